//! Start, stop and reset-database workflows.
//!
//! Each workflow is a linear chain of steps. The first failing step ends the
//! chain; the steps that already completed stay in the returned log. Nothing
//! is retried. Command failures come back as data in [`WorkflowResult`];
//! a missing confirmation is a [`SafetyError`] raised before anything runs.

use crate::compose::{artisan, artisan_with_timeout, compose_down, compose_up, composer, ProjectContext};
use crate::error::SafetyError;
use crate::health::wait_until_healthy;
use crate::marker::MarkerStore;
use crate::process::{CommandResult, CommandRunner};
use crate::project::sail_installed;
use crate::safety::{require_confirmation, SafetyContext};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const STOP_ACTION: &str = "stop docker environment";
pub const RESET_ACTION: &str = "reset database (migrate:fresh)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowResult {
    pub ok: bool,
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn success(steps: Vec<String>, result: Option<CommandResult>) -> Self {
        Self {
            ok: true,
            steps,
            result,
            error: None,
        }
    }

    pub fn failure(
        steps: Vec<String>,
        error: impl Into<String>,
        result: Option<CommandResult>,
    ) -> Self {
        let error = error.into();
        debug_assert!(!error.is_empty());
        Self {
            ok: false,
            steps,
            result,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOptions {
    pub auto_migrate: bool,
    pub ensure_sail: bool,
    pub wait_for_health: bool,
    pub health_service: String,
    pub health_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            auto_migrate: true,
            ensure_sail: false,
            wait_for_health: true,
            health_service: "mysql".to_string(),
            health_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3),
        }
    }
}

impl StartOptions {
    /// Defaults with the health settings taken from `ctx`'s config.
    pub fn for_project(ctx: &ProjectContext) -> Self {
        Self {
            health_service: ctx.config.health.service.clone(),
            health_timeout: ctx.config.health.timeout(),
            poll_interval: ctx.config.health.poll_interval(),
            ..Self::default()
        }
    }
}

/// Brings the environment up, then optionally waits for health, installs
/// Sail and migrates, in that order.
#[instrument(skip_all, fields(project = %ctx.name()))]
pub fn start_environment<R: CommandRunner, M: MarkerStore>(
    ctx: &ProjectContext,
    runner: &R,
    markers: &M,
    options: &StartOptions,
) -> WorkflowResult {
    let mut steps = Vec::new();

    let up = compose_up(ctx, runner);
    if !up.ok {
        return WorkflowResult::failure(steps, "Docker failed to start", Some(up));
    }
    steps.push("Docker environment started".to_string());
    info!("docker environment started");

    match markers.mark_initialized(ctx.root()) {
        Ok(()) => steps.push("MySQL marked as initialized".to_string()),
        Err(err) => warn!(err = %err, "failed to record mysql marker"),
    }

    if options.wait_for_health {
        let service = options.health_service.as_str();
        let healthy = wait_until_healthy(
            ctx,
            runner,
            service,
            options.health_timeout,
            options.poll_interval,
        );
        if !healthy {
            return WorkflowResult::failure(
                steps,
                format!("Service '{service}' did not become healthy in time"),
                None,
            );
        }
        steps.push(format!("Service '{service}' is healthy"));
    }

    if options.ensure_sail {
        if sail_installed(ctx.root()) {
            steps.push("Laravel Sail already installed".to_string());
        } else {
            let sail = install_sail(ctx, runner);
            if !sail.ok {
                return WorkflowResult::failure(steps, "Failed to install Laravel Sail", Some(sail));
            }
            steps.push("Laravel Sail installed".to_string());
        }
    }

    if options.auto_migrate {
        let migrate = artisan(ctx, runner, &["migrate"]);
        if !migrate.ok {
            return WorkflowResult::failure(steps, "Database migration failed", Some(migrate));
        }
        steps.push("Database migrations completed".to_string());
    }

    WorkflowResult::success(steps, Some(up))
}

/// `composer require laravel/sail --dev`, then `artisan sail:install`.
/// Returns the first failing sub-command's result.
pub fn install_sail<R: CommandRunner>(ctx: &ProjectContext, runner: &R) -> CommandResult {
    let timeout = ctx.config.docker.install_timeout();
    let required = composer(ctx, runner, &["require", "laravel/sail", "--dev"], timeout);
    if !required.ok {
        return required;
    }
    artisan_with_timeout(ctx, runner, &["sail:install", "--no-interaction"], timeout)
}

#[instrument(skip_all, fields(project = %ctx.name()))]
pub fn stop_environment<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    safety: &SafetyContext,
) -> Result<WorkflowResult, SafetyError> {
    require_confirmation(safety, STOP_ACTION)?;

    let down = compose_down(ctx, runner);
    if !down.ok {
        return Ok(WorkflowResult::failure(Vec::new(), "Docker down failed", Some(down)));
    }
    info!("docker environment stopped");
    Ok(WorkflowResult::success(
        vec!["Docker environment stopped".to_string()],
        Some(down),
    ))
}

/// Confirmation, then `migrate:fresh`, then the optional seed. Order is fixed.
#[instrument(skip_all, fields(project = %ctx.name(), seed = seed))]
pub fn reset_database<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    seed: bool,
    safety: &SafetyContext,
) -> Result<WorkflowResult, SafetyError> {
    require_confirmation(safety, RESET_ACTION)?;

    let mut steps = Vec::new();
    let fresh = artisan(ctx, runner, &["migrate:fresh"]);
    if !fresh.ok {
        return Ok(WorkflowResult::failure(steps, "migrate:fresh failed", Some(fresh)));
    }
    steps.push("Database reset with migrate:fresh".to_string());

    if seed {
        let seeded = artisan(ctx, runner, &["db:seed"]);
        if !seeded.ok {
            return Ok(WorkflowResult::failure(steps, "Database seeding failed", Some(seeded)));
        }
        steps.push("Database seeded".to_string());
    }

    info!("database reset");
    Ok(WorkflowResult::success(steps, Some(fresh)))
}
