//! Argument building for `docker compose` and in-container commands.

use crate::config::Config;
use crate::process::{CommandResult, CommandRunner};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A project directory together with the settings used to drive it.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub root: PathBuf,
    pub config: Config,
}

impl ProjectContext {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    }
}

pub fn compose_base_args(ctx: &ProjectContext) -> Vec<String> {
    vec![
        "compose".to_string(),
        "-f".to_string(),
        ctx.config.docker.compose_file.clone(),
    ]
}

fn run_compose<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    args: Vec<String>,
    timeout: Duration,
) -> CommandResult {
    runner.run(&ctx.config.docker.binary, &args, ctx.root(), timeout)
}

/// Builds and starts the environment. Builds can be slow, hence the longer timeout.
pub fn compose_up<R: CommandRunner>(ctx: &ProjectContext, runner: &R) -> CommandResult {
    let mut args = compose_base_args(ctx);
    args.extend(["up", "-d", "--build"].map(String::from));
    run_compose(ctx, runner, args, ctx.config.docker.up_timeout())
}

/// Stops and removes containers. Volumes are kept.
pub fn compose_down<R: CommandRunner>(ctx: &ProjectContext, runner: &R) -> CommandResult {
    let mut args = compose_base_args(ctx);
    args.extend(["down", "--remove-orphans"].map(String::from));
    run_compose(ctx, runner, args, ctx.config.docker.command_timeout())
}

pub fn compose_ps<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    service: &str,
) -> CommandResult {
    let mut args = compose_base_args(ctx);
    args.extend(["ps", "--format", "json", service].map(String::from));
    run_compose(ctx, runner, args, ctx.config.docker.command_timeout())
}

/// Runs `command` inside the app service without a TTY, so output is buffered.
pub fn app_exec<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    command: &[String],
    timeout: Duration,
) -> CommandResult {
    let mut args = compose_base_args(ctx);
    args.push("exec".to_string());
    args.push("-T".to_string());
    args.push(ctx.config.docker.app_service.clone());
    args.extend(command.iter().cloned());
    run_compose(ctx, runner, args, timeout)
}

pub fn artisan<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    args: &[&str],
) -> CommandResult {
    artisan_with_timeout(ctx, runner, args, ctx.config.docker.command_timeout())
}

pub fn artisan_with_timeout<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    args: &[&str],
    timeout: Duration,
) -> CommandResult {
    if args.is_empty() {
        return CommandResult::failure("No artisan command provided");
    }
    let command = with_prefix(&ctx.config.app.cli, args);
    app_exec(ctx, runner, &command, timeout)
}

pub fn composer<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    args: &[&str],
    timeout: Duration,
) -> CommandResult {
    let command = with_prefix(&ctx.config.app.composer, args);
    app_exec(ctx, runner, &command, timeout)
}

fn with_prefix(prefix: &[String], args: &[&str]) -> Vec<String> {
    prefix
        .iter()
        .filter(|part| !part.trim().is_empty())
        .cloned()
        .chain(args.iter().map(|arg| arg.to_string()))
        .collect()
}
