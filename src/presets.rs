use crate::compose::ProjectContext;
use crate::error::SafetyError;
use crate::marker::MarkerStore;
use crate::process::CommandRunner;
use crate::safety::SafetyContext;
use crate::workflow::{
    reset_database, start_environment, stop_environment, StartOptions, WorkflowResult,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "workflow", rename_all = "snake_case")]
pub enum PresetAction {
    /// Start with auto-migrate and the configured health wait.
    Start { auto_migrate: bool, ensure_sail: bool },
    Stop,
    ResetDatabase { seed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Preset {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub action: PresetAction,
}

pub const PRESETS: [Preset; 3] = [
    Preset {
        key: "ready",
        name: "Ready for work",
        description: "Start Docker and run migrations",
        action: PresetAction::Start {
            auto_migrate: true,
            ensure_sail: false,
        },
    },
    Preset {
        key: "fresh",
        name: "Fresh start",
        description: "Rebuild the database with migrate:fresh and seed it",
        action: PresetAction::ResetDatabase { seed: true },
    },
    Preset {
        key: "stop",
        name: "Stop environment",
        description: "Stop Docker containers",
        action: PresetAction::Stop,
    },
];

pub fn find_preset(key: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.key == key)
}

impl PresetAction {
    pub fn is_destructive(&self) -> bool {
        !matches!(self, Self::Start { .. })
    }
}

pub fn run_preset<R: CommandRunner, M: MarkerStore>(
    preset: &Preset,
    ctx: &ProjectContext,
    runner: &R,
    markers: &M,
    safety: &SafetyContext,
) -> Result<WorkflowResult, SafetyError> {
    match preset.action {
        PresetAction::Start {
            auto_migrate,
            ensure_sail,
        } => {
            let options = StartOptions {
                auto_migrate,
                ensure_sail,
                ..StartOptions::for_project(ctx)
            };
            Ok(start_environment(ctx, runner, markers, &options))
        }
        PresetAction::Stop => stop_environment(ctx, runner, safety),
        PresetAction::ResetDatabase { seed } => reset_database(ctx, runner, seed, safety),
    }
}
