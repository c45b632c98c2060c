pub mod compose;
pub mod config;
pub mod env_defaults;
pub mod error;
pub mod fs_guard;
pub mod health;
pub mod logging;
pub mod marker;
pub mod presets;
pub mod process;
pub mod project;
pub mod safety;
pub mod setup;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use compose::ProjectContext;
pub use error::{AppError, MountError, ProjectValidationError, SafetyError};
pub use health::HealthStatus;
pub use process::{CommandResult, CommandRunner, SystemRunner};
pub use safety::SafetyContext;
pub use workflow::{StartOptions, WorkflowResult};
