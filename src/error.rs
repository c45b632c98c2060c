use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Raised when a destructive action runs without confirmation or override.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Action '{action}' requires explicit confirmation")]
pub struct SafetyError {
    pub action: String,
}

/// A host path has the wrong type for the bind mount that will use it.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("Expected file but found directory: {}", .0.display())]
    ExpectedFile(PathBuf),
    #[error("Expected directory but found file: {}", .0.display())]
    ExpectedDirectory(PathBuf),
    #[error("Cannot back up missing file: {}", .0.display())]
    MissingBackupSource(PathBuf),
    #[error("filesystem error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MountError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Missing required project files: {}", .missing.join(", "))]
pub struct ProjectValidationError {
    pub missing: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Safety(#[from] SafetyError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Project(#[from] ProjectValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_error_names_the_action() {
        let err = SafetyError {
            action: "stop docker environment".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Action 'stop docker environment' requires explicit confirmation"
        );
    }

    #[test]
    fn project_validation_lists_missing_files() {
        let err = ProjectValidationError {
            missing: vec!["artisan".to_string(), "composer.json".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required project files: artisan, composer.json"
        );
    }

    #[test]
    fn app_error_is_transparent_for_mount_errors() {
        let err: AppError = MountError::ExpectedFile(PathBuf::from("/tmp/x")).into();
        assert_eq!(err.to_string(), "Expected file but found directory: /tmp/x");
    }
}
