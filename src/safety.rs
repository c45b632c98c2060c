use crate::error::SafetyError;
use std::path::PathBuf;
use tracing::warn;

/// Caller's authorization for the current action. Built fresh per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyContext {
    pub project: PathBuf,
    pub confirmed: bool,
    pub force: bool,
}

impl SafetyContext {
    pub fn new(project: impl Into<PathBuf>, confirmed: bool, force: bool) -> Self {
        Self {
            project: project.into(),
            confirmed,
            force,
        }
    }
}

/// Fails closed unless the context is forced or confirmed. Call before acting.
pub fn require_confirmation(ctx: &SafetyContext, action: &str) -> Result<(), SafetyError> {
    if ctx.force {
        return Ok(());
    }
    if !ctx.confirmed {
        warn!(action, project = %ctx.project.display(), "refusing unconfirmed action");
        return Err(SafetyError {
            action: action.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfirmed_action_is_rejected_with_its_name() {
        let ctx = SafetyContext::new("/srv/shop", false, false);
        let err = require_confirmation(&ctx, "stop docker environment").unwrap_err();
        assert_eq!(err.action, "stop docker environment");
    }

    #[test]
    fn confirmation_passes() {
        let ctx = SafetyContext::new("/srv/shop", true, false);
        assert!(require_confirmation(&ctx, "reset").is_ok());
    }

    #[test]
    fn force_overrides_missing_confirmation() {
        let ctx = SafetyContext::new("/srv/shop", false, true);
        assert!(require_confirmation(&ctx, "reset").is_ok());
    }
}
