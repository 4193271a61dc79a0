//! The closed set of compensation actions.

use serde::{Deserialize, Serialize};

use crate::error::CompensationError;

/// What a compensation entry does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompensationAction {
    /// Delete a repository created on the gateway.
    DeleteRepository,
    /// Audit record of a project-side rollback. No external effect.
    RollbackProject,
    /// Tell operators something could not be undone. Always succeeds.
    NotifyFailure,
}

impl CompensationAction {
    /// Returns the action tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationAction::DeleteRepository => "delete-repository",
            CompensationAction::RollbackProject => "rollback-project",
            CompensationAction::NotifyFailure => "notify-failure",
        }
    }
}

impl std::fmt::Display for CompensationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CompensationAction {
    type Err = CompensationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete-repository" => Ok(CompensationAction::DeleteRepository),
            "rollback-project" => Ok(CompensationAction::RollbackProject),
            "notify-failure" => Ok(CompensationAction::NotifyFailure),
            other => Err(CompensationError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for action in [
            CompensationAction::DeleteRepository,
            CompensationAction::RollbackProject,
            CompensationAction::NotifyFailure,
        ] {
            assert_eq!(action.as_str().parse::<CompensationAction>().unwrap(), action);
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
        }
    }

    #[test]
    fn test_unknown_tag() {
        let err = "drop-database".parse::<CompensationAction>().unwrap_err();
        assert!(matches!(err, CompensationError::UnknownAction(ref tag) if tag == "drop-database"));
    }
}
