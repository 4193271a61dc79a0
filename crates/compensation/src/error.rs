//! Compensation error types.

use common::CompensationId;
use gateway::GatewayError;
use thiserror::Error;

use crate::action::CompensationAction;
use crate::entry::Disposition;

/// Errors from an individual action executor.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The gateway call behind the action failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The entry's resource id is not usable by the action.
    #[error("Invalid resource id '{0}'")]
    InvalidResource(String),
}

/// Errors that can occur during compensation operations.
#[derive(Debug, Error)]
pub enum CompensationError {
    /// No entry is registered under the id.
    #[error("Compensation not found: {0}")]
    NotFound(CompensationId),

    /// The entry used up its retry budget and is now failed.
    #[error("Compensation {id} exhausted its {max_retries} retries")]
    RetriesExhausted { id: CompensationId, max_retries: u32 },

    /// The action ran and failed; the entry stays pending for re-drive.
    #[error("Compensation {id} ({action}) failed: {source}")]
    ExecutionFailed {
        id: CompensationId,
        action: CompensationAction,
        #[source]
        source: ActionError,
    },

    /// The entry is held by an undecided transaction or was retired by a
    /// confirmed one.
    #[error("Compensation {id} is {disposition} and cannot run")]
    NotArmed {
        id: CompensationId,
        disposition: Disposition,
    },

    /// The action tag is not one of the known actions.
    #[error("Unknown compensation action: {0}")]
    UnknownAction(String),

    /// The caller cancelled before the action was invoked.
    #[error("Compensation cancelled before execution")]
    Cancelled,
}

impl CompensationError {
    /// True if the entry stays pending and may succeed on a later run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompensationError::ExecutionFailed { .. } | CompensationError::Cancelled
        )
    }
}

/// Convenience type alias for compensation results.
pub type Result<T> = std::result::Result<T, CompensationError>;
