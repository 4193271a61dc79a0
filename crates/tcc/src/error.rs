//! Transaction error types.

use common::{ActorId, ProjectId, RepositoryId};
use compensation::CompensationError;
use gateway::GatewayError;
use project::ProjectError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::TransactionStatus;
use crate::validation::ValidationError;

/// The phase a transaction is in, and the tag carried by its errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Validation,
    Execution,
    Confirm,
    Cancel,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validation => "validation",
            Phase::Execution => "execution",
            Phase::Confirm => "confirm",
            Phase::Cancel => "cancel",
        }
    }

    /// The error kind a failure in this phase is reported as.
    pub fn failure_kind(&self) -> ErrorKind {
        match self {
            Phase::Validation => ErrorKind::ValidationFailure,
            Phase::Execution => ErrorKind::ExecutionFailure,
            Phase::Confirm => ErrorKind::ConfirmationFailure,
            Phase::Cancel => ErrorKind::CompensationFailure,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of transaction failures for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any side effect.
    ValidationFailure,
    /// The actor may not act on the project.
    AccessDenied,
    /// The gateway rejected the side effect; nothing to roll back.
    ExecutionFailure,
    /// The side effect could not be confirmed and was rolled back.
    ConfirmationFailure,
    /// Rolling back failed; the compensation manager holds the leftovers.
    CompensationFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::ExecutionFailure => "execution_failure",
            ErrorKind::ConfirmationFailure => "confirmation_failure",
            ErrorKind::CompensationFailure => "compensation_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by transaction operations.
///
/// Every message starts with the phase tag, e.g. `[validation] ...`.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("[validation] project {project_id} not found")]
    ProjectNotFound { project_id: ProjectId },

    #[error("[validation] actor {actor_id} has no access to project {project_id}")]
    AccessDenied {
        actor_id: ActorId,
        project_id: ProjectId,
    },

    #[error("[validation] invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("[validation] repository {repository_id} not found in project {project_id}")]
    RepositoryNotFound {
        repository_id: RepositoryId,
        project_id: ProjectId,
    },

    #[error("[validation] project lookup failed: {0}")]
    ProjectLookup(#[source] ProjectError),

    #[error("[validation] repository lookup failed: {0}")]
    RepositoryLookup(#[source] GatewayError),

    #[error("[execution] gateway rejected the operation: {0}")]
    Execution(#[source] GatewayError),

    #[error("[confirm] {reason}")]
    Confirmation { reason: String },

    #[error("[cancel] compensation failed after '{reason}': {source}")]
    Compensation {
        reason: String,
        #[source]
        source: CompensationError,
    },

    #[error("[{phase}] cancelled")]
    Cancelled { phase: Phase },

    #[error("[{phase}] invalid transition from {from} to {to}")]
    InvalidTransition {
        phase: Phase,
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

impl TransactionError {
    /// The phase the error was raised in.
    pub fn phase(&self) -> Phase {
        match self {
            TransactionError::ProjectNotFound { .. }
            | TransactionError::AccessDenied { .. }
            | TransactionError::InvalidRequest(_)
            | TransactionError::RepositoryNotFound { .. }
            | TransactionError::ProjectLookup(_)
            | TransactionError::RepositoryLookup(_) => Phase::Validation,
            TransactionError::Execution(_) => Phase::Execution,
            TransactionError::Confirmation { .. } => Phase::Confirm,
            TransactionError::Compensation { .. } => Phase::Cancel,
            TransactionError::Cancelled { phase } | TransactionError::InvalidTransition { phase, .. } => {
                *phase
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::AccessDenied { .. } => ErrorKind::AccessDenied,
            other => other.phase().failure_kind(),
        }
    }

    /// True if a side effect may have been committed and rolled back.
    pub fn is_post_commit(&self) -> bool {
        matches!(self.phase(), Phase::Confirm | Phase::Cancel)
    }
}

/// Convenience type alias for transaction results.
pub type Result<T> = std::result::Result<T, TransactionError>;
