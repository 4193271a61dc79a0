//! Transaction record and its state machine.

use chrono::{DateTime, Utc};
use common::{ActorId, CompensationId, ProjectId, TenantId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Phase, Result, TransactionError};

/// The operation a transaction drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    CreateRepository,
    DeleteRepository,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::CreateRepository => "create-repository",
            TransactionKind::DeleteRepository => "delete-repository",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a transaction.
///
/// ```text
/// Pending ──► Validated ──► Executed ──► Confirmed
///    │            │             │
///    └► Failed    └► Failed     └► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Validated,
    Executed,
    /// Terminal.
    Confirmed,
    /// Terminal; enrolled compensations were attempted.
    Cancelled,
    /// Terminal; no side effect was committed.
    Failed,
}

impl TransactionStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed | TransactionStatus::Cancelled | TransactionStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Validated => "validated",
            TransactionStatus::Executed => "executed",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The error a transaction ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFailure {
    pub phase: Phase,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TransactionError> for TransactionFailure {
    fn from(err: &TransactionError) -> Self {
        Self {
            phase: err.phase(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A single try-confirm-cancel run.
///
/// Fields are public for reading; status only changes through the `mark_*`
/// methods, which reject transitions outside the state machine and leave the
/// transaction untouched when they do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub phase: Phase,
    pub status: TransactionStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub request: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub compensation_ids: Vec<CompensationId>,
    pub last_error: Option<TransactionFailure>,
}

impl Transaction {
    pub fn new(
        kind: TransactionKind,
        actor_id: ActorId,
        tenant_id: TenantId,
        project_id: ProjectId,
        request: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            kind,
            actor_id,
            tenant_id,
            project_id,
            phase: Phase::Validation,
            status: TransactionStatus::Pending,
            started_at: now,
            updated_at: now,
            completed_at: None,
            request,
            result: None,
            compensation_ids: Vec::new(),
            last_error: None,
        }
    }

    fn invalid(&self, to: TransactionStatus) -> TransactionError {
        TransactionError::InvalidTransition {
            phase: self.phase,
            from: self.status,
            to,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn complete(&mut self) {
        self.touch();
        self.completed_at = Some(self.updated_at);
    }

    /// Pending → Validated; moves into the execution phase.
    pub fn mark_validated(&mut self) -> Result<()> {
        if self.status != TransactionStatus::Pending {
            return Err(self.invalid(TransactionStatus::Validated));
        }
        self.status = TransactionStatus::Validated;
        self.phase = Phase::Execution;
        self.touch();
        Ok(())
    }

    /// Records a compensation enrolled after the side effect was committed.
    pub fn enrol(&mut self, compensation_id: CompensationId) -> Result<()> {
        if self.status != TransactionStatus::Validated {
            return Err(self.invalid(TransactionStatus::Executed));
        }
        self.compensation_ids.push(compensation_id);
        self.touch();
        Ok(())
    }

    /// Validated → Executed; moves into the confirm phase.
    ///
    /// Requires at least one enrolled compensation.
    pub fn mark_executed(&mut self, result: serde_json::Value) -> Result<()> {
        if self.status != TransactionStatus::Validated || self.compensation_ids.is_empty() {
            return Err(self.invalid(TransactionStatus::Executed));
        }
        self.status = TransactionStatus::Executed;
        self.phase = Phase::Confirm;
        self.result = Some(result);
        self.touch();
        Ok(())
    }

    /// Executed → Confirmed.
    pub fn mark_confirmed(&mut self) -> Result<()> {
        if self.status != TransactionStatus::Executed {
            return Err(self.invalid(TransactionStatus::Confirmed));
        }
        self.status = TransactionStatus::Confirmed;
        self.complete();
        Ok(())
    }

    /// Pending or Validated → Failed.
    pub fn mark_failed(&mut self, err: &TransactionError) -> Result<()> {
        if !matches!(
            self.status,
            TransactionStatus::Pending | TransactionStatus::Validated
        ) {
            return Err(self.invalid(TransactionStatus::Failed));
        }
        self.status = TransactionStatus::Failed;
        self.last_error = Some(err.into());
        self.complete();
        Ok(())
    }

    /// Executed → Cancelled; moves into the cancel phase.
    pub fn mark_cancelled(&mut self, err: &TransactionError) -> Result<()> {
        if self.status != TransactionStatus::Executed {
            return Err(self.invalid(TransactionStatus::Cancelled));
        }
        self.status = TransactionStatus::Cancelled;
        self.phase = Phase::Cancel;
        self.last_error = Some(err.into());
        self.complete();
        Ok(())
    }
}
