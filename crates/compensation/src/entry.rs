//! Compensation entries and their status.

use chrono::{DateTime, Utc};
use common::CompensationId;
use serde::{Deserialize, Serialize};

use crate::action::CompensationAction;

/// Default retry budget for a new entry.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle of a compensation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompensationStatus {
    /// Waiting to run, or ran and failed with retries left.
    #[default]
    Pending,
    /// Ran successfully (terminal).
    Executed,
    /// Retry budget exhausted (terminal).
    Failed,
}

impl CompensationStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompensationStatus::Executed | CompensationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationStatus::Pending => "pending",
            CompensationStatus::Executed => "executed",
            CompensationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CompensationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a pending entry may run.
///
/// Entries enrolled by a transaction start `Held` and are settled by its
/// outcome: armed when it cancels, retired when it confirms. Entries
/// registered directly start `Armed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Eligible for execution and for drains.
    #[default]
    Armed,
    /// The owning transaction has not decided yet.
    Held,
    /// The owning transaction confirmed; never runs.
    Retired,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Armed => "armed",
            Disposition::Held => "held",
            Disposition::Retired => "retired",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered compensation intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationEntry {
    pub id: CompensationId,
    pub action: CompensationAction,
    pub resource_id: String,
    pub payload: serde_json::Value,
    pub status: CompensationStatus,
    #[serde(default)]
    pub disposition: Disposition,
    /// Number of times the action has been invoked. Never exceeds `max_retries`.
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retired_at: Option<DateTime<Utc>>,
}

impl CompensationEntry {
    pub(crate) fn new(
        action: CompensationAction,
        resource_id: String,
        payload: serde_json::Value,
        max_retries: u32,
        disposition: Disposition,
    ) -> Self {
        Self {
            id: CompensationId::new(),
            action,
            resource_id,
            payload,
            status: CompensationStatus::Pending,
            disposition,
            retry_count: 0,
            max_retries,
            last_error: None,
            created_at: Utc::now(),
            executed_at: None,
            retired_at: None,
        }
    }

    /// True when another invocation is allowed.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// True when a drain should pick this entry up.
    pub fn is_drainable(&self) -> bool {
        self.status == CompensationStatus::Pending && self.disposition == Disposition::Armed
    }
}

/// Entry counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompensationStats {
    pub pending: usize,
    pub executed: usize,
    pub failed: usize,
    pub retired: usize,
}

impl CompensationStats {
    pub fn total(&self) -> usize {
        self.pending + self.executed + self.failed + self.retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_defaults() {
        let entry = CompensationEntry::new(
            CompensationAction::DeleteRepository,
            "repo".into(),
            serde_json::Value::Null,
            DEFAULT_MAX_RETRIES,
            Disposition::Armed,
        );
        assert_eq!(entry.status, CompensationStatus::Pending);
        assert!(entry.is_drainable());
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.max_retries, 3);
        assert!(entry.has_retries_left());
        assert!(entry.executed_at.is_none());
    }

    #[test]
    fn test_only_armed_pending_entries_drain() {
        let mut entry = CompensationEntry::new(
            CompensationAction::NotifyFailure,
            "repo".into(),
            serde_json::Value::Null,
            DEFAULT_MAX_RETRIES,
            Disposition::Held,
        );
        assert!(!entry.is_drainable());

        entry.disposition = Disposition::Retired;
        assert!(!entry.is_drainable());

        entry.disposition = Disposition::Armed;
        entry.status = CompensationStatus::Failed;
        assert!(!entry.is_drainable());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!CompensationStatus::Pending.is_terminal());
        assert!(CompensationStatus::Executed.is_terminal());
        assert!(CompensationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&CompensationStatus::Executed).unwrap(),
            "\"executed\""
        );
        assert_eq!(CompensationStatus::Failed.to_string(), "failed");
    }
}
