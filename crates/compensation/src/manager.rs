//! The compensation registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use callback::EventPublisher;
use chrono::{DateTime, TimeDelta, Utc};
use common::CompensationId;
use gateway::GatewayClient;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::action::CompensationAction;
use crate::entry::{CompensationEntry, CompensationStats, CompensationStatus, Disposition, DEFAULT_MAX_RETRIES};
use crate::error::{CompensationError, Result};
use crate::executor::ActionExecutor;

/// Tuning for a [`CompensationManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompensationConfig {
    /// Retry budget given to new entries.
    pub max_retries: u32,
    /// How long executed and retired entries are kept before `clear_executed`
    /// drops them.
    pub retention: Duration,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retention: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct Slot {
    entry: CompensationEntry,
    /// Enrolment order, used when draining.
    seq: u64,
    /// Serialises executions of this entry.
    gate: Arc<Mutex<()>>,
}

#[derive(Debug, Default)]
struct Registry {
    slots: HashMap<CompensationId, Slot>,
    next_seq: u64,
}

impl Registry {
    fn slot(&self, id: CompensationId) -> Result<&Slot> {
        self.slots.get(&id).ok_or(CompensationError::NotFound(id))
    }

    fn slot_mut(&mut self, id: CompensationId) -> Result<&mut Slot> {
        self.slots.get_mut(&id).ok_or(CompensationError::NotFound(id))
    }

    fn sorted(&self, keep: impl Fn(&CompensationEntry) -> bool) -> Vec<CompensationEntry> {
        let mut slots: Vec<&Slot> = self.slots.values().filter(|s| keep(&s.entry)).collect();
        slots.sort_by_key(|s| s.seq);
        slots.into_iter().map(|s| s.entry.clone()).collect()
    }
}

/// Registers compensation intents and executes them until they succeed or
/// exhaust their retry budget.
///
/// State lives in a process-local map behind a single mutex. Actions run
/// outside that lock so slow gateway calls never block status queries;
/// executions of the same entry are serialised by a per-entry gate, so of
/// several concurrent callers only the first observes a transition and the
/// rest see the resulting status.
pub struct CompensationManager<G, E> {
    registry: Mutex<Registry>,
    executor: ActionExecutor<G, E>,
    config: CompensationConfig,
}

impl<G, E> CompensationManager<G, E>
where
    G: GatewayClient,
    E: EventPublisher,
{
    /// Creates a manager with the default configuration.
    pub fn new(gateway: G, publisher: E) -> Self {
        Self::with_config(gateway, publisher, CompensationConfig::default())
    }

    pub fn with_config(gateway: G, publisher: E, config: CompensationConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            executor: ActionExecutor::new(gateway, publisher),
            config,
        }
    }

    pub fn config(&self) -> CompensationConfig {
        self.config
    }

    /// Registers a new pending entry and returns its id.
    ///
    /// The entry is armed: the next drain runs it.
    #[tracing::instrument(skip_all, fields(action = %action))]
    pub async fn add_compensation(
        &self,
        action: CompensationAction,
        resource_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> CompensationId {
        self.register(action, resource_id.into(), payload, Disposition::Armed).await
    }

    /// Registers a pending entry on behalf of an undecided transaction.
    ///
    /// The entry is held: drains skip it and it cannot run until the
    /// transaction arms it with [`arm`](Self::arm). A transaction that
    /// confirms calls [`retire`](Self::retire) instead.
    #[tracing::instrument(skip_all, fields(action = %action))]
    pub async fn enrol_compensation(
        &self,
        action: CompensationAction,
        resource_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> CompensationId {
        self.register(action, resource_id.into(), payload, Disposition::Held).await
    }

    async fn register(
        &self,
        action: CompensationAction,
        resource_id: String,
        payload: serde_json::Value,
        disposition: Disposition,
    ) -> CompensationId {
        let entry = CompensationEntry::new(action, resource_id, payload, self.config.max_retries, disposition);
        let id = entry.id;

        let mut registry = self.registry.lock().await;
        let seq = registry.next_seq;
        registry.next_seq += 1;
        registry.slots.insert(
            id,
            Slot {
                entry,
                seq,
                gate: Arc::new(Mutex::new(())),
            },
        );
        drop(registry);

        metrics::counter!("compensations_registered_total", "action" => action.as_str()).increment(1);
        tracing::debug!(compensation_id = %id, %disposition, "compensation registered");
        id
    }

    /// Makes held entries runnable. Returns how many changed.
    pub async fn arm(&self, ids: &[CompensationId]) -> usize {
        self.settle(ids, Disposition::Armed).await
    }

    /// Marks entries whose side effect was confirmed so they never run.
    ///
    /// Retired entries keep status `pending` and are dropped by
    /// `clear_executed` once past retention. Returns how many changed.
    pub async fn retire(&self, ids: &[CompensationId]) -> usize {
        self.settle(ids, Disposition::Retired).await
    }

    async fn settle(&self, ids: &[CompensationId], to: Disposition) -> usize {
        let mut registry = self.registry.lock().await;
        let mut changed = 0;
        for id in ids {
            let Some(slot) = registry.slots.get_mut(id) else {
                tracing::warn!(compensation_id = %id, "cannot settle unknown compensation");
                continue;
            };
            let entry = &mut slot.entry;
            if entry.status != CompensationStatus::Pending || entry.disposition != Disposition::Held {
                continue;
            }
            entry.disposition = to;
            if to == Disposition::Retired {
                entry.retired_at = Some(Utc::now());
            }
            changed += 1;
        }
        tracing::debug!(changed, disposition = %to, "compensations settled");
        changed
    }

    /// Executes one entry.
    ///
    /// - executed entries return `Ok` without running again
    /// - held or retired entries return `NotArmed` without running
    /// - entries out of retries become `Failed` and return `RetriesExhausted`
    /// - otherwise the action runs once and the retry count goes up by one;
    ///   on failure the entry stays pending with the error recorded
    #[tracing::instrument(skip(self, cancel))]
    pub async fn execute_compensation(
        &self,
        cancel: &CancellationToken,
        id: CompensationId,
    ) -> Result<()> {
        let gate = Arc::clone(&self.registry.lock().await.slot(id)?.gate);
        let _running = gate.lock().await;

        let entry = {
            let mut registry = self.registry.lock().await;
            let slot = registry.slot_mut(id)?;
            match slot.entry.status {
                CompensationStatus::Executed => {
                    tracing::debug!("already executed, skipping");
                    return Ok(());
                }
                CompensationStatus::Failed => {
                    return Err(CompensationError::RetriesExhausted {
                        id,
                        max_retries: slot.entry.max_retries,
                    });
                }
                CompensationStatus::Pending if slot.entry.disposition != Disposition::Armed => {
                    return Err(CompensationError::NotArmed {
                        id,
                        disposition: slot.entry.disposition,
                    });
                }
                CompensationStatus::Pending if !slot.entry.has_retries_left() => {
                    slot.entry.status = CompensationStatus::Failed;
                    metrics::counter!("compensations_failed_total", "action" => slot.entry.action.as_str())
                        .increment(1);
                    tracing::error!(
                        action = %slot.entry.action,
                        resource_id = %slot.entry.resource_id,
                        retries = slot.entry.retry_count,
                        last_error = ?slot.entry.last_error,
                        "compensation exhausted its retries; operator action required"
                    );
                    return Err(CompensationError::RetriesExhausted {
                        id,
                        max_retries: slot.entry.max_retries,
                    });
                }
                CompensationStatus::Pending => slot.entry.clone(),
            }
        };

        if cancel.is_cancelled() {
            return Err(CompensationError::Cancelled);
        }

        let outcome = self.executor.execute(&entry).await;

        let mut registry = self.registry.lock().await;
        let slot = registry.slot_mut(id)?;
        slot.entry.retry_count += 1;

        match outcome {
            Ok(()) => {
                slot.entry.status = CompensationStatus::Executed;
                slot.entry.executed_at = Some(Utc::now());
                slot.entry.last_error = None;
                metrics::counter!("compensations_executed_total", "action" => entry.action.as_str())
                    .increment(1);
                tracing::info!(
                    action = %entry.action,
                    resource_id = %entry.resource_id,
                    attempt = slot.entry.retry_count,
                    "compensation executed"
                );
                Ok(())
            }
            Err(source) => {
                slot.entry.last_error = Some(source.to_string());
                tracing::warn!(
                    action = %entry.action,
                    resource_id = %entry.resource_id,
                    attempt = slot.entry.retry_count,
                    error = %source,
                    "compensation attempt failed"
                );
                Err(CompensationError::ExecutionFailed {
                    id,
                    action: entry.action,
                    source,
                })
            }
        }
    }

    /// Executes every armed pending entry in enrolment order.
    ///
    /// Held and retired entries are skipped. Keeps going past failures and returns the first error seen.
    /// Cancellation is honoured between entries.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn execute_all_pending(&self, cancel: &CancellationToken) -> Result<()> {
        let ids: Vec<CompensationId> = self
            .registry
            .lock()
            .await
            .sorted(CompensationEntry::is_drainable)
            .into_iter()
            .map(|e| e.id)
            .collect();

        tracing::debug!(pending = ids.len(), "draining pending compensations");
        self.execute_many(cancel, &ids).await
    }

    /// Executes the given entries in order, best effort.
    ///
    /// Keeps going past failures and returns the first error seen.
    /// Cancellation is honoured between entries.
    pub async fn execute_many(&self, cancel: &CancellationToken, ids: &[CompensationId]) -> Result<()> {
        let mut first_error = None;

        for &id in ids {
            if cancel.is_cancelled() {
                first_error.get_or_insert(CompensationError::Cancelled);
                break;
            }
            if let Err(e) = self.execute_compensation(cancel, id).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Returns the status of an entry.
    pub async fn get_status(&self, id: CompensationId) -> Result<CompensationStatus> {
        Ok(self.registry.lock().await.slot(id)?.entry.status)
    }

    /// Returns a snapshot of an entry.
    pub async fn get(&self, id: CompensationId) -> Option<CompensationEntry> {
        self.registry
            .lock()
            .await
            .slots
            .get(&id)
            .map(|s| s.entry.clone())
    }

    /// Pending entries in enrolment order.
    pub async fn list_pending(&self) -> Vec<CompensationEntry> {
        self.registry
            .lock()
            .await
            .sorted(|e| e.status == CompensationStatus::Pending)
    }

    /// Entries that exhausted their retries, in enrolment order.
    pub async fn list_failed(&self) -> Vec<CompensationEntry> {
        self.registry
            .lock()
            .await
            .sorted(|e| e.status == CompensationStatus::Failed)
    }

    /// Drops executed and retired entries older than the configured retention.
    ///
    /// Armed, held and failed entries are never removed.
    pub async fn clear_executed(&self) -> usize {
        let retention = self.config.retention;
        let mut registry = self.registry.lock().await;
        let before = registry.slots.len();
        registry.slots.retain(|_, slot| {
            let entry = &slot.entry;
            let settled_at = match (entry.status, entry.disposition) {
                (CompensationStatus::Executed, _) => entry.executed_at,
                (CompensationStatus::Pending, Disposition::Retired) => entry.retired_at,
                _ => None,
            };
            !settled_at.is_some_and(|at| is_older_than(at, retention))
        });
        let cleared = before - registry.slots.len();
        if cleared > 0 {
            tracing::info!(cleared, "cleared executed compensations");
        }
        cleared
    }

    /// Counts entries by status. Retired entries are counted apart from
    /// pending ones.
    pub async fn stats(&self) -> CompensationStats {
        let registry = self.registry.lock().await;
        let mut stats = CompensationStats::default();
        for slot in registry.slots.values() {
            match slot.entry.status {
                CompensationStatus::Pending if slot.entry.disposition == Disposition::Retired => {
                    stats.retired += 1
                }
                CompensationStatus::Pending => stats.pending += 1,
                CompensationStatus::Executed => stats.executed += 1,
                CompensationStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

fn is_older_than(at: DateTime<Utc>, age: Duration) -> bool {
    match TimeDelta::from_std(age) {
        Ok(age) => Utc::now().signed_duration_since(at) >= age,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callback::InMemoryEventPublisher;
    use gateway::InMemoryGatewayClient;
    use serde_json::json;

    fn setup() -> (
        CompensationManager<InMemoryGatewayClient, InMemoryEventPublisher>,
        InMemoryGatewayClient,
        InMemoryEventPublisher,
    ) {
        let gateway = InMemoryGatewayClient::new();
        let publisher = InMemoryEventPublisher::new();
        let manager = CompensationManager::new(gateway.clone(), publisher.clone());
        (manager, gateway, publisher)
    }

    #[tokio::test]
    async fn test_add_registers_pending_entry() {
        let (manager, _, _) = setup();
        let id = manager
            .add_compensation(CompensationAction::RollbackProject, "p-1", json!({"k": 1}))
            .await;

        let entry = manager.get(id).await.unwrap();
        assert_eq!(entry.status, CompensationStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.max_retries, 3);
        assert_eq!(entry.payload["k"], 1);
        assert_eq!(manager.list_pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let (manager, _, _) = setup();
        let id = CompensationId::new();
        let cancel = CancellationToken::new();
        assert!(matches!(
            manager.execute_compensation(&cancel, id).await,
            Err(CompensationError::NotFound(missing)) if missing == id
        ));
        assert!(matches!(
            manager.get_status(id).await,
            Err(CompensationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rollback_project_is_audit_only() {
        let (manager, gateway, _) = setup();
        let id = manager
            .add_compensation(CompensationAction::RollbackProject, "p-1", json!({}))
            .await;

        manager
            .execute_compensation(&CancellationToken::new(), id)
            .await
            .unwrap();
        assert_eq!(manager.get_status(id).await.unwrap(), CompensationStatus::Executed);
        assert_eq!(gateway.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_notify_failure_publishes_event() {
        let (manager, _, publisher) = setup();
        let project_id = common::ProjectId::new();
        let id = manager
            .add_compensation(
                CompensationAction::NotifyFailure,
                "repo-9",
                json!({ "project_id": project_id, "reason": "confirm failed" }),
            )
            .await;

        manager
            .execute_compensation(&CancellationToken::new(), id)
            .await
            .unwrap();

        let events = publisher.events_of("compensation", "notify_failure").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].project_id, Some(project_id));
        assert_eq!(events[0].resource["reason"], "confirm failed");
        assert_eq!(events[0].metadata["compensation_id"], id.to_string());
    }

    #[tokio::test]
    async fn test_invalid_resource_id_stays_pending() {
        let (manager, _, _) = setup();
        let id = manager
            .add_compensation(CompensationAction::DeleteRepository, "not-a-uuid", json!({}))
            .await;

        let err = manager
            .execute_compensation(&CancellationToken::new(), id)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let entry = manager.get(id).await.unwrap();
        assert_eq!(entry.status, CompensationStatus::Pending);
        assert_eq!(entry.retry_count, 1);
        assert!(entry.last_error.unwrap().contains("not-a-uuid"));
    }

    #[tokio::test]
    async fn test_cancelled_before_invocation_does_not_count() {
        let (manager, _, _) = setup();
        let id = manager
            .add_compensation(CompensationAction::RollbackProject, "p-1", json!({}))
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            manager.execute_compensation(&cancel, id).await,
            Err(CompensationError::Cancelled)
        ));
        assert_eq!(manager.get(id).await.unwrap().retry_count, 0);
    }

    #[tokio::test]
    async fn test_clear_executed_respects_retention() {
        let gateway = InMemoryGatewayClient::new();
        let manager = CompensationManager::with_config(
            gateway,
            InMemoryEventPublisher::new(),
            CompensationConfig {
                retention: Duration::from_secs(3600),
                ..Default::default()
            },
        );
        let id = manager
            .add_compensation(CompensationAction::RollbackProject, "p-1", json!({}))
            .await;
        manager
            .execute_compensation(&CancellationToken::new(), id)
            .await
            .unwrap();

        // Executed just now, well inside the retention window
        assert_eq!(manager.clear_executed().await, 0);
        assert!(manager.get(id).await.is_some());
    }

    #[tokio::test]
    async fn test_held_entry_waits_for_arming() {
        let (manager, _, _) = setup();
        let cancel = CancellationToken::new();
        let id = manager
            .enrol_compensation(CompensationAction::RollbackProject, "p-1", json!({}))
            .await;

        manager.execute_all_pending(&cancel).await.unwrap();
        let entry = manager.get(id).await.unwrap();
        assert_eq!(entry.status, CompensationStatus::Pending);
        assert_eq!(entry.disposition, Disposition::Held);
        assert_eq!(entry.retry_count, 0);
        assert!(matches!(
            manager.execute_compensation(&cancel, id).await,
            Err(CompensationError::NotArmed { disposition: Disposition::Held, .. })
        ));

        assert_eq!(manager.arm(&[id]).await, 1);
        manager.execute_all_pending(&cancel).await.unwrap();
        assert_eq!(manager.get_status(id).await.unwrap(), CompensationStatus::Executed);
    }

    #[tokio::test]
    async fn test_retired_entry_never_runs() {
        let (manager, gateway, _) = setup();
        let cancel = CancellationToken::new();
        let id = manager
            .enrol_compensation(
                CompensationAction::DeleteRepository,
                common::RepositoryId::new().to_string(),
                json!({}),
            )
            .await;

        assert_eq!(manager.retire(&[id]).await, 1);
        // Settling twice is a no-op
        assert_eq!(manager.arm(&[id]).await, 0);

        manager.execute_all_pending(&cancel).await.unwrap();
        assert!(matches!(
            manager.execute_compensation(&cancel, id).await,
            Err(CompensationError::NotArmed { disposition: Disposition::Retired, .. })
        ));
        assert_eq!(gateway.delete_calls(), 0);

        let entry = manager.get(id).await.unwrap();
        assert_eq!(entry.status, CompensationStatus::Pending);
        assert!(entry.retired_at.is_some());
        let stats = manager.stats().await;
        assert_eq!((stats.pending, stats.retired), (0, 1));

        // Zero retention: cleared on the next pass
        assert_eq!(manager.clear_executed().await, 1);
        assert!(manager.get(id).await.is_none());
    }

    #[test]
    fn test_is_older_than() {
        let now = Utc::now();
        assert!(is_older_than(now - TimeDelta::seconds(10), Duration::from_secs(5)));
        assert!(!is_older_than(now, Duration::from_secs(5)));
        assert!(is_older_than(now, Duration::ZERO));
    }
}
