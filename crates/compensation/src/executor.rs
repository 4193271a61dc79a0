//! Per-action executors.

use callback::{CallbackEvent, EventPublisher, EventSource};
use callback::event::TYPE_COMPENSATION;
use common::{ProjectId, RepositoryId};
use gateway::GatewayClient;

use crate::action::CompensationAction;
use crate::entry::CompensationEntry;
use crate::error::ActionError;

/// Runs the side effect behind each [`CompensationAction`].
#[derive(Debug, Clone)]
pub struct ActionExecutor<G, E> {
    gateway: G,
    publisher: E,
}

impl<G, E> ActionExecutor<G, E>
where
    G: GatewayClient,
    E: EventPublisher,
{
    pub fn new(gateway: G, publisher: E) -> Self {
        Self { gateway, publisher }
    }

    /// Invokes the entry's action once.
    pub async fn execute(&self, entry: &CompensationEntry) -> Result<(), ActionError> {
        match entry.action {
            CompensationAction::DeleteRepository => self.delete_repository(entry).await,
            CompensationAction::RollbackProject => {
                tracing::info!(
                    compensation_id = %entry.id,
                    resource_id = %entry.resource_id,
                    payload = %entry.payload,
                    "project rollback recorded"
                );
                Ok(())
            }
            CompensationAction::NotifyFailure => {
                self.notify_failure(entry).await;
                Ok(())
            }
        }
    }

    async fn delete_repository(&self, entry: &CompensationEntry) -> Result<(), ActionError> {
        let repository_id: RepositoryId = entry
            .resource_id
            .parse()
            .map_err(|_| ActionError::InvalidResource(entry.resource_id.clone()))?;

        match self.gateway.delete_repository(repository_id).await {
            Ok(()) => Ok(()),
            // Already gone counts as compensated
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn notify_failure(&self, entry: &CompensationEntry) {
        tracing::warn!(
            compensation_id = %entry.id,
            resource_id = %entry.resource_id,
            payload = %entry.payload,
            "operation failure requires attention"
        );

        let project_id = entry
            .payload
            .get("project_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<ProjectId>().ok());

        match CallbackEvent::new(
            TYPE_COMPENSATION,
            "notify_failure",
            EventSource::ProjectService,
            project_id,
            &entry.payload,
        ) {
            Ok(event) => {
                let event = event
                    .with_metadata("compensation_id", entry.id.to_string())
                    .with_metadata("resource_id", entry.resource_id.clone());
                self.publisher.publish(event).await;
            }
            Err(e) => {
                tracing::error!(compensation_id = %entry.id, error = %e, "could not build failure notice");
            }
        }
    }
}
