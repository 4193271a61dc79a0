//! Shared application state.

use std::sync::Arc;

use callback::EventPublisher;
use compensation::CompensationManager;
use gateway::GatewayClient;
use project::InMemoryProjectRepository;
use tcc::{TransactionManager, TransactionManagerConfig};
use tokio_util::sync::CancellationToken;

/// Shared application state accessible from all handlers.
pub struct AppState<G, E> {
    pub projects: InMemoryProjectRepository,
    pub transactions: TransactionManager<G, InMemoryProjectRepository, E>,
    pub compensations: Arc<CompensationManager<G, E>>,
    pub publisher: E,
    /// Cancelled on shutdown; in-flight transactions and drains observe it.
    pub shutdown: CancellationToken,
}

impl<G, E> AppState<G, E>
where
    G: GatewayClient + Clone,
    E: EventPublisher + Clone,
{
    pub fn new(
        gateway: G,
        publisher: E,
        config: TransactionManagerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let projects = InMemoryProjectRepository::new();
        let compensations = Arc::new(CompensationManager::new(gateway.clone(), publisher.clone()));
        let transactions = TransactionManager::with_config(
            gateway,
            projects.clone(),
            publisher.clone(),
            Arc::clone(&compensations),
            config,
        );

        Self {
            projects,
            transactions,
            compensations,
            publisher,
            shutdown,
        }
    }
}
