//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use callback::EventPublisher;
use gateway::GatewayClient;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while compensations await an operator.
    pub status: &'static str,
    pub active_transactions: usize,
    pub pending_compensations: usize,
    pub failed_compensations: usize,
}

/// GET /health: returns system health status.
pub async fn check<G, E>(State(state): State<Arc<AppState<G, E>>>) -> Json<HealthResponse>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    let stats = state.compensations.stats().await;
    let active_transactions = state.transactions.list_active().await.len();

    Json(HealthResponse {
        status: if stats.failed > 0 { "degraded" } else { "ok" },
        active_transactions,
        pending_compensations: stats.pending,
        failed_compensations: stats.failed,
    })
}
