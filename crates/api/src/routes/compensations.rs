//! Compensation operator endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use callback::EventPublisher;
use common::CompensationId;
use compensation::{CompensationEntry, CompensationStats};
use gateway::GatewayClient;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct DrainResponse {
    pub stats: CompensationStats,
    /// First error met while draining, if any.
    pub error: Option<String>,
}

/// GET /compensations/pending
pub async fn pending<G, E>(State(state): State<Arc<AppState<G, E>>>) -> Json<Vec<CompensationEntry>>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    Json(state.compensations.list_pending().await)
}

/// GET /compensations/failed: entries that need an operator.
pub async fn failed<G, E>(State(state): State<Arc<AppState<G, E>>>) -> Json<Vec<CompensationEntry>>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    Json(state.compensations.list_failed().await)
}

/// GET /compensations/{id}
pub async fn get<G, E>(
    State(state): State<Arc<AppState<G, E>>>,
    Path(id): Path<CompensationId>,
) -> Result<Json<CompensationEntry>, ApiError>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    state
        .compensations
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("compensation {id} not found")))
}

/// POST /compensations/{id}/execute: run one entry now.
#[tracing::instrument(skip(state))]
pub async fn execute<G, E>(
    State(state): State<Arc<AppState<G, E>>>,
    Path(id): Path<CompensationId>,
) -> Result<Json<CompensationEntry>, ApiError>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    state
        .compensations
        .execute_compensation(&state.shutdown, id)
        .await?;

    state
        .compensations
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("compensation {id} not found")))
}

/// POST /compensations/drain: run every armed pending entry.
#[tracing::instrument(skip(state))]
pub async fn drain<G, E>(State(state): State<Arc<AppState<G, E>>>) -> Json<DrainResponse>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    let error = state
        .compensations
        .execute_all_pending(&state.shutdown)
        .await
        .err()
        .map(|e| e.to_string());

    Json(DrainResponse {
        stats: state.compensations.stats().await,
        error,
    })
}
