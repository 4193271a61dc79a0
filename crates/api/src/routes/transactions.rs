//! Transaction inspection endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use callback::EventPublisher;
use common::TransactionId;
use gateway::GatewayClient;
use serde::Deserialize;
use tcc::Transaction;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    /// Only non-terminal transactions.
    #[serde(default)]
    pub active: bool,
}

/// GET /transactions: list retained transactions, oldest first.
pub async fn list<G, E>(
    State(state): State<Arc<AppState<G, E>>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Transaction>>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    let transactions = if query.active {
        state.transactions.list_active().await
    } else {
        state.transactions.list_all().await
    };
    Json(transactions)
}

/// GET /transactions/{id}
pub async fn get<G, E>(
    State(state): State<Arc<AppState<G, E>>>,
    Path(id): Path<TransactionId>,
) -> Result<Json<Transaction>, ApiError>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    state
        .transactions
        .get_transaction(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("transaction {id} not found")))
}
