//! HTTP API server for the Git gateway orchestration core.
//!
//! Exposes repository operations as try-confirm-cancel transactions, plus
//! operator endpoints for transactions and compensations, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod maintenance;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use callback::EventPublisher;
use gateway::GatewayClient;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<G, E>(state: Arc<AppState<G, E>>, metrics_handle: PrometheusHandle) -> Router
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<G, E>))
        .route("/projects", post(routes::projects::create::<G, E>))
        .route(
            "/projects/{id}/members",
            post(routes::projects::add_member::<G, E>),
        )
        .route(
            "/projects/{id}/repositories",
            post(routes::repositories::create::<G, E>),
        )
        .route(
            "/projects/{id}/repositories/{repo_id}",
            delete(routes::repositories::delete::<G, E>),
        )
        .route("/transactions", get(routes::transactions::list::<G, E>))
        .route("/transactions/{id}", get(routes::transactions::get::<G, E>))
        .route(
            "/compensations/pending",
            get(routes::compensations::pending::<G, E>),
        )
        .route(
            "/compensations/failed",
            get(routes::compensations::failed::<G, E>),
        )
        .route(
            "/compensations/drain",
            post(routes::compensations::drain::<G, E>),
        )
        .route("/compensations/{id}", get(routes::compensations::get::<G, E>))
        .route(
            "/compensations/{id}/execute",
            post(routes::compensations::execute::<G, E>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
