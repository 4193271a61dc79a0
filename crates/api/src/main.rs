//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::config::Config;
use callback::{CallbackDispatcher, CallbackPublisher};
use gateway::{GatewayClient, HttpGatewayClient, InMemoryGatewayClient};
use metrics_exporter_prometheus::PrometheusHandle;
use tcc::TransactionManagerConfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Callback delivery; retries stop once shutdown is cancelled
    let shutdown = CancellationToken::new();
    let dispatcher = CallbackDispatcher::new().expect("failed to build callback HTTP client");
    let publisher = CallbackPublisher::new(dispatcher, config.callbacks(), shutdown.clone());
    tracing::info!(endpoints = publisher.endpoint_count(), "callback publisher ready");

    // 4. Gateway, then serve
    match config.gateway() {
        Some(gateway_config) => {
            tracing::info!(url = %gateway_config.base_url, "using HTTP gateway");
            let gateway =
                HttpGatewayClient::new(gateway_config).expect("failed to build gateway HTTP client");
            serve(config, gateway, publisher, metrics_handle, shutdown).await;
        }
        None => {
            tracing::warn!("GIT_GATEWAY_URL not set, using in-memory gateway");
            serve(
                config,
                InMemoryGatewayClient::new(),
                publisher,
                metrics_handle,
                shutdown,
            )
            .await;
        }
    }
}

async fn serve<G>(
    config: Config,
    gateway: G,
    publisher: CallbackPublisher,
    metrics_handle: PrometheusHandle,
    shutdown: CancellationToken,
) where
    G: GatewayClient + Clone + 'static,
{
    let state = Arc::new(AppState::new(
        gateway,
        publisher,
        TransactionManagerConfig {
            retention: config.transaction_retention,
        },
        shutdown.clone(),
    ));

    // Background drain of pending compensations and transaction cleanup
    let maintenance = tokio::spawn(api::maintenance::run(
        Arc::clone(&state),
        config.drain_interval,
        shutdown.clone(),
    ));

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // In-flight requests are done; stop background work and callback retries
    shutdown.cancel();
    if let Err(e) = maintenance.await {
        tracing::error!(error = %e, "maintenance task panicked");
    }

    tracing::info!("server shut down gracefully");
}
