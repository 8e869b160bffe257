//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use provider_types::WebhookHandler;

use super::handlers::{self, AppState};
use super::request_id::request_id_middleware;
use crate::ProviderService;
use crate::service::{CREATE_PAYMENT_ROUTE, GATEWAY_WEBHOOK_ROUTE, PAY_ROUTE, PAYMENT_WEBHOOK_ROUTE};

/// HTTP Server for the provider integration API.
pub struct HttpServer<W: WebhookHandler> {
    state: Arc<AppState<W>>,
}

impl<W: WebhookHandler> HttpServer<W> {
    pub fn new(service: ProviderService<W>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health::<W>))
            .route("/api-docs/openapi.json", get(handlers::openapi))
            .route(CREATE_PAYMENT_ROUTE, post(handlers::create_payment::<W>))
            .route(PAY_ROUTE, post(handlers::pay::<W>))
            .route("/usage/batch", post(handlers::usage_batch::<W>))
            .route(
                "/reseller/{operation}",
                post(handlers::reseller_operation::<W>),
            )
            .route(GATEWAY_WEBHOOK_ROUTE, post(handlers::gateway_webhook::<W>))
            .route(PAYMENT_WEBHOOK_ROUTE, post(handlers::payment_webhook::<W>))
            .layer(metrics)
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
