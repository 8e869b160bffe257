//! # Provider Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Build the outbound clients (reseller transport, gateway)
//! - Build the layered idempotency store
//! - Create the provider service
//! - Start the HTTP server

mod config;
mod webhooks;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use provider_client::{
    CredentialManager, GatewayClient, HttpConfig, ReqwestHttp, ResellerClient, Transport,
};
use provider_hex::{ProviderService, inbound::HttpServer};
use provider_repo::build_store;
use provider_types::SystemClock;

use crate::webhooks::LoggingWebhookHandler;

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to create OTLP span exporter: {}", e))?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("provider-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize OpenTelemetry tracing
    let (otel_tracer, otel_provider) = init_tracer()?;
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,provider_app=debug,provider_hex=debug,provider_client=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    let provider = &config.provider;

    tracing::info!("Starting provider server on port {}", config.port);
    tracing::info!(
        mode = ?provider.credentials.mode,
        reseller = provider.reseller.base_url.as_deref().unwrap_or("-"),
        gateway = provider.gateway.base_url.as_deref().unwrap_or("-"),
        "Provider endpoints"
    );

    // One pooled client for the reseller API, one for the gateway's own timeout
    let reseller_http = Arc::new(ReqwestHttp::new(&provider.http)?);
    let gateway_http = Arc::new(ReqwestHttp::new(&HttpConfig {
        timeout: provider.gateway.timeout,
        ..provider.http.clone()
    })?);

    let credentials = Arc::new(CredentialManager::new(
        provider.credentials.clone(),
        reseller_http.clone(),
        Arc::new(SystemClock),
    ));
    let transport = Transport::new(
        &provider.reseller,
        provider.retry,
        reseller_http,
        credentials,
    );
    let reseller = ResellerClient::new(Arc::new(transport), provider.reseller.clone());
    let gateway = GatewayClient::new(
        provider.gateway.clone(),
        gateway_http,
        provider.retry,
    );
    if !gateway.is_configured() {
        tracing::warn!("GATEWAY_BASE_URL not set, payment endpoints will fail");
    }

    // Build the idempotency store (handles connections and migrations per tier)
    let store = build_store(&config.store_config()).await;
    tracing::info!(tiers = ?store.tier_names(), "Idempotency store ready");

    // Create the provider service
    let service = ProviderService::new(reseller, gateway, store, LoggingWebhookHandler);

    // Create and run the HTTP server
    let server = HttpServer::new(service);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces are flushed before exit
    let _ = otel_provider.shutdown();
    Ok(())
}
