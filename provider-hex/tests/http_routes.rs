//! Router-level tests: request ids, idempotent replay over HTTP, webhook
//! verification and the error body shape.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use provider_client::{
    CredentialConfig, CredentialManager, GatewayClient, GatewayConfig, KeySource, RequestSigner,
    ResellerClient, ResellerConfig, RetryPolicy, SignatureVerifier, Transport,
};
use provider_hex::{ProviderService, inbound::HttpServer};
use provider_repo::IdempotencyStore;
use provider_types::{
    AppError, GatewayEvent, HttpRequest, HttpResponse, SystemClock, TransportFailure,
    UpstreamHttp, WebhookHandler,
};

const CLIENT_PRIVATE: &str = include_str!("../../provider-client/tests/fixtures/client_private.pem");
const SERVER_PRIVATE: &str = include_str!("../../provider-client/tests/fixtures/server_private.pem");
const SERVER_PUBLIC: &str = include_str!("../../provider-client/tests/fixtures/server_public.pem");

const GATEWAY_BASE: &str = "http://gateway.test";

/// Signed gateway double; each call returns a different checkout url.
#[derive(Default)]
struct Gateway {
    calls: AtomicUsize,
}

#[async_trait]
impl UpstreamHttp for Gateway {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let path = request.url.trim_start_matches(GATEWAY_BASE).to_string();
        let raw = serde_json::to_vec(&json!({
            "result": {"result": "S"},
            "data": {"normal_url": format!("https://pay.test/c/{}", n), "paymentId": format!("P{}", n)}
        }))
        .unwrap();
        let headers = RequestSigner::new("GATEWAY", Some(KeySource::Pem(SERVER_PRIVATE.into())))
            .headers_at(request.method.as_ref(), &path, &raw, "1700000000000")
            .unwrap();
        Ok(HttpResponse::new(200, raw)
            .with_header("Authorization", headers.authorization)
            .with_header("X-Appid", headers.app_id))
    }
}

struct CountingHandler;

#[async_trait]
impl WebhookHandler for CountingHandler {
    async fn handle(&self, event: GatewayEvent, _request_id: Option<&str>) -> Result<u32, AppError> {
        Ok(match event {
            GatewayEvent::Ignored { .. } => 0,
            _ => 1,
        })
    }
}

fn server(gateway: Arc<Gateway>) -> HttpServer<CountingHandler> {
    let credentials = Arc::new(CredentialManager::new(
        CredentialConfig::default(),
        gateway.clone(),
        Arc::new(SystemClock),
    ));
    let reseller_config = ResellerConfig::default();
    let transport = Transport::new(
        &reseller_config,
        RetryPolicy::none(),
        gateway.clone(),
        credentials,
    );
    let reseller = ResellerClient::new(Arc::new(transport), reseller_config);
    let gateway = GatewayClient::new(
        GatewayConfig {
            base_url: Some(GATEWAY_BASE.into()),
            app_id: "APPID".into(),
            ..Default::default()
        },
        gateway,
        RetryPolicy::none(),
    )
    .with_keys(
        RequestSigner::new("APPID", Some(KeySource::Pem(CLIENT_PRIVATE.into()))),
        SignatureVerifier::new(Some(KeySource::Pem(SERVER_PUBLIC.into()))),
    );

    HttpServer::new(ProviderService::new(
        reseller,
        gateway,
        IdempotencyStore::new(),
        CountingHandler,
    ))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_request(key: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/payments/gateway/create")
        .header("Content-Type", "application/json")
        .header("Idempotency-Key", key)
        .body(Body::from(r#"{"orderId":"O1","amount":9.99}"#))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_simulated_mode_and_generates_request_id() {
    let app = server(Arc::new(Gateway::default())).router();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let generated = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(generated.len(), 36);
    let json = body_json(response).await;
    assert_eq!(json, json!({"status": "healthy", "provider_mode": "simulated"}));
}

#[tokio::test]
async fn test_caller_request_id_is_echoed() {
    let app = server(Arc::new(Gateway::default())).router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("Request-Id", "rid-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers().get("x-request-id").unwrap(), "rid-abc");
}

#[tokio::test]
async fn test_create_payment_replays_identical_bytes() {
    let gateway = Arc::new(Gateway::default());
    let app = server(gateway.clone()).router();

    let first = app.clone().oneshot(create_request("K1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = first.into_body().collect().await.unwrap().to_bytes();

    let second = app.oneshot(create_request("K1")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = second.into_body().collect().await.unwrap().to_bytes();

    assert_eq!(first, second);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    let json: Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(json["checkoutUrl"], "https://pay.test/c/1");
}

#[tokio::test]
async fn test_unsigned_webhook_is_401_with_error_body() {
    let app = server(Arc::new(Gateway::default())).router();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/webhooks/gateway")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"business_type":"ACQUIRING_PAYMENT","data":{}}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], 401);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_signed_webhook_is_acknowledged() {
    let app = server(Arc::new(Gateway::default())).router();
    let body = r#"{"business_type":"ACQUIRING_PAYMENT","data":{"payment_status":"SUCCESS"}}"#;
    let headers = RequestSigner::new("GATEWAY", Some(KeySource::Pem(SERVER_PRIVATE.into())))
        .headers_at("POST", "/webhooks/gateway", body.as_bytes(), "1700000000000")
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/webhooks/gateway")
                .header("Authorization", headers.authorization)
                .header("X-Appid", headers.app_id)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"code": 200, "data": {"updated": 1}, "msg": ""})
    );
}

#[tokio::test]
async fn test_unknown_reseller_operation_is_404() {
    let app = server(Arc::new(Gateway::default())).router();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/reseller/orders.cancel")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_simulated_reseller_operation_returns_empty_data() {
    let app = server(Arc::new(Gateway::default())).router();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/reseller/orders.list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = server(Arc::new(Gateway::default())).router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["paths"]["/payments/gateway/create"].is_object());
}
