//! HTTP request handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use provider_client::{Payer, RequestContext, ResellerOperation};
use provider_types::domain::IDEMPOTENCY_KEY_HEADER;
use provider_types::{AppError, HealthResponse, UsageBatchRequest, WebhookHandler};
use utoipa::OpenApi;

use super::request_id::RequestId;
use crate::ProviderService;
use crate::openapi::ApiDoc;
use crate::service::{IdempotentResponse, SignedDelivery};

/// Application state shared across handlers.
pub struct AppState<W: WebhookHandler> {
    pub service: ProviderService<W>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::json!({
            "error": self.0.message(),
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Buyer identity as forwarded by the authenticating proxy.
fn payer_from(headers: &HeaderMap) -> Payer {
    let client_ip = header_text(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header_text(headers, "x-real-ip"))
        .map(str::to_string);
    let buyer_id = header_text(headers, "x-user-id").map(str::to_string);
    let login_id = header_text(headers, "x-user-email")
        .map(str::to_string)
        .or_else(|| buyer_id.clone());
    Payer {
        buyer_id,
        login_id,
        client_ip,
    }
}

fn stored_json(response: IdempotentResponse) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        response.body,
    )
        .into_response()
}

/// Health check endpoint.
pub async fn health<W: WebhookHandler>(
    State(state): State<Arc<AppState<W>>>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".into(),
        provider_mode: state.service.provider_mode().into(),
    })
}

pub async fn openapi() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ─────────────────────────────────────────────────────────────────────────────
// Payments
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip_all, fields(request_id = %rid.as_str()))]
pub async fn create_payment<W: WebhookHandler>(
    State(state): State<Arc<AppState<W>>>,
    Extension(rid): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let ctx = RequestContext::with_request_id(rid.as_str());
    let response = state
        .service
        .create_payment(
            &body,
            header_text(&headers, IDEMPOTENCY_KEY_HEADER),
            &payer_from(&headers),
            &ctx,
        )
        .await?;
    Ok(stored_json(response))
}

#[tracing::instrument(skip_all, fields(request_id = %rid.as_str()))]
pub async fn pay<W: WebhookHandler>(
    State(state): State<Arc<AppState<W>>>,
    Extension(rid): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let ctx = RequestContext::with_request_id(rid.as_str());
    let response = state
        .service
        .pay(
            &body,
            header_text(&headers, IDEMPOTENCY_KEY_HEADER),
            &payer_from(&headers),
            &ctx,
        )
        .await?;
    Ok(stored_json(response))
}

// ─────────────────────────────────────────────────────────────────────────────
// Reseller
// ─────────────────────────────────────────────────────────────────────────────

/// Batch usage lookup across many orders.
#[tracing::instrument(skip_all, fields(request_id = %rid.as_str()))]
pub async fn usage_batch<W: WebhookHandler>(
    State(state): State<Arc<AppState<W>>>,
    Extension(rid): Extension<RequestId>,
    Json(req): Json<UsageBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = RequestContext::with_request_id(rid.as_str());
    let response = state.service.usage_batch(req, &ctx).await?;
    Ok(Json(response))
}

/// Pass-through for a named reseller operation, e.g. `orders.list`.
#[tracing::instrument(skip(state, rid, body), fields(request_id = %rid.as_str()))]
pub async fn reseller_operation<W: WebhookHandler>(
    State(state): State<Arc<AppState<W>>>,
    Extension(rid): Extension<RequestId>,
    Path(operation): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let op = ResellerOperation::from_str(&operation)
        .map_err(|_| AppError::NotFound(format!("Unknown operation {}", operation)))?;
    // An empty body means an empty payload.
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid request body: {}", e)))?
    };
    let ctx = RequestContext::with_request_id(rid.as_str());

    let data = state.service.send_reseller(op, &payload, &ctx).await?;
    Ok(Json(data))
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhooks
// ─────────────────────────────────────────────────────────────────────────────

fn delivery<'a>(
    method: &'a Method,
    uri: &'a Uri,
    headers: &'a HeaderMap,
    body: &'a [u8],
) -> SignedDelivery<'a> {
    SignedDelivery {
        method: method.as_str(),
        path: uri.path(),
        authorization: header_text(headers, "authorization"),
        app_id: header_text(headers, "x-appid"),
        body,
    }
}

/// Gateway notification; the signature is checked against the raw body.
#[tracing::instrument(skip_all, fields(request_id = %rid.as_str()))]
pub async fn gateway_webhook<W: WebhookHandler>(
    State(state): State<Arc<AppState<W>>>,
    Extension(rid): Extension<RequestId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let ack = state
        .service
        .handle_gateway_webhook(delivery(&method, &uri, &headers, &body), Some(rid.as_str()))
        .await?;
    Ok(Json(ack))
}

#[tracing::instrument(skip_all, fields(request_id = %rid.as_str()))]
pub async fn payment_webhook<W: WebhookHandler>(
    State(state): State<Arc<AppState<W>>>,
    Extension(rid): Extension<RequestId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let ack = state
        .service
        .handle_payment_webhook(delivery(&method, &uri, &headers, &body), Some(rid.as_str()))
        .await?;
    Ok(Json(ack))
}
