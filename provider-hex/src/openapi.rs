//! OpenAPI document and path documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use provider_types::domain::{
    GatewayWebhookEnvelope, PaymentMethod, PaymentProvider, PaymentStatus, PaymentWebhookBody,
};
use provider_types::dto::{
    CheckoutSession, CreatePaymentRequest, HealthResponse, PayRequest, PayResult,
    UsageBatchRequest, UsageBatchResponse, UsageItem, WebhookAck, WebhookAckData,
};
use utoipa::OpenApi;

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
async fn health() {}

/// Open a hosted checkout session at the gateway
#[utoipa::path(
    post,
    path = "/payments/gateway/create",
    tag = "payments",
    request_body = CreatePaymentRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the stored response for a repeated identical request")
    ),
    responses(
        (status = 200, description = "Checkout session", body = CheckoutSession),
        (status = 400, description = "Invalid request"),
        (status = 502, description = "Gateway rejected the request or returned an invalid signature"),
        (status = 503, description = "Gateway unreachable")
    )
)]
async fn create_payment() {}

/// Charge a payment method
#[utoipa::path(
    post,
    path = "/payments/gateway/pay",
    tag = "payments",
    request_body = PayRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the stored response for a repeated identical request")
    ),
    responses(
        (status = 200, description = "Payment accepted", body = PayResult),
        (status = 400, description = "Invalid request, e.g. card payment without paymentMethodId"),
        (status = 423, description = "Gateway busy")
    )
)]
async fn pay() {}

/// Usage for many orders, in request order
#[utoipa::path(
    post,
    path = "/usage/batch",
    tag = "reseller",
    request_body = UsageBatchRequest,
    responses(
        (status = 200, description = "Usage per order; failed lookups are empty objects", body = UsageBatchResponse),
        (status = 400, description = "No order references")
    )
)]
async fn usage_batch() {}

/// Forward one reseller operation
#[utoipa::path(
    post,
    path = "/reseller/{operation}",
    tag = "reseller",
    params(
        ("operation" = String, Path, description = "Operation name such as `orders.list` or `bundle.networks`")
    ),
    request_body(content = inline(serde_json::Value), description = "Operation payload"),
    responses(
        (status = 200, description = "Envelope data", body = inline(serde_json::Value)),
        (status = 404, description = "Unknown operation or upstream record not found")
    )
)]
async fn reseller_operation() {}

/// Signed gateway notification
#[utoipa::path(
    post,
    path = "/webhooks/gateway",
    tag = "webhooks",
    request_body = GatewayWebhookEnvelope,
    params(
        ("Authorization" = String, Header, description = "algorithm=RSA2,time=<ms>,signature=<urlencoded>"),
        ("X-Appid" = String, Header, description = "Gateway app id")
    ),
    responses(
        (status = 200, description = "Acknowledged", body = WebhookAck),
        (status = 401, description = "Signature rejected")
    )
)]
async fn gateway_webhook() {}

/// Signed payment notification
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    tag = "webhooks",
    request_body = PaymentWebhookBody,
    responses(
        (status = 200, description = "Acknowledged", body = WebhookAck),
        (status = 401, description = "Signature rejected")
    )
)]
async fn payment_webhook() {}

/// OpenAPI documentation for the provider integration API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Provider Integration API",
        version = "1.0.0",
        description = "Gateway payments with idempotent replay, reseller pass-through and signed webhooks.\n\n## Idempotency\n\nSend `Idempotency-Key` on payment endpoints. A repeat of the same key, route and body within the TTL returns the stored response without calling the gateway again.",
        license(name = "MIT"),
    ),
    paths(
        health,
        create_payment,
        pay,
        usage_batch,
        reseller_operation,
        gateway_webhook,
        payment_webhook,
    ),
    components(
        schemas(
            HealthResponse,
            CreatePaymentRequest,
            CheckoutSession,
            PayRequest,
            PayResult,
            PaymentMethod,
            PaymentProvider,
            PaymentStatus,
            UsageBatchRequest,
            UsageBatchResponse,
            UsageItem,
            GatewayWebhookEnvelope,
            PaymentWebhookBody,
            WebhookAck,
            WebhookAckData,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "payments", description = "Gateway checkout and payment"),
        (name = "reseller", description = "Reseller operations"),
        (name = "webhooks", description = "Inbound signed notifications"),
    )
)]
pub struct ApiDoc;
