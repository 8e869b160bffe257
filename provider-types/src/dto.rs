//! Data Transfer Objects (DTOs) for requests and responses.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::PaymentMethod;

// ─────────────────────────────────────────────────────────────────────────────
// Gateway payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to open a hosted checkout session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Merchant order reference
    #[schema(example = "O1")]
    pub order_id: String,
    #[serde(default)]
    pub method: PaymentMethod,
    #[schema(example = 9.99)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// ISO currency, defaults to CNY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Checkout session opened at the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub payment_id: String,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub payment_request_id: Option<String>,
}

/// Request to charge a stored payment method.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    pub order_id: String,
    #[serde(default)]
    pub method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Required for card payments
    #[serde(
        default,
        alias = "payment_method_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayResult {
    #[serde(default)]
    pub checkout_url: Option<String>,
    pub payment_id: String,
    #[serde(default)]
    pub scheme_url: Option<String>,
    #[serde(default)]
    pub applink_url: Option<String>,
    #[serde(default)]
    pub app_identifier: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAckData {
    pub updated: u32,
}

/// Acknowledgement returned to the gateway, in the upstream envelope shape.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    #[schema(example = 200)]
    pub code: i64,
    pub data: WebhookAckData,
    pub msg: String,
}

impl WebhookAck {
    pub fn updated(updated: u32) -> Self {
        Self {
            code: 200,
            data: WebhookAckData { updated },
            msg: String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usage DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for a batch usage lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UsageBatchRequest {
    #[serde(default)]
    pub order_references: Vec<String>,
}

/// Usage for one order reference. `usage` is `{}` when the lookup failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageItem {
    pub order_reference: String,
    #[schema(value_type = Object)]
    pub usage: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UsageBatchResponse {
    pub items: Vec<UsageItem>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Misc
// ─────────────────────────────────────────────────────────────────────────────

/// Response for the health check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    /// `live` or `simulated`
    pub provider_mode: String,
}
