//! Payment gateway vocabulary and inbound webhook events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Payment method chosen by the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Alipay,
    #[default]
    Card,
    Applepay,
    Paypal,
}

impl AsRef<str> for PaymentMethod {
    fn as_ref(&self) -> &str {
        match self {
            Self::Alipay => "alipay",
            Self::Card => "card",
            Self::Applepay => "applepay",
            Self::Paypal => "paypal",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Provider that settled a payment, as reported by notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Alipay,
    Paypal,
    Card,
    Applepay,
    Googlepay,
}

impl PaymentProvider {
    /// Maps a gateway method type such as `ALIPAY_CN` or `APPLE_PAY`.
    pub fn from_method_type(raw: &str) -> Self {
        let s = raw.to_ascii_uppercase();
        if s.contains("ALIPAY") {
            Self::Alipay
        } else if s.contains("PAYPAL") {
            Self::Paypal
        } else if s.contains("APPLEPAY") || s.contains("APPLE_PAY") {
            Self::Applepay
        } else if s.contains("GOOGLEPAY") || s.contains("GOOGLE_PAY") {
            Self::Googlepay
        } else {
            Self::Card
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn from_gateway(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "SUCCESS" | "PAID" => Self::Paid,
            "FAILED" | "FAIL" => Self::Failed,
            _ => Self::Created,
        }
    }
}

/// Payee lifecycle notifications forwarded as-is.
pub const PAYEE_EVENT_TYPES: &[&str] = &[
    "PAYEE_ACCOUNT_ACTIVE",
    "REMITTANCE_FAIL",
    "REMITTANCE_COMPLETE",
    "REMITTANCE_REVERSE",
    "PAYEE_DEACTIVATED",
];

// ─────────────────────────────────────────────────────────────────────────────
// Webhook events
// ─────────────────────────────────────────────────────────────────────────────

/// A verified notification, classified for business dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Payment {
        provider: PaymentProvider,
        provider_order_id: Option<String>,
        order_reference: Option<String>,
        status: PaymentStatus,
        amount: Option<f64>,
        currency: Option<String>,
    },
    AuthToken {
        user_login_id: String,
        access_token: Option<String>,
        refresh_token: Option<String>,
        access_token_expiry_time: Option<String>,
        refresh_token_expiry_time: Option<String>,
    },
    Payee {
        business_type: String,
        event_time: String,
        business_id: String,
        data: Value,
    },
    /// Recognised envelope with a business type nobody handles.
    Ignored { business_type: String },
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Payment { .. } => "payment",
            Self::AuthToken { .. } => "auth_token",
            Self::Payee { .. } => "payee",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// Body of `/webhooks/gateway`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayWebhookEnvelope {
    pub business_type: String,
    #[serde(default)]
    pub event_time: String,
    #[serde(default)]
    pub business_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

impl GatewayWebhookEnvelope {
    pub fn into_event(self) -> GatewayEvent {
        let business_type = self.business_type.to_ascii_uppercase();
        let data = self.data;
        let text = |key: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if business_type.starts_with("ACQUIRING_PAYMENT") {
            let method = text("payment_method")
                .or_else(|| text("payment_method_type"))
                .unwrap_or_default();
            let status = data
                .get("payment_status")
                .map(value_to_string)
                .unwrap_or_default();
            let payment_amount = data.get("payment_amount");
            let amount = payment_amount
                .and_then(|pa| pa.get("amount"))
                .and_then(value_to_f64);
            let currency = payment_amount
                .and_then(|pa| pa.get("currency"))
                .filter(|c| !c.is_null())
                .map(value_to_string);
            let provider_order_id = data
                .get("payment_id")
                .filter(|v| !v.is_null())
                .map(value_to_string)
                .filter(|s| !s.is_empty());
            GatewayEvent::Payment {
                provider: PaymentProvider::from_method_type(&method),
                provider_order_id,
                order_reference: None,
                status: PaymentStatus::from_gateway(&status),
                amount,
                currency,
            }
        } else if business_type.starts_with("ACQUIRING_AUTH_TOKEN") {
            GatewayEvent::AuthToken {
                user_login_id: text("user_login_id").unwrap_or_default(),
                access_token: text("access_token"),
                refresh_token: text("refresh_token"),
                access_token_expiry_time: text("access_token_expiry_time"),
                refresh_token_expiry_time: text("refresh_token_expiry_time"),
            }
        } else if PAYEE_EVENT_TYPES.contains(&business_type.as_str()) {
            GatewayEvent::Payee {
                business_type,
                event_time: self.event_time,
                business_id: self.business_id,
                data,
            }
        } else {
            GatewayEvent::Ignored { business_type }
        }
    }
}

/// Body of `/webhooks/payments`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhookBody {
    pub provider: PaymentProvider,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl PaymentWebhookBody {
    pub fn into_event(self) -> GatewayEvent {
        GatewayEvent::Payment {
            provider: self.provider,
            provider_order_id: self.order_id.filter(|s| !s.is_empty()),
            order_reference: self.reference.filter(|s| !s.is_empty()),
            status: self.status,
            amount: self.amount,
            currency: self.currency,
        }
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(business_type: &str, data: Value) -> GatewayWebhookEnvelope {
        GatewayWebhookEnvelope {
            business_type: business_type.into(),
            event_time: "2024-01-01T00:00:00Z".into(),
            business_id: "B1".into(),
            data,
        }
    }

    #[test]
    fn test_payment_event_mapping() {
        let event = envelope(
            "acquiring_payment_result",
            json!({
                "payment_method_type": "ALIPAY_CN",
                "payment_status": "SUCCESS",
                "payment_amount": {"amount": "9.99", "currency": "CNY"},
                "payment_id": 12345
            }),
        )
        .into_event();
        assert_eq!(
            event,
            GatewayEvent::Payment {
                provider: PaymentProvider::Alipay,
                provider_order_id: Some("12345".into()),
                order_reference: None,
                status: PaymentStatus::Paid,
                amount: Some(9.99),
                currency: Some("CNY".into()),
            }
        );
    }

    #[test]
    fn test_unknown_status_is_created() {
        let event = envelope("ACQUIRING_PAYMENT", json!({"payment_status": "PROCESSING"})).into_event();
        assert!(matches!(
            event,
            GatewayEvent::Payment {
                status: PaymentStatus::Created,
                provider: PaymentProvider::Card,
                ..
            }
        ));
    }

    #[test]
    fn test_payee_and_ignored_events() {
        assert_eq!(envelope("REMITTANCE_COMPLETE", json!({})).into_event().kind(), "payee");
        assert_eq!(envelope("SOMETHING_ELSE", json!({})).into_event().kind(), "ignored");
        assert_eq!(
            envelope("ACQUIRING_AUTH_TOKEN", json!({"user_login_id": "u1"})).into_event().kind(),
            "auth_token"
        );
    }

    #[test]
    fn test_payment_webhook_body_parses_camel_case() {
        let body: PaymentWebhookBody = serde_json::from_value(json!({
            "provider": "paypal",
            "orderId": "P-1",
            "status": "failed"
        }))
        .unwrap();
        assert!(matches!(
            body.into_event(),
            GatewayEvent::Payment {
                provider: PaymentProvider::Paypal,
                status: PaymentStatus::Failed,
                ..
            }
        ));
    }
}
