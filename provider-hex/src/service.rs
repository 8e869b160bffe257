//! Provider Application Service
//!
//! Orchestrates the outbound clients, the idempotency store and webhook
//! dispatch. Contains NO transport logic.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use provider_client::{GatewayClient, Payer, RequestContext, ResellerClient, ResellerOperation};
use provider_repo::IdempotencyStore;
use provider_types::{
    AppError, CreatePaymentRequest, GatewayEvent, IdempotencyKey, PayRequest, UsageBatchRequest,
    UsageBatchResponse, WebhookAck, WebhookHandler,
};
use provider_types::domain::{GatewayWebhookEnvelope, PaymentWebhookBody};

pub const CREATE_PAYMENT_ROUTE: &str = "/payments/gateway/create";
pub const PAY_ROUTE: &str = "/payments/gateway/pay";
pub const GATEWAY_WEBHOOK_ROUTE: &str = "/webhooks/gateway";
pub const PAYMENT_WEBHOOK_ROUTE: &str = "/webhooks/payments";

/// Serialized response of an idempotent operation.
///
/// `body` is what was stored, so a replay is byte-for-byte the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotentResponse {
    pub body: String,
    pub replayed: bool,
}

impl IdempotentResponse {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_str(&self.body).map_err(|e| AppError::Internal(e.to_string()))
    }
}

/// An inbound notification exactly as received, before verification.
#[derive(Debug, Clone, Copy)]
pub struct SignedDelivery<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub authorization: Option<&'a str>,
    pub app_id: Option<&'a str>,
    pub body: &'a [u8],
}

/// Application service for the provider integration layer.
///
/// Generic over `W: WebhookHandler` so business dispatch of verified
/// notifications is injected by the binary.
pub struct ProviderService<W: WebhookHandler> {
    reseller: ResellerClient,
    gateway: GatewayClient,
    store: IdempotencyStore,
    webhooks: W,
    usage_concurrency: usize,
}

impl<W: WebhookHandler> ProviderService<W> {
    pub fn new(
        reseller: ResellerClient,
        gateway: GatewayClient,
        store: IdempotencyStore,
        webhooks: W,
    ) -> Self {
        Self {
            reseller,
            gateway,
            store,
            webhooks,
            usage_concurrency: provider_client::DEFAULT_USAGE_CONCURRENCY,
        }
    }

    pub fn with_usage_concurrency(mut self, concurrency: usize) -> Self {
        self.usage_concurrency = concurrency.max(1);
        self
    }

    pub fn reseller(&self) -> &ResellerClient {
        &self.reseller
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    pub fn store(&self) -> &IdempotencyStore {
        &self.store
    }

    pub fn webhooks(&self) -> &W {
        &self.webhooks
    }

    /// `simulated` when reseller calls never leave the process.
    pub fn provider_mode(&self) -> &'static str {
        if self.reseller.transport().is_offline() {
            "simulated"
        } else {
            "live"
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Gateway payments
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens a checkout session. With an idempotency key, a repeat of the same
    /// body within the TTL replays the stored response without calling upstream.
    #[tracing::instrument(skip(self, body, payer, ctx), fields(request_id = ctx.request_id.as_deref()))]
    pub async fn create_payment(
        &self,
        body: &Value,
        idempotency_key: Option<&str>,
        payer: &Payer,
        ctx: &RequestContext,
    ) -> Result<IdempotentResponse, AppError> {
        let req: CreatePaymentRequest = parse_body(body)?;
        if req.order_id.trim().is_empty() {
            return Err(AppError::BadRequest("orderId is required".into()));
        }
        if req.amount.is_some_and(|a| !a.is_finite() || a < 0.0) {
            return Err(AppError::BadRequest("amount must be a non-negative number".into()));
        }

        self.idempotent(CREATE_PAYMENT_ROUTE, idempotency_key, body, || async {
            self.gateway
                .create_payment_session(&req, payer, ctx)
                .await
                .map_err(AppError::from)
        })
        .await
    }

    /// Charges a payment method, with the same replay rules as `create_payment`.
    #[tracing::instrument(skip(self, body, payer, ctx), fields(request_id = ctx.request_id.as_deref()))]
    pub async fn pay(
        &self,
        body: &Value,
        idempotency_key: Option<&str>,
        payer: &Payer,
        ctx: &RequestContext,
    ) -> Result<IdempotentResponse, AppError> {
        let req: PayRequest = parse_body(body)?;
        if req.order_id.trim().is_empty() {
            return Err(AppError::BadRequest("orderId is required".into()));
        }

        self.idempotent(PAY_ROUTE, idempotency_key, body, || async {
            self.gateway
                .pay(&req, payer, ctx)
                .await
                .map_err(AppError::from)
        })
        .await
    }

    async fn idempotent<T, F, Fut>(
        &self,
        route: &str,
        idempotency_key: Option<&str>,
        body: &Value,
        op: F,
    ) -> Result<IdempotentResponse, AppError>
    where
        T: serde::Serialize,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let key = match idempotency_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => {
                let fingerprint =
                    serde_json::to_vec(body).map_err(|e| AppError::BadRequest(e.to_string()))?;
                Some(IdempotencyKey::new(k, route, "POST", &fingerprint))
            }
            None => None,
        };

        if let Some(key) = &key {
            let lookup = self.store.lookup(key).await;
            let tier = lookup.hit_tier();
            if let Some(payload) = lookup.payload {
                info!(key = %key, tier = ?tier, "replaying stored response");
                return Ok(IdempotentResponse {
                    body: payload,
                    replayed: true,
                });
            }
        }

        let value = op().await?;
        let payload =
            serde_json::to_string(&value).map_err(|e| AppError::Internal(e.to_string()))?;

        if let Some(key) = &key {
            let report = self.store.store(key, &payload).await;
            if report.written() == 0 {
                warn!(key = %key, "response was not stored in any idempotency tier");
            }
        }

        Ok(IdempotentResponse {
            body: payload,
            replayed: false,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reseller
    // ─────────────────────────────────────────────────────────────────────────────

    /// Forwards one reseller operation and returns its `data`.
    pub async fn send_reseller(
        &self,
        op: ResellerOperation,
        payload: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        self.reseller.send(op, payload, ctx).await.map_err(Into::into)
    }

    /// Looks up usage for many orders with bounded concurrency.
    #[tracing::instrument(skip(self, req, ctx), fields(orders = req.order_references.len()))]
    pub async fn usage_batch(
        &self,
        req: UsageBatchRequest,
        ctx: &RequestContext,
    ) -> Result<UsageBatchResponse, AppError> {
        if req.order_references.iter().all(|r| r.trim().is_empty()) {
            return Err(AppError::BadRequest(
                "order_references must contain at least one reference".into(),
            ));
        }
        let items = self
            .reseller
            .consumption_batch(&req.order_references, self.usage_concurrency, ctx)
            .await;
        Ok(UsageBatchResponse { items })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Webhooks
    // ─────────────────────────────────────────────────────────────────────────────

    /// Verifies and dispatches a gateway notification.
    #[tracing::instrument(skip(self, delivery), fields(path = delivery.path))]
    pub async fn handle_gateway_webhook(
        &self,
        delivery: SignedDelivery<'_>,
        request_id: Option<&str>,
    ) -> Result<WebhookAck, AppError> {
        self.verify(&delivery)?;
        let envelope: GatewayWebhookEnvelope = parse_raw(delivery.body)?;
        self.dispatch(envelope.into_event(), request_id).await
    }

    /// Verifies and dispatches a generic payment notification.
    #[tracing::instrument(skip(self, delivery), fields(path = delivery.path))]
    pub async fn handle_payment_webhook(
        &self,
        delivery: SignedDelivery<'_>,
        request_id: Option<&str>,
    ) -> Result<WebhookAck, AppError> {
        self.verify(&delivery)?;
        let body: PaymentWebhookBody = parse_raw(delivery.body)?;
        self.dispatch(body.into_event(), request_id).await
    }

    fn verify(&self, delivery: &SignedDelivery<'_>) -> Result<(), AppError> {
        self.gateway
            .verifier()
            .verify(
                delivery.method,
                delivery.path,
                delivery.authorization,
                delivery.app_id,
                delivery.body,
            )
            .map_err(|e| {
                warn!(path = delivery.path, error = %e, "rejected webhook");
                AppError::Unauthorized("invalid webhook signature".into())
            })
    }

    async fn dispatch(
        &self,
        event: GatewayEvent,
        request_id: Option<&str>,
    ) -> Result<WebhookAck, AppError> {
        let kind = event.kind();
        let updated = self.webhooks.handle(event, request_id).await?;
        info!(kind, updated, "webhook handled");
        Ok(WebhookAck::updated(updated))
    }
}

fn parse_body<T: DeserializeOwned>(body: &Value) -> Result<T, AppError> {
    serde_json::from_value(body.clone())
        .map_err(|e| AppError::BadRequest(format!("invalid request body: {}", e)))
}

fn parse_raw<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("invalid notification body: {}", e)))
}
