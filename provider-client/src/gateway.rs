//! Payment gateway client.
//!
//! Every call is RSA2-signed, and every response must carry a valid gateway
//! signature before its body is trusted. Responses use the gateway envelope
//! `{result: {result, code, message}, data}`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use provider_types::domain::{GatewayEnvelope, PaymentMethod};
use provider_types::{
    CheckoutSession, Clock, CreatePaymentRequest, HttpMethod, HttpRequest, HttpResponse,
    PayRequest, PayResult, ProviderError, SignatureError, Sleeper, SystemClock, UpstreamHttp,
};

use crate::config::GatewayConfig;
use crate::retry::{RetryPolicy, TokioSleeper};
use crate::signing::{
    APP_ID_HEADER, AUTHORIZATION_HEADER, KeySource, RequestSigner, SignatureVerifier,
};
use crate::transport::{REQUEST_ID_HEADER, RequestContext};

const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DEFAULT_CURRENCY: &str = "CNY";

/// Who is paying, as far as the gateway payload is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payer {
    pub buyer_id: Option<String>,
    /// Email when known, otherwise the buyer id.
    pub login_id: Option<String>,
    pub client_ip: Option<String>,
}

/// Strips zero-width spaces, collapses repeated slashes and a doubled
/// `gateway/v1/` prefix from a configured path.
pub fn sanitize_path(path: &str) -> String {
    let mut cleaned = String::with_capacity(path.len());
    for c in path.chars().filter(|c| *c != '\u{200b}') {
        if c == '/' && cleaned.ends_with('/') {
            continue;
        }
        cleaned.push(c);
    }
    while cleaned.contains("gateway/v1/gateway/v1/") {
        cleaned = cleaned.replace("gateway/v1/gateway/v1/", "gateway/v1/");
    }
    cleaned
}

pub struct GatewayClient {
    config: Arc<GatewayConfig>,
    http: Arc<dyn UpstreamHttp>,
    signer: Arc<RequestSigner>,
    verifier: Arc<SignatureVerifier>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.config.base_url)
            .field("app_id", &self.config.app_id)
            .field("retry", &self.retry)
            .finish()
    }
}

impl GatewayClient {
    /// Builds a client whose keys come from the configured PEM files.
    pub fn new(config: GatewayConfig, http: Arc<dyn UpstreamHttp>, retry: RetryPolicy) -> Self {
        let signer = RequestSigner::new(
            config.app_id.clone(),
            config.client_private_key.clone().map(KeySource::File),
        );
        let verifier = SignatureVerifier::new(config.server_public_key.clone().map(KeySource::File));
        Self {
            config: Arc::new(config),
            http,
            signer: Arc::new(signer),
            verifier: Arc::new(verifier),
            retry,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_keys(mut self, signer: RequestSigner, verifier: SignatureVerifier) -> Self {
        self.signer = Arc::new(signer);
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Verifier for gateway-signed inbound traffic such as webhooks.
    pub fn verifier(&self) -> Arc<SignatureVerifier> {
        self.verifier.clone()
    }

    pub fn is_configured(&self) -> bool {
        self.config.base_url.is_some()
    }

    /// Signed call returning the envelope `data` on success.
    ///
    /// GET payloads become the query string and are signed over an empty
    /// body. POST payloads are sent as compact JSON and signed over exactly
    /// those bytes. Only GETs are retried.
    #[instrument(skip(self, payload, ctx), fields(request_id = ctx.request_id.as_deref()))]
    pub async fn call(
        &self,
        method: HttpMethod,
        path: &str,
        payload: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| ProviderError::Config("gateway base url is not configured".into()))?;
        let path = sanitize_path(path);

        let (mut request, body) = match method {
            HttpMethod::Get => {
                let url = format!("{}{}{}", base_url, path, query_string(payload));
                (HttpRequest::get(url), Vec::new())
            }
            HttpMethod::Post => {
                let body = serde_json::to_vec(payload)
                    .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
                let request = HttpRequest::post(format!("{}{}", base_url, path), body.clone())
                    .with_header("Content-Type", "application/json");
                (request, body)
            }
        };

        let timestamp = self.clock.now().timestamp_millis().to_string();
        let signed = self
            .signer
            .headers_at(method.as_ref(), &path, &body, &timestamp)
            .map_err(signing_failure)?;
        request.set_header(AUTHORIZATION_HEADER, signed.authorization);
        request.set_header(APP_ID_HEADER, signed.app_id);
        if let Some(request_id) = ctx.request_id.as_deref() {
            request.set_header(REQUEST_ID_HEADER, request_id);
        }
        for (name, value) in &ctx.headers {
            request.set_header(name.as_str(), value.as_str());
        }
        request.timeout = Some(self.config.timeout);

        let response = self.execute(request).await?;

        if let Err(e) = self.verifier.verify(
            method.as_ref(),
            &path,
            response.header(AUTHORIZATION_HEADER),
            response.header(APP_ID_HEADER),
            &response.body,
        ) {
            warn!(path = %path, error = %e, "rejected unsigned or tampered gateway response");
            return Err(e.into());
        }

        GatewayEnvelope::from_slice(&response.body)?.into_result()
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        let policy = match request.method {
            HttpMethod::Get => self.retry,
            HttpMethod::Post => RetryPolicy::none(),
        };
        let mut attempt = 0u32;
        loop {
            let failure = match self.http.execute(request.clone()).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.is_server_error() && policy.should_retry(attempt) => {
                    format!("HTTP {}", response.status)
                }
                Ok(response) => {
                    return Err(ProviderError::HttpStatus {
                        status: response.status,
                    });
                }
                Err(failure) if policy.should_retry(attempt) => failure.to_string(),
                Err(failure) => {
                    return Err(ProviderError::Transport {
                        message: failure.to_string(),
                        attempts: attempt + 1,
                    });
                }
            };

            let delay = policy.backoff(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "retrying gateway call"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }

    /// Opens a hosted checkout session for an order.
    #[instrument(skip(self, request, payer, ctx), fields(order_id = %request.order_id))]
    pub async fn create_payment_session(
        &self,
        request: &CreatePaymentRequest,
        payer: &Payer,
        ctx: &RequestContext,
    ) -> Result<CheckoutSession, ProviderError> {
        let payload = self.session_payload(request, payer, self.clock.now());
        let payment_request_id = payment_request_id(&request.order_id);
        let data = self
            .call(
                HttpMethod::Post,
                self.config.create_path_for(request.method),
                &payload,
                ctx,
            )
            .await?;

        let checkout_url = first_text(
            &data,
            &["normal_url", "checkoutUrl", "pay_url", "h5_url", "url"],
        );
        let mut payment_id = first_text(&data, &["paymentId", "trade_no", "orderNo", "id"]);
        if checkout_url.is_none() && payment_id.is_none() {
            payment_id = first_text(&data, &["orderString"]);
        }
        let session = CheckoutSession {
            checkout_url: checkout_url.unwrap_or_default(),
            payment_id: payment_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
            payment_method_id: first_text(
                &data,
                &["payment_method_id", "paymentMethodId", "pm_id"],
            ),
            payment_request_id: Some(payment_request_id),
        };
        info!(payment_id = %session.payment_id, "payment session created");
        Ok(session)
    }

    /// Charges a payment method. Card payments need a stored payment method id.
    #[instrument(skip(self, request, payer, ctx), fields(order_id = %request.order_id))]
    pub async fn pay(
        &self,
        request: &PayRequest,
        payer: &Payer,
        ctx: &RequestContext,
    ) -> Result<PayResult, ProviderError> {
        let payment_method_id = request
            .payment_method_id
            .as_deref()
            .filter(|id| !id.trim().is_empty());
        if request.method == PaymentMethod::Card && payment_method_id.is_none() {
            return Err(ProviderError::InvalidRequest(
                "missing payment_method_id for card".into(),
            ));
        }

        let payload = self.pay_payload(request, payment_method_id, payer, self.clock.now());
        let data = self
            .call(
                HttpMethod::Post,
                self.config.pay_path_for(request.method),
                &payload,
                ctx,
            )
            .await?;

        Ok(PayResult {
            checkout_url: first_text(&data, &["normal_url"]),
            payment_id: first_text(&data, &["payment_id", "payment_request_id"])
                .unwrap_or_default(),
            scheme_url: first_text(&data, &["scheme_url"]),
            applink_url: first_text(&data, &["applink_url"]),
            app_identifier: first_text(&data, &["app_identifier"]),
        })
    }

    fn order_block(&self, order_id: &str, currency: &str, amount: f64, payer: &Payer) -> Value {
        json!({
            "reference_order_id": order_id,
            "order_description": self.config.order_description,
            "order_currency": currency,
            "order_amount": amount,
            "order_buyer_id": payer.buyer_id.as_deref().unwrap_or_default(),
        })
    }

    fn session_payload(
        &self,
        request: &CreatePaymentRequest,
        payer: &Payer,
        now: DateTime<Utc>,
    ) -> Value {
        let currency = currency_or_default(request.currency.as_deref());
        let amount = round_amount(request.amount);
        let expiry = expiry_after(now, self.config.session_expiry);
        let buyer_id = payer.buyer_id.as_deref().unwrap_or_default();
        json!({
            "mch_app_id": self.config.mch_app_id,
            "payment_request_id": payment_request_id(&request.order_id),
            "payment_currency": currency,
            "payment_amount": amount,
            "payment_method_type": self.config.pay_types.for_method(request.method),
            "payment_session_expiry_time": expiry,
            "notify_url": self.config.notify_url,
            "order": self.order_block(&request.order_id, currency, amount, payer),
            "payment_redirect_url": self.config.return_url,
            "settlement_currency": currency,
            "env_client_ip": payer.client_ip.as_deref().unwrap_or_default(),
            "product_scene": self.config.product_scene,
            "auth_state": buyer_id,
            "user_login_id": payer.login_id.as_deref().unwrap_or(buyer_id),
        })
    }

    fn pay_payload(
        &self,
        request: &PayRequest,
        payment_method_id: Option<&str>,
        payer: &Payer,
        now: DateTime<Utc>,
    ) -> Value {
        let currency = currency_or_default(request.currency.as_deref());
        let amount = round_amount(request.amount);
        json!({
            "mch_app_id": self.config.mch_app_id,
            "payment_request_id": payment_request_id(&request.order_id),
            "payment_currency": currency,
            "payment_amount": amount,
            "payment_method_id": payment_method_id,
            "payment_method_type": self.config.pay_types.for_method(request.method),
            "payment_redirect_url": self.config.return_url,
            "order": self.order_block(&request.order_id, currency, amount, payer),
            "settlement_currency": currency,
            "env_client_ip": payer.client_ip.as_deref().unwrap_or_default(),
            "payment_expiry_time": expiry_after(now, self.config.pay_expiry),
            "env_terminal_type": self.config.env_terminal_type,
            "env_os_type": self.config.env_os_type,
        })
    }
}

// Key problems are configuration errors, not upstream misbehaviour.
fn signing_failure(err: SignatureError) -> ProviderError {
    match err {
        SignatureError::KeyUnavailable(msg) | SignatureError::InvalidKey(msg) => {
            ProviderError::Config(format!("gateway signing key: {}", msg))
        }
        other => ProviderError::Signature(other),
    }
}

/// `PAY_` followed by the first 20 characters of the order id without dashes.
pub fn payment_request_id(order_id: &str) -> String {
    let stem: String = order_id.chars().filter(|c| *c != '-').take(20).collect();
    format!("PAY_{}", stem)
}

fn currency_or_default(currency: Option<&str>) -> &str {
    currency
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CURRENCY)
}

fn round_amount(amount: Option<f64>) -> f64 {
    (amount.unwrap_or(0.0) * 100.0).round() / 100.0
}

fn expiry_after(now: DateTime<Utc>, window: std::time::Duration) -> String {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
    (now + window).format(EXPIRY_FORMAT).to_string()
}

fn first_text(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn query_string(payload: &Value) -> String {
    let Some(fields) = payload.as_object().filter(|m| !m.is_empty()) else {
        return String::new();
    };
    let pairs: Vec<String> = fields
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!(
                "{}={}",
                utf8_percent_encode(k, QUERY_ENCODE_SET),
                utf8_percent_encode(&value, QUERY_ENCODE_SET)
            )
        })
        .collect();
    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}
