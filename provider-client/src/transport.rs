//! Reseller transport.
//!
//! One POST per operation, wrapped in the `{code, data, msg}` envelope.
//! Handles credential injection, retry with backoff for transient failures,
//! and at most one re-authentication per call (HTTP 401 or envelope code 411).

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use provider_types::domain::{CredentialMode, Envelope};
use provider_types::error::TOKEN_EXPIRED_CODE;
use provider_types::{HttpRequest, ProviderError, Sleeper, TokenProvider, UpstreamHttp};

use crate::config::ResellerConfig;
use crate::retry::{RetryPolicy, TokioSleeper};

pub const ACCESS_TOKEN_HEADER: &str = "Access-Token";
pub const REQUEST_ID_HEADER: &str = "Request-Id";
pub const X_REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Per-call correlation data forwarded upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Option<String>,
    /// Extra headers, sent after the standard ones.
    pub headers: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The caller's request id, or a fresh one.
    pub fn request_id_or_new(&self) -> String {
        self.request_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
    }
}

/// What a single exchange (with its retries) ended in.
enum Exchange {
    Unauthorized,
    Envelope(Envelope),
}

/// Why an attempt may be retried.
enum Transient {
    Status(u16),
    Failure(String),
    InvalidBody(String),
}

impl std::fmt::Display for Transient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transient::Status(status) => write!(f, "HTTP {}", status),
            Transient::Failure(msg) => write!(f, "{}", msg),
            Transient::InvalidBody(msg) => write!(f, "invalid response: {}", msg),
        }
    }
}

pub struct Transport {
    base_url: Option<String>,
    mode: CredentialMode,
    http: Arc<dyn UpstreamHttp>,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("mode", &self.mode)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Transport {
    pub fn new(
        config: &ResellerConfig,
        retry: RetryPolicy,
        http: Arc<dyn UpstreamHttp>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            base_url: config.base_url.clone(),
            mode: config.mode,
            http,
            tokens,
            retry,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// True when calls short-circuit to a synthetic envelope.
    pub fn is_offline(&self) -> bool {
        self.mode == CredentialMode::Simulated || self.base_url.is_none()
    }

    /// Sends one operation and returns the successful envelope.
    #[instrument(skip(self, body, ctx), fields(request_id = ctx.request_id.as_deref()))]
    pub async fn send(
        &self,
        path: &str,
        body: &Value,
        ctx: &RequestContext,
        include_token: bool,
    ) -> Result<Envelope, ProviderError> {
        let Some(base_url) = self.base_url.as_deref().filter(|_| !self.is_offline()) else {
            debug!("offline mode, returning synthetic envelope");
            return Ok(Envelope::synthetic_success());
        };
        let url = format!("{}{}", base_url, path);
        let payload =
            serde_json::to_vec(body).map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        let request_id = ctx.request_id_or_new();

        let mut token = if include_token {
            Some(self.tokens.get_token().await?)
        } else {
            None
        };
        let mut reauthenticated = false;

        loop {
            let mut request = HttpRequest::post(url.clone(), payload.clone())
                .with_header("Content-Type", "application/json")
                .with_header(REQUEST_ID_HEADER, request_id.as_str())
                .with_header(X_REQUEST_ID_HEADER, request_id.as_str());
            if let Some(token) = token.as_deref() {
                request.set_header(ACCESS_TOKEN_HEADER, token);
            }
            for (name, value) in &ctx.headers {
                request.set_header(name.as_str(), value.as_str());
            }

            match self.exchange(request).await? {
                Exchange::Unauthorized if include_token && !reauthenticated => {
                    warn!("upstream rejected token, re-authenticating once");
                    reauthenticated = true;
                    token = Some(self.tokens.refresh().await?);
                }
                Exchange::Unauthorized => {
                    return Err(ProviderError::HttpStatus { status: 401 });
                }
                Exchange::Envelope(envelope) => match envelope.failure() {
                    None => return Ok(envelope),
                    Some(failure)
                        if failure.code == TOKEN_EXPIRED_CODE
                            && include_token
                            && !reauthenticated =>
                    {
                        warn!("upstream reported expired token, re-authenticating once");
                        reauthenticated = true;
                        token = Some(self.tokens.refresh().await?);
                    }
                    Some(failure) => {
                        return Err(ProviderError::reseller_business(
                            failure.code,
                            failure.message,
                        ));
                    }
                },
            }
        }
    }

    /// Sends one request, retrying 5xx, transport failures and unparseable bodies.
    async fn exchange(&self, request: HttpRequest) -> Result<Exchange, ProviderError> {
        let mut attempt = 0u32;
        loop {
            let transient = match self.http.execute(request.clone()).await {
                Ok(response) if response.status == 401 => return Ok(Exchange::Unauthorized),
                Ok(response) if response.is_success() => match Envelope::from_slice(&response.body) {
                    Ok(envelope) => return Ok(Exchange::Envelope(envelope)),
                    Err(e) => Transient::InvalidBody(e.to_string()),
                },
                Ok(response) if response.is_server_error() => Transient::Status(response.status),
                Ok(response) => {
                    return Err(ProviderError::HttpStatus {
                        status: response.status,
                    });
                }
                Err(failure) => Transient::Failure(failure.to_string()),
            };

            if !self.retry.should_retry(attempt) {
                let attempts = attempt + 1;
                return Err(match transient {
                    Transient::InvalidBody(msg) => ProviderError::InvalidResponse(msg),
                    other => ProviderError::Transport {
                        message: other.to_string(),
                        attempts,
                    },
                });
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                reason = %transient,
                "retrying upstream call"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}
