//! Reseller credential manager.
//!
//! Owns the access/refresh token pair and decides when to re-authenticate.
//! Refresh is single-flight: callers queue on an async mutex and, once inside,
//! check a generation counter. If another caller already refreshed while they
//! waited, they reuse that token instead of refreshing again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use provider_types::domain::{
    Credential, CredentialMode, Envelope, SIMULATED_ACCESS_TOKEN, TokenGrant,
};
use provider_types::{Clock, HttpRequest, ProviderError, TokenProvider, UpstreamHttp};

use crate::config::CredentialConfig;

pub struct CredentialManager {
    config: CredentialConfig,
    http: Arc<dyn UpstreamHttp>,
    clock: Arc<dyn Clock>,
    state: RwLock<Credential>,
    generation: AtomicU64,
    refresh_gate: Mutex<()>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("config", &self.config)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl CredentialManager {
    /// A statically configured token, if any, seeds the credential with a 24 h expiry.
    pub fn new(config: CredentialConfig, http: Arc<dyn UpstreamHttp>, clock: Arc<dyn Clock>) -> Self {
        let mut credential = Credential::new(config.mode);
        if config.mode == CredentialMode::Live {
            if let Some(token) = config.static_token.as_deref() {
                credential.adopt_static(token, clock.now());
            }
        }
        Self {
            config,
            http,
            clock,
            state: RwLock::new(credential),
            generation: AtomicU64::new(0),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Copy of the current credential, for diagnostics.
    pub async fn snapshot(&self) -> Credential {
        self.state.read().await.clone()
    }

    /// Number of successful re-authentications so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    async fn refresh_from(&self, observed: u64) -> Result<String, ProviderError> {
        let _gate = self.refresh_gate.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            let state = self.state.read().await;
            if let Some(token) = state.usable_access_token(self.clock.now()) {
                return Ok(token.to_string());
            }
        }

        let outcome = self.acquire_grant().await;
        let mut state = self.state.write().await;
        let token = match outcome {
            Ok(grant) => {
                let token = grant.access_token.clone();
                state.apply_grant(grant);
                token
            }
            Err(err) => match self.config.static_token.as_deref() {
                Some(token) => {
                    warn!(error = %err, "re-authentication failed, adopting static token");
                    state.adopt_static(token, self.clock.now());
                    token.to_string()
                }
                None => return Err(err),
            },
        };
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(token)
    }

    /// Refresh-token exchange when possible, full login otherwise or on failure.
    async fn acquire_grant(&self) -> Result<TokenGrant, ProviderError> {
        let refresh_token = {
            let state = self.state.read().await;
            state
                .usable_refresh_token(self.clock.now())
                .map(str::to_string)
        };

        if let Some(refresh_token) = refresh_token {
            let payload = json!({ "refresh_token": refresh_token });
            match self.exchange(&self.config.refresh_path, &payload, "refresh").await {
                Ok(grant) => return Ok(grant),
                Err(err) => warn!(error = %err, "token refresh failed, falling back to login"),
            }
        }

        let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
        else {
            return Err(ProviderError::Credential {
                code: None,
                message: "agent username/password not configured".to_string(),
            });
        };
        let payload = json!({ "username": username, "password": password });
        self.exchange(&self.config.login_path, &payload, "login").await
    }

    #[instrument(skip(self, payload))]
    async fn exchange(
        &self,
        path: &str,
        payload: &Value,
        kind: &'static str,
    ) -> Result<TokenGrant, ProviderError> {
        let base_url = self.config.base_url.as_deref().ok_or_else(|| ProviderError::Credential {
            code: None,
            message: "PROVIDER_BASE_URL not configured".to_string(),
        })?;
        let body = serde_json::to_vec(payload)
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        let mut request = HttpRequest::post(format!("{}{}", base_url, path), body)
            .with_header("Content-Type", "application/json")
            .with_header("Request-Id", uuid::Uuid::new_v4().simple().to_string());
        request.timeout = Some(self.config.timeout);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ProviderError::Credential {
                code: None,
                message: format!("agent {} failed: {}", kind, e),
            })?;
        if !response.is_success() {
            return Err(ProviderError::Credential {
                code: None,
                message: format!("agent {} returned HTTP {}", kind, response.status),
            });
        }

        let envelope = Envelope::from_slice(&response.body).map_err(|e| ProviderError::Credential {
            code: None,
            message: format!("agent {}: {}", kind, e),
        })?;
        let now = self.clock.now();
        match envelope.is_success().then(|| TokenGrant::from_data(&envelope.data, now)) {
            Some(Some(grant)) => {
                info!(kind, expires_at = %grant.access_expiry, "reseller token acquired");
                Ok(grant)
            }
            _ => {
                let (code, message) = envelope.error_details();
                Err(ProviderError::Credential {
                    code,
                    message: format!("agent {} failed: {}", kind, message),
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for CredentialManager {
    fn mode(&self) -> CredentialMode {
        self.config.mode
    }

    async fn get_token(&self) -> Result<String, ProviderError> {
        if self.config.mode == CredentialMode::Simulated {
            return Ok(SIMULATED_ACCESS_TOKEN.to_string());
        }
        let observed = self.generation.load(Ordering::Acquire);
        {
            let state = self.state.read().await;
            if let Some(token) = state.usable_access_token(self.clock.now()) {
                return Ok(token.to_string());
            }
        }
        self.refresh_from(observed).await
    }

    #[instrument(skip(self))]
    async fn refresh(&self) -> Result<String, ProviderError> {
        if self.config.mode == CredentialMode::Simulated {
            return Ok(SIMULATED_ACCESS_TOKEN.to_string());
        }
        let observed = self.generation.load(Ordering::Acquire);
        self.refresh_from(observed).await
    }
}
