//! Provider configuration loaded from the environment.
//!
//! Parsing is lenient: an unparseable number falls back to its default with a
//! warning instead of refusing to start.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use provider_types::domain::{CredentialMode, PaymentMethod};

use crate::reseller::ResellerOperation;
use crate::retry::RetryPolicy;

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Connection pool and timeouts for the reseller transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub max_connections: usize,
    pub max_keepalive: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: None,
            read_timeout: None,
            max_connections: 100,
            max_keepalive: 20,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CredentialConfig {
    pub mode: CredentialMode,
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub login_path: String,
    pub refresh_path: String,
    /// Seeds the credential at startup and is the last resort when login fails.
    pub static_token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("mode", &self.mode)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("login_path", &self.login_path)
            .field("refresh_path", &self.refresh_path)
            .field("static_token", &self.static_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            mode: CredentialMode::Simulated,
            base_url: None,
            username: None,
            password: None,
            login_path: "/agent/login".to_string(),
            refresh_path: "/agent/refreshToken".to_string(),
            static_token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResellerConfig {
    pub mode: CredentialMode,
    pub base_url: Option<String>,
    pub path_overrides: HashMap<ResellerOperation, String>,
}

impl ResellerConfig {
    pub fn path_for(&self, op: ResellerOperation) -> &str {
        self.path_overrides
            .get(&op)
            .map(String::as_str)
            .unwrap_or(op.default_path())
    }
}

/// Gateway pay-type codes per payment method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayTypes {
    pub alipay: String,
    pub card: String,
    pub applepay: String,
    pub paypal: String,
}

impl Default for PayTypes {
    fn default() -> Self {
        Self {
            alipay: "ALIPAY_CN".to_string(),
            card: "CARD".to_string(),
            applepay: "APPLEPAY".to_string(),
            paypal: "PAYPAL".to_string(),
        }
    }
}

impl PayTypes {
    pub fn for_method(&self, method: PaymentMethod) -> &str {
        match method {
            PaymentMethod::Alipay => &self.alipay,
            PaymentMethod::Card => &self.card,
            PaymentMethod::Applepay => &self.applepay,
            PaymentMethod::Paypal => &self.paypal,
        }
    }
}

pub const DEFAULT_CREATE_PATH: &str = "/v1/gateway/v1/acquiring/pay_session";
pub const DEFAULT_CARD_PAY_PATH: &str = "/v1/gateway/v1/acquiring/card_auto_debit/pay";
pub const DEFAULT_PAY_PATH: &str = "/v1/gateway/v1/acquiring/easy_safe_pay/pay";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: Option<String>,
    pub app_id: String,
    pub client_private_key: Option<PathBuf>,
    pub server_public_key: Option<PathBuf>,
    pub create_path: Option<String>,
    pub card_create_path: Option<String>,
    pub pay_path: Option<String>,
    pub card_pay_path: Option<String>,
    pub mch_app_id: String,
    pub notify_url: String,
    pub return_url: String,
    pub pay_types: PayTypes,
    pub session_expiry: Duration,
    pub pay_expiry: Duration,
    pub product_scene: String,
    pub env_terminal_type: String,
    pub env_os_type: String,
    pub order_description: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            app_id: String::new(),
            client_private_key: None,
            server_public_key: None,
            create_path: None,
            card_create_path: None,
            pay_path: None,
            card_pay_path: None,
            mch_app_id: String::new(),
            notify_url: "/webhooks/payments".to_string(),
            return_url: "/return/payments".to_string(),
            pay_types: PayTypes::default(),
            session_expiry: Duration::from_secs(60 * 60),
            pay_expiry: Duration::from_secs(14 * 60),
            product_scene: "CHECKOUT_PAYMENT".to_string(),
            env_terminal_type: "WEB".to_string(),
            env_os_type: "IOS".to_string(),
            order_description: "eSIM purchase".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    pub fn create_path_for(&self, method: PaymentMethod) -> &str {
        let configured = match method {
            PaymentMethod::Card => self.card_create_path.as_deref(),
            _ => self.create_path.as_deref(),
        };
        configured.unwrap_or(DEFAULT_CREATE_PATH)
    }

    pub fn pay_path_for(&self, method: PaymentMethod) -> &str {
        match method {
            PaymentMethod::Card => self.card_pay_path.as_deref().unwrap_or(DEFAULT_CARD_PAY_PATH),
            _ => self.pay_path.as_deref().unwrap_or(DEFAULT_PAY_PATH),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub http: HttpConfig,
    pub retry: RetryPolicy,
    pub credentials: CredentialConfig,
    pub reseller: ResellerConfig,
    pub gateway: GatewayConfig,
}

impl ProviderConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `get`, which returns the raw value of a variable.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let simulated = text("PROVIDER_FAKE")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(true);
        let mode = if simulated {
            CredentialMode::Simulated
        } else {
            CredentialMode::Live
        };
        let base_url = text("PROVIDER_BASE_URL").map(|u| u.trim_end_matches('/').to_string());

        let total = secs_f64(&text, "PROVIDER_HTTP_TIMEOUT").unwrap_or(Duration::from_secs(15));
        let http = HttpConfig {
            timeout: total,
            connect_timeout: secs_f64(&text, "PROVIDER_HTTP_CONNECT_TIMEOUT"),
            read_timeout: secs_f64(&text, "PROVIDER_HTTP_READ_TIMEOUT"),
            max_connections: number(&text, "PROVIDER_HTTP_MAX_CONNECTIONS").unwrap_or(100),
            max_keepalive: number(&text, "PROVIDER_HTTP_MAX_KEEPALIVE").unwrap_or(20),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: number(&text, "PROVIDER_HTTP_RETRIES").unwrap_or(defaults.max_retries),
            base_backoff: number::<u64>(&text, "PROVIDER_HTTP_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_backoff),
            max_jitter: number::<u64>(&text, "PROVIDER_HTTP_JITTER_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_jitter),
        };

        let credential_defaults = CredentialConfig::default();
        let credentials = CredentialConfig {
            mode,
            base_url: base_url.clone(),
            username: text("PROVIDER_AGENT_USERNAME"),
            password: text("PROVIDER_AGENT_PASSWORD"),
            login_path: text("PROVIDER_LOGIN_PATH").unwrap_or(credential_defaults.login_path),
            refresh_path: text("PROVIDER_REFRESH_PATH").unwrap_or(credential_defaults.refresh_path),
            static_token: text("PROVIDER_ACCESS_TOKEN"),
            timeout: credential_defaults.timeout,
        };

        let path_overrides = ResellerOperation::ALL
            .iter()
            .filter_map(|op| text(&op.env_key()).map(|path| (*op, path)))
            .collect();
        let reseller = ResellerConfig {
            mode,
            base_url,
            path_overrides,
        };

        let gateway_defaults = GatewayConfig::default();
        let public_base = text("PUBLIC_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_default();
        let pay_defaults = PayTypes::default();
        let gateway = GatewayConfig {
            base_url: text("GATEWAY_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            app_id: text("GATEWAY_APPID").unwrap_or_default(),
            client_private_key: text("GATEWAY_CLIENT_PRIVATE_KEY_PATH").map(PathBuf::from),
            server_public_key: text("GATEWAY_SERVER_PUBLIC_KEY_PATH").map(PathBuf::from),
            create_path: text("GATEWAY_CREATE_PATH"),
            card_create_path: text("GATEWAY_CARD_CREATE_PATH"),
            pay_path: text("GATEWAY_PAY_PATH"),
            card_pay_path: text("GATEWAY_CARD_PAY_PATH"),
            mch_app_id: text("GATEWAY_MCH_APP_ID").unwrap_or_default(),
            notify_url: text("GATEWAY_NOTIFY_URL")
                .unwrap_or_else(|| format!("{}/webhooks/payments", public_base)),
            return_url: text("GATEWAY_RETURN_URL")
                .unwrap_or_else(|| format!("{}/return/payments", public_base)),
            pay_types: PayTypes {
                alipay: text("GATEWAY_PAYTYPE_ALIPAY").unwrap_or(pay_defaults.alipay),
                card: text("GATEWAY_PAYTYPE_CARD").unwrap_or(pay_defaults.card),
                applepay: text("GATEWAY_PAYTYPE_APPLEPAY").unwrap_or(pay_defaults.applepay),
                paypal: text("GATEWAY_PAYTYPE_PAYPAL").unwrap_or(pay_defaults.paypal),
            },
            session_expiry: number::<u64>(&text, "GATEWAY_SESSION_EXPIRY_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(gateway_defaults.session_expiry),
            pay_expiry: number::<u64>(&text, "GATEWAY_PAY_EXPIRY_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(gateway_defaults.pay_expiry),
            product_scene: text("GATEWAY_PRODUCT_SCENE").unwrap_or(gateway_defaults.product_scene),
            env_terminal_type: text("GATEWAY_ENV_TERMINAL_TYPE")
                .unwrap_or(gateway_defaults.env_terminal_type),
            env_os_type: text("GATEWAY_ENV_OS_TYPE").unwrap_or(gateway_defaults.env_os_type),
            order_description: text("GATEWAY_ORDER_DESCRIPTION")
                .unwrap_or(gateway_defaults.order_description),
            timeout: gateway_defaults.timeout,
        };

        Self {
            http,
            retry,
            credentials,
            reseller,
            gateway,
        }
    }
}

fn number<T: FromStr>(text: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = text(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting, using default");
            None
        }
    }
}

fn secs_f64(text: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    number::<f64>(text, key)
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64)
}
