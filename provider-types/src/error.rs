//! Error types for the provider integration layer.

use serde::Serialize;

/// Envelope code the reseller uses for an expired access token.
pub const TOKEN_EXPIRED_CODE: i64 = 411;

// ─────────────────────────────────────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse classification of an upstream failure, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    BadInput,
    NotFound,
    Conflict,
    Forbidden,
    Unauthorized,
    AuthExpired,
    Busy,
    UpstreamError,
    UpstreamUnavailable,
    Internal,
}

impl ErrorCategory {
    /// HTTP status used when this category is surfaced to a client.
    pub fn http_status(self) -> u16 {
        match self {
            Self::BadInput => 400,
            Self::Unauthorized | Self::AuthExpired => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Busy => 423,
            Self::Internal => 500,
            Self::UpstreamError => 502,
            Self::UpstreamUnavailable => 503,
        }
    }
}

impl AsRef<str> for ErrorCategory {
    fn as_ref(&self) -> &str {
        match self {
            Self::BadInput => "bad_input",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::AuthExpired => "auth_expired",
            Self::Busy => "busy",
            Self::UpstreamError => "upstream_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Fixed table of reseller envelope codes. Unknown codes are a generic upstream failure.
pub fn category_for_reseller_code(code: i64) -> ErrorCategory {
    match code {
        1003 => ErrorCategory::BadInput,
        1070 => ErrorCategory::NotFound,
        1081 => ErrorCategory::Conflict,
        1016 => ErrorCategory::Unauthorized,
        TOKEN_EXPIRED_CODE => ErrorCategory::AuthExpired,
        _ => ErrorCategory::UpstreamError,
    }
}

const GATEWAY_SYSTEM_FAILURE: &[&str] = &[
    "系统错误",
    "添加卡失败",
    "创建收款人账户失败",
    "更新收款人账户失败",
];
const GATEWAY_BUSY: &[&str] = &["系统繁忙"];
const GATEWAY_NOT_FOUND: &[&str] = &["未找到"];
const GATEWAY_FORBIDDEN: &[&str] = &["禁忌", "不允许"];

/// Classifies a gateway failure by its numeric result code, then by message keywords.
///
/// Anything unrecognised is treated as bad input, since the gateway reports
/// validation problems without a stable code.
pub fn category_for_gateway_failure(code: Option<i64>, message: &str) -> ErrorCategory {
    let msg = message.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| msg.contains(w));

    if code == Some(500) || mentions(GATEWAY_SYSTEM_FAILURE) {
        ErrorCategory::UpstreamError
    } else if code == Some(423) || mentions(GATEWAY_BUSY) {
        ErrorCategory::Busy
    } else if code == Some(404) || mentions(GATEWAY_NOT_FOUND) {
        ErrorCategory::NotFound
    } else if code == Some(403) || mentions(GATEWAY_FORBIDDEN) {
        ErrorCategory::Forbidden
    } else {
        ErrorCategory::BadInput
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signature errors
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons an RSA2 signature could not be produced or was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Authorization header missing")]
    MissingAuthorization,

    #[error("Authorization header malformed: {0}")]
    MalformedAuthorization(String),

    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature missing from Authorization header")]
    MissingSignature,

    #[error("X-Appid header missing")]
    MissingAppId,

    #[error("Timestamp missing from Authorization header")]
    MissingTimestamp,

    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature encoding invalid: {0}")]
    Encoding(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Signature does not match")]
    Mismatch,
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider errors
// ─────────────────────────────────────────────────────────────────────────────

/// Everything that can go wrong while talking to the reseller or the gateway.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Login, refresh and the static fallback all failed.
    #[error("Credential acquisition failed (code {code:?}): {message}")]
    Credential { code: Option<i64>, message: String },

    #[error("Upstream unavailable after {attempts} attempt(s): {message}")]
    Transport { message: String, attempts: u32 },

    #[error("Upstream returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Upstream business error {code}: {message}")]
    Business {
        code: String,
        message: String,
        category: ErrorCategory,
    },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Business error from a reseller envelope code.
    pub fn reseller_business(code: i64, message: impl Into<String>) -> Self {
        Self::Business {
            code: code.to_string(),
            message: message.into(),
            category: category_for_reseller_code(code),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Credential { .. } => ErrorCategory::Unauthorized,
            Self::Transport { .. } => ErrorCategory::UpstreamUnavailable,
            Self::HttpStatus { status } => match status {
                401 => ErrorCategory::Unauthorized,
                403 => ErrorCategory::Forbidden,
                404 => ErrorCategory::NotFound,
                500..=599 => ErrorCategory::UpstreamUnavailable,
                _ => ErrorCategory::UpstreamError,
            },
            Self::Business { category, .. } => *category,
            Self::Signature(_) | Self::InvalidResponse(_) => ErrorCategory::UpstreamError,
            Self::Config(_) => ErrorCategory::Internal,
            Self::InvalidRequest(_) => ErrorCategory::BadInput,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.category().http_status()
    }

    /// Upstream code carried by the error, when there is one.
    pub fn upstream_code(&self) -> Option<String> {
        match self {
            Self::Credential { code, .. } => code.map(|c| c.to_string()),
            Self::HttpStatus { status } => Some(status.to_string()),
            Self::Business { code, .. } => Some(code.clone()),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository errors
// ─────────────────────────────────────────────────────────────────────────────

/// Idempotency tier failures. Never fatal to a request; tiers are skipped.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Application errors
// ─────────────────────────────────────────────────────────────────────────────

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::Busy(_) => 423,
            AppError::Internal(_) => 500,
            AppError::BadGateway(_) => 502,
            AppError::ServiceUnavailable(_) => 503,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(m)
            | AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::Busy(m)
            | AppError::BadGateway(m)
            | AppError::ServiceUnavailable(m)
            | AppError::Internal(m) => m,
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        let message = match &err {
            ProviderError::Business { message, .. } => message.clone(),
            ProviderError::Config(_) => "Provider is not configured".to_string(),
            other => other.to_string(),
        };
        match err.category() {
            ErrorCategory::BadInput => AppError::BadRequest(message),
            ErrorCategory::NotFound => AppError::NotFound(message),
            ErrorCategory::Conflict => AppError::Conflict(message),
            ErrorCategory::Forbidden => AppError::Forbidden(message),
            ErrorCategory::Unauthorized | ErrorCategory::AuthExpired => {
                AppError::Unauthorized(message)
            }
            ErrorCategory::Busy => AppError::Busy(message),
            ErrorCategory::UpstreamError => AppError::BadGateway(message),
            ErrorCategory::UpstreamUnavailable => AppError::ServiceUnavailable(message),
            ErrorCategory::Internal => AppError::Internal(message),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        AppError::Internal(err.to_string())
    }
}
