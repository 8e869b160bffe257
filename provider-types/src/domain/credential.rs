//! Reseller credential state.
//!
//! A [`Credential`] is created at process start from configuration, mutated
//! only by the credential manager and never persisted.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Token handed out in simulated mode.
pub const SIMULATED_ACCESS_TOKEN: &str = "simulated-access-token";

/// Lifetime assumed when the upstream does not say how long a token lives.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 86_400;

/// Relative lifetimes longer than this are not trusted; the default applies.
const MAX_TOKEN_LIFETIME_SECS: f64 = 366.0 * 86_400.0;

/// Whether the credential talks to the real upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    Live,
    /// No network I/O; the token is a fixed placeholder.
    #[default]
    Simulated,
}

impl AsRef<str> for CredentialMode {
    fn as_ref(&self) -> &str {
        match self {
            Self::Live => "live",
            Self::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(Clone, Default)]
pub struct Credential {
    pub mode: CredentialMode,
    pub access_token: Option<String>,
    pub access_expiry: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub refresh_expiry: Option<DateTime<Utc>>,
}

// Tokens stay out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("mode", &self.mode)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("access_expiry", &self.access_expiry)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_expiry", &self.refresh_expiry)
            .finish()
    }
}

impl Credential {
    pub fn new(mode: CredentialMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Returns the access token if it can still be used at `now`.
    pub fn usable_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.mode == CredentialMode::Simulated {
            return Some(SIMULATED_ACCESS_TOKEN);
        }
        match (&self.access_token, self.access_expiry) {
            (Some(token), Some(expiry)) if now < expiry => Some(token.as_str()),
            _ => None,
        }
    }

    /// Returns the refresh token if it exists and has not expired.
    pub fn usable_refresh_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.refresh_token.as_deref()?;
        match self.refresh_expiry {
            Some(expiry) if now >= expiry => None,
            _ => Some(token),
        }
    }

    /// Replaces the token pair with a freshly issued grant.
    ///
    /// A grant without a refresh token keeps the previous one.
    pub fn apply_grant(&mut self, grant: TokenGrant) {
        self.access_token = Some(grant.access_token);
        self.access_expiry = Some(grant.access_expiry);
        if let Some(refresh) = grant.refresh_token {
            self.refresh_token = Some(refresh);
            self.refresh_expiry = grant.refresh_expiry;
        } else if grant.refresh_expiry.is_some() {
            self.refresh_expiry = grant.refresh_expiry;
        }
    }

    /// Adopts a statically configured token with the default lifetime.
    pub fn adopt_static(&mut self, token: &str, now: DateTime<Utc>) {
        self.access_token = Some(token.to_string());
        self.access_expiry = Some(default_expiry(now));
    }
}

/// Token pair extracted from a successful login or refresh envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub access_expiry: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub refresh_expiry: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_expiry", &self.access_expiry)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("refresh_expiry", &self.refresh_expiry)
            .finish()
    }
}

impl TokenGrant {
    /// Reads a grant out of envelope `data`. Returns `None` without an access token.
    ///
    /// Expiry comes from `expires_at` when it lies in the future, then from
    /// `expires_in`, and otherwise defaults to 24 hours. The refresh token's
    /// expiry is read the same way from `refresh_expires_at`/`refresh_expires_in`.
    pub fn from_data(data: &Value, now: DateTime<Utc>) -> Option<Self> {
        let access_token = data
            .get("access_token")
            .or_else(|| data.get("accessToken"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())?
            .to_string();

        let access_expiry = expiry_from(data, "expires_at", "expires_in", now)
            .unwrap_or_else(|| default_expiry(now));

        let refresh_token = data
            .get("refresh_token")
            .or_else(|| data.get("refreshToken"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let refresh_expiry = expiry_from(data, "refresh_expires_at", "refresh_expires_in", now)
            .or_else(|| {
                refresh_token.as_ref().map(|_| default_expiry(now))
            });

        Some(Self {
            access_token,
            access_expiry,
            refresh_token,
            refresh_expiry,
        })
    }
}

fn expiry_from(
    data: &Value,
    absolute_key: &str,
    relative_key: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let absolute = data
        .get(absolute_key)
        .and_then(Value::as_f64)
        .and_then(epoch_to_datetime)
        .filter(|at| *at > now);
    if absolute.is_some() {
        return absolute;
    }
    data.get(relative_key)
        .and_then(Value::as_f64)
        .filter(|secs| *secs > 0.0 && *secs <= MAX_TOKEN_LIFETIME_SECS)
        .and_then(|secs| Duration::try_milliseconds((secs * 1000.0) as i64))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
}

fn default_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_add_signed(Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// Values past 1e12 are epoch milliseconds.
fn epoch_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    let millis = if value > 1e12 { value } else { value * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}
