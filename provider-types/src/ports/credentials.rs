//! Token provider port.

use crate::domain::CredentialMode;
use crate::error::ProviderError;

/// Supplies reseller access tokens to the transport.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    fn mode(&self) -> CredentialMode;

    /// Returns a usable access token, re-authenticating first if needed.
    async fn get_token(&self) -> Result<String, ProviderError>;

    /// Forces re-authentication and returns the new token.
    ///
    /// Concurrent callers share a single in-flight refresh.
    async fn refresh(&self) -> Result<String, ProviderError>;
}
