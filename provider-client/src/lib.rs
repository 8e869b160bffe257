//! # Provider Client
//!
//! Outbound adapters for the upstream reseller API and the payment gateway.
//!
//! ## Architecture
//!
//! - `http` - reqwest implementation of the [`UpstreamHttp`](provider_types::UpstreamHttp) port
//! - `credentials` - access-token lifecycle with single-flight refresh
//! - `transport` - reseller envelope calls with retry and one-shot re-authentication
//! - `reseller` - typed reseller operations and batched usage lookups
//! - `signing` - RSA2 request signing and response/webhook verification
//! - `gateway` - signed payment gateway calls
//! - `config` - environment-driven configuration

pub mod config;
pub mod credentials;
pub mod gateway;
pub mod http;
pub mod reseller;
pub mod retry;
pub mod signing;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{CredentialConfig, GatewayConfig, HttpConfig, ProviderConfig, ResellerConfig};
pub use credentials::CredentialManager;
pub use gateway::{GatewayClient, Payer, sanitize_path};
pub use http::ReqwestHttp;
pub use reseller::{DEFAULT_USAGE_CONCURRENCY, ResellerClient, ResellerOperation};
pub use retry::{RetryPolicy, TokioSleeper};
pub use signing::{KeySource, RequestSigner, SignatureHeaders, SignatureVerifier};
pub use transport::{RequestContext, Transport};
