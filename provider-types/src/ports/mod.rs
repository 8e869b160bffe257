//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod credentials;
mod http;
mod idempotency;
mod time;
mod webhook;

pub use credentials::TokenProvider;
pub use http::{HttpMethod, HttpRequest, HttpResponse, TransportFailure, UpstreamHttp};
pub use idempotency::IdempotencyBackend;
pub use time::{Clock, Sleeper, SystemClock};
pub use webhook::WebhookHandler;
