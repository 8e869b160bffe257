//! # Provider Types
//!
//! Domain types and port traits for the provider integration layer.
//! This crate has ZERO external IO dependencies - only data structures,
//! protocol rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Credential, Envelope, SignedRequest, idempotency records, gateway events
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Provider, signature, repository and application errors

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    BusinessFailure, Credential, CredentialMode, Envelope, GatewayEvent, IdempotencyKey,
    IdempotencyRecord, SignedRequest, TokenGrant, body_hash,
};
pub use dto::*;
pub use error::{AppError, ErrorCategory, ProviderError, RepoError, SignatureError};
pub use ports::{
    Clock, HttpMethod, HttpRequest, HttpResponse, IdempotencyBackend, Sleeper, SystemClock,
    TokenProvider, TransportFailure, UpstreamHttp, WebhookHandler,
};
