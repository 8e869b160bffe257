//! # Provider Hex
//!
//! Application service layer and HTTP adapter for the provider integration layer.
//!
//! ## Architecture
//!
//! - `service/` - Application service (idempotent payments, reseller calls, webhook dispatch)
//! - `inbound/` - HTTP adapter (Axum server)
//! - `openapi` - OpenAPI document served at `/api-docs/openapi.json`
//!
//! The service is generic over `W: WebhookHandler`, so the business reaction
//! to verified notifications is injected by the binary.

pub mod inbound;
pub mod openapi;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use service::{IdempotentResponse, ProviderService, SignedDelivery};
