//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

mod handlers;
mod request_id;
mod server;

pub use handlers::{ApiError, AppState};
pub use request_id::{RequestId, request_id_middleware};
pub use server::HttpServer;
