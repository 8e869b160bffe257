//! Business dispatch for verified webhooks.

use crate::domain::GatewayEvent;
use crate::error::AppError;

/// Receives events only after their signature has been verified.
#[async_trait::async_trait]
pub trait WebhookHandler: Send + Sync + 'static {
    /// Applies the event and returns how many records it updated.
    async fn handle(&self, event: GatewayEvent, request_id: Option<&str>)
    -> Result<u32, AppError>;
}
