//! Default reaction to verified gateway notifications.

use async_trait::async_trait;
use tracing::info;

use provider_types::{AppError, GatewayEvent, WebhookHandler};

/// Records every verified event in the log and counts it as one update.
///
/// Deployments that own order state replace this with a handler that writes
/// to their store.
pub struct LoggingWebhookHandler;

#[async_trait]
impl WebhookHandler for LoggingWebhookHandler {
    async fn handle(&self, event: GatewayEvent, request_id: Option<&str>) -> Result<u32, AppError> {
        let request_id = request_id.unwrap_or("-");
        match &event {
            GatewayEvent::Payment {
                provider,
                provider_order_id,
                order_reference,
                status,
                ..
            } => {
                info!(
                    request_id,
                    ?provider,
                    ?status,
                    provider_order_id = provider_order_id.as_deref().unwrap_or(""),
                    order_reference = order_reference.as_deref().unwrap_or(""),
                    "payment notification"
                );
            }
            GatewayEvent::AuthToken { user_login_id, .. } => {
                info!(request_id, user_login_id = %user_login_id, "auth token notification");
            }
            GatewayEvent::Payee {
                business_type,
                business_id,
                ..
            } => {
                info!(request_id, %business_type, %business_id, "payee notification");
            }
            GatewayEvent::Ignored { business_type } => {
                info!(request_id, %business_type, "notification ignored");
                return Ok(0);
            }
        }
        Ok(1)
    }
}
