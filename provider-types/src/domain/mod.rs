//! Domain models for the provider integration layer.

pub mod credential;
pub mod envelope;
pub mod gateway;
pub mod idempotency;
pub mod reseller;
pub mod signed_request;

pub use credential::{
    Credential, CredentialMode, DEFAULT_TOKEN_LIFETIME_SECS, SIMULATED_ACCESS_TOKEN, TokenGrant,
};
pub use envelope::{BusinessFailure, Envelope, GatewayEnvelope, GatewayResult};
pub use gateway::{
    GatewayEvent, GatewayWebhookEnvelope, PaymentMethod, PaymentProvider, PaymentStatus,
    PaymentWebhookBody,
};
pub use idempotency::{
    DEFAULT_IDEMPOTENCY_TTL_SECS, IDEMPOTENCY_KEY_HEADER, IdempotencyKey, IdempotencyRecord,
    MAX_IDEMPOTENCY_TTL_SECS, default_ttl,
};
pub use reseller::{AgentBillsQuery, AssignBundle, BundleListQuery, OrderListQuery};
pub use signed_request::{SIGNATURE_ALGORITHM, SignedRequest, body_hash};
