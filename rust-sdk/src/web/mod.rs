//! Webhook authentication and the gateway's HTTP surface.
//!
//! This module provides:
//! - `signature`: HMAC verification of inbound Kiket webhook deliveries
//! - `handlers`: axum handlers that authenticate deliveries and run local
//!   audit proof checks
//!
//! Business-logic dispatch of accepted deliveries happens elsewhere.

pub mod handlers;
pub mod signature;

pub use handlers::{
    audit_verify, health, webhook, AppState, HealthResponse, LocalVerifyRequest,
    WebhookResponse, EVENT_VERSION_HEADER,
};
pub use signature::{
    generate_signature, verify_signature, AuthError, AuthenticatorConfig, Clock, FixedClock,
    HeaderSource, ProtocolViolation, SystemClock, WebhookAuthenticator, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
