//! Kiket SDK trust verification.
//!
//! This library provides the verification core shared by the two binaries:
//! - `kiket-gateway`: web server that authenticates webhook deliveries
//! - `kiket-audit`: CLI for content hashes, signatures and audit proofs
//!
//! ## Architecture
//!
//! ```text
//! Webhook → WebhookAuthenticator → caller's business logic
//! Record + BlockchainProof → verify_proof_locally / AuditClient::verify
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod web;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, ClientConfig};
pub use audit::{
    compute_content_hash, verify_locally, verify_proof_locally, AuditClient, BlockchainAnchor,
    BlockchainProof, VerificationResult,
};
pub use config::Config;
pub use web::{
    generate_signature, verify_signature, AppState, AuthError, AuthenticatorConfig,
    WebhookAuthenticator,
};
