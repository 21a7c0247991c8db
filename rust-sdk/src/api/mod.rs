//! Kiket API access.
//!
//! A thin JSON-over-HTTPS client used by the audit module. It handles
//! authentication headers, timeouts and error mapping; endpoint-specific
//! calls live with the types they return.

pub mod client;

pub use client::{ApiClient, ApiError, ClientConfig, API_KEY_HEADER};
