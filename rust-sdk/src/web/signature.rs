//! Kiket webhook signature verification.
//!
//! Kiket signs every webhook delivery with HMAC-SHA256 over
//! `timestamp + "." + body`, keyed by the extension's delivery secret.
//! The signature and timestamp travel in the `X-Kiket-Signature` and
//! `X-Kiket-Timestamp` headers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::DEFAULT_SIGNATURE_MAX_AGE;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Kiket-Signature";

/// Header carrying the signing timestamp in Unix seconds.
pub const TIMESTAMP_HEADER: &str = "X-Kiket-Timestamp";

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Malformed or missing authentication headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    MissingSignature,
    MissingTimestamp,
    InvalidTimestamp,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "missing signature header"),
            Self::MissingTimestamp => write!(f, "missing timestamp header"),
            Self::InvalidTimestamp => write!(f, "invalid timestamp"),
        }
    }
}

/// Reasons a webhook delivery fails authentication.
///
/// Everything except [`AuthError::Configuration`] is the sender's fault and
/// should be answered with 401; a configuration error is ours.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("webhook secret not configured")]
    Configuration,

    #[error("{0}")]
    Protocol(ProtocolViolation),

    #[error("request timestamp too old or too far in future: {skew_seconds}s")]
    Freshness {
        /// Absolute difference between the request timestamp and now.
        skew_seconds: u64,
    },

    #[error("invalid signature")]
    Integrity,
}

impl AuthError {
    /// Whether the failure is attributable to the request rather than to
    /// local configuration.
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(self, AuthError::Configuration)
    }
}

// =============================================================================
// Header lookup
// =============================================================================

/// Read access to request headers by name.
pub trait HeaderSource {
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl HeaderSource for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Look a header up by its canonical name, then by its lowercase name.
/// Empty values count as absent.
pub fn lookup<'a, H: HeaderSource + ?Sized>(headers: &'a H, canonical: &str) -> Option<&'a str> {
    headers
        .header(canonical)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .header(&canonical.to_ascii_lowercase())
                .filter(|v| !v.is_empty())
        })
}

// =============================================================================
// Authenticator
// =============================================================================

/// Settings for [`WebhookAuthenticator`].
#[derive(Clone)]
pub struct AuthenticatorConfig {
    /// Shared delivery secret. Empty means "not configured".
    pub secret: Vec<u8>,
    /// Maximum accepted skew in either direction, in seconds.
    pub max_age_seconds: u64,
}

impl AuthenticatorConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            max_age_seconds: DEFAULT_SIGNATURE_MAX_AGE,
        }
    }
}

impl fmt::Debug for AuthenticatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorConfig")
            .field("secret", &"<redacted>")
            .field("secret_configured", &!self.secret.is_empty())
            .field("max_age_seconds", &self.max_age_seconds)
            .finish()
    }
}

/// Verifies inbound webhook deliveries.
///
/// Holds no mutable state; clones share the clock and may be used from any
/// number of tasks at once.
#[derive(Clone)]
pub struct WebhookAuthenticator {
    config: AuthenticatorConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for WebhookAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookAuthenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WebhookAuthenticator {
    /// Create an authenticator reading the system clock.
    pub fn new(config: AuthenticatorConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Whether a non-empty secret is configured.
    pub fn is_configured(&self) -> bool {
        !self.config.secret.is_empty()
    }

    /// Verify a webhook delivery.
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// secret configured, signature header present, timestamp header present
    /// and numeric, timestamp within the freshness window, signature match.
    pub fn verify<H: HeaderSource + ?Sized>(&self, body: &[u8], headers: &H) -> Result<(), AuthError> {
        if self.config.secret.is_empty() {
            warn!("webhook_secret_not_configured");
            return Err(AuthError::Configuration);
        }

        let signature = match lookup(headers, SIGNATURE_HEADER) {
            Some(s) => s,
            None => {
                warn!("webhook_signature_missing");
                return Err(AuthError::Protocol(ProtocolViolation::MissingSignature));
            }
        };

        let timestamp = match lookup(headers, TIMESTAMP_HEADER) {
            Some(t) => t,
            None => {
                warn!("webhook_timestamp_missing");
                return Err(AuthError::Protocol(ProtocolViolation::MissingTimestamp));
            }
        };

        let request_time: i64 = match timestamp.parse() {
            Ok(t) => t,
            Err(_) => {
                warn!(timestamp = %timestamp, "webhook_timestamp_invalid");
                return Err(AuthError::Protocol(ProtocolViolation::InvalidTimestamp));
            }
        };

        let now = self.clock.now_unix();
        let skew = now.abs_diff(request_time);
        if skew > self.config.max_age_seconds {
            warn!(
                request_time = request_time,
                current_time = now,
                skew_seconds = skew,
                max_age_seconds = self.config.max_age_seconds,
                "webhook_timestamp_stale"
            );
            return Err(AuthError::Freshness { skew_seconds: skew });
        }

        let expected = compute_signature(&self.config.secret, timestamp, body)?;

        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            warn!(
                expected_length = expected.len(),
                actual_length = signature.len(),
                "webhook_signature_mismatch"
            );
            return Err(AuthError::Integrity);
        }

        Ok(())
    }

    /// Produce a signature and timestamp header value for `body`.
    ///
    /// Uses `timestamp` when given, otherwise the authenticator's clock.
    pub fn generate(&self, body: &[u8], timestamp: Option<i64>) -> Result<(String, String), AuthError> {
        let ts = timestamp.unwrap_or_else(|| self.clock.now_unix()).to_string();
        let signature = compute_signature(&self.config.secret, &ts, body)?;
        Ok((signature, ts))
    }
}

/// Verify a delivery against `secret` with the default window and the
/// system clock.
pub fn verify_signature<H: HeaderSource + ?Sized>(
    secret: &[u8],
    body: &[u8],
    headers: &H,
) -> Result<(), AuthError> {
    WebhookAuthenticator::new(AuthenticatorConfig::new(secret)).verify(body, headers)
}

/// Generate a `(signature, timestamp)` pair for test fixtures.
pub fn generate_signature(
    secret: &[u8],
    body: &[u8],
    timestamp: Option<i64>,
) -> Result<(String, String), AuthError> {
    WebhookAuthenticator::new(AuthenticatorConfig::new(secret)).generate(body, timestamp)
}

/// Lowercase hex HMAC-SHA256 of `timestamp + "." + body`.
fn compute_signature(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| AuthError::Configuration)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison. Unequal lengths compare unequal inside
/// `subtle`, without a separate early return here.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
