//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables and hands the
//! verifiers and the audit client explicit configuration values.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::api::ClientConfig;
use crate::web::AuthenticatorConfig;

/// Default audit service base URL.
pub const DEFAULT_BASE_URL: &str = "https://kiket.dev";

/// Default freshness window for webhook timestamps, in seconds.
pub const DEFAULT_SIGNATURE_MAX_AGE: u64 = 300;

/// Default timeout for audit service requests, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret used to sign webhook deliveries
    pub webhook_secret: Option<String>,

    /// Audit service base URL
    pub base_url: String,

    /// Extension API key, sent as `X-Kiket-API-Key`
    pub extension_api_key: Option<String>,

    /// Workspace token, sent as a bearer token when no API key is set
    pub workspace_token: Option<String>,

    /// Maximum allowed skew in seconds between a webhook timestamp and now
    pub signature_max_age: u64,

    /// Default HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Port for the webhook gateway to listen on
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            webhook_secret: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            extension_api_key: None,
            workspace_token: None,
            signature_max_age: DEFAULT_SIGNATURE_MAX_AGE,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            webhook_secret: parse_optional("KIKET_WEBHOOK_SECRET"),

            base_url: parse_optional("KIKET_BASE_URL")
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),

            extension_api_key: parse_optional("KIKET_EXTENSION_API_KEY"),

            workspace_token: parse_optional("KIKET_WORKSPACE_TOKEN"),

            signature_max_age: parse_number("KIKET_SIGNATURE_MAX_AGE", DEFAULT_SIGNATURE_MAX_AGE),

            request_timeout_ms: parse_number(
                "KIKET_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            ),

            port: parse_number("PORT", 8080),
        }
    }

    /// Authenticator settings derived from this configuration.
    pub fn authenticator(&self) -> AuthenticatorConfig {
        AuthenticatorConfig {
            secret: self.webhook_secret.clone().unwrap_or_default().into_bytes(),
            max_age_seconds: self.signature_max_age,
        }
    }

    /// Audit client settings derived from this configuration.
    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            api_key: self.extension_api_key.clone(),
            token: self.workspace_token.clone(),
            timeout: Duration::from_millis(self.request_timeout_ms),
            ..ClientConfig::default()
        }
    }
}

/// Read a variable as given, treating an empty value as unset.
///
/// Credentials are not trimmed: the secret must match byte for byte what
/// signers use.
fn parse_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn parse_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
            default
        }
    }
}
