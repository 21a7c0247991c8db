//! Async HTTP client for the Kiket API.
//!
//! The client is cheap to clone and shares one connection pool. Every
//! request is bounded by the configured default timeout unless the caller
//! passes its own; dropping the returned future cancels the request.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};
use url::Url;

use crate::config::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_MS};

/// Header carrying the extension API key.
pub const API_KEY_HEADER: &str = "X-Kiket-API-Key";

/// Errors returned by the API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status of a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Settings for [`ApiClient`].
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as `X-Kiket-API-Key`; takes precedence over `token`.
    pub api_key: Option<String>,
    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    /// Timeout applied when a call does not supply its own.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            token: None,
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            user_agent: concat!("kiket-sdk-rust/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("has_token", &self.token.is_some())
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Kiket API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
}

impl ApiClient {
    /// Create a client from `config`.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(ApiError::ClientBuild)?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Resolve `path` against the base URL and append `query`.
    pub fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            path
        ))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// `GET` a JSON resource.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<T, ApiError> {
        let url = self.url(path, query)?;
        let request = self.request(Method::GET, url);
        self.send(request, timeout).await
    }

    /// `POST` a JSON body and decode the JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError> {
        let url = self.url(path, &[])?;
        let request = self.request(Method::POST, url).json(body);
        self.send(request, timeout).await
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut request = self
            .http
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(key) = self.config.api_key.as_deref() {
            request = request.header(API_KEY_HEADER, key);
        } else if let Some(token) = self.config.token.as_deref() {
            request = request.bearer_auth(token);
        }

        request
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError> {
        let timeout = timeout.unwrap_or(self.config.timeout);
        let request = request.timeout(timeout);
        let started = Instant::now();

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                error!(timeout_seconds = timeout.as_secs_f64(), error = %e, "api_request_timeout");
                ApiError::Timeout(timeout)
            } else {
                error!(error = %e, "api_request_error");
                ApiError::Transport(e)
            }
        })?;

        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(timeout)
            } else {
                ApiError::Transport(e)
            }
        })?;

        if status.is_client_error() || status.is_server_error() {
            warn!(
                path = url.path(),
                status_code = status.as_u16(),
                body_length = body.len(),
                "api_request_rejected"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            path = url.path(),
            status_code = status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "api_request_complete"
        );

        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, config: ClientConfig) -> ApiClient {
        ApiClient::new(ClientConfig {
            base_url: server.uri(),
            ..config
        })
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let client = ApiClient::new(ClientConfig {
            base_url: "https://kiket.example/".to_string(),
            ..ClientConfig::default()
        })
        .unwrap();

        let url = client
            .url("/api/v1/audit/anchors", &[("page", "1".to_string()), ("status", "a b".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://kiket.example/api/v1/audit/anchors?page=1&status=a+b"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ApiClient::new(ClientConfig {
            base_url: "not a url".to_string(),
            ..ClientConfig::default()
        });
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ClientConfig {
            api_key: Some("very-secret-key".to_string()),
            ..ClientConfig::default()
        };
        assert!(!format!("{config:?}").contains("very-secret-key"));
    }

    #[tokio::test]
    async fn test_api_key_header_takes_precedence() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/ping"))
            .and(matchers::header("x-kiket-api-key", "ext-key"))
            .and(matchers::header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(
            &server,
            ClientConfig {
                api_key: Some("ext-key".to_string()),
                token: Some("workspace-token".to_string()),
                ..ClientConfig::default()
            },
        );

        let body: Value = client.get_json("/ping", &[], None).await.unwrap();
        assert_eq!(body["ok"], Value::Bool(true));
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::header("authorization", "Bearer workspace-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(
            &server,
            ClientConfig {
                token: Some("workspace-token".to_string()),
                ..ClientConfig::default()
            },
        );

        let _: Value = client.get_json("/anything", &[], None).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("unprocessable"))
            .mount(&server)
            .await;

        let client = client_for(&server, ClientConfig::default());
        let err = client
            .post_json::<_, Value>("/api/v1/audit/verify", &serde_json::json!({}), None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(422));
        assert_eq!(err.to_string(), "API error (status 422): unprocessable");
    }

    #[tokio::test]
    async fn test_per_call_timeout() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, ClientConfig::default());
        let err = client
            .get_json::<Value>("/slow", &[], Some(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server, ClientConfig::default());
        let err = client.get_json::<Value>("/x", &[], None).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
