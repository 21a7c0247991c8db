//! Gateway endpoint handlers.
//!
//! The webhook endpoint only authenticates and acknowledges; it does not
//! dispatch to business logic. The audit endpoint runs a local proof check.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::audit::{
    check_proof, check_structure, compute_content_hash, ProofError, VerificationResult,
};
use crate::web::signature::{lookup, WebhookAuthenticator};
use crate::Config;

/// Header naming the payload schema version of a delivery.
pub const EVENT_VERSION_HEADER: &str = "X-Kiket-Event-Version";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: WebhookAuthenticator,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            authenticator: WebhookAuthenticator::new(config.authenticator()),
        }
    }

    /// Replace the authenticator, e.g. to pin its clock.
    pub fn with_authenticator(mut self, authenticator: WebhookAuthenticator) -> Self {
        self.authenticator = authenticator;
        self
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Webhook
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    fn failure(status: &str, error: impl ToString) -> Self {
        Self {
            status: status.to_string(),
            event: None,
            event_version: None,
            error: Some(error.to_string()),
        }
    }
}

/// Webhook endpoint.
///
/// This endpoint:
/// 1. Authenticates the raw body against the signature headers
/// 2. Checks the body is a JSON object
/// 3. Acknowledges with the event name and version
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    info!(body_length = body.len(), "webhook_received");

    if let Err(e) = state.authenticator.verify(&body, &headers) {
        if e.is_authentication_failure() {
            warn!(error = %e, "webhook_rejected");
            return (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse::failure("unauthorized", &e)),
            );
        }
        error!(error = %e, "webhook_authentication_unavailable");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WebhookResponse::failure("error", &e)),
        );
    }

    let payload: Map<String, Value> = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "webhook_payload_invalid");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::failure("invalid_payload", "failed to parse webhook payload")),
            );
        }
    };

    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let event_version = lookup(&headers, EVENT_VERSION_HEADER)
        .unwrap_or("v1")
        .to_string();

    info!(event = %event, event_version = %event_version, "webhook_accepted");

    (
        StatusCode::OK,
        Json(WebhookResponse {
            status: "accepted".to_string(),
            event: Some(event),
            event_version: Some(event_version),
            error: None,
        }),
    )
}

// =============================================================================
// Audit Verification
// =============================================================================

/// Local proof verification request.
///
/// Either `record` or `content_hash` must be given; `record` wins when both
/// are present.
#[derive(Debug, Deserialize)]
pub struct LocalVerifyRequest {
    #[serde(default)]
    pub record: Option<Map<String, Value>>,
    #[serde(default)]
    pub content_hash: Option<String>,
    pub merkle_root: String,
    #[serde(default)]
    pub proof: Vec<String>,
    pub leaf_index: u64,
    /// When present, the path length and index are checked against it.
    #[serde(default)]
    pub leaf_count: Option<u64>,
}

/// Local audit proof verification endpoint.
pub async fn audit_verify(Json(request): Json<LocalVerifyRequest>) -> impl IntoResponse {
    let content_hash = match (&request.record, &request.content_hash) {
        (Some(record), _) => compute_content_hash(record),
        (None, Some(hash)) => hash.clone(),
        (None, None) => {
            warn!("audit_verify_missing_content");
            return (
                StatusCode::BAD_REQUEST,
                Json(local_result(
                    &request,
                    String::new(),
                    Err("record or content_hash is required".to_string()),
                )),
            );
        }
    };

    let outcome = structural_check(&request)
        .and_then(|_| {
            check_proof(
                &content_hash,
                &request.proof,
                request.leaf_index,
                &request.merkle_root,
            )
        })
        .map_err(|e| e.to_string());

    info!(
        leaf_index = request.leaf_index,
        proof_length = request.proof.len(),
        proof_valid = outcome.is_ok(),
        "audit_local_verification_complete"
    );

    (
        StatusCode::OK,
        Json(local_result(&request, content_hash, outcome)),
    )
}

fn structural_check(request: &LocalVerifyRequest) -> Result<(), ProofError> {
    match request.leaf_count {
        Some(leaf_count) => check_structure(request.leaf_index, leaf_count, request.proof.len()),
        None => Ok(()),
    }
}

fn local_result(
    request: &LocalVerifyRequest,
    content_hash: String,
    outcome: Result<(), String>,
) -> VerificationResult {
    VerificationResult {
        verified: false,
        proof_valid: outcome.is_ok(),
        blockchain_verified: false,
        content_hash,
        merkle_root: request.merkle_root.clone(),
        leaf_index: request.leaf_index,
        block_number: None,
        block_timestamp: None,
        network: None,
        explorer_url: None,
        error: outcome.err(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{build_proof, compute_root, encode_hash, hash::sha256};
    use crate::web::signature::FixedClock;
    use crate::web::AuthenticatorConfig;
    use axum::response::Response;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn state(secret: &str) -> AppState {
        let config = Config {
            webhook_secret: Some(secret.to_string()),
            ..Config::default()
        };
        let authenticator = WebhookAuthenticator::new(AuthenticatorConfig::new(secret))
            .with_clock(FixedClock(NOW));
        AppState::new(&config).with_authenticator(authenticator)
    }

    fn signed_headers(state: &AppState, body: &[u8], ts: i64) -> HeaderMap {
        let (sig, ts) = state.authenticator.generate(body, Some(ts)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-kiket-signature", sig.parse().unwrap());
        headers.insert("x-kiket-timestamp", ts.parse().unwrap());
        headers
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let Json(response) = health().await;
        assert_eq!(response.status, "ok");
    }

    #[tokio::test]
    async fn test_webhook_accepted() {
        let state = state("s3cr3t");
        let body = br#"{"event":"issue.created","issue":{"id":1}}"#;
        let mut headers = signed_headers(&state, body, NOW);
        headers.insert("x-kiket-event-version", "v2".parse().unwrap());

        let response = webhook(State(state), headers, Bytes::from_static(body))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body: WebhookResponse = json_body(response).await;
        assert_eq!(body.status, "accepted");
        assert_eq!(body.event.as_deref(), Some("issue.created"));
        assert_eq!(body.event_version.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_webhook_defaults_event_version() {
        let state = state("s3cr3t");
        let body = br#"{"event":"issue.updated"}"#;
        let headers = signed_headers(&state, body, NOW);

        let response = webhook(State(state), headers, Bytes::from_static(body))
            .await
            .into_response();
        let body: WebhookResponse = json_body(response).await;
        assert_eq!(body.event_version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_webhook_bad_signature_is_unauthorized() {
        let state = state("s3cr3t");
        let headers = signed_headers(&state, b"{}", NOW);

        let response = webhook(State(state), headers, Bytes::from_static(b"{\"x\":1}"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body: WebhookResponse = json_body(response).await;
        assert_eq!(body.error.as_deref(), Some("invalid signature"));
    }

    #[tokio::test]
    async fn test_webhook_stale_is_unauthorized() {
        let state = state("s3cr3t");
        let headers = signed_headers(&state, b"{}", NOW - 301);

        let response = webhook(State(state), headers, Bytes::from_static(b"{}"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_without_secret_is_server_error() {
        let state = state("");
        let response = webhook(State(state), HeaderMap::new(), Bytes::from_static(b"{}"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_webhook_non_object_body_is_bad_request() {
        let state = state("s3cr3t");
        let headers = signed_headers(&state, b"[1,2,3]", NOW);

        let response = webhook(State(state), headers, Bytes::from_static(b"[1,2,3]"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_audit_verify_with_record() {
        let records = [json!({"id": 1, "action": "a"}), json!({"id": 2, "action": "b"})];
        let leaves: Vec<_> = records
            .iter()
            .map(|r| crate::audit::decode_hash(&compute_content_hash(r.as_object().unwrap())).unwrap())
            .collect();
        let root = encode_hash(&compute_root(&leaves).unwrap());
        let proof: Vec<String> = build_proof(&leaves, 0).unwrap().iter().map(encode_hash).collect();

        let request = LocalVerifyRequest {
            record: records[0].as_object().cloned(),
            content_hash: None,
            merkle_root: root,
            proof,
            leaf_index: 0,
            leaf_count: Some(2),
        };

        let response = audit_verify(Json(request)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let result: VerificationResult = json_body(response).await;
        assert!(result.proof_valid);
        assert!(!result.blockchain_verified);
        assert_eq!(result.content_hash, encode_hash(&leaves[0]));
    }

    #[tokio::test]
    async fn test_audit_verify_structure_mismatch() {
        let leaf = encode_hash(&sha256(b"only"));
        let request = LocalVerifyRequest {
            record: None,
            content_hash: Some(leaf.clone()),
            merkle_root: leaf,
            proof: vec![],
            leaf_index: 0,
            leaf_count: Some(4),
        };

        let result: VerificationResult =
            json_body(audit_verify(Json(request)).await.into_response()).await;
        assert!(!result.proof_valid);
        assert_eq!(
            result.error.as_deref(),
            Some("proof has 0 siblings, expected 2")
        );
    }

    #[tokio::test]
    async fn test_audit_verify_requires_content() {
        let request = LocalVerifyRequest {
            record: None,
            content_hash: None,
            merkle_root: "0x00".to_string(),
            proof: vec![],
            leaf_index: 0,
            leaf_count: None,
        };

        let response = audit_verify(Json(request)).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
