//! Audit service endpoints: anchors, proofs and remote verification.

use std::time::Duration;

use tracing::{info, warn};

use super::merkle::check_blockchain_proof;
use super::types::{
    BlockchainAnchor, BlockchainProof, ListAnchorsOptions, ListAnchorsResult, VerificationResult,
};
use crate::api::{ApiClient, ApiError};

const ANCHORS_PATH: &str = "/api/v1/audit/anchors";
const VERIFY_PATH: &str = "/api/v1/audit/verify";

/// Client for the blockchain audit endpoints.
///
/// No call is retried; every failure is returned to the caller.
#[derive(Debug, Clone)]
pub struct AuditClient {
    api: ApiClient,
}

impl AuditClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// List anchors for the organization, one page at a time.
    pub async fn list_anchors(
        &self,
        options: &ListAnchorsOptions,
        timeout: Option<Duration>,
    ) -> Result<ListAnchorsResult, ApiError> {
        let result: ListAnchorsResult = self
            .api
            .get_json(ANCHORS_PATH, &options.query_pairs(), timeout)
            .await?;

        info!(
            page = result.pagination.page,
            total = result.pagination.total,
            returned = result.anchors.len(),
            "audit_anchors_listed"
        );

        Ok(result)
    }

    /// Fetch one anchor by Merkle root, optionally with its leaf records.
    pub async fn get_anchor(
        &self,
        merkle_root: &str,
        include_records: bool,
        timeout: Option<Duration>,
    ) -> Result<BlockchainAnchor, ApiError> {
        let path = format!("{ANCHORS_PATH}/{merkle_root}");
        let query = if include_records {
            vec![("include_records", "true".to_string())]
        } else {
            Vec::new()
        };

        self.api.get_json(&path, &query, timeout).await
    }

    /// Fetch the inclusion proof for an audit record.
    pub async fn get_proof(
        &self,
        record_id: i64,
        timeout: Option<Duration>,
    ) -> Result<BlockchainProof, ApiError> {
        let path = format!("/api/v1/audit/records/{record_id}/proof");
        self.api.get_json(&path, &[], timeout).await
    }

    /// Ask the audit service to verify `proof`, including on-chain
    /// confirmation.
    ///
    /// The service's answer is authoritative and may disagree with a local
    /// check, for example when the anchoring transaction was never confirmed.
    pub async fn verify(
        &self,
        proof: &BlockchainProof,
        timeout: Option<Duration>,
    ) -> Result<VerificationResult, ApiError> {
        if let Err(reason) = check_blockchain_proof(proof) {
            warn!(
                record_id = proof.record_id,
                reason = %reason,
                "audit_local_proof_check_failed"
            );
        }

        let result: VerificationResult = self
            .api
            .post_json(VERIFY_PATH, &proof.verify_request(), timeout)
            .await?;

        info!(
            record_id = proof.record_id,
            verified = result.verified,
            proof_valid = result.proof_valid,
            blockchain_verified = result.blockchain_verified,
            "audit_remote_verification_complete"
        );

        Ok(result)
    }
}
