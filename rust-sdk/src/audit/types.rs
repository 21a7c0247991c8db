//! Audit service message types.
//!
//! Anchors and proofs are produced by the audit service; this crate only
//! reads them. Field names match the service's JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default page requested when listing anchors.
pub const DEFAULT_PAGE: u32 = 1;

/// Default page size when listing anchors.
pub const DEFAULT_PER_PAGE: u32 = 25;

// =============================================================================
// Anchors
// =============================================================================

/// A batch of audit records whose Merkle root was committed on chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockchainAnchor {
    pub id: i64,
    pub merkle_root: String,
    pub leaf_count: u64,
    #[serde(default)]
    pub first_record_at: Option<String>,
    #[serde(default)]
    pub last_record_at: Option<String>,
    pub network: String,
    /// Lifecycle status as reported by the service (`pending`, `confirmed`, `failed`, ...)
    pub status: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<i64>,
    #[serde(default)]
    pub block_timestamp: Option<String>,
    #[serde(default)]
    pub confirmed_at: Option<String>,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<AnchorRecord>>,
}

impl BlockchainAnchor {
    /// The leaf committed at `leaf_index`, when records were included.
    pub fn record_at(&self, leaf_index: u64) -> Option<&AnchorRecord> {
        self.records
            .as_ref()?
            .iter()
            .find(|r| r.leaf_index == leaf_index)
    }
}

/// One leaf of an anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub record_type: String,
    pub leaf_index: u64,
    pub content_hash: String,
}

/// Filters for listing anchors.
#[derive(Debug, Clone, Default)]
pub struct ListAnchorsOptions {
    pub status: Option<String>,
    pub network: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Page number; `None` or zero means [`DEFAULT_PAGE`].
    pub page: Option<u32>,
    /// Page size; `None` or zero means [`DEFAULT_PER_PAGE`].
    pub per_page: Option<u32>,
}

impl ListAnchorsOptions {
    /// Query parameters with defaults applied.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let page = self.page.filter(|&p| p > 0).unwrap_or(DEFAULT_PAGE);
        let per_page = self.per_page.filter(|&p| p > 0).unwrap_or(DEFAULT_PER_PAGE);

        let mut pairs = vec![("page", page.to_string()), ("per_page", per_page.to_string())];

        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("status", status.to_string()));
        }
        if let Some(network) = self.network.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("network", network.to_string()));
        }
        if let Some(from) = self.from {
            pairs.push(("from", from.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
        }
        if let Some(to) = self.to {
            pairs.push(("to", to.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
        }

        pairs
    }
}

/// One page of anchors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListAnchorsResult {
    pub anchors: Vec<BlockchainAnchor>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

// =============================================================================
// Proofs
// =============================================================================

/// Inclusion proof for a single audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockchainProof {
    pub record_id: i64,
    #[serde(default)]
    pub record_type: String,
    pub content_hash: String,
    pub anchor_id: i64,
    pub merkle_root: String,
    pub leaf_index: u64,
    pub leaf_count: u64,
    /// Sibling hashes from leaf to root.
    pub proof: Vec<String>,
    pub network: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<i64>,
    #[serde(default)]
    pub block_timestamp: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verification_url: Option<String>,
}

impl BlockchainProof {
    /// Request body for remote verification of this proof.
    pub fn verify_request(&self) -> VerifyRequest {
        VerifyRequest {
            content_hash: self.content_hash.clone(),
            merkle_root: self.merkle_root.clone(),
            proof: self.proof.clone(),
            leaf_index: self.leaf_index,
            tx_hash: self.tx_hash.clone(),
        }
    }
}

/// Body of `POST /api/v1/audit/verify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub content_hash: String,
    pub merkle_root: String,
    pub proof: Vec<String>,
    pub leaf_index: u64,
    /// Serialized as `null` when absent.
    pub tx_hash: Option<String>,
}

/// Outcome of local or remote proof verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub proof_valid: bool,
    pub blockchain_verified: bool,
    pub content_hash: String,
    pub merkle_root: String,
    pub leaf_index: u64,
    #[serde(default)]
    pub block_number: Option<i64>,
    #[serde(default)]
    pub block_timestamp: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
