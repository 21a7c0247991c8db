//! Blockchain audit verification.
//!
//! Audit records are batched by the Kiket audit service into Merkle trees
//! whose roots are anchored on chain. This module:
//! - computes the canonical content hash of a record
//! - verifies inclusion proofs locally
//! - talks to the audit service for anchors, proofs and on-chain checks
//!
//! ## Verification Flow
//!
//! ```text
//! record → compute_content_hash() ─┐
//!                                  ├→ verify_proof_locally() → bool
//! get_proof() → BlockchainProof ───┘
//!                     └→ AuditClient::verify() → VerificationResult
//! ```

pub mod client;
pub mod hash;
pub mod merkle;
pub mod types;

pub use client::AuditClient;
pub use hash::{compute_content_hash, decode_hash, encode_hash, Digest};
pub use merkle::{
    build_proof, check_blockchain_proof, check_proof, check_structure, combine, compute_root,
    tree_height, verify_proof_locally, ProofError,
};
pub use types::{
    AnchorRecord, BlockchainAnchor, BlockchainProof, ListAnchorsOptions, ListAnchorsResult,
    PaginationInfo, VerificationResult, VerifyRequest,
};

/// Check `proof` without contacting the audit service.
///
/// `blockchain_verified` is always `false`: on-chain confirmation needs
/// [`AuditClient::verify`].
pub fn verify_locally(proof: &BlockchainProof) -> VerificationResult {
    let outcome = check_blockchain_proof(proof);

    VerificationResult {
        verified: false,
        proof_valid: outcome.is_ok(),
        blockchain_verified: false,
        content_hash: proof.content_hash.clone(),
        merkle_root: proof.merkle_root.clone(),
        leaf_index: proof.leaf_index,
        block_number: proof.block_number,
        block_timestamp: proof.block_timestamp.clone(),
        network: Some(proof.network.clone()),
        explorer_url: proof.verification_url.clone(),
        error: outcome.err().map(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof_for(leaves: &[Digest], index: usize) -> BlockchainProof {
        BlockchainProof {
            record_id: 10,
            record_type: "AuditLog".to_string(),
            content_hash: encode_hash(&leaves[index]),
            anchor_id: 3,
            merkle_root: encode_hash(&compute_root(leaves).unwrap()),
            leaf_index: index as u64,
            leaf_count: leaves.len() as u64,
            proof: build_proof(leaves, index)
                .unwrap()
                .iter()
                .map(encode_hash)
                .collect(),
            network: "polygon_amoy".to_string(),
            tx_hash: None,
            block_number: Some(7),
            block_timestamp: None,
            verified: false,
            verification_url: None,
        }
    }

    #[test]
    fn test_verify_locally_valid() {
        let leaves: Vec<Digest> = (0u8..5).map(|n| hash::sha256(&[n])).collect();
        let result = verify_locally(&proof_for(&leaves, 4));

        assert!(result.proof_valid);
        assert!(!result.verified);
        assert!(!result.blockchain_verified);
        assert_eq!(result.leaf_index, 4);
        assert_eq!(result.network.as_deref(), Some("polygon_amoy"));
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_verify_locally_reports_reason() {
        let leaves: Vec<Digest> = (0u8..4).map(|n| hash::sha256(&[n])).collect();
        let mut proof = proof_for(&leaves, 1);
        proof.content_hash = encode_hash(&hash::sha256(b"tampered"));

        let result = verify_locally(&proof);
        assert!(!result.proof_valid);
        assert!(result
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("computed root")));
    }

    #[test]
    fn test_record_hash_proves_inclusion() {
        let records = [
            serde_json::json!({"id": 1, "action": "issue.created", "actor": "ana"}),
            serde_json::json!({"id": 2, "action": "issue.closed", "actor": "ben"}),
            serde_json::json!({"id": 3, "action": "issue.reopened", "actor": "cy"}),
        ];
        let leaves: Vec<Digest> = records
            .iter()
            .map(|r| decode_hash(&compute_content_hash(r.as_object().unwrap())).unwrap())
            .collect();
        let root = encode_hash(&compute_root(&leaves).unwrap());
        let path: Vec<String> = build_proof(&leaves, 1)
            .unwrap()
            .iter()
            .map(encode_hash)
            .collect();

        let hash = compute_content_hash(records[1].as_object().unwrap());
        assert!(verify_proof_locally(&hash, &path, 1, &root));
    }
}
