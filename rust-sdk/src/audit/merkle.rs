//! Merkle inclusion proofs for anchored audit records.
//!
//! Interior nodes are `SHA256(min(a, b) || max(a, b))`: the two children are
//! ordered by raw byte value before concatenation, so the combine is
//! commutative and a proof needs no left/right markers. Anchors built by the
//! audit service use the same rule; changing it invalidates every issued
//! proof.

use tracing::{debug, trace};

use super::hash::{decode_hash, encode_hash, sha256, Digest};
use super::types::BlockchainProof;

/// Why a proof was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    #[error("malformed hash in {field}")]
    MalformedHash { field: String },

    #[error("leaf index {leaf_index} out of range for {leaf_count} leaves")]
    LeafIndexOutOfRange { leaf_index: u64, leaf_count: u64 },

    #[error("proof has {actual} siblings, expected {expected}")]
    ProofLength { expected: usize, actual: usize },

    #[error("computed root {computed} does not match merkle root")]
    RootMismatch { computed: String },
}

/// Combine two sibling nodes.
pub fn combine(a: &Digest, b: &Digest) -> Digest {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo);
    buf[32..].copy_from_slice(hi);
    sha256(&buf)
}

/// Number of siblings in a proof for a tree of `leaf_count` leaves.
pub fn tree_height(leaf_count: u64) -> usize {
    if leaf_count <= 1 {
        0
    } else {
        (u64::BITS - (leaf_count - 1).leading_zeros()) as usize
    }
}

/// Verify that `content_hash` is included under `merkle_root`.
///
/// A `false` result does not distinguish malformed input from a genuine
/// non-inclusion; use [`check_proof`] for the reason.
pub fn verify_proof_locally<S: AsRef<str>>(
    content_hash: &str,
    proof: &[S],
    leaf_index: u64,
    merkle_root: &str,
) -> bool {
    check_proof(content_hash, proof, leaf_index, merkle_root).is_ok()
}

/// Recompute the root from `content_hash` and `proof` and compare it with
/// `merkle_root`.
pub fn check_proof<S: AsRef<str>>(
    content_hash: &str,
    proof: &[S],
    leaf_index: u64,
    merkle_root: &str,
) -> Result<(), ProofError> {
    let mut current = decode_hash(content_hash).ok_or_else(|| ProofError::MalformedHash {
        field: "content_hash".to_string(),
    })?;
    let expected = decode_hash(merkle_root).ok_or_else(|| ProofError::MalformedHash {
        field: "merkle_root".to_string(),
    })?;

    // The index is walked for tracing only; the sorted combine ignores it.
    let mut idx = leaf_index;
    for (level, sibling) in proof.iter().enumerate() {
        let sibling = decode_hash(sibling.as_ref()).ok_or_else(|| ProofError::MalformedHash {
            field: format!("proof[{level}]"),
        })?;
        current = combine(&current, &sibling);
        trace!(level = level, index = idx, "merkle_level_combined");
        idx /= 2;
    }

    if current != expected {
        let computed = encode_hash(&current);
        debug!(computed = %computed, merkle_root = %merkle_root, "merkle_root_mismatch");
        return Err(ProofError::RootMismatch { computed });
    }

    Ok(())
}

/// Check that `leaf_index` lies inside a tree of `leaf_count` leaves and
/// that a path of `proof_len` siblings matches the tree height.
pub fn check_structure(leaf_index: u64, leaf_count: u64, proof_len: usize) -> Result<(), ProofError> {
    if leaf_index >= leaf_count {
        return Err(ProofError::LeafIndexOutOfRange {
            leaf_index,
            leaf_count,
        });
    }

    let expected = tree_height(leaf_count);
    if proof_len != expected {
        return Err(ProofError::ProofLength {
            expected,
            actual: proof_len,
        });
    }

    Ok(())
}

/// Check a proof fetched from the audit service, structure included.
pub fn check_blockchain_proof(proof: &BlockchainProof) -> Result<(), ProofError> {
    check_structure(proof.leaf_index, proof.leaf_count, proof.proof.len())?;
    check_proof(
        &proof.content_hash,
        &proof.proof,
        proof.leaf_index,
        &proof.merkle_root,
    )
}

/// Root of a tree over `leaves`. An odd node at the end of a level is
/// paired with itself. Returns `None` for an empty slice.
pub fn compute_root(leaves: &[Digest]) -> Option<Digest> {
    let mut level = leaves.to_vec();
    if level.is_empty() {
        return None;
    }
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.first().copied()
}

/// Inclusion path for `leaves[index]`, leaf to root, built with the same
/// rules as [`compute_root`].
pub fn build_proof(leaves: &[Digest], index: usize) -> Option<Vec<Digest>> {
    if index >= leaves.len() {
        return None;
    }

    let mut path = Vec::with_capacity(tree_height(leaves.len() as u64));
    let mut level = leaves.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        let sibling = if idx % 2 == 0 {
            level.get(idx + 1).unwrap_or(&level[idx])
        } else {
            &level[idx - 1]
        };
        path.push(*sibling);
        level = next_level(&level);
        idx /= 2;
    }

    Some(path)
}

fn next_level(level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [a, b] => combine(a, b),
            [a] => combine(a, a),
            _ => unreachable!("chunks(2) yields one or two nodes"),
        })
        .collect()
}
