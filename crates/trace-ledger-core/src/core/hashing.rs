// crates/trace-ledger-core/src/core/hashing.rs
// ============================================================================
// Module: Trace Ledger Content Hashing
// Description: Canonical decision hashing and Merkle root construction.
// Purpose: Provide the tamper-evidence primitives behind content hashes and
//          chained integrity proofs.
// Dependencies: sha2, time
// ============================================================================

//! ## Overview
//! A decision's `content_hash` is the lowercase-hex SHA-256 of a canonical,
//! length-prefixed encoding of its identifying fields. The encoding is stable
//! across platforms: every field is rendered to UTF-8 text, prefixed with its
//! byte length as a little-endian `u64`, and concatenated in a fixed order.
//! Integrity proofs aggregate those hashes into a binary Merkle tree whose
//! root is chained to the previous proof row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;
use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::core::identifiers::DecisionId;

// ============================================================================
// SECTION: Canonical Time Form
// ============================================================================

/// Canonical RFC 3339 form with exactly nine subsecond digits, UTC `Z`.
const CANONICAL_TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
);

/// Renders a timestamp in the canonical UTC RFC 3339 nanosecond form.
///
/// Falls back to the unix nanosecond count if formatting fails; the fallback
/// is itself deterministic so hashes remain stable.
#[must_use]
pub fn canonical_timestamp(value: OffsetDateTime) -> String {
    let utc = value.to_offset(UtcOffset::UTC);
    utc.format(CANONICAL_TIME_FORMAT)
        .unwrap_or_else(|_| utc.unix_timestamp_nanos().to_string())
}

// ============================================================================
// SECTION: Content Hash
// ============================================================================

/// Appends one canonical field: little-endian `u64` length, then the bytes.
fn push_field(buf: &mut Vec<u8>, field: &str) {
    let bytes = field.as_bytes();
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Computes the canonical content hash for a decision.
///
/// The hash covers `(id, decision_type, outcome, confidence, reasoning,
/// valid_from)`. A missing `reasoning` hashes as the empty string, which is
/// distinct from no field at all because the length prefix is always present.
#[must_use]
pub fn content_hash(
    id: DecisionId,
    decision_type: &str,
    outcome: &str,
    confidence: f64,
    reasoning: Option<&str>,
    valid_from: OffsetDateTime,
) -> String {
    let mut buf = Vec::with_capacity(
        decision_type.len() + outcome.len() + reasoning.map_or(0, str::len) + 128,
    );
    push_field(&mut buf, &id.to_string());
    push_field(&mut buf, decision_type);
    push_field(&mut buf, outcome);
    push_field(&mut buf, &confidence.to_string());
    push_field(&mut buf, reasoning.unwrap_or(""));
    push_field(&mut buf, &canonical_timestamp(valid_from));
    let digest = Sha256::digest(&buf);
    hex_encode(&digest)
}

// ============================================================================
// SECTION: Merkle Root
// ============================================================================

/// Hashes the concatenation of two node digests.
fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().to_vec()
}

/// Builds the binary Merkle root over a batch of content hashes.
///
/// Leaves are SHA-256 digests of the hex hash strings. At each level pairs
/// are combined left-to-right; an odd trailing node is promoted unchanged.
/// Returns `None` for an empty batch. Callers must pass the hashes already
/// sorted lexicographically so the root is order-independent.
#[must_use]
pub fn merkle_root(sorted_hashes: &[String]) -> Option<String> {
    if sorted_hashes.is_empty() {
        return None;
    }
    let mut level: Vec<Vec<u8>> = sorted_hashes
        .iter()
        .map(|hash| Sha256::digest(hash.as_bytes()).to_vec())
        .collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut nodes = level.chunks_exact(2);
        for pair in nodes.by_ref() {
            next.push(hash_pair(&pair[0], &pair[1]));
        }
        if let [odd] = nodes.remainder() {
            next.push(odd.clone());
        }
        level = next;
    }
    level.first().map(|root| hex_encode(root))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use time::Duration;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::canonical_timestamp;
    use super::content_hash;
    use super::hex_encode;
    use super::merkle_root;
    use crate::core::identifiers::DecisionId;

    /// Fixed decision id used across hash tests.
    fn fixed_id() -> DecisionId {
        DecisionId::from_uuid(Uuid::from_u128(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10))
    }

    #[test]
    fn canonical_timestamp_has_nine_subsecond_digits() {
        let ts = OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_456_789)
            .expect("timestamp");
        let text = canonical_timestamp(ts);
        assert!(text.ends_with("Z"));
        assert_eq!(text, "2023-11-14T22:13:20.123456789Z");
    }

    #[test]
    fn content_hash_is_deterministic() {
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let a = content_hash(fixed_id(), "architecture", "chose Postgres", 0.87, None, ts);
        let b = content_hash(fixed_id(), "architecture", "chose Postgres", 0.87, None, ts);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn content_hash_distinguishes_missing_reasoning_from_adjacent_fields() {
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let none = content_hash(fixed_id(), "t", "o", 0.5, None, ts);
        let empty = content_hash(fixed_id(), "t", "o", 0.5, Some(""), ts);
        let shifted = content_hash(fixed_id(), "t", "o", 0.5, Some("o"), ts);
        assert_eq!(none, empty);
        assert_ne!(none, shifted);
    }

    #[test]
    fn content_hash_changes_with_each_field() {
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let base = content_hash(fixed_id(), "t", "o", 0.5, Some("r"), ts);
        assert_ne!(base, content_hash(fixed_id(), "t2", "o", 0.5, Some("r"), ts));
        assert_ne!(base, content_hash(fixed_id(), "t", "o2", 0.5, Some("r"), ts));
        assert_ne!(base, content_hash(fixed_id(), "t", "o", 0.51, Some("r"), ts));
        assert_ne!(base, content_hash(fixed_id(), "t", "o", 0.5, Some("r2"), ts));
        assert_ne!(
            base,
            content_hash(fixed_id(), "t", "o", 0.5, Some("r"), ts + Duration::nanoseconds(1))
        );
    }

    #[test]
    fn merkle_root_empty_batch_is_none() {
        assert!(merkle_root(&[]).is_none());
    }

    #[test]
    fn merkle_root_single_leaf_is_leaf_digest() {
        use sha2::Digest as _;

        let root = merkle_root(&["abc".to_string()]).expect("root");
        let leaf = hex_encode(&sha2::Sha256::digest(b"abc"));
        assert_eq!(root, leaf);
    }

    #[test]
    fn merkle_root_odd_node_is_promoted() {
        let hashes: Vec<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();
        let root3 = merkle_root(&hashes).expect("root");
        // Root over three leaves differs from the root over the first two.
        let root2 = merkle_root(&hashes[..2]).expect("root");
        assert_ne!(root3, root2);
    }

    #[test]
    fn merkle_root_depends_on_order() {
        let forward: Vec<String> = ["a", "b"].iter().map(ToString::to_string).collect();
        let reverse: Vec<String> = ["b", "a"].iter().map(ToString::to_string).collect();
        assert_ne!(merkle_root(&forward), merkle_root(&reverse));
    }

    #[test]
    fn hex_encode_matches_expected() {
        assert_eq!(hex_encode(&[0x00, 0xff, 0x10]), "00ff10");
    }
}
