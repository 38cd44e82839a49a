// crates/trace-ledger-core/src/core/keys.rs
// ============================================================================
// Module: API Key Material
// Description: Minting, parsing, hashing, and verification of API keys.
// Purpose: Keep raw credentials out of storage while supporting O(1) lookup
//          and constant-time verification.
// Dependencies: rand, sha2, subtle
// ============================================================================

//! ## Overview
//! API keys have the wire form `ak_<8-hex-prefix>_<32-hex-secret>`. Only the
//! prefix and the SHA-256 hash of the full raw key persist; the raw key is
//! returned exactly once, on creation or rotation. Authentication looks up
//! `(agent_id, prefix)` then compares hashes in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::core::hashing::hex_encode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Key prefix marker on the wire.
const KEY_MARKER: &str = "ak";
/// Hex length of the lookup prefix.
const PREFIX_HEX_LEN: usize = 8;
/// Hex length of the secret portion.
const SECRET_HEX_LEN: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Raised when a presented key does not match the documented wire form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiKeyFormatError {
    /// The key did not have the `ak_<prefix>_<secret>` shape.
    #[error("api key has malformed structure")]
    Malformed,
}

// ============================================================================
// SECTION: Minting
// ============================================================================

/// Freshly minted key material.
///
/// # Invariants
/// - `raw` is shown to the caller exactly once; only `prefix` and `hash`
///   persist.
#[derive(Debug, Clone)]
pub struct ApiKeyMaterial {
    /// Full raw key in wire form.
    pub raw: String,
    /// Lookup prefix (8 lowercase hex chars).
    pub prefix: String,
    /// Lowercase-hex SHA-256 of the full raw key.
    pub hash: String,
}

/// Mints a new API key from OS randomness.
#[must_use]
pub fn mint_api_key() -> ApiKeyMaterial {
    let mut prefix_bytes = [0_u8; PREFIX_HEX_LEN / 2];
    let mut secret_bytes = [0_u8; SECRET_HEX_LEN / 2];
    OsRng.fill_bytes(&mut prefix_bytes);
    OsRng.fill_bytes(&mut secret_bytes);
    let prefix = hex_encode(&prefix_bytes);
    let secret = hex_encode(&secret_bytes);
    let raw = format!("{KEY_MARKER}_{prefix}_{secret}");
    let hash = hash_api_key(&raw);
    ApiKeyMaterial { raw, prefix, hash }
}

// ============================================================================
// SECTION: Parsing and Verification
// ============================================================================

/// Extracts the lookup prefix from a presented raw key.
///
/// # Errors
///
/// Returns [`ApiKeyFormatError::Malformed`] when the key does not match
/// `ak_<8-hex>_<32-hex>`.
pub fn parse_api_key_prefix(raw: &str) -> Result<&str, ApiKeyFormatError> {
    let mut parts = raw.split('_');
    let (Some(marker), Some(prefix), Some(secret), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ApiKeyFormatError::Malformed);
    };
    let lower_hex = |s: &str| s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
    if marker != KEY_MARKER
        || prefix.len() != PREFIX_HEX_LEN
        || secret.len() != SECRET_HEX_LEN
        || !lower_hex(prefix)
        || !lower_hex(secret)
    {
        return Err(ApiKeyFormatError::Malformed);
    }
    Ok(prefix)
}

/// Hashes a raw key for persistence.
#[must_use]
pub fn hash_api_key(raw: &str) -> String {
    hex_encode(&Sha256::digest(raw.as_bytes()))
}

/// Verifies a presented raw key against a stored hash in constant time.
#[must_use]
pub fn verify_api_key(raw: &str, stored_hash: &str) -> bool {
    let presented = hash_api_key(raw);
    presented.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ApiKeyFormatError;
    use super::mint_api_key;
    use super::parse_api_key_prefix;
    use super::verify_api_key;

    #[test]
    fn minted_keys_have_documented_shape() {
        let material = mint_api_key();
        assert!(material.raw.starts_with("ak_"));
        assert_eq!(parse_api_key_prefix(&material.raw), Ok(material.prefix.as_str()));
        assert_eq!(material.hash.len(), 64);
    }

    #[test]
    fn minted_keys_are_unique() {
        let a = mint_api_key();
        let b = mint_api_key();
        assert_ne!(a.raw, b.raw);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        for raw in [
            "",
            "ak",
            "ak_short_00112233445566778899aabbccddeeff",
            "ak_0011aabb_tooshort",
            "ak_0011AABB_00112233445566778899aabbccddeeff",
            "bk_0011aabb_00112233445566778899aabbccddeeff",
            "ak_0011aabb_00112233445566778899aabbccddeeff_extra",
        ] {
            assert_eq!(
                parse_api_key_prefix(raw),
                Err(ApiKeyFormatError::Malformed),
                "expected rejection for {raw}"
            );
        }
    }

    #[test]
    fn verify_matches_only_the_minted_key() {
        let material = mint_api_key();
        assert!(verify_api_key(&material.raw, &material.hash));
        assert!(!verify_api_key("ak_00000000_00000000000000000000000000000000", &material.hash));
    }
}
