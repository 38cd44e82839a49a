// crates/trace-ledger-core/src/core/validate.rs
// ============================================================================
// Module: Input Validators
// Description: Field-level validation consumed at the storage boundary.
// Purpose: Fail closed on malformed identifiers, tags, URIs, and oversized
//          decision fields before anything reaches a statement.
// Dependencies: thiserror, url
// ============================================================================

//! ## Overview
//! Hosts run these validators before handing requests to the store. They are
//! strict allow-lists: anything outside the documented grammar is rejected.
//! Source URIs additionally refuse private, loopback, and link-local targets
//! so evidence links can never point back into the deployment network.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

use thiserror::Error;
use url::Host;
use url::Url;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum `agent_id` length in bytes.
pub const AGENT_ID_MAX_BYTES: usize = 255;
/// Maximum tag length in bytes.
pub const TAG_MAX_BYTES: usize = 64;
/// Maximum `decision_type` length in bytes.
pub const DECISION_TYPE_MAX_BYTES: usize = 200;
/// Maximum `outcome` length in bytes.
pub const OUTCOME_MAX_BYTES: usize = 32_768;
/// Maximum `reasoning` length in bytes.
pub const REASONING_MAX_BYTES: usize = 65_536;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation failures surfaced to hosts as invalid-input errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling and audit labeling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The field was empty after trimming.
    #[error("{0} must not be empty")]
    Empty(&'static str),
    /// The field exceeded its byte budget.
    #[error("{field} exceeds {limit} bytes")]
    TooLong {
        /// Field name for the error envelope.
        field: &'static str,
        /// Maximum byte budget for the field.
        limit: usize,
    },
    /// The field contained characters outside its grammar.
    #[error("{0} contains disallowed characters")]
    DisallowedCharacters(&'static str),
    /// The URI failed to parse or used a rejected scheme.
    #[error("source uri is not a valid http(s) url")]
    MalformedUri,
    /// The URI carried embedded credentials.
    #[error("source uri must not embed credentials")]
    UriCredentials,
    /// The URI host was missing or resolves into a private range.
    #[error("source uri host is missing or not publicly routable")]
    UriHostRejected,
}

// ============================================================================
// SECTION: Agent Identifier
// ============================================================================

/// Validates an external agent identifier.
///
/// Grammar: non-empty, at most 255 bytes, ASCII from the set
/// `[A-Za-z0-9._@-]`.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violated rule.
pub fn validate_agent_id(agent_id: &str) -> Result<(), ValidationError> {
    if agent_id.is_empty() {
        return Err(ValidationError::Empty("agent_id"));
    }
    if agent_id.len() > AGENT_ID_MAX_BYTES {
        return Err(ValidationError::TooLong {
            field: "agent_id",
            limit: AGENT_ID_MAX_BYTES,
        });
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-');
    if !agent_id.chars().all(allowed) {
        return Err(ValidationError::DisallowedCharacters("agent_id"));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tags
// ============================================================================

/// Validates an agent tag.
///
/// Grammar: 1..=64 bytes, lowercase letter first, then lowercase letters,
/// digits, `_`, or `-`.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violated rule.
pub fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    if tag.is_empty() {
        return Err(ValidationError::Empty("tag"));
    }
    if tag.len() > TAG_MAX_BYTES {
        return Err(ValidationError::TooLong {
            field: "tag",
            limit: TAG_MAX_BYTES,
        });
    }
    let mut chars = tag.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let tail_ok =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'));
    if !head_ok || !tail_ok {
        return Err(ValidationError::DisallowedCharacters("tag"));
    }
    Ok(())
}

// ============================================================================
// SECTION: Source URI
// ============================================================================

/// Returns true when the IPv4 address must not be a source target.
fn ipv4_rejected(addr: Ipv4Addr) -> bool {
    addr.is_private() || addr.is_loopback() || addr.is_link_local() || addr.is_unspecified()
}

/// Returns true when the IPv6 address must not be a source target.
fn ipv6_rejected(addr: Ipv6Addr) -> bool {
    let segments = addr.segments();
    let unique_local = (segments[0] & 0xfe00) == 0xfc00;
    let link_local = (segments[0] & 0xffc0) == 0xfe80;
    addr.is_loopback() || addr.is_unspecified() || unique_local || link_local
}

/// Validates an evidence source URI.
///
/// Only `http` and `https` schemes are accepted; a host is required; embedded
/// credentials are refused; `localhost`, RFC 1918 ranges, loopback,
/// link-local, and IPv6 unique-local / link-local hosts are rejected.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violated rule.
pub fn validate_source_uri(uri: &str) -> Result<(), ValidationError> {
    let parsed = Url::parse(uri).map_err(|_| ValidationError::MalformedUri)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::MalformedUri);
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(ValidationError::UriCredentials);
    }
    match parsed.host() {
        None => Err(ValidationError::UriHostRejected),
        Some(Host::Domain(domain)) => {
            let lowered = domain.trim_end_matches('.').to_ascii_lowercase();
            if lowered == "localhost" || lowered.ends_with(".localhost") {
                return Err(ValidationError::UriHostRejected);
            }
            Ok(())
        }
        Some(Host::Ipv4(addr)) => {
            if ipv4_rejected(addr) {
                return Err(ValidationError::UriHostRejected);
            }
            Ok(())
        }
        Some(Host::Ipv6(addr)) => {
            if ipv6_rejected(addr) {
                return Err(ValidationError::UriHostRejected);
            }
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Decision Field Limits
// ============================================================================

/// Validates the size-limited decision fields.
///
/// # Errors
///
/// Returns [`ValidationError::TooLong`] naming the offending field, or
/// [`ValidationError::Empty`] when `decision_type` or `outcome` is blank.
pub fn validate_decision_fields(
    decision_type: &str,
    outcome: &str,
    reasoning: Option<&str>,
) -> Result<(), ValidationError> {
    if decision_type.trim().is_empty() {
        return Err(ValidationError::Empty("decision_type"));
    }
    if decision_type.len() > DECISION_TYPE_MAX_BYTES {
        return Err(ValidationError::TooLong {
            field: "decision_type",
            limit: DECISION_TYPE_MAX_BYTES,
        });
    }
    if outcome.trim().is_empty() {
        return Err(ValidationError::Empty("outcome"));
    }
    if outcome.len() > OUTCOME_MAX_BYTES {
        return Err(ValidationError::TooLong {
            field: "outcome",
            limit: OUTCOME_MAX_BYTES,
        });
    }
    if let Some(reasoning) = reasoning
        && reasoning.len() > REASONING_MAX_BYTES
    {
        return Err(ValidationError::TooLong {
            field: "reasoning",
            limit: REASONING_MAX_BYTES,
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ValidationError;
    use super::validate_agent_id;
    use super::validate_decision_fields;
    use super::validate_source_uri;
    use super::validate_tag;

    #[test]
    fn agent_id_accepts_documented_grammar() {
        assert!(validate_agent_id("planner-01").is_ok());
        assert!(validate_agent_id("svc@org.example_2").is_ok());
    }

    #[test]
    fn agent_id_rejects_empty_whitespace_and_controls() {
        assert_eq!(validate_agent_id(""), Err(ValidationError::Empty("agent_id")));
        assert!(validate_agent_id("has space").is_err());
        assert!(validate_agent_id("tab\there").is_err());
        assert!(validate_agent_id("null\u{0}byte").is_err());
    }

    #[test]
    fn agent_id_rejects_oversize() {
        let long = "a".repeat(256);
        assert!(matches!(
            validate_agent_id(&long),
            Err(ValidationError::TooLong { field: "agent_id", .. })
        ));
    }

    #[test]
    fn tag_grammar_is_enforced() {
        assert!(validate_tag("prod").is_ok());
        assert!(validate_tag("team-a_2").is_ok());
        assert!(validate_tag("Prod").is_err());
        assert!(validate_tag("2fast").is_err());
        assert!(validate_tag("").is_err());
        assert!(validate_tag(&"t".repeat(65)).is_err());
    }

    #[test]
    fn source_uri_accepts_public_https() {
        assert!(validate_source_uri("https://docs.example.com/rfc-17").is_ok());
        assert!(validate_source_uri("http://example.org").is_ok());
    }

    #[test]
    fn source_uri_rejects_schemes_and_credentials() {
        assert_eq!(validate_source_uri("ftp://example.com"), Err(ValidationError::MalformedUri));
        assert_eq!(validate_source_uri("not a url"), Err(ValidationError::MalformedUri));
        assert_eq!(
            validate_source_uri("https://user:pw@example.com"),
            Err(ValidationError::UriCredentials)
        );
    }

    #[test]
    fn source_uri_rejects_internal_hosts() {
        for uri in [
            "https://localhost/x",
            "https://api.localhost/x",
            "https://127.0.0.1/x",
            "https://10.0.0.8/x",
            "https://172.16.4.2/x",
            "https://192.168.1.1/x",
            "https://169.254.1.1/x",
            "https://[::1]/x",
            "https://[fc00::1]/x",
            "https://[fe80::1]/x",
        ] {
            assert_eq!(
                validate_source_uri(uri),
                Err(ValidationError::UriHostRejected),
                "expected rejection for {uri}"
            );
        }
    }

    #[test]
    fn decision_field_limits_are_enforced() {
        assert!(validate_decision_fields("architecture", "chose Postgres", None).is_ok());
        assert!(validate_decision_fields("", "o", None).is_err());
        assert!(validate_decision_fields("t", " ", None).is_err());
        assert!(validate_decision_fields(&"t".repeat(201), "o", None).is_err());
        assert!(validate_decision_fields("t", &"o".repeat(32_769), None).is_err());
        assert!(validate_decision_fields("t", "o", Some(&"r".repeat(65_537))).is_err());
    }
}
