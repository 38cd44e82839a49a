// crates/trace-ledger-core/src/core/identifiers.rs
// ============================================================================
// Module: Trace Ledger Identifiers
// Description: Strongly typed 128-bit identifiers for ledger records.
// Purpose: Prevent cross-record identifier mixups with stable wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Every persisted record is keyed by a UUID. Each record family gets its own
//! newtype so a run identifier can never be passed where a decision
//! identifier is expected. Identifiers serialize as hyphenated lowercase
//! UUID strings on the wire.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares a UUID-backed identifier newtype with the shared impl surface.
macro_rules! uuid_identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a fresh random (v4) identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID value.
            #[must_use]
            pub const fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Returns the raw UUID value.
            #[must_use]
            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

uuid_identifier! {
    /// Tenant (organization) identifier. Every read and write is scoped by it.
    OrgId
}

uuid_identifier! {
    /// Agent run identifier.
    RunId
}

uuid_identifier! {
    /// Agent event identifier.
    EventId
}

uuid_identifier! {
    /// Decision identifier.
    DecisionId
}

uuid_identifier! {
    /// Scored conflict identifier.
    ConflictId
}

uuid_identifier! {
    /// Decision assessment identifier.
    AssessmentId
}

uuid_identifier! {
    /// Internal agent row identifier (distinct from the external `agent_id`
    /// string, which is an org-scoped unique name).
    AgentUid
}

uuid_identifier! {
    /// API key row identifier.
    ApiKeyId
}

uuid_identifier! {
    /// Access grant identifier.
    GrantId
}

uuid_identifier! {
    /// Legal hold identifier.
    HoldId
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::DecisionId;
    use super::OrgId;

    #[test]
    fn identifiers_roundtrip_through_uuid() {
        let id = DecisionId::generate();
        assert_eq!(DecisionId::from_uuid(id.as_uuid()), id);
    }

    #[test]
    fn identifiers_serialize_as_transparent_strings() {
        let id = OrgId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{id}\""));
        let back: OrgId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn identifiers_display_as_hyphenated_lowercase() {
        let id = OrgId::generate();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert!(text.chars().all(|c| c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
