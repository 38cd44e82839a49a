// crates/trace-ledger-core/src/core/orgs.rs
// ============================================================================
// Module: Organizations
// Description: Tenant records and their retention configuration.
// Purpose: Model the organization row every other record hangs off.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! An organization exclusively owns everything it contains; no code path
//! reads across tenants. Retention configuration lives on the org row:
//! `retention_days` of null means keep forever, and
//! `retention_exclude_types` exempts whole decision types from purging.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Records
// ============================================================================

/// A persisted organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization identifier.
    pub id: OrgId,
    /// Display name.
    pub name: String,
    /// Age-based purge window in days; null keeps records forever.
    pub retention_days: Option<i32>,
    /// Decision types exempt from purging.
    pub retention_exclude_types: Vec<String>,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Parameters for creating an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrganization {
    /// Display name.
    pub name: String,
    /// Initial retention window in days, if any.
    pub retention_days: Option<i32>,
    /// Initial exempted decision types.
    pub retention_exclude_types: Vec<String>,
}

impl NewOrganization {
    /// Creates an organization that keeps records forever.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retention_days: None,
            retention_exclude_types: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::NewOrganization;

    #[test]
    fn default_retention_keeps_forever() {
        let org = NewOrganization::new("acme");
        assert!(org.retention_days.is_none());
        assert!(org.retention_exclude_types.is_empty());
    }
}
