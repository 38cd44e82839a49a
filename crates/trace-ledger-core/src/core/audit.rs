// crates/trace-ledger-core/src/core/audit.rs
// ============================================================================
// Module: Mutation Audit
// Description: Append-only audit entry attached to every mutation.
// Purpose: Model the audit record the store persists in-transaction.
// Dependencies: serde, serde_json, uuid
// ============================================================================

//! ## Overview
//! No mutation may commit without its audit row: the store inserts the entry
//! inside the same transaction, and an audit insert failure rolls the whole
//! mutation back. Entries are write-only; nothing in the core ever updates
//! or deletes them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Record
// ============================================================================

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationAuditEntry {
    /// Request correlation identifier.
    pub request_id: Uuid,
    /// Owning organization.
    pub org_id: OrgId,
    /// External identifier of the acting agent.
    pub actor: String,
    /// HTTP method of the originating request.
    pub method: String,
    /// Endpoint of the originating request.
    pub endpoint: String,
    /// Store operation name (for example `decision_revised`).
    pub operation: String,
    /// Mutated resource type.
    pub resource_type: String,
    /// Mutated resource identifier, when known.
    pub resource_id: Option<String>,
    /// State before the mutation, when captured.
    pub before: Option<Value>,
    /// State after the mutation, when captured.
    pub after: Option<Value>,
    /// Free-form metadata (always a JSON object).
    pub metadata: Value,
}

impl MutationAuditEntry {
    /// Creates an entry with a fresh request id and empty envelopes.
    #[must_use]
    pub fn new(
        org_id: OrgId,
        actor: impl Into<String>,
        operation: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            org_id,
            actor: actor.into(),
            method: String::new(),
            endpoint: String::new(),
            operation: operation.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            before: None,
            after: None,
            metadata: Value::Null,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::MutationAuditEntry;
    use crate::core::identifiers::OrgId;

    #[test]
    fn new_entries_have_fresh_request_ids() {
        let org = OrgId::generate();
        let a = MutationAuditEntry::new(org, "planner", "run_created", "agent_run");
        let b = MutationAuditEntry::new(org, "planner", "run_created", "agent_run");
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.operation, "run_created");
        assert!(a.before.is_none());
    }
}
