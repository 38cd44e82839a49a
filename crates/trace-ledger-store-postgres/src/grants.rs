// crates/trace-ledger-store-postgres/src/grants.rs
// ============================================================================
// Module: Access Grants
// Description: Fine-grained point-to-point capabilities between agents.
// Purpose: Issue, revoke, and evaluate grants with strict expiry semantics.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! `has_access` answers whether any non-expired grant covers the target; a
//! null `resource_id` on the grant covers every resource of its type.
//! Expired grants never grant access, regardless of their other fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use time::OffsetDateTime;
use trace_ledger_core::AccessGrant;
use trace_ledger_core::GrantId;
use trace_ledger_core::MutationAuditEntry;
use trace_ledger_core::NewAccessGrant;
use trace_ledger_core::OrgId;

use crate::audit::insert_audit_tx;
use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for grant selects.
const GRANT_COLUMNS: &str = "id, org_id, grantor_agent_id, grantee_agent_id, resource_type, \
                             resource_id, permission, expires_at, created_at";

/// Maps a grant row to the domain record.
fn row_to_grant(row: &Row) -> AccessGrant {
    AccessGrant {
        id: GrantId::from_uuid(row.get(0)),
        org_id: OrgId::from_uuid(row.get(1)),
        grantor_agent_id: row.get(2),
        grantee_agent_id: row.get(3),
        resource_type: row.get(4),
        resource_id: row.get(5),
        permission: row.get(6),
        expires_at: row.get(7),
        created_at: row.get(8),
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Issues a grant, optionally with an in-transaction audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn create_grant(
        &self,
        org_id: OrgId,
        new: &NewAccessGrant,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<AccessGrant, StoreError> {
        let mut conn = self.conn("create_grant")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("create_grant", &err))?;
        let id = GrantId::generate();
        let now = OffsetDateTime::now_utc();
        tx.execute(
            "INSERT INTO access_grants (id, org_id, grantor_agent_id, grantee_agent_id, \
             resource_type, resource_id, permission, expires_at, created_at) VALUES ($1, $2, \
             $3, $4, $5, $6, $7, $8, $9)",
            &[
                &id.as_uuid(),
                &org_id.as_uuid(),
                &new.grantor_agent_id,
                &new.grantee_agent_id,
                &new.resource_type,
                &new.resource_id,
                &new.permission,
                &new.expires_at,
                &now,
            ],
        )
        .map_err(|err| StoreError::db("create_grant", &err))?;
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("create_grant", &err))?;
        Ok(AccessGrant {
            id,
            org_id,
            grantor_agent_id: new.grantor_agent_id.clone(),
            grantee_agent_id: new.grantee_agent_id.clone(),
            resource_type: new.resource_type.clone(),
            resource_id: new.resource_id.clone(),
            permission: new.permission.clone(),
            expires_at: new.expires_at,
            created_at: now,
        })
    }

    /// Revokes (deletes) a grant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or [`StoreError`] on
    /// driver failure.
    pub fn revoke_grant(
        &self,
        org_id: OrgId,
        grant_id: GrantId,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn("revoke_grant")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("revoke_grant", &err))?;
        let deleted = tx
            .execute(
                "DELETE FROM access_grants WHERE org_id = $1 AND id = $2",
                &[&org_id.as_uuid(), &grant_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("revoke_grant", &err))?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("revoke_grant", &err))?;
        Ok(())
    }

    /// Lists a grantee's grants, newest first. The limit clamps into
    /// `[1, 1000]` with a default of 50.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_grants_for_grantee(
        &self,
        org_id: OrgId,
        grantee_agent_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<AccessGrant>, StoreError> {
        let limit = clamp_limit(limit, 50, 1_000);
        let mut conn = self.conn("list_grants_for_grantee")?;
        let sql = format!(
            "SELECT {GRANT_COLUMNS} FROM access_grants WHERE org_id = $1 AND grantee_agent_id = \
             $2 ORDER BY created_at DESC LIMIT $3"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &grantee_agent_id, &limit])
            .map_err(|err| StoreError::db("list_grants_for_grantee", &err))?;
        Ok(rows.iter().map(row_to_grant).collect())
    }

    /// Returns true iff a non-expired grant covers the target. A grant with
    /// a null `resource_id` matches any resource of its type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn has_access(
        &self,
        org_id: OrgId,
        grantee_agent_id: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        permission: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn("has_access")?;
        let row = conn
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM access_grants WHERE org_id = $1 AND \
                 grantee_agent_id = $2 AND resource_type = $3 AND permission = $4 AND \
                 (resource_id IS NULL OR resource_id = $5) AND (expires_at IS NULL OR \
                 expires_at > now()))",
                &[&org_id.as_uuid(), &grantee_agent_id, &resource_type, &permission, &resource_id],
            )
            .map_err(|err| StoreError::db("has_access", &err))?;
        Ok(row.get(0))
    }
}
