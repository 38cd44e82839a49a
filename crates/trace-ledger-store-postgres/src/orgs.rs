// crates/trace-ledger-store-postgres/src/orgs.rs
// ============================================================================
// Module: Organization Store
// Description: Tenant rows and retention configuration.
// Purpose: Create organizations and manage the retention settings the purge
//          engine reads.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Organization rows anchor tenancy and carry the retention configuration:
//! `retention_days` (null keeps forever) and `retention_exclude_types`. The
//! retention engine lists orgs with a configured window and runs per org.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use time::OffsetDateTime;
use trace_ledger_core::NewOrganization;
use trace_ledger_core::OrgId;
use trace_ledger_core::Organization;

use crate::error::StoreError;
use crate::store::TraceStore;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for organization selects.
const ORG_COLUMNS: &str = "id, name, retention_days, retention_exclude_types, created_at";

/// Maps an organization row to the domain record.
fn row_to_org(row: &Row) -> Organization {
    Organization {
        id: OrgId::from_uuid(row.get(0)),
        name: row.get(1),
        retention_days: row.get(2),
        retention_exclude_types: row.get(3),
        created_at: row.get(4),
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl TraceStore {
    /// Creates an organization.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn create_organization(&self, new: &NewOrganization) -> Result<Organization, StoreError> {
        let mut conn = self.conn("create_organization")?;
        let id = OrgId::generate();
        let now = OffsetDateTime::now_utc();
        conn.execute(
            "INSERT INTO organizations (id, name, retention_days, retention_exclude_types, \
             created_at) VALUES ($1, $2, $3, $4, $5)",
            &[
                &id.as_uuid(),
                &new.name,
                &new.retention_days,
                &new.retention_exclude_types,
                &now,
            ],
        )
        .map_err(|err| StoreError::db("create_organization", &err))?;
        Ok(Organization {
            id,
            name: new.name.clone(),
            retention_days: new.retention_days,
            retention_exclude_types: new.retention_exclude_types.clone(),
            created_at: now,
        })
    }

    /// Fetches one organization.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or [`StoreError`] on
    /// driver failure.
    pub fn get_organization(&self, org_id: OrgId) -> Result<Organization, StoreError> {
        let mut conn = self.conn("get_organization")?;
        let sql = format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = $1");
        let row = conn
            .query_opt(sql.as_str(), &[&org_id.as_uuid()])
            .map_err(|err| StoreError::db("get_organization", &err))?
            .ok_or(StoreError::NotFound)?;
        Ok(row_to_org(&row))
    }

    /// Updates an organization's retention policy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or [`StoreError`] on
    /// driver failure.
    pub fn update_retention_policy(
        &self,
        org_id: OrgId,
        retention_days: Option<i32>,
        retention_exclude_types: &[String],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn("update_retention_policy")?;
        let updated = conn
            .execute(
                "UPDATE organizations SET retention_days = $2, retention_exclude_types = $3 \
                 WHERE id = $1",
                &[&org_id.as_uuid(), &retention_days, &retention_exclude_types.to_vec()],
            )
            .map_err(|err| StoreError::db("update_retention_policy", &err))?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Lists organizations with a configured retention window, the
    /// retention engine's work list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_orgs_with_retention(&self) -> Result<Vec<Organization>, StoreError> {
        let mut conn = self.conn("list_orgs_with_retention")?;
        let sql = format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE retention_days IS NOT NULL ORDER BY \
             created_at ASC"
        );
        let rows = conn
            .query(sql.as_str(), &[])
            .map_err(|err| StoreError::db("list_orgs_with_retention", &err))?;
        Ok(rows.iter().map(row_to_org).collect())
    }
}
