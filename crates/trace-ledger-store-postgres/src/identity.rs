// crates/trace-ledger-store-postgres/src/identity.rs
// ============================================================================
// Module: Agent Identity Store
// Description: Agent records and rotating API-key credentials.
// Purpose: Register agents, patch their profiles, and manage credentials
//          with O(1) lookup and constant-time verification.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! An agent's external `agent_id` is unique per org; authentication resolves
//! it globally across orgs, then narrows to one key via the `(agent,
//! prefix)` index and compares hashes in constant time. Rotation revokes the
//! old key, mints and inserts the new one, and records the audit entry in a
//! single transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use time::OffsetDateTime;
use trace_ledger_core::Agent;
use trace_ledger_core::AgentPatch;
use trace_ledger_core::AgentUid;
use trace_ledger_core::ApiKey;
use trace_ledger_core::ApiKeyId;
use trace_ledger_core::MutationAuditEntry;
use trace_ledger_core::NewAgent;
use trace_ledger_core::OrgId;
use trace_ledger_core::mint_api_key;
use trace_ledger_core::normalized_metadata;
use trace_ledger_core::parse_api_key_prefix;
use trace_ledger_core::verify_api_key;

use crate::audit::insert_audit_tx;
use crate::error::StoreError;
use crate::store::TraceStore;
use crate::store::clamp_limit;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for agent selects.
const AGENT_COLUMNS: &str =
    "id, org_id, agent_id, name, metadata, tags, last_seen_at, created_at, updated_at";

/// Maps an agent row to the domain record.
fn row_to_agent(row: &Row) -> Agent {
    Agent {
        id: AgentUid::from_uuid(row.get(0)),
        org_id: OrgId::from_uuid(row.get(1)),
        agent_id: row.get(2),
        name: row.get(3),
        metadata: row.get(4),
        tags: row.get(5),
        last_seen_at: row.get(6),
        created_at: row.get(7),
        updated_at: row.get(8),
    }
}

/// Column list for API key selects.
const API_KEY_COLUMNS: &str =
    "id, org_id, agent_uid, prefix, key_hash, created_at, expires_at, revoked_at, last_used_at";

/// Maps an API key row to the domain record.
fn row_to_api_key(row: &Row) -> ApiKey {
    ApiKey {
        id: ApiKeyId::from_uuid(row.get(0)),
        org_id: OrgId::from_uuid(row.get(1)),
        agent_uid: AgentUid::from_uuid(row.get(2)),
        prefix: row.get(3),
        key_hash: row.get(4),
        created_at: row.get(5),
        expires_at: row.get(6),
        revoked_at: row.get(7),
        last_used_at: row.get(8),
    }
}

// ============================================================================
// SECTION: Agents
// ============================================================================

impl TraceStore {
    /// Registers an agent, optionally with an in-transaction audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure (including the unique
    /// violation for a duplicate `agent_id` within the org).
    pub fn create_agent(
        &self,
        org_id: OrgId,
        new: &NewAgent,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<Agent, StoreError> {
        let mut conn = self.conn("create_agent")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("create_agent", &err))?;
        let id = AgentUid::generate();
        let now = OffsetDateTime::now_utc();
        let metadata = normalized_metadata(&new.metadata);
        tx.execute(
            "INSERT INTO agents (id, org_id, agent_id, name, metadata, tags, created_at, \
             updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &id.as_uuid(),
                &org_id.as_uuid(),
                &new.agent_id,
                &new.name,
                &metadata,
                &new.tags,
                &now,
                &now,
            ],
        )
        .map_err(|err| StoreError::db("create_agent", &err))?;
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("create_agent", &err))?;
        Ok(Agent {
            id,
            org_id,
            agent_id: new.agent_id.clone(),
            name: new.name.clone(),
            metadata,
            tags: new.tags.clone(),
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetches one agent by its external identifier, scoped by org.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or [`StoreError`] on
    /// driver failure.
    pub fn get_agent(&self, org_id: OrgId, agent_id: &str) -> Result<Agent, StoreError> {
        let mut conn = self.conn("get_agent")?;
        let sql =
            format!("SELECT {AGENT_COLUMNS} FROM agents WHERE org_id = $1 AND agent_id = $2");
        let row = conn
            .query_opt(sql.as_str(), &[&org_id.as_uuid(), &agent_id])
            .map_err(|err| StoreError::db("get_agent", &err))?
            .ok_or(StoreError::NotFound)?;
        Ok(row_to_agent(&row))
    }

    /// Resolves an external identifier across all orgs; the authentication
    /// path uses this before key verification narrows to one org.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn find_agents_globally(&self, agent_id: &str) -> Result<Vec<Agent>, StoreError> {
        let mut conn = self.conn("find_agents_globally")?;
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = $1 ORDER BY created_at ASC"
        );
        let rows = conn
            .query(sql.as_str(), &[&agent_id])
            .map_err(|err| StoreError::db("find_agents_globally", &err))?;
        Ok(rows.iter().map(row_to_agent).collect())
    }

    /// Lists an org's agents alphabetically by external identifier. The
    /// limit clamps into `[1, 1000]` with a default of 50.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_agents(
        &self,
        org_id: OrgId,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Agent>, StoreError> {
        let limit = clamp_limit(limit, 50, 1_000);
        let mut conn = self.conn("list_agents")?;
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE org_id = $1 ORDER BY agent_id ASC LIMIT \
             $2 OFFSET $3"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &limit, &offset.max(0)])
            .map_err(|err| StoreError::db("list_agents", &err))?;
        Ok(rows.iter().map(row_to_agent).collect())
    }

    /// Patches an agent's name and metadata with COALESCE semantics: absent
    /// fields keep their stored values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or [`StoreError`] on
    /// driver failure.
    pub fn patch_agent(
        &self,
        org_id: OrgId,
        agent_id: &str,
        patch: &AgentPatch,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<Agent, StoreError> {
        let mut conn = self.conn("patch_agent")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("patch_agent", &err))?;
        let sql = format!(
            "UPDATE agents SET name = COALESCE($3, name), metadata = COALESCE($4, metadata), \
             updated_at = now() WHERE org_id = $1 AND agent_id = $2 RETURNING {AGENT_COLUMNS}"
        );
        let row = tx
            .query_opt(
                sql.as_str(),
                &[&org_id.as_uuid(), &agent_id, &patch.name, &patch.metadata],
            )
            .map_err(|err| StoreError::db("patch_agent", &err))?
            .ok_or(StoreError::NotFound)?;
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("patch_agent", &err))?;
        Ok(row_to_agent(&row))
    }

    /// Replaces an agent's tags wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent, or [`StoreError`] on
    /// driver failure.
    pub fn replace_agent_tags(
        &self,
        org_id: OrgId,
        agent_id: &str,
        tags: &[String],
        audit: Option<&MutationAuditEntry>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn("replace_agent_tags")?;
        let mut tx =
            conn.transaction().map_err(|err| StoreError::db("replace_agent_tags", &err))?;
        let updated = tx
            .execute(
                "UPDATE agents SET tags = $3, updated_at = now() WHERE org_id = $1 AND agent_id \
                 = $2",
                &[&org_id.as_uuid(), &agent_id, &tags.to_vec()],
            )
            .map_err(|err| StoreError::db("replace_agent_tags", &err))?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("replace_agent_tags", &err))?;
        Ok(())
    }

    /// Touches an agent's `last_seen_at`. Missing agents are ignored; the
    /// touch rides on hot paths that must not fail requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn touch_agent_last_seen(&self, org_id: OrgId, agent_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn("touch_agent_last_seen")?;
        conn.execute(
            "UPDATE agents SET last_seen_at = now() WHERE org_id = $1 AND agent_id = $2",
            &[&org_id.as_uuid(), &agent_id],
        )
        .map_err(|err| StoreError::db("touch_agent_last_seen", &err))?;
        Ok(())
    }

    /// Lists agents carrying a tag (GIN-indexed containment).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_agents_by_tag(
        &self,
        org_id: OrgId,
        tag: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Agent>, StoreError> {
        let limit = clamp_limit(limit, 50, 1_000);
        let mut conn = self.conn("list_agents_by_tag")?;
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE org_id = $1 AND tags @> ARRAY[$2] ORDER \
             BY agent_id ASC LIMIT $3"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &tag, &limit])
            .map_err(|err| StoreError::db("list_agents_by_tag", &err))?;
        Ok(rows.iter().map(row_to_agent).collect())
    }
}

// ============================================================================
// SECTION: API Keys
// ============================================================================

impl TraceStore {
    /// Issues a fresh API key for an agent. The raw key is returned exactly
    /// once; only its prefix and hash persist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn create_api_key(
        &self,
        org_id: OrgId,
        agent_uid: AgentUid,
        expires_at: Option<OffsetDateTime>,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<(ApiKey, String), StoreError> {
        let mut conn = self.conn("create_api_key")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("create_api_key", &err))?;
        let issued = insert_key_tx(&mut tx, org_id, agent_uid, expires_at)?;
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("create_api_key", &err))?;
        Ok(issued)
    }

    /// Rotates an agent's key atomically: the old key is revoked, the new
    /// one inserted, and the audit entry recorded in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the old key is absent or
    /// already revoked, or [`StoreError`] on driver failure.
    pub fn rotate_api_key(
        &self,
        org_id: OrgId,
        agent_uid: AgentUid,
        old_key_id: ApiKeyId,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<(ApiKey, String), StoreError> {
        let mut conn = self.conn("rotate_api_key")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("rotate_api_key", &err))?;
        let revoked = tx
            .execute(
                "UPDATE api_keys SET revoked_at = now() WHERE org_id = $1 AND agent_uid = $2 \
                 AND id = $3 AND revoked_at IS NULL",
                &[&org_id.as_uuid(), &agent_uid.as_uuid(), &old_key_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("rotate_api_key", &err))?;
        if revoked == 0 {
            return Err(StoreError::NotFound);
        }
        let issued = insert_key_tx(&mut tx, org_id, agent_uid, None)?;
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("rotate_api_key", &err))?;
        Ok(issued)
    }

    /// Revokes one key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the key is absent or already
    /// revoked, or [`StoreError`] on driver failure.
    pub fn revoke_api_key(
        &self,
        org_id: OrgId,
        key_id: ApiKeyId,
        audit: Option<&MutationAuditEntry>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn("revoke_api_key")?;
        let mut tx = conn.transaction().map_err(|err| StoreError::db("revoke_api_key", &err))?;
        let revoked = tx
            .execute(
                "UPDATE api_keys SET revoked_at = now() WHERE org_id = $1 AND id = $2 AND \
                 revoked_at IS NULL",
                &[&org_id.as_uuid(), &key_id.as_uuid()],
            )
            .map_err(|err| StoreError::db("revoke_api_key", &err))?;
        if revoked == 0 {
            return Err(StoreError::NotFound);
        }
        if let Some(entry) = audit {
            insert_audit_tx(&mut tx, entry)?;
        }
        tx.commit().map_err(|err| StoreError::db("revoke_api_key", &err))?;
        Ok(())
    }

    /// Lists an agent's keys, newest first. Hashes are included; raw keys
    /// are never recoverable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on driver failure.
    pub fn list_api_keys(
        &self,
        org_id: OrgId,
        agent_uid: AgentUid,
    ) -> Result<Vec<ApiKey>, StoreError> {
        let mut conn = self.conn("list_api_keys")?;
        let sql = format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE org_id = $1 AND agent_uid = $2 ORDER \
             BY created_at DESC"
        );
        let rows = conn
            .query(sql.as_str(), &[&org_id.as_uuid(), &agent_uid.as_uuid()])
            .map_err(|err| StoreError::db("list_api_keys", &err))?;
        Ok(rows.iter().map(row_to_api_key).collect())
    }

    /// Authenticates a presented raw key for an external agent identifier.
    ///
    /// The lookup is O(1) on `(agent, prefix)`; the hash comparison is
    /// constant-time. On success `last_used_at` is touched and the agent
    /// plus key are returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown agent, unknown
    /// prefix, inactive key, or hash mismatch (indistinguishable by
    /// design), [`StoreError::Invalid`] for a malformed key, or
    /// [`StoreError`] on driver failure.
    pub fn authenticate_api_key(
        &self,
        agent_id: &str,
        raw_key: &str,
    ) -> Result<(Agent, ApiKey), StoreError> {
        let prefix = parse_api_key_prefix(raw_key)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let mut conn = self.conn("authenticate_api_key")?;
        let sql = "SELECT k.id, k.org_id, k.agent_uid, k.prefix, k.key_hash, k.created_at, \
                   k.expires_at, k.revoked_at, k.last_used_at FROM api_keys k JOIN agents a ON \
                   a.id = k.agent_uid AND a.org_id = k.org_id WHERE a.agent_id = $1 AND \
                   k.prefix = $2 AND k.revoked_at IS NULL AND (k.expires_at IS NULL OR \
                   k.expires_at > now())";
        let row = conn
            .query_opt(sql, &[&agent_id, &prefix])
            .map_err(|err| StoreError::db("authenticate_api_key", &err))?
            .ok_or(StoreError::NotFound)?;
        let key = row_to_api_key(&row);
        if !verify_api_key(raw_key, &key.key_hash) {
            return Err(StoreError::NotFound);
        }
        conn.execute(
            "UPDATE api_keys SET last_used_at = now() WHERE id = $1",
            &[&key.id.as_uuid()],
        )
        .map_err(|err| StoreError::db("authenticate_api_key", &err))?;
        let agent_sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1");
        let agent_row = conn
            .query_opt(agent_sql.as_str(), &[&key.agent_uid.as_uuid()])
            .map_err(|err| StoreError::db("authenticate_api_key", &err))?
            .ok_or(StoreError::NotFound)?;
        Ok((row_to_agent(&agent_row), key))
    }
}

/// Mints and inserts a key inside an open transaction, returning the
/// persisted record and the raw key.
fn insert_key_tx(
    tx: &mut postgres::Transaction<'_>,
    org_id: OrgId,
    agent_uid: AgentUid,
    expires_at: Option<OffsetDateTime>,
) -> Result<(ApiKey, String), StoreError> {
    let material = mint_api_key();
    let id = ApiKeyId::generate();
    let now = OffsetDateTime::now_utc();
    tx.execute(
        "INSERT INTO api_keys (id, org_id, agent_uid, prefix, key_hash, created_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
        &[
            &id.as_uuid(),
            &org_id.as_uuid(),
            &agent_uid.as_uuid(),
            &material.prefix,
            &material.hash,
            &now,
            &expires_at,
        ],
    )
    .map_err(|err| StoreError::db("create_api_key", &err))?;
    Ok((
        ApiKey {
            id,
            org_id,
            agent_uid,
            prefix: material.prefix,
            key_hash: material.hash,
            created_at: now,
            expires_at,
            revoked_at: None,
            last_used_at: None,
        },
        material.raw,
    ))
}
