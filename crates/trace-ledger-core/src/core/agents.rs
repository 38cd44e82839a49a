// crates/trace-ledger-core/src/core/agents.rs
// ============================================================================
// Module: Agents, API Keys, and Grants
// Description: Identity records, rotating credentials, and access grants.
// Purpose: Model the identity surface the storage layer persists.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! An agent's external `agent_id` is unique within its organization; the
//! row itself is keyed by an internal UUID. Credentials rotate: only the key
//! prefix and hash persist, and the raw key is surfaced exactly once. Grants
//! are point-to-point capabilities with optional expiry; an expired grant
//! never grants access.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::core::identifiers::AgentUid;
use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::GrantId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Role hierarchy used by hosts for authorization decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access.
    Reader,
    /// A recording agent.
    Agent,
    /// Organization administrator.
    Admin,
    /// Organization owner.
    OrgOwner,
    /// Platform operator.
    PlatformAdmin,
}

impl Role {
    /// Returns the rank used for comparisons; higher ranks dominate.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Reader => 1,
            Self::Agent => 2,
            Self::Admin => 3,
            Self::OrgOwner => 4,
            Self::PlatformAdmin => 100,
        }
    }

    /// Parses a persisted label; unknown labels rank zero via `None`.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "reader" => Some(Self::Reader),
            "agent" => Some(Self::Agent),
            "admin" => Some(Self::Admin),
            "org_owner" => Some(Self::OrgOwner),
            "platform_admin" => Some(Self::PlatformAdmin),
            _ => None,
        }
    }

    /// Returns the rank of a label, zero when unknown.
    #[must_use]
    pub fn rank_of(label: &str) -> u8 {
        Self::parse(label).map_or(0, Self::rank)
    }

    /// Returns true when this role meets or exceeds `required`.
    #[must_use]
    pub const fn at_least(self, required: Self) -> bool {
        self.rank() >= required.rank()
    }
}

// ============================================================================
// SECTION: Agents
// ============================================================================

/// A persisted agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Internal row identifier.
    pub id: AgentUid,
    /// Owning organization.
    pub org_id: OrgId,
    /// External identifier, unique within the organization.
    pub agent_id: String,
    /// Display name.
    pub name: Option<String>,
    /// Free-form metadata (always a JSON object).
    pub metadata: Value,
    /// Searchable tags.
    pub tags: Vec<String>,
    /// Last activity timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen_at: Option<OffsetDateTime>,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Parameters for registering an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgent {
    /// External identifier, unique within the organization.
    pub agent_id: String,
    /// Display name.
    pub name: Option<String>,
    /// Free-form metadata.
    pub metadata: Value,
    /// Initial tags.
    pub tags: Vec<String>,
}

impl NewAgent {
    /// Creates minimal registration parameters.
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: None,
            metadata: Value::Null,
            tags: Vec::new(),
        }
    }
}

/// Partial update applied with COALESCE semantics: `None` keeps the stored
/// value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentPatch {
    /// New display name, when present.
    pub name: Option<String>,
    /// New metadata object, when present.
    pub metadata: Option<Value>,
}

// ============================================================================
// SECTION: API Keys
// ============================================================================

/// A persisted API key (hash only; the raw key never persists).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Key row identifier.
    pub id: ApiKeyId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Internal identifier of the owning agent.
    pub agent_uid: AgentUid,
    /// Lookup prefix (8 lowercase hex chars).
    pub prefix: String,
    /// Lowercase-hex SHA-256 of the full raw key.
    pub key_hash: String,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Optional expiry.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    /// Revocation time; a revoked key never authenticates.
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    /// Last successful authentication.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
}

impl ApiKey {
    /// Returns true when the key can still authenticate at `now`.
    #[must_use]
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

// ============================================================================
// SECTION: Access Grants
// ============================================================================

/// A persisted access grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Grant identifier.
    pub id: GrantId,
    /// Owning organization.
    pub org_id: OrgId,
    /// External identifier of the granting agent.
    pub grantor_agent_id: String,
    /// External identifier of the receiving agent.
    pub grantee_agent_id: String,
    /// Granted resource type (for example `decision`).
    pub resource_type: String,
    /// Specific resource, or null to cover every resource of the type.
    pub resource_id: Option<String>,
    /// Granted permission (for example `read`).
    pub permission: String,
    /// Optional expiry; an expired grant never matches.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Parameters for issuing a grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccessGrant {
    /// External identifier of the granting agent.
    pub grantor_agent_id: String,
    /// External identifier of the receiving agent.
    pub grantee_agent_id: String,
    /// Granted resource type.
    pub resource_type: String,
    /// Specific resource, or null to cover every resource of the type.
    pub resource_id: Option<String>,
    /// Granted permission.
    pub permission: String,
    /// Optional expiry.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use time::Duration;
    use time::OffsetDateTime;

    use super::Role;

    #[test]
    fn role_ranks_are_ordered() {
        assert!(Role::Reader.rank() < Role::Agent.rank());
        assert!(Role::Agent.rank() < Role::Admin.rank());
        assert!(Role::Admin.rank() < Role::OrgOwner.rank());
        assert!(Role::OrgOwner.rank() < Role::PlatformAdmin.rank());
        assert_eq!(Role::PlatformAdmin.rank(), 100);
    }

    #[test]
    fn unknown_roles_rank_zero() {
        assert_eq!(Role::rank_of("superuser"), 0);
        assert_eq!(Role::rank_of("org_owner"), 4);
    }

    #[test]
    fn at_least_respects_hierarchy() {
        assert!(Role::Admin.at_least(Role::Reader));
        assert!(!Role::Reader.at_least(Role::Agent));
        assert!(Role::PlatformAdmin.at_least(Role::OrgOwner));
    }

    #[test]
    fn api_key_activity_window() {
        use crate::core::identifiers::AgentUid;
        use crate::core::identifiers::ApiKeyId;
        use crate::core::identifiers::OrgId;

        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let key = super::ApiKey {
            id: ApiKeyId::generate(),
            org_id: OrgId::generate(),
            agent_uid: AgentUid::generate(),
            prefix: "00112233".to_string(),
            key_hash: "0".repeat(64),
            created_at: now,
            expires_at: Some(now + Duration::hours(1)),
            revoked_at: None,
            last_used_at: None,
        };
        assert!(key.is_active(now));
        assert!(!key.is_active(now + Duration::hours(2)));
        let revoked = super::ApiKey {
            revoked_at: Some(now),
            ..key
        };
        assert!(!revoked.is_active(now));
    }
}
