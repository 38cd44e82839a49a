// crates/trace-ledger-core/src/lib.rs
// ============================================================================
// Module: Trace Ledger Core
// Description: Domain model and primitives for the trace-and-decision ledger.
// Purpose: Define the records, identifiers, hashing, and validation shared by
//          every storage backend and host surface.
// ============================================================================

//! ## Overview
//! `trace-ledger-core` holds the backend-agnostic vocabulary of the ledger:
//! runs, events, bi-temporal decisions and their children, scored conflicts,
//! assessments, identity records, and the tamper-evidence primitives
//! (canonical content hashing and Merkle roots). Storage crates consume these
//! types; this crate never talks to a database.

pub mod core;

pub use crate::core::agents::AccessGrant;
pub use crate::core::agents::Agent;
pub use crate::core::agents::AgentPatch;
pub use crate::core::agents::ApiKey;
pub use crate::core::agents::NewAccessGrant;
pub use crate::core::agents::NewAgent;
pub use crate::core::agents::Role;
pub use crate::core::assessments::AssessmentOutcome;
pub use crate::core::assessments::AssessmentSummary;
pub use crate::core::assessments::DecisionAssessment;
pub use crate::core::assessments::NewAssessment;
pub use crate::core::audit::MutationAuditEntry;
pub use crate::core::children::Alternative;
pub use crate::core::children::DecisionClaim;
pub use crate::core::children::Evidence;
pub use crate::core::children::EvidenceSourceType;
pub use crate::core::children::NewAlternative;
pub use crate::core::children::NewDecisionClaim;
pub use crate::core::children::NewEvidence;
pub use crate::core::conflicts::ConflictFilter;
pub use crate::core::conflicts::ConflictKind;
pub use crate::core::conflicts::ConflictResolution;
pub use crate::core::conflicts::ConflictSide;
pub use crate::core::conflicts::ConflictStatus;
pub use crate::core::conflicts::NewScoredConflict;
pub use crate::core::conflicts::ScoredConflict;
pub use crate::core::decisions::ConflictFate;
pub use crate::core::decisions::Decision;
pub use crate::core::decisions::DecisionFilter;
pub use crate::core::decisions::DecisionInclude;
pub use crate::core::decisions::DecisionOrder;
pub use crate::core::decisions::DecisionRevision;
pub use crate::core::decisions::NewDecision;
pub use crate::core::decisions::OrderDirection;
pub use crate::core::decisions::OutcomeSignals;
pub use crate::core::decisions::TimeRange;
pub use crate::core::events::AgentEvent;
pub use crate::core::events::EventType;
pub use crate::core::events::NewAgentEvent;
pub use crate::core::hashing::canonical_timestamp;
pub use crate::core::hashing::content_hash;
pub use crate::core::hashing::hex_encode;
pub use crate::core::hashing::merkle_root;
pub use crate::core::identifiers::AgentUid;
pub use crate::core::identifiers::ApiKeyId;
pub use crate::core::identifiers::AssessmentId;
pub use crate::core::identifiers::ConflictId;
pub use crate::core::identifiers::DecisionId;
pub use crate::core::identifiers::EventId;
pub use crate::core::identifiers::GrantId;
pub use crate::core::identifiers::HoldId;
pub use crate::core::identifiers::OrgId;
pub use crate::core::identifiers::RunId;
pub use crate::core::idempotency::IdempotencyLookup;
pub use crate::core::idempotency::IdempotencyStatus;
pub use crate::core::keys::ApiKeyFormatError;
pub use crate::core::keys::ApiKeyMaterial;
pub use crate::core::keys::hash_api_key;
pub use crate::core::keys::mint_api_key;
pub use crate::core::keys::parse_api_key_prefix;
pub use crate::core::keys::verify_api_key;
pub use crate::core::orgs::NewOrganization;
pub use crate::core::orgs::Organization;
pub use crate::core::outbox::OutboxOperation;
pub use crate::core::outbox::SearchOutboxRow;
pub use crate::core::proofs::IntegrityProof;
pub use crate::core::retention::DeletionLogEntry;
pub use crate::core::retention::LegalHold;
pub use crate::core::retention::NewLegalHold;
pub use crate::core::retention::RetentionOutcome;
pub use crate::core::runs::AgentRun;
pub use crate::core::runs::NewRun;
pub use crate::core::runs::RunStatus;
pub use crate::core::runs::normalized_metadata;
pub use crate::core::validate::DECISION_TYPE_MAX_BYTES;
pub use crate::core::validate::OUTCOME_MAX_BYTES;
pub use crate::core::validate::REASONING_MAX_BYTES;
pub use crate::core::validate::ValidationError;
pub use crate::core::validate::validate_agent_id;
pub use crate::core::validate::validate_decision_fields;
pub use crate::core::validate::validate_source_uri;
pub use crate::core::validate::validate_tag;
