// crates/trace-ledger-core/tests/hashing.rs
// ============================================================================
// Module: Hashing Property Tests
// Description: Property-based checks over content hashing and Merkle roots.
// Purpose: Ensure tamper-evidence primitives are deterministic and sensitive.
// ============================================================================

//! Content hash and Merkle root property tests.

use proptest::prelude::any;
use proptest::prelude::prop_assert;
use proptest::prelude::prop_assert_eq;
use proptest::prelude::prop_assert_ne;
use proptest::proptest;
use time::OffsetDateTime;
use trace_ledger_core::DecisionId;
use trace_ledger_core::content_hash;
use trace_ledger_core::merkle_root;
use uuid::Uuid;

/// Builds a timestamp from an arbitrary but in-range unix second count.
fn timestamp(secs: i64) -> OffsetDateTime {
    let clamped = secs.rem_euclid(4_000_000_000);
    OffsetDateTime::from_unix_timestamp(clamped).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

proptest! {
    #[test]
    fn content_hash_is_stable_for_equal_inputs(
        raw_id in any::<u128>(),
        decision_type in ".{0,40}",
        outcome in ".{0,200}",
        confidence in 0.0_f64..=1.0,
        reasoning in proptest::option::of(".{0,200}"),
        secs in any::<i64>(),
    ) {
        let id = DecisionId::from_uuid(Uuid::from_u128(raw_id));
        let ts = timestamp(secs);
        let first = content_hash(id, &decision_type, &outcome, confidence, reasoning.as_deref(), ts);
        let second = content_hash(id, &decision_type, &outcome, confidence, reasoning.as_deref(), ts);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), 64);
    }

    #[test]
    fn content_hash_field_boundaries_do_not_collide(
        raw_id in any::<u128>(),
        prefix in "[a-z]{1,20}",
        suffix in "[a-z]{1,20}",
        secs in any::<i64>(),
    ) {
        // Moving a boundary between decision_type and outcome must change
        // the digest; the length prefixes make the encoding unambiguous.
        let id = DecisionId::from_uuid(Uuid::from_u128(raw_id));
        let ts = timestamp(secs);
        let joined = format!("{prefix}{suffix}");
        let left = content_hash(id, &joined, "", 0.5, None, ts);
        let split = content_hash(id, &prefix, &suffix, 0.5, None, ts);
        prop_assert_ne!(left, split);
    }

    #[test]
    fn merkle_root_is_deterministic_and_non_empty(
        hashes in proptest::collection::vec("[0-9a-f]{64}", 1..32),
    ) {
        let mut sorted = hashes.clone();
        sorted.sort();
        let first = merkle_root(&sorted);
        let second = merkle_root(&sorted);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.is_some());
        prop_assert_eq!(first.unwrap_or_default().len(), 64);
    }
}
