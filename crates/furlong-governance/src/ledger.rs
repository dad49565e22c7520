// crates/furlong-governance/src/ledger.rs
// ============================================================================
// Module: Governance Ledger
// Description: Immutable audit log of accept, reject, and rollback actions.
// Purpose: Every governance decision leaves exactly one permanent record.
// Dependencies: crate::{store, types}, furlong-core, serde_json
// ============================================================================

//! ## Overview
//! Each accept, reject, or rollback writes exactly one ledger entry with
//! the actor, rationale, doctrine snapshot, and the finalized-episode count
//! at decision time. Entries are append-only; nothing here updates or
//! deletes a row. Entry ids derive from the proposal, action, and instant,
//! so identical replays converge instead of duplicating.

// ============================================================================
// SECTION: Imports
// ============================================================================

use furlong_core::ProposalId;
use furlong_core::Timestamp;
use furlong_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use furlong_core::core::hashing::hash_bytes;
use serde_json::Value;
use serde_json::json;

use crate::store::GovernanceError;
use crate::store::GovernanceStore;
use crate::types::LedgerAction;
use crate::types::LedgerEntry;
use crate::types::SemVer;

// ============================================================================
// SECTION: Identifier Derivation
// ============================================================================

/// Derives the stable ledger entry id.
fn ledger_id(proposal_id: &ProposalId, action: LedgerAction, timestamp: Timestamp) -> String {
    let raw = format!(
        "{}|{}|{}",
        proposal_id.as_str(),
        action.as_str(),
        timestamp.as_unix_millis()
    );
    format!("led_{}", hash_bytes(DEFAULT_HASH_ALGORITHM, raw.as_bytes()).short())
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Writes one governance action to the ledger.
///
/// The entry captures the finalized-episode count at decision time so the
/// audit trail records how much evidence backed each decision.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
#[allow(
    clippy::too_many_arguments,
    reason = "A ledger entry records every dimension of the decision."
)]
pub fn write_entry(
    store: &dyn GovernanceStore,
    proposal_id: &ProposalId,
    action: LedgerAction,
    actor: &str,
    rationale: &str,
    doctrine_version: SemVer,
    metadata: Option<Value>,
    now: Timestamp,
) -> Result<LedgerEntry, GovernanceError> {
    let entry = LedgerEntry {
        id: ledger_id(proposal_id, action, now),
        proposal_id: proposal_id.clone(),
        action,
        actor: actor.to_string(),
        timestamp: now,
        rationale: rationale.to_string(),
        doctrine_version_snapshot: doctrine_version,
        episode_count_at_decision: store.count_finalized_episodes()?,
        metadata: metadata.unwrap_or_else(|| json!({})),
    };
    store.append_ledger(&entry)?;
    Ok(entry)
}

/// Computes the acceptance rate: accepts over accepts plus rejects.
///
/// Returns zero before any review has happened.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
pub fn acceptance_rate(store: &dyn GovernanceStore) -> Result<f64, GovernanceError> {
    let accepted = store.count_ledger_by_action(LedgerAction::Accept)?;
    let rejected = store.count_ledger_by_action(LedgerAction::Reject)?;
    let total = accepted + rejected;
    if total == 0 {
        return Ok(0.0);
    }
    #[allow(
        clippy::cast_precision_loss,
        reason = "Ledger counts stay far below the f64 integer range."
    )]
    Ok(accepted as f64 / total as f64)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use furlong_core::ProposalId;
    use furlong_core::Timestamp;

    use super::acceptance_rate;
    use super::write_entry;
    use crate::store::GovernanceStore;
    use crate::store::MemoryGovernanceStore;
    use crate::types::LedgerAction;
    use crate::types::SemVer;

    fn now() -> Timestamp {
        Timestamp::from_unix_millis(1_700_000_000_000)
    }

    #[test]
    fn each_action_writes_exactly_one_entry() {
        let store = MemoryGovernanceStore::new();
        let proposal = ProposalId::new("prop_abc");
        write_entry(
            &store,
            &proposal,
            LedgerAction::Accept,
            "reviewer",
            "sound finding",
            SemVer::new(13, 1, 0),
            None,
            now(),
        )
        .expect("write");
        assert_eq!(store.recent_ledger(10).expect("recent").len(), 1);
        assert_eq!(store.ledger_for_proposal(&proposal).expect("for proposal").len(), 1);
    }

    #[test]
    fn identical_replays_converge_on_one_entry() {
        let store = MemoryGovernanceStore::new();
        let proposal = ProposalId::new("prop_abc");
        write_entry(
            &store,
            &proposal,
            LedgerAction::Accept,
            "reviewer",
            "sound finding",
            SemVer::new(13, 1, 0),
            None,
            now(),
        )
        .expect("first");
        // The same action at the same instant derives the same id and is
        // rejected as a duplicate append.
        let err = write_entry(
            &store,
            &proposal,
            LedgerAction::Accept,
            "reviewer",
            "sound finding",
            SemVer::new(13, 1, 0),
            None,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, crate::store::GovernanceError::Conflict(_)));
        assert_eq!(store.recent_ledger(10).expect("recent").len(), 1);
    }

    #[test]
    fn acceptance_rate_covers_accepts_and_rejects() {
        let store = MemoryGovernanceStore::new();
        assert!((acceptance_rate(&store).expect("empty") - 0.0).abs() < f64::EPSILON);
        write_entry(
            &store,
            &ProposalId::new("prop_a"),
            LedgerAction::Accept,
            "reviewer",
            "ok",
            SemVer::new(13, 1, 0),
            None,
            now(),
        )
        .expect("accept");
        write_entry(
            &store,
            &ProposalId::new("prop_b"),
            LedgerAction::Reject,
            "reviewer",
            "weak",
            SemVer::new(13, 1, 0),
            None,
            now().plus_minutes(1),
        )
        .expect("reject");
        write_entry(
            &store,
            &ProposalId::new("prop_a"),
            LedgerAction::Rollback,
            "reviewer",
            "regression",
            SemVer::new(13, 0, 0),
            None,
            now().plus_minutes(2),
        )
        .expect("rollback");
        // Rollbacks do not count toward the acceptance rate.
        assert!((acceptance_rate(&store).expect("rate") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn entries_capture_finalized_episode_count() {
        let store = MemoryGovernanceStore::new();
        let entry = write_entry(
            &store,
            &ProposalId::new("prop_a"),
            LedgerAction::Reject,
            "reviewer",
            "weak",
            SemVer::new(13, 0, 0),
            None,
            now(),
        )
        .expect("write");
        assert_eq!(entry.episode_count_at_decision, 0);
    }
}
