// crates/furlong-governance/src/review.rs
// ============================================================================
// Module: Governance Review Facade
// Description: Proposal review operations over the governance store.
// Purpose: List, inspect, accept, reject, and roll back with full audit.
// Dependencies: crate::{doctrine, ledger, store, types}, furlong-core
// ============================================================================

//! ## Overview
//! The review facade is the only path through which proposal state changes:
//! accept bumps doctrine (MINOR by default) and writes an ACCEPT ledger
//! entry; reject mirrors accept without a bump; rollback reverts an
//! accepted proposal. Wrong-state transitions are rejected with state-name
//! errors and write no ledger entry. No automatic doctrine application
//! happens anywhere in this layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use furlong_core::EpisodeId;
use furlong_core::ProposalId;
use furlong_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::doctrine::active_version;
use crate::doctrine::bump_version;
use crate::doctrine::rollback_to_version;
use crate::ledger::acceptance_rate;
use crate::ledger::write_entry;
use crate::store::GovernanceError;
use crate::store::GovernanceStore;
use crate::store::StatusUpdate;
use crate::types::ChangeType;
use crate::types::CriticType;
use crate::types::DoctrineVersion;
use crate::types::GovernanceStats;
use crate::types::LedgerAction;
use crate::types::LedgerEntry;
use crate::types::Proposal;
use crate::types::ProposalStatus;
use crate::types::SemVer;

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Proposal enriched with its dedup neighborhood and audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedProposal {
    /// The proposal row.
    #[serde(flatten)]
    pub proposal: Proposal,
    /// Every episode sharing the fingerprint.
    pub similar_episodes: Vec<EpisodeId>,
    /// Ledger history for the proposal, newest first.
    pub ledger_history: Vec<LedgerEntry>,
}

/// Outcome of an accept operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptOutcome {
    /// Doctrine version now active.
    pub doctrine_version: SemVer,
    /// Doctrine version before the accept.
    pub previous_version: SemVer,
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Lists proposals with optional status and critic filters.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
pub fn list_proposals(
    store: &dyn GovernanceStore,
    status: Option<ProposalStatus>,
    critic_type: Option<CriticType>,
    limit: usize,
    offset: usize,
) -> Result<Vec<Proposal>, GovernanceError> {
    store.list_proposals(status, critic_type, limit, offset)
}

/// Loads a proposal enriched with similar episodes and ledger history.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure; `Ok(None)` when the
/// proposal does not exist.
pub fn get_proposal(
    store: &dyn GovernanceStore,
    id: &ProposalId,
) -> Result<Option<EnrichedProposal>, GovernanceError> {
    let Some(proposal) = store.get_proposal(id)? else {
        return Ok(None);
    };
    let similar_episodes = store.episodes_for_proposal(id)?;
    let ledger_history = store.ledger_for_proposal(id)?;
    Ok(Some(EnrichedProposal {
        proposal,
        similar_episodes,
        ledger_history,
    }))
}

// ============================================================================
// SECTION: Transitions
// ============================================================================

/// Accepts a PENDING proposal: bumps doctrine, updates the row, writes the
/// ledger entry.
///
/// # Errors
///
/// Returns [`GovernanceError::NotFound`] for an unknown proposal and
/// [`GovernanceError::InvalidState`] when it is not PENDING; neither writes
/// a ledger entry.
pub fn accept_proposal(
    store: &dyn GovernanceStore,
    id: &ProposalId,
    reviewer_id: &str,
    rationale: &str,
    metadata: Option<Value>,
    now: Timestamp,
) -> Result<AcceptOutcome, GovernanceError> {
    let proposal = store
        .get_proposal(id)?
        .ok_or_else(|| GovernanceError::NotFound(format!("proposal {id}")))?;
    if proposal.status != ProposalStatus::Pending {
        return Err(GovernanceError::InvalidState {
            proposal_id: id.clone(),
            current: proposal.status.as_str().to_string(),
            expected: ProposalStatus::Pending.as_str().to_string(),
        });
    }

    let previous_version = active_version(store, now)?;
    let new_version = bump_version(
        store,
        ChangeType::Minor,
        &format!("Accepted proposal {id}: {}", proposal.finding_type),
        reviewer_id,
        None,
        now,
    )?;

    store.update_proposal_status(id, ProposalStatus::Pending, &StatusUpdate {
        status: ProposalStatus::Accepted,
        reviewed_at: Some(now),
        reviewer_id: Some(reviewer_id.to_string()),
        review_rationale: Some(rationale.to_string()),
        doctrine_version_before: Some(previous_version),
        doctrine_version_after: Some(new_version),
    })?;

    write_entry(
        store,
        id,
        LedgerAction::Accept,
        reviewer_id,
        rationale,
        new_version,
        metadata,
        now,
    )?;

    Ok(AcceptOutcome {
        doctrine_version: new_version,
        previous_version,
    })
}

/// Rejects a PENDING proposal without a doctrine bump.
///
/// # Errors
///
/// Returns [`GovernanceError::NotFound`] for an unknown proposal and
/// [`GovernanceError::InvalidState`] when it is not PENDING.
pub fn reject_proposal(
    store: &dyn GovernanceStore,
    id: &ProposalId,
    reviewer_id: &str,
    rationale: &str,
    metadata: Option<Value>,
    now: Timestamp,
) -> Result<(), GovernanceError> {
    let proposal = store
        .get_proposal(id)?
        .ok_or_else(|| GovernanceError::NotFound(format!("proposal {id}")))?;
    if proposal.status != ProposalStatus::Pending {
        return Err(GovernanceError::InvalidState {
            proposal_id: id.clone(),
            current: proposal.status.as_str().to_string(),
            expected: ProposalStatus::Pending.as_str().to_string(),
        });
    }

    let current_version = active_version(store, now)?;
    store.update_proposal_status(id, ProposalStatus::Pending, &StatusUpdate {
        status: ProposalStatus::Rejected,
        reviewed_at: Some(now),
        reviewer_id: Some(reviewer_id.to_string()),
        review_rationale: Some(rationale.to_string()),
        doctrine_version_before: None,
        doctrine_version_after: None,
    })?;

    write_entry(
        store,
        id,
        LedgerAction::Reject,
        reviewer_id,
        rationale,
        current_version,
        metadata,
        now,
    )?;
    Ok(())
}

/// Rolls back an ACCEPTED proposal and reactivates its prior doctrine.
///
/// # Errors
///
/// Returns [`GovernanceError::NotFound`] for an unknown proposal and
/// [`GovernanceError::InvalidState`] when it is not ACCEPTED.
pub fn rollback_proposal(
    store: &dyn GovernanceStore,
    id: &ProposalId,
    reviewer_id: &str,
    rationale: &str,
    metadata: Option<Value>,
    now: Timestamp,
) -> Result<(), GovernanceError> {
    let proposal = store
        .get_proposal(id)?
        .ok_or_else(|| GovernanceError::NotFound(format!("proposal {id}")))?;
    if proposal.status != ProposalStatus::Accepted {
        return Err(GovernanceError::InvalidState {
            proposal_id: id.clone(),
            current: proposal.status.as_str().to_string(),
            expected: ProposalStatus::Accepted.as_str().to_string(),
        });
    }

    store.update_proposal_status(id, ProposalStatus::Accepted, &StatusUpdate {
        status: ProposalStatus::RolledBack,
        reviewed_at: Some(now),
        reviewer_id: Some(reviewer_id.to_string()),
        review_rationale: Some(rationale.to_string()),
        doctrine_version_before: None,
        doctrine_version_after: None,
    })?;

    // Reactivate the doctrine that preceded this acceptance, when recorded.
    let snapshot = if let Some(before) = proposal.doctrine_version_before {
        rollback_to_version(store, before)?;
        before
    } else {
        active_version(store, now)?
    };

    write_entry(
        store,
        id,
        LedgerAction::Rollback,
        reviewer_id,
        rationale,
        snapshot,
        metadata,
        now,
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Reporting
// ============================================================================

/// Lists recent ledger entries.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
pub fn get_ledger(
    store: &dyn GovernanceStore,
    limit: usize,
) -> Result<Vec<LedgerEntry>, GovernanceError> {
    store.recent_ledger(limit)
}

/// Lists doctrine versions, newest first.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
pub fn get_doctrine_versions(
    store: &dyn GovernanceStore,
    limit: usize,
) -> Result<Vec<DoctrineVersion>, GovernanceError> {
    store.list_doctrine_versions(limit)
}

/// Computes aggregate governance statistics.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
pub fn get_stats(
    store: &dyn GovernanceStore,
    now: Timestamp,
) -> Result<GovernanceStats, GovernanceError> {
    Ok(GovernanceStats {
        proposals_draft: store.count_proposals_by_status(ProposalStatus::Draft)?,
        proposals_pending: store.count_proposals_by_status(ProposalStatus::Pending)?,
        proposals_accepted: store.count_proposals_by_status(ProposalStatus::Accepted)?,
        proposals_rejected: store.count_proposals_by_status(ProposalStatus::Rejected)?,
        proposals_rolled_back: store.count_proposals_by_status(ProposalStatus::RolledBack)?,
        acceptance_rate: acceptance_rate(store)?,
        doctrine_version: active_version(store, now)?,
        doctrine_version_count: store.count_doctrine_versions()?,
    })
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

    use furlong_core::EpisodeId;
    use furlong_core::Timestamp;
    use serde_json::json;

    use super::accept_proposal;
    use super::get_proposal;
    use super::get_stats;
    use super::reject_proposal;
    use super::rollback_proposal;
    use crate::proposals::persist_proposals;
    use crate::proposals::transition_to_pending;
    use crate::store::GovernanceError;
    use crate::store::GovernanceStore;
    use crate::store::MemoryGovernanceStore;
    use crate::types::CriticType;
    use crate::types::LedgerAction;
    use crate::types::ProposalDraft;
    use crate::types::ProposalStatus;
    use crate::types::SemVer;
    use crate::types::Severity;

    fn now() -> Timestamp {
        Timestamp::from_unix_millis(1_700_000_000_000)
    }

    fn pending_proposal(store: &MemoryGovernanceStore) -> furlong_core::ProposalId {
        let episode = EpisodeId::new("race_2026-03-14_R1");
        let ids = persist_proposals(
            store,
            &episode,
            CriticType::Leakage,
            &[ProposalDraft {
                severity: Severity::Critical,
                finding_type: "FUTURE_MARKET_LEAKAGE".to_string(),
                description: "temporal validation".to_string(),
                proposed_change: json!({"rule_type": "temporal_validation"}),
            }],
            now(),
        )
        .expect("persist");
        transition_to_pending(store, &episode).expect("transition");
        ids[0].clone()
    }

    #[test]
    fn accept_bumps_doctrine_and_writes_ledger() {
        let store = MemoryGovernanceStore::new();
        let id = pending_proposal(&store);
        let outcome =
            accept_proposal(&store, &id, "reviewer", "sound", None, now()).expect("accept");
        assert_eq!(outcome.previous_version, SemVer::new(13, 0, 0));
        assert_eq!(outcome.doctrine_version, SemVer::new(13, 1, 0));

        let enriched = get_proposal(&store, &id).expect("get").expect("present");
        assert_eq!(enriched.proposal.status, ProposalStatus::Accepted);
        assert_eq!(enriched.proposal.doctrine_version_after, Some(SemVer::new(13, 1, 0)));
        assert_eq!(enriched.ledger_history.len(), 1);
        assert_eq!(enriched.ledger_history[0].action, LedgerAction::Accept);

        let active = store.get_active_doctrine().expect("get").expect("present");
        assert_eq!(active.version, SemVer::new(13, 1, 0));
    }

    #[test]
    fn reject_leaves_doctrine_untouched() {
        let store = MemoryGovernanceStore::new();
        let id = pending_proposal(&store);
        reject_proposal(&store, &id, "reviewer", "weak evidence", None, now())
            .expect("reject");
        let active = store.get_active_doctrine().expect("get").expect("present");
        assert_eq!(active.version, SemVer::new(13, 0, 0));
        let enriched = get_proposal(&store, &id).expect("get").expect("present");
        assert_eq!(enriched.proposal.status, ProposalStatus::Rejected);
    }

    #[test]
    fn rejected_proposal_cannot_be_accepted() {
        let store = MemoryGovernanceStore::new();
        let id = pending_proposal(&store);
        reject_proposal(&store, &id, "reviewer", "weak", None, now()).expect("reject");
        let err = accept_proposal(&store, &id, "reviewer", "changed my mind", None, now())
            .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::InvalidState { ref current, ref expected, .. }
                if current == "REJECTED" && expected == "PENDING"
        ));
        // No ledger entry is written for the refused transition.
        assert_eq!(store.ledger_for_proposal(&id).expect("ledger").len(), 1);
    }

    #[test]
    fn draft_proposal_cannot_be_accepted() {
        let store = MemoryGovernanceStore::new();
        let episode = EpisodeId::new("race_2026-03-14_R1");
        let ids = persist_proposals(
            &store,
            &episode,
            CriticType::Bias,
            &[ProposalDraft {
                severity: Severity::High,
                finding_type: "ANCHORING_BIAS".to_string(),
                description: "favorite over-weighted".to_string(),
                proposed_change: json!({"rule_type": "confidence_calibration"}),
            }],
            now(),
        )
        .expect("persist");
        let err =
            accept_proposal(&store, &ids[0], "reviewer", "premature", None, now()).unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState { .. }));
    }

    #[test]
    fn rollback_requires_accepted_and_reverts_doctrine() {
        let store = MemoryGovernanceStore::new();
        let id = pending_proposal(&store);
        accept_proposal(&store, &id, "reviewer", "sound", None, now()).expect("accept");
        rollback_proposal(&store, &id, "reviewer", "regressed in shadow", None, now())
            .expect("rollback");

        let enriched = get_proposal(&store, &id).expect("get").expect("present");
        assert_eq!(enriched.proposal.status, ProposalStatus::RolledBack);
        let active = store.get_active_doctrine().expect("get").expect("present");
        assert_eq!(active.version, SemVer::new(13, 0, 0));

        // A second rollback is a wrong-state transition.
        let err = rollback_proposal(&store, &id, "reviewer", "again", None, now()).unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState { .. }));
    }

    #[test]
    fn stats_cover_counts_rate_and_version() {
        let store = MemoryGovernanceStore::new();
        let id = pending_proposal(&store);
        accept_proposal(&store, &id, "reviewer", "sound", None, now()).expect("accept");
        let stats = get_stats(&store, now()).expect("stats");
        assert_eq!(stats.proposals_accepted, 1);
        assert_eq!(stats.proposals_pending, 0);
        assert!((stats.acceptance_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(stats.doctrine_version, SemVer::new(13, 1, 0));
        assert_eq!(stats.doctrine_version_count, 2);
    }
}
