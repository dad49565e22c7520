// crates/furlong-governance/src/proposals.rs
// ============================================================================
// Module: Proposal Persistence & Transitions
// Description: Dedup-aware persistence and the DRAFT -> PENDING transition.
// Purpose: One row per unique finding; only episode links multiply.
// Dependencies: crate::{fingerprint, store, types}, furlong-core
// ============================================================================

//! ## Overview
//! Critic findings persist as DRAFT proposals. The fingerprint decides
//! identity: an existing row with the same fingerprint gains an episode
//! link instead of a duplicate row, and the insert/link race between two
//! episodes resolves by whichever commits first; the loser re-reads and
//! links. When an episode finalizes, every DRAFT anchored to it or linked
//! with it moves to PENDING, counted explicitly per batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use furlong_core::EpisodeId;
use furlong_core::ProposalId;
use furlong_core::Timestamp;

use crate::fingerprint::fingerprint_proposal;
use crate::store::GovernanceError;
use crate::store::GovernanceStore;
use crate::types::CriticType;
use crate::types::Proposal;
use crate::types::ProposalDraft;
use crate::types::ProposalStatus;

// ============================================================================
// SECTION: Identifier Derivation
// ============================================================================

/// Derives the stable proposal id from a fingerprint.
///
/// Ids are `prop_` plus the first sixteen hex characters of the
/// fingerprint, so replays and dedup races converge on one identity.
#[must_use]
pub fn proposal_id_for(fingerprint: &str) -> ProposalId {
    let short: String = fingerprint.chars().take(16).collect();
    ProposalId::new(format!("prop_{short}"))
}

// ============================================================================
// SECTION: Persistence
// ============================================================================

/// Persists critic proposals for an episode with fingerprint dedup.
///
/// Every returned id is linked to the episode through the junction table,
/// whether the row was created here or reused.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure or when a proposed
/// change cannot be fingerprinted.
pub fn persist_proposals(
    store: &dyn GovernanceStore,
    episode_id: &EpisodeId,
    critic_type: CriticType,
    drafts: &[ProposalDraft],
    now: Timestamp,
) -> Result<Vec<ProposalId>, GovernanceError> {
    let mut ids = Vec::with_capacity(drafts.len());

    for draft in drafts {
        let fingerprint = fingerprint_proposal(
            critic_type,
            &draft.finding_type,
            &draft.proposed_change,
        )
        .map_err(|err| GovernanceError::Serialization(err.to_string()))?;

        if let Some(existing) = store.find_proposal_by_fingerprint(&fingerprint)? {
            store.link_proposal_episode(&existing.id, episode_id)?;
            ids.push(existing.id);
            continue;
        }

        let proposal = Proposal {
            id: proposal_id_for(&fingerprint),
            episode_id: episode_id.clone(),
            critic_type,
            severity: draft.severity,
            finding_type: draft.finding_type.clone(),
            description: draft.description.clone(),
            proposed_change: draft.proposed_change.clone(),
            fingerprint: fingerprint.clone(),
            status: ProposalStatus::Draft,
            created_at: now,
            reviewed_at: None,
            reviewer_id: None,
            review_rationale: None,
            doctrine_version_before: None,
            doctrine_version_after: None,
        };

        match store.insert_proposal(&proposal) {
            Ok(()) => {
                store.link_proposal_episode(&proposal.id, episode_id)?;
                ids.push(proposal.id);
            }
            // Lost the race to another episode: re-read and link.
            Err(GovernanceError::Conflict(_)) => {
                let existing = store.find_proposal_by_fingerprint(&fingerprint)?.ok_or_else(
                    || {
                        GovernanceError::NotFound(format!(
                            "proposal with fingerprint {fingerprint} vanished after conflict"
                        ))
                    },
                )?;
                store.link_proposal_episode(&existing.id, episode_id)?;
                ids.push(existing.id);
            }
            Err(err) => return Err(err),
        }
    }

    Ok(ids)
}

// ============================================================================
// SECTION: Transitions
// ============================================================================

/// Transitions every DRAFT proposal of a finalized episode to PENDING.
///
/// Covers both direct anchors (the `episode_id` column) and junction links,
/// returning the explicit count of rows moved.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
pub fn transition_to_pending(
    store: &dyn GovernanceStore,
    episode_id: &EpisodeId,
) -> Result<u64, GovernanceError> {
    store.transition_drafts_to_pending(episode_id)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
