// crates/furlong-governance/src/store.rs
// ============================================================================
// Module: Governance Store Interface
// Description: Backend-agnostic governance store trait and in-memory impl.
// Purpose: Define the persistence contract for episodes, proposals,
// doctrine, and ledger; provide an isolated store for tests.
// Dependencies: crate::types, furlong-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The store trait is the only shared resource between concurrent race
//! workers. Writes are idempotent thanks to stable ids and fingerprints:
//! episode creation is insert-if-absent, proposal insertion conflicts on
//! the fingerprint unique key so a losing racer re-reads and links, doctrine
//! activation is compare-and-set over the single active row, and the ledger
//! is append-only. The in-memory implementation mirrors the durable SQLite
//! store for isolated tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;

use furlong_core::EpisodeId;
use furlong_core::ProposalId;
use furlong_core::Timestamp;
use thiserror::Error;

use crate::types::ArtifactType;
use crate::types::CriticType;
use crate::types::DoctrineVersion;
use crate::types::Episode;
use crate::types::EpisodeArtifact;
use crate::types::LedgerAction;
use crate::types::LedgerEntry;
use crate::types::Proposal;
use crate::types::ProposalStatus;
use crate::types::SemVer;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Governance store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `InvalidState` carries the state names for the API error surface.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// Store I/O error.
    #[error("governance store io error: {0}")]
    Io(String),
    /// Unique-key conflict (fingerprint or primary key).
    #[error("governance store conflict: {0}")]
    Conflict(String),
    /// Referenced row does not exist.
    #[error("governance store missing row: {0}")]
    NotFound(String),
    /// Proposal is not in the state the transition requires.
    #[error("proposal {proposal_id} is {current}, not {expected}")]
    InvalidState {
        /// Proposal identifier.
        proposal_id: ProposalId,
        /// Current state name.
        current: String,
        /// Required state name.
        expected: String,
    },
    /// Row could not be serialized or deserialized.
    #[error("governance store serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// SECTION: Status Update
// ============================================================================

/// Review fields applied together with a status transition.
///
/// # Invariants
/// - Applied atomically with the compare-and-set on status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// New status.
    pub status: ProposalStatus,
    /// Review instant.
    pub reviewed_at: Option<Timestamp>,
    /// Reviewer identity.
    pub reviewer_id: Option<String>,
    /// Review rationale.
    pub review_rationale: Option<String>,
    /// Doctrine version before the action.
    pub doctrine_version_before: Option<SemVer>,
    /// Doctrine version after the action.
    pub doctrine_version_after: Option<SemVer>,
}

// ============================================================================
// SECTION: Store Trait
// ============================================================================

/// Backend-agnostic governance store.
pub trait GovernanceStore: Send + Sync {
    /// Inserts an episode if absent; returns whether a row was created.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn insert_episode_if_absent(&self, episode: &Episode) -> Result<bool, GovernanceError>;

    /// Loads an episode by id.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn get_episode(&self, id: &EpisodeId) -> Result<Option<Episode>, GovernanceError>;

    /// Marks an episode finalized at the given instant.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::NotFound`] when the episode is absent.
    fn finalize_episode(
        &self,
        id: &EpisodeId,
        finalized_at: Timestamp,
    ) -> Result<(), GovernanceError>;

    /// Counts finalized episodes.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn count_finalized_episodes(&self) -> Result<u64, GovernanceError>;

    /// Inserts or replaces an episode artifact.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn upsert_artifact(&self, artifact: &EpisodeArtifact) -> Result<(), GovernanceError>;

    /// Loads an artifact by episode and type.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn get_artifact(
        &self,
        episode_id: &EpisodeId,
        artifact_type: ArtifactType,
    ) -> Result<Option<EpisodeArtifact>, GovernanceError>;

    /// Finds a proposal by fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn find_proposal_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<Proposal>, GovernanceError>;

    /// Inserts a new proposal row.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Conflict`] when the fingerprint already
    /// exists; the caller re-reads and links instead.
    fn insert_proposal(&self, proposal: &Proposal) -> Result<(), GovernanceError>;

    /// Links a proposal to an episode (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn link_proposal_episode(
        &self,
        proposal_id: &ProposalId,
        episode_id: &EpisodeId,
    ) -> Result<(), GovernanceError>;

    /// Returns episode ids linked to a proposal.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn episodes_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<EpisodeId>, GovernanceError>;

    /// Loads a proposal by id.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, GovernanceError>;

    /// Lists proposals with optional filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
        critic_type: Option<CriticType>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Proposal>, GovernanceError>;

    /// Applies a status update iff the proposal is in the expected state.
    ///
    /// Returns the refreshed proposal on success.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::NotFound`] for an unknown proposal and
    /// [`GovernanceError::InvalidState`] on a state mismatch; no row is
    /// modified in either case.
    fn update_proposal_status(
        &self,
        id: &ProposalId,
        expected: ProposalStatus,
        update: &StatusUpdate,
    ) -> Result<Proposal, GovernanceError>;

    /// Transitions every DRAFT proposal anchored to or linked with the
    /// episode to PENDING, returning the explicit count of rows moved.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn transition_drafts_to_pending(
        &self,
        episode_id: &EpisodeId,
    ) -> Result<u64, GovernanceError>;

    /// Counts proposals by status.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn count_proposals_by_status(
        &self,
        status: ProposalStatus,
    ) -> Result<u64, GovernanceError>;

    /// Loads the active doctrine version, if seeded.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn get_active_doctrine(&self) -> Result<Option<DoctrineVersion>, GovernanceError>;

    /// Loads a doctrine version by number.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn get_doctrine(&self, version: SemVer) -> Result<Option<DoctrineVersion>, GovernanceError>;

    /// Inserts a doctrine version row.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Conflict`] when the version exists.
    fn insert_doctrine(&self, version: &DoctrineVersion) -> Result<(), GovernanceError>;

    /// Atomically deactivates the current active version and activates the
    /// target (compare-and-set over the single active row).
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::NotFound`] when the target is absent.
    fn activate_doctrine(&self, version: SemVer) -> Result<(), GovernanceError>;

    /// Lists doctrine versions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn list_doctrine_versions(
        &self,
        limit: usize,
    ) -> Result<Vec<DoctrineVersion>, GovernanceError>;

    /// Counts doctrine versions.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn count_doctrine_versions(&self) -> Result<u64, GovernanceError>;

    /// Appends a ledger entry; entries are never updated or deleted.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Conflict`] on a duplicate entry id.
    fn append_ledger(&self, entry: &LedgerEntry) -> Result<(), GovernanceError>;

    /// Lists ledger entries for a proposal, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn ledger_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<LedgerEntry>, GovernanceError>;

    /// Lists recent ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn recent_ledger(&self, limit: usize) -> Result<Vec<LedgerEntry>, GovernanceError>;

    /// Counts ledger entries by action.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on storage failure.
    fn count_ledger_by_action(&self, action: LedgerAction) -> Result<u64, GovernanceError>;
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Interior state of the in-memory governance store.
#[derive(Debug, Default)]
struct MemoryInner {
    /// Episodes by id.
    episodes: BTreeMap<EpisodeId, Episode>,
    /// Artifacts by artifact id.
    artifacts: BTreeMap<String, EpisodeArtifact>,
    /// Proposals by id, insertion-ordered via `proposal_order`.
    proposals: BTreeMap<ProposalId, Proposal>,
    /// Proposal ids oldest first.
    proposal_order: Vec<ProposalId>,
    /// Junction rows (proposal, episode).
    links: BTreeSet<(ProposalId, EpisodeId)>,
    /// Doctrine rows by version.
    doctrine: BTreeMap<SemVer, DoctrineVersion>,
    /// Doctrine versions insertion-ordered.
    doctrine_order: Vec<SemVer>,
    /// Ledger entries oldest first.
    ledger: Vec<LedgerEntry>,
}

/// In-memory governance store for isolated tests.
///
/// # Invariants
/// - Mirrors the durable store semantics, including conflict behavior.
#[derive(Debug, Default)]
pub struct MemoryGovernanceStore {
    /// Interior state behind a mutex.
    inner: Mutex<MemoryInner>,
}

impl MemoryGovernanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the interior state.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, GovernanceError> {
        self.inner
            .lock()
            .map_err(|_| GovernanceError::Io("governance store lock poisoned".to_string()))
    }
}

impl GovernanceStore for MemoryGovernanceStore {
    fn insert_episode_if_absent(&self, episode: &Episode) -> Result<bool, GovernanceError> {
        let mut inner = self.lock()?;
        if inner.episodes.contains_key(&episode.id) {
            return Ok(false);
        }
        inner.episodes.insert(episode.id.clone(), episode.clone());
        Ok(true)
    }

    fn get_episode(&self, id: &EpisodeId) -> Result<Option<Episode>, GovernanceError> {
        Ok(self.lock()?.episodes.get(id).cloned())
    }

    fn finalize_episode(
        &self,
        id: &EpisodeId,
        finalized_at: Timestamp,
    ) -> Result<(), GovernanceError> {
        let mut inner = self.lock()?;
        let episode = inner
            .episodes
            .get_mut(id)
            .ok_or_else(|| GovernanceError::NotFound(format!("episode {id}")))?;
        episode.finalized = true;
        episode.finalized_at = Some(finalized_at);
        Ok(())
    }

    fn count_finalized_episodes(&self) -> Result<u64, GovernanceError> {
        Ok(self.lock()?.episodes.values().filter(|episode| episode.finalized).count() as u64)
    }

    fn upsert_artifact(&self, artifact: &EpisodeArtifact) -> Result<(), GovernanceError> {
        self.lock()?.artifacts.insert(artifact.id.clone(), artifact.clone());
        Ok(())
    }

    fn get_artifact(
        &self,
        episode_id: &EpisodeId,
        artifact_type: ArtifactType,
    ) -> Result<Option<EpisodeArtifact>, GovernanceError> {
        let id = format!("{episode_id}_{}", artifact_type.as_str());
        Ok(self.lock()?.artifacts.get(&id).cloned())
    }

    fn find_proposal_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<Proposal>, GovernanceError> {
        Ok(self
            .lock()?
            .proposals
            .values()
            .find(|proposal| proposal.fingerprint == fingerprint)
            .cloned())
    }

    fn insert_proposal(&self, proposal: &Proposal) -> Result<(), GovernanceError> {
        let mut inner = self.lock()?;
        if inner
            .proposals
            .values()
            .any(|existing| existing.fingerprint == proposal.fingerprint)
        {
            return Err(GovernanceError::Conflict(format!(
                "fingerprint {} already present",
                proposal.fingerprint
            )));
        }
        if inner.proposals.contains_key(&proposal.id) {
            return Err(GovernanceError::Conflict(format!(
                "proposal {} already present",
                proposal.id
            )));
        }
        inner.proposal_order.push(proposal.id.clone());
        inner.proposals.insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    fn link_proposal_episode(
        &self,
        proposal_id: &ProposalId,
        episode_id: &EpisodeId,
    ) -> Result<(), GovernanceError> {
        self.lock()?.links.insert((proposal_id.clone(), episode_id.clone()));
        Ok(())
    }

    fn episodes_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<EpisodeId>, GovernanceError> {
        Ok(self
            .lock()?
            .links
            .iter()
            .filter(|(proposal, _)| proposal == proposal_id)
            .map(|(_, episode)| episode.clone())
            .collect())
    }

    fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, GovernanceError> {
        Ok(self.lock()?.proposals.get(id).cloned())
    }

    fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
        critic_type: Option<CriticType>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Proposal>, GovernanceError> {
        let inner = self.lock()?;
        Ok(inner
            .proposal_order
            .iter()
            .rev()
            .filter_map(|id| inner.proposals.get(id))
            .filter(|proposal| status.is_none_or(|wanted| proposal.status == wanted))
            .filter(|proposal| critic_type.is_none_or(|wanted| proposal.critic_type == wanted))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_proposal_status(
        &self,
        id: &ProposalId,
        expected: ProposalStatus,
        update: &StatusUpdate,
    ) -> Result<Proposal, GovernanceError> {
        let mut inner = self.lock()?;
        let proposal = inner
            .proposals
            .get_mut(id)
            .ok_or_else(|| GovernanceError::NotFound(format!("proposal {id}")))?;
        if proposal.status != expected {
            return Err(GovernanceError::InvalidState {
                proposal_id: id.clone(),
                current: proposal.status.as_str().to_string(),
                expected: expected.as_str().to_string(),
            });
        }
        proposal.status = update.status;
        if update.reviewed_at.is_some() {
            proposal.reviewed_at = update.reviewed_at;
        }
        if update.reviewer_id.is_some() {
            proposal.reviewer_id = update.reviewer_id.clone();
        }
        if update.review_rationale.is_some() {
            proposal.review_rationale = update.review_rationale.clone();
        }
        if update.doctrine_version_before.is_some() {
            proposal.doctrine_version_before = update.doctrine_version_before;
        }
        if update.doctrine_version_after.is_some() {
            proposal.doctrine_version_after = update.doctrine_version_after;
        }
        Ok(proposal.clone())
    }

    fn transition_drafts_to_pending(
        &self,
        episode_id: &EpisodeId,
    ) -> Result<u64, GovernanceError> {
        let mut inner = self.lock()?;
        // Collect the affected set first: direct anchors plus junction
        // links, deduplicated, then count explicitly per batch.
        let mut affected: BTreeSet<ProposalId> = inner
            .proposals
            .values()
            .filter(|proposal| {
                &proposal.episode_id == episode_id && proposal.status == ProposalStatus::Draft
            })
            .map(|proposal| proposal.id.clone())
            .collect();
        for (proposal_id, linked_episode) in &inner.links {
            if linked_episode == episode_id
                && inner
                    .proposals
                    .get(proposal_id)
                    .is_some_and(|proposal| proposal.status == ProposalStatus::Draft)
            {
                affected.insert(proposal_id.clone());
            }
        }
        let mut moved = 0u64;
        for id in affected {
            if let Some(proposal) = inner.proposals.get_mut(&id) {
                proposal.status = ProposalStatus::Pending;
                moved += 1;
            }
        }
        Ok(moved)
    }

    fn count_proposals_by_status(
        &self,
        status: ProposalStatus,
    ) -> Result<u64, GovernanceError> {
        Ok(self
            .lock()?
            .proposals
            .values()
            .filter(|proposal| proposal.status == status)
            .count() as u64)
    }

    fn get_active_doctrine(&self) -> Result<Option<DoctrineVersion>, GovernanceError> {
        Ok(self.lock()?.doctrine.values().find(|version| version.active).cloned())
    }

    fn get_doctrine(&self, version: SemVer) -> Result<Option<DoctrineVersion>, GovernanceError> {
        Ok(self.lock()?.doctrine.get(&version).cloned())
    }

    fn insert_doctrine(&self, version: &DoctrineVersion) -> Result<(), GovernanceError> {
        let mut inner = self.lock()?;
        if inner.doctrine.contains_key(&version.version) {
            return Err(GovernanceError::Conflict(format!(
                "doctrine version {} already present",
                version.version
            )));
        }
        inner.doctrine_order.push(version.version);
        inner.doctrine.insert(version.version, version.clone());
        Ok(())
    }

    fn activate_doctrine(&self, version: SemVer) -> Result<(), GovernanceError> {
        let mut inner = self.lock()?;
        if !inner.doctrine.contains_key(&version) {
            return Err(GovernanceError::NotFound(format!("doctrine version {version}")));
        }
        for row in inner.doctrine.values_mut() {
            row.active = row.version == version;
        }
        Ok(())
    }

    fn list_doctrine_versions(
        &self,
        limit: usize,
    ) -> Result<Vec<DoctrineVersion>, GovernanceError> {
        let inner = self.lock()?;
        Ok(inner
            .doctrine_order
            .iter()
            .rev()
            .filter_map(|version| inner.doctrine.get(version))
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_doctrine_versions(&self) -> Result<u64, GovernanceError> {
        Ok(self.lock()?.doctrine.len() as u64)
    }

    fn append_ledger(&self, entry: &LedgerEntry) -> Result<(), GovernanceError> {
        let mut inner = self.lock()?;
        if inner.ledger.iter().any(|existing| existing.id == entry.id) {
            return Err(GovernanceError::Conflict(format!(
                "ledger entry {} already present",
                entry.id
            )));
        }
        inner.ledger.push(entry.clone());
        Ok(())
    }

    fn ledger_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<LedgerEntry>, GovernanceError> {
        Ok(self
            .lock()?
            .ledger
            .iter()
            .rev()
            .filter(|entry| &entry.proposal_id == proposal_id)
            .cloned()
            .collect())
    }

    fn recent_ledger(&self, limit: usize) -> Result<Vec<LedgerEntry>, GovernanceError> {
        Ok(self.lock()?.ledger.iter().rev().take(limit).cloned().collect())
    }

    fn count_ledger_by_action(&self, action: LedgerAction) -> Result<u64, GovernanceError> {
        Ok(self.lock()?.ledger.iter().filter(|entry| entry.action == action).count() as u64)
    }
}
