// crates/furlong-governance/src/lib.rs
// ============================================================================
// Module: Furlong Governance
// Description: Episodes, proposals, doctrine versions, ledger, shadow
// runner.
// Purpose: Turn critic findings into human-approved doctrine with a full
// audit trail.
// Dependencies: furlong-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Governance is the human-gated loop around the engine. Critics emit
//! findings as DRAFT proposals deduplicated by fingerprint; finalized
//! episodes move their drafts to PENDING; humans accept (bumping the
//! doctrine version and writing an ACCEPT ledger entry), reject, or roll
//! back. Nothing in this crate applies rule changes automatically; the
//! layer bookkeeps decisions and versions only.

/// Doctrine version management.
pub mod doctrine;
/// Proposal fingerprinting.
pub mod fingerprint;
/// Immutable governance ledger.
pub mod ledger;
/// Proposal persistence and transitions.
pub mod proposals;
/// Review facade.
pub mod review;
/// Episodic shadow runner.
pub mod shadow;
/// Store trait and in-memory implementation.
pub mod store;
/// Governance record types.
pub mod types;

pub use doctrine::SEED_VERSION;
pub use doctrine::active_version;
pub use doctrine::bump_version;
pub use doctrine::rollback_to_version;
pub use fingerprint::fingerprint_proposal;
pub use ledger::acceptance_rate;
pub use ledger::write_entry;
pub use proposals::persist_proposals;
pub use proposals::proposal_id_for;
pub use proposals::transition_to_pending;
pub use review::AcceptOutcome;
pub use review::EnrichedProposal;
pub use review::accept_proposal;
pub use review::get_doctrine_versions;
pub use review::get_ledger;
pub use review::get_proposal;
pub use review::get_stats;
pub use review::list_proposals;
pub use review::reject_proposal;
pub use review::rollback_proposal;
pub use shadow::ShadowError;
pub use shadow::ShadowRunner;
pub use store::GovernanceError;
pub use store::GovernanceStore;
pub use store::MemoryGovernanceStore;
pub use store::StatusUpdate;
pub use types::ArtifactType;
pub use types::ChangeType;
pub use types::CriticType;
pub use types::DoctrineVersion;
pub use types::Episode;
pub use types::EpisodeArtifact;
pub use types::GovernanceStats;
pub use types::LedgerAction;
pub use types::LedgerEntry;
pub use types::Proposal;
pub use types::ProposalDraft;
pub use types::ProposalStatus;
pub use types::SemVer;
pub use types::Severity;
