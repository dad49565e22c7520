// crates/furlong-governance/src/types.rs
// ============================================================================
// Module: Governance Types
// Description: Episodes, artifacts, proposals, doctrine versions, ledger.
// Purpose: Typed governance records with stable wire forms.
// Dependencies: furlong-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Governance records carry the epistemic audit trail: episodes pin a
//! decision time distinct from their creation time, artifacts checksum the
//! exact blobs the engine saw and produced, proposals deduplicate across
//! episodes by fingerprint, doctrine versions form a semver chain with
//! exactly one active row, and the ledger is append-only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use furlong_core::EpisodeId;
use furlong_core::ProposalId;
use furlong_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Critic family that produced a proposal.
///
/// # Invariants
/// - Variants are stable for serialization and fingerprinting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriticType {
    /// Leakage detector findings.
    Leakage,
    /// Cognitive-bias findings.
    Bias,
    /// Feature-coverage findings.
    Feature,
    /// Decision-quality findings.
    Decision,
}

impl CriticType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Leakage => "LEAKAGE",
            Self::Bias => "BIAS",
            Self::Feature => "FEATURE",
            Self::Decision => "DECISION",
        }
    }
}

/// Finding severity.
///
/// # Invariants
/// - Variants are stable for serialization and triage ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Must be reviewed before the next deployment.
    Critical,
    /// High-priority finding.
    High,
    /// Medium-priority finding.
    Medium,
    /// Informational finding.
    Low,
}

impl Severity {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Proposal lifecycle status.
///
/// # Invariants
/// - Transitions follow `DRAFT -> PENDING -> {ACCEPTED, REJECTED}` with
///   `ROLLED_BACK` reachable only from `ACCEPTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Critic emitted; not yet ready for review.
    Draft,
    /// Episode finalized; awaiting human review.
    Pending,
    /// Human approved; doctrine bumped.
    Accepted,
    /// Human declined; archived.
    Rejected,
    /// Previously accepted, now reverted.
    RolledBack,
}

impl ProposalStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::RolledBack => "ROLLED_BACK",
        }
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "DRAFT" => Ok(Self::Draft),
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            "ROLLED_BACK" => Ok(Self::RolledBack),
            other => Err(format!("unknown proposal status: {other}")),
        }
    }
}

/// Doctrine change magnitude.
///
/// # Invariants
/// - Variants are stable for serialization and version arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    /// Breaking change.
    Major,
    /// New rule added.
    Minor,
    /// Fix without behavior change.
    Patch,
}

/// Governance ledger action.
///
/// # Invariants
/// - Variants are stable for serialization and audit matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerAction {
    /// Proposal accepted.
    Accept,
    /// Proposal rejected.
    Reject,
    /// Accepted proposal rolled back.
    Rollback,
}

impl LedgerAction {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
            Self::Rollback => "ROLLBACK",
        }
    }
}

/// Episode artifact kind.
///
/// # Invariants
/// - Variants are stable for serialization and artifact-id composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactType {
    /// Inputs as known at decision time.
    PreState,
    /// Engine inference output.
    Inference,
    /// Verified race outcome.
    Outcome,
}

impl ArtifactType {
    /// Returns the stable wire label used in artifact ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreState => "PRE_STATE",
            Self::Inference => "INFERENCE",
            Self::Outcome => "OUTCOME",
        }
    }
}

// ============================================================================
// SECTION: Semantic Version
// ============================================================================

/// Doctrine semantic version `MAJOR.MINOR.PATCH`.
///
/// # Invariants
/// - Renders exactly as `{major}.{minor}.{patch}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemVer {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl SemVer {
    /// Creates a version from components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns the version after a bump, resetting lower components.
    #[must_use]
    pub const fn bump(self, change: ChangeType) -> Self {
        match change {
            ChangeType::Major => Self::new(self.major + 1, 0, 0),
            ChangeType::Minor => Self::new(self.major, self.minor + 1, 0),
            ChangeType::Patch => Self::new(self.major, self.minor, self.patch + 1),
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid semver: {raw}"))?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid semver: {raw}"))?;
        let patch = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid semver: {raw}"))?;
        if parts.next().is_some() {
            return Err(format!("invalid semver: {raw}"));
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl Serialize for SemVer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// One observable race viewed as an epistemic unit.
///
/// # Invariants
/// - `decision_time` is the knowledge cutoff, never the creation instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Episode identifier (`race_{date}_{race_id}`).
    pub id: EpisodeId,
    /// Decision instant (epistemic time).
    pub decision_time: Timestamp,
    /// Wall-clock creation instant.
    pub created_at: Timestamp,
    /// Short hash over the episode context.
    pub context_hash: String,
    /// Whether the outcome has been recorded.
    pub finalized: bool,
    /// Finalization instant, when finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<Timestamp>,
}

/// A typed episode artifact blob.
///
/// # Invariants
/// - `id` is `{episode_id}_{artifact_type}`; `checksum` is the SHA-256 of
///   the canonical content bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeArtifact {
    /// Artifact identifier.
    pub id: String,
    /// Owning episode.
    pub episode_id: EpisodeId,
    /// Artifact kind.
    pub artifact_type: ArtifactType,
    /// Canonical JSON content.
    pub content: Value,
    /// SHA-256 checksum over the canonical content bytes.
    pub checksum: String,
    /// Creation instant.
    pub created_at: Timestamp,
}

/// Critic finding before persistence.
///
/// # Invariants
/// - `proposed_change` is the structured patch payload the fingerprint
///   covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDraft {
    /// Finding severity.
    pub severity: Severity,
    /// Specific finding type (e.g. `FUTURE_MARKET_LEAKAGE`).
    pub finding_type: String,
    /// Human-readable description.
    pub description: String,
    /// Structured patch payload.
    pub proposed_change: Value,
}

/// Persisted patch proposal.
///
/// # Invariants
/// - `fingerprint` is unique across the store; duplicates share a row and
///   multiply only through episode links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposal identifier.
    pub id: ProposalId,
    /// Originating episode.
    pub episode_id: EpisodeId,
    /// Critic family.
    pub critic_type: CriticType,
    /// Finding severity.
    pub severity: Severity,
    /// Specific finding type.
    pub finding_type: String,
    /// Human-readable description.
    pub description: String,
    /// Structured patch payload.
    pub proposed_change: Value,
    /// Deduplication fingerprint.
    pub fingerprint: String,
    /// Lifecycle status.
    pub status: ProposalStatus,
    /// Creation instant.
    pub created_at: Timestamp,
    /// Review instant, once reviewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<Timestamp>,
    /// Reviewer identity, once reviewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    /// Review rationale, once reviewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_rationale: Option<String>,
    /// Doctrine version before acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctrine_version_before: Option<SemVer>,
    /// Doctrine version after acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctrine_version_after: Option<SemVer>,
}

/// One doctrine version row.
///
/// # Invariants
/// - Exactly one row in the store has `active = true` at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctrineVersion {
    /// Semantic version.
    pub version: SemVer,
    /// Creation instant.
    pub created_at: Timestamp,
    /// Creator identity.
    pub created_by: String,
    /// Human-readable description.
    pub description: String,
    /// Rules snapshot payload.
    pub rules_snapshot: Value,
    /// Parent version, absent for the seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<SemVer>,
    /// Whether this version is active.
    pub active: bool,
}

/// One immutable governance ledger entry.
///
/// # Invariants
/// - Entries are append-only; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Ledger entry identifier.
    pub id: String,
    /// Proposal the action applied to.
    pub proposal_id: ProposalId,
    /// Action taken.
    pub action: LedgerAction,
    /// Reviewer identity.
    pub actor: String,
    /// Action instant.
    pub timestamp: Timestamp,
    /// Human rationale.
    pub rationale: String,
    /// Doctrine version snapshot at action time.
    pub doctrine_version_snapshot: SemVer,
    /// Count of finalized episodes at action time.
    pub episode_count_at_decision: u64,
    /// Additional context.
    #[serde(default)]
    pub metadata: Value,
}

/// Aggregate governance statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceStats {
    /// Draft proposal count.
    pub proposals_draft: u64,
    /// Pending proposal count.
    pub proposals_pending: u64,
    /// Accepted proposal count.
    pub proposals_accepted: u64,
    /// Rejected proposal count.
    pub proposals_rejected: u64,
    /// Rolled-back proposal count.
    pub proposals_rolled_back: u64,
    /// Accept / (accept + reject) over the ledger.
    pub acceptance_rate: f64,
    /// Active doctrine version.
    pub doctrine_version: SemVer,
    /// Total doctrine version count.
    pub doctrine_version_count: u64,
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

    use super::ChangeType;
    use super::ProposalStatus;
    use super::SemVer;

    #[test]
    fn semver_bumps_reset_lower_components() {
        let version = SemVer::new(13, 2, 5);
        assert_eq!(version.bump(ChangeType::Major), SemVer::new(14, 0, 0));
        assert_eq!(version.bump(ChangeType::Minor), SemVer::new(13, 3, 0));
        assert_eq!(version.bump(ChangeType::Patch), SemVer::new(13, 2, 6));
    }

    #[test]
    fn semver_round_trips_through_strings() {
        let version: SemVer = "13.1.0".parse().expect("parse");
        assert_eq!(version, SemVer::new(13, 1, 0));
        assert_eq!(version.to_string(), "13.1.0");
        assert!("13.1".parse::<SemVer>().is_err());
        assert!("13.1.0.4".parse::<SemVer>().is_err());
        assert!("a.b.c".parse::<SemVer>().is_err());
    }

    #[test]
    fn status_wire_labels_round_trip() {
        for status in [
            ProposalStatus::Draft,
            ProposalStatus::Pending,
            ProposalStatus::Accepted,
            ProposalStatus::Rejected,
            ProposalStatus::RolledBack,
        ] {
            let parsed: ProposalStatus = status.as_str().parse().expect("parse");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn rolled_back_serializes_with_underscore() {
        let json = serde_json::to_string(&ProposalStatus::RolledBack).expect("serialize");
        assert_eq!(json, "\"ROLLED_BACK\"");
    }
}
