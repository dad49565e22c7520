// crates/furlong-core/src/core/identifiers.rs
// ============================================================================
// Module: Furlong Identifiers
// Description: Canonical opaque identifiers for races, runners, and runs.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Furlong.
//! Identifiers are opaque UTF-8 strings and serialize transparently on the
//! wire. No normalization is applied; uniqueness is a caller responsibility
//! (race ids are globally unique, runner ids unique within a race).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Race identifier, globally unique across all race cards.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RaceId(String);

impl RaceId {
    /// Creates a new race identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RaceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RaceId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Runner identifier, unique within a single race.
///
/// # Invariants
/// - Opaque UTF-8 string; stable across every pipeline stage of one race.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerId(String);

impl RunnerId {
    /// Creates a new runner identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RunnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RunnerId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Engine run identifier derived from race id and decision timestamp.
///
/// # Invariants
/// - Sixteen lowercase hex characters when derived via
///   [`crate::core::hashing::derive_engine_run_id`]; opaque otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineRunId(String);

impl EngineRunId {
    /// Creates a new engine run identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for EngineRunId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EngineRunId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Episode identifier for the epistemic-time governance unit of one race.
///
/// # Invariants
/// - Canonical form is `race_{YYYY-MM-DD}_{race_id}` (decision date, not
///   creation date).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(String);

impl EpisodeId {
    /// Creates a new episode identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for EpisodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EpisodeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Proposal identifier for governance patch proposals.
///
/// # Invariants
/// - Opaque UTF-8 string; duplicates are detected by fingerprint, never by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(String);

impl ProposalId {
    /// Creates a new proposal identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ProposalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProposalId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Pipeline version tag embedded in every engine run record.
///
/// # Invariants
/// - Opaque UTF-8 string; replays compare equality, not ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineVersion(String);

impl PipelineVersion {
    /// Creates a new pipeline version tag.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Returns the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Default for PipelineVersion {
    fn default() -> Self {
        Self::new("v12.0")
    }
}

impl From<&str> for PipelineVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PipelineVersion {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
