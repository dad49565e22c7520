// crates/furlong-core/src/core/profile.rs
// ============================================================================
// Module: Furlong Opponent Profiles
// Description: Strategic classifications of runners as market agents.
// Purpose: Capture intent, market role, and stable tactic with audit reasons.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! The market is treated as a strategic agent, not an information source.
//! Each runner receives an [`OpponentProfile`] combining trainer intent,
//! market role, and stable tactic. Every role assignment carries a non-empty
//! `role_reason` naming the rule that fired; a role without a reason is a
//! contract violation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::RunnerId;

// ============================================================================
// SECTION: Classifications
// ============================================================================

/// Trainer/owner intent classification.
///
/// # Invariants
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentClass {
    /// Entered to win today.
    Win,
    /// Entered for a place or each-way result.
    Place,
    /// Conditioning or preparation run.
    Prep,
    /// Running to adjust the handicap mark.
    #[serde(rename = "Mark-Adjust")]
    MarkAdjust,
    /// No confident classification.
    Unknown,
}

impl IntentClass {
    /// Returns the stable wire label for the intent.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Win => "Win",
            Self::Place => "Place",
            Self::Prep => "Prep",
            Self::MarkAdjust => "Mark-Adjust",
            Self::Unknown => "Unknown",
        }
    }
}

/// Market role classification over the decision-time snapshot.
///
/// # Invariants
/// - The lowest-odds runner is never [`MarketRole::Noise`].
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketRole {
    /// Shortest price; absorbs market liquidity.
    #[serde(rename = "Liquidity_Anchor")]
    LiquidityAnchor,
    /// Non-anchor contender treated as a genuine chance.
    #[serde(rename = "Release_Horse")]
    ReleaseHorse,
    /// Sharp-money mover.
    Steam,
    /// Tactical entry shaping the race.
    Spoiler,
    /// Drifting price holding liquidity.
    #[serde(rename = "Drift_Bait")]
    DriftBait,
    /// Long outsider with no market significance.
    Noise,
}

impl MarketRole {
    /// Returns the stable wire label for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LiquidityAnchor => "Liquidity_Anchor",
            Self::ReleaseHorse => "Release_Horse",
            Self::Steam => "Steam",
            Self::Spoiler => "Spoiler",
            Self::DriftBait => "Drift_Bait",
            Self::Noise => "Noise",
        }
    }
}

/// Multi-runner stable tactic.
///
/// # Invariants
/// - Variants are stable for serialization and coupling analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StableTactic {
    /// Sets the pace for a stablemate.
    #[serde(rename = "Pace_Setter")]
    PaceSetter,
    /// Covers moves for a stablemate.
    Cover,
    /// The stable's intended finisher.
    Finisher,
    /// Market decoy.
    Decoy,
    /// Only runner from its stable.
    Solo,
}

impl StableTactic {
    /// Returns the stable wire label for the tactic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaceSetter => "Pace_Setter",
            Self::Cover => "Cover",
            Self::Finisher => "Finisher",
            Self::Decoy => "Decoy",
            Self::Solo => "Solo",
        }
    }
}

// ============================================================================
// SECTION: Opponent Profile
// ============================================================================

/// Complete strategic profile for one runner.
///
/// # Invariants
/// - `role_reason` is non-empty (validated at stage boundaries).
/// - `confidence` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentProfile {
    /// Runner identifier.
    pub runner_id: RunnerId,
    /// Horse name.
    pub horse_name: String,
    /// Trainer/owner intent classification.
    pub intent_class: IntentClass,
    /// Market role classification.
    pub market_role: MarketRole,
    /// Stable tactic classification.
    pub stable_tactic: StableTactic,
    /// Classification confidence in `[0, 1]`.
    pub confidence: f64,
    /// Audit reason naming rank, odds, implied probability, and the rule
    /// that fired.
    pub role_reason: String,
    /// Supporting evidence values keyed by marker name.
    #[serde(default)]
    pub evidence: BTreeMap<String, Value>,
}
