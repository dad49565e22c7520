// crates/furlong-core/src/core/decision.rs
// ============================================================================
// Module: Furlong Decision Output
// Description: Bet-chassis verdict structures emitted by the decision policy.
// Purpose: Capture the structural shape of a wager with explicit reasons.
// Dependencies: crate::core::{gate, identifiers, profile}, serde
// ============================================================================

//! ## Overview
//! The decision policy emits a [`DecisionOutput`]: the chassis (structural
//! shape of the wager), the score-ranked Top-4, the optional TopStrike
//! selection, and a signals snapshot in the notes. Suppressions always carry
//! the full list of failing conditions so an auditor can reconstruct why a
//! win bet was withheld.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::gate::LearningStatus;
use crate::core::identifiers::RunnerId;
use crate::core::profile::MarketRole;

// ============================================================================
// SECTION: Chassis
// ============================================================================

/// Structural shape of a wager.
///
/// # Invariants
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChassisType {
    /// Single win bet on the top selection.
    #[serde(rename = "Win_Overlay")]
    WinOverlay,
    /// Support the score-ranked Top-4 set.
    #[serde(rename = "Top_4_Structure")]
    Top4Structure,
    /// Each-way value entry.
    #[serde(rename = "Value_EW")]
    ValueEw,
    /// Oppose only; no positive selection.
    #[serde(rename = "Fade_Only")]
    FadeOnly,
    /// No bet.
    Suppress,
}

impl ChassisType {
    /// Returns the stable wire label for the chassis.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WinOverlay => "Win_Overlay",
            Self::Top4Structure => "Top_4_Structure",
            Self::ValueEw => "Value_EW",
            Self::FadeOnly => "Fade_Only",
            Self::Suppress => "Suppress",
        }
    }
}

// ============================================================================
// SECTION: Notes
// ============================================================================

/// Signals snapshot bundled into every decision for audit.
///
/// # Invariants
/// - Values are copies of stage outputs, never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionNotes {
    /// Chaos level at decision time.
    pub chaos_level: f64,
    /// Manipulation risk at decision time.
    pub manipulation_risk: f64,
    /// Stability signal at decision time.
    pub stability_score: f64,
    /// Pace-geometry signal at decision time.
    pub pace_geometry_score: f64,
    /// Whether the race crossed the chaos threshold.
    pub is_chaos: bool,
    /// Whether the market crossed the manipulation threshold.
    pub is_manipulated: bool,
    /// Whether ablation flagged the decision fragile.
    pub is_fragile: bool,
    /// Whether the cognitive-trap firewall adjusted the decision.
    pub ctf_adjusted: bool,
    /// Short branch label for the decision path taken.
    pub reason: String,
    /// Stake multiplier forced by mitigations, when below 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake_multiplier: Option<f64>,
}

// ============================================================================
// SECTION: Decision Output
// ============================================================================

/// Final verdict emitted by the decision policy.
///
/// # Invariants
/// - `top_4_structure` has exactly `min(4, field_size)` entries.
/// - `win_suppressed` implies `top_strike_selection` is `None` and
///   `suppression_reason` is present.
/// - `confidence` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutput {
    /// Chassis selected by the policy.
    pub chassis_type: ChassisType,
    /// TopStrike selection, when the win margin is sufficient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_strike_selection: Option<RunnerId>,
    /// Score-ranked supported set, best first.
    pub top_4_structure: Vec<RunnerId>,
    /// Each-way value candidates.
    #[serde(default)]
    pub value_ew: Vec<RunnerId>,
    /// Runners actively opposed.
    #[serde(default)]
    pub fade_zone: Vec<RunnerId>,
    /// Market role per runner across the whole field.
    #[serde(default)]
    pub market_roles: BTreeMap<RunnerId, MarketRole>,
    /// Whether the win bet was suppressed.
    pub win_suppressed: bool,
    /// Concatenated failing conditions when suppressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<String>,
    /// Policy confidence in `[0, 1]`.
    pub confidence: f64,
    /// Learning gate status; `None` until the gate stage runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_gate_status: Option<LearningStatus>,
    /// Signals snapshot for audit.
    pub notes: DecisionNotes,
}

impl DecisionOutput {
    /// Appends a suppression reason, concatenating with `"; "` when one is
    /// already present.
    pub fn push_suppression_reason(&mut self, reason: &str) {
        match &mut self.suppression_reason {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(reason);
            }
            None => self.suppression_reason = Some(reason.to_string()),
        }
    }
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

    use super::ChassisType;
    use super::DecisionNotes;
    use super::DecisionOutput;

    #[test]
    fn suppression_reasons_concatenate() {
        let mut decision = DecisionOutput {
            chassis_type: ChassisType::Top4Structure,
            top_strike_selection: None,
            top_4_structure: Vec::new(),
            value_ew: Vec::new(),
            fade_zone: Vec::new(),
            market_roles: std::collections::BTreeMap::new(),
            win_suppressed: true,
            suppression_reason: None,
            confidence: 0.60,
            learning_gate_status: None,
            notes: DecisionNotes::default(),
        };
        decision.push_suppression_reason("Not Release Horse");
        decision.push_suppression_reason("Intent not Win");
        assert_eq!(
            decision.suppression_reason.as_deref(),
            Some("Not Release Horse; Intent not Win")
        );
    }

    #[test]
    fn chassis_wire_labels_are_stable() {
        let json = serde_json::to_string(&ChassisType::WinOverlay).expect("serialize");
        assert_eq!(json, "\"Win_Overlay\"");
        let json = serde_json::to_string(&ChassisType::Top4Structure).expect("serialize");
        assert_eq!(json, "\"Top_4_Structure\"");
    }
}
