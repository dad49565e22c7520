// crates/furlong-core/src/core/score.rs
// ============================================================================
// Module: Furlong Score Breakdown
// Description: Per-runner composite score with auditable components.
// Purpose: Guarantee that every ranked runner exposes how its score arose.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every runner receives a [`ScoreBreakdown`]: a composite total plus the
//! named components that produced it. The contract is that the numeric
//! components sum to the total within 0.01; summation always iterates in
//! sorted component-key order so audits can reproduce the total exactly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Absolute tolerance for the components-sum-to-total contract.
pub const SCORE_SUM_TOLERANCE: f64 = 0.01;

// ============================================================================
// SECTION: Components
// ============================================================================

/// Named score components for one runner.
///
/// # Invariants
/// - Numeric fields sum to the breakdown total within
///   [`SCORE_SUM_TOLERANCE`].
/// - Reason strings are audit labels, never part of the numeric sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    /// Stability-cluster trust modifier.
    pub stability: f64,
    /// Historical strike-rate modifier.
    pub historical: f64,
    /// Weighted market-role strength.
    pub role: f64,
    /// Odds-derived implied-probability component.
    pub odds: f64,
    /// Chaos adjustment for the race regime.
    pub chaos: f64,
    /// Field-size component.
    pub field: f64,
    /// Anchor guard boost for strong favorites in clean markets.
    pub anchor_guard: f64,
    /// Cluster label (or `not_available`) behind the stability modifier.
    pub stability_reason: String,
    /// Source label (or `no_historical_stats`) behind the historical
    /// modifier.
    pub historical_reason: String,
}

impl ScoreComponents {
    /// Sums the numeric components in sorted component-key order.
    ///
    /// Order: `anchor_guard`, `chaos`, `field`, `historical`, `odds`,
    /// `role`, `stability`.
    #[must_use]
    pub fn numeric_sum(&self) -> f64 {
        self.anchor_guard + self.chaos + self.field + self.historical + self.odds
            + self.role
            + self.stability
    }
}

// ============================================================================
// SECTION: Breakdown
// ============================================================================

/// Composite score for one runner with its component breakdown.
///
/// # Invariants
/// - `total` is finite and non-negative for valid inputs.
/// - `components.numeric_sum()` matches `total` within
///   [`SCORE_SUM_TOLERANCE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Composite total score.
    pub total: f64,
    /// Named component breakdown.
    pub components: ScoreComponents,
}

impl ScoreBreakdown {
    /// Returns whether the components sum to the total within tolerance.
    #[must_use]
    pub fn sum_matches_total(&self) -> bool {
        (self.components.numeric_sum() - self.total).abs() < SCORE_SUM_TOLERANCE
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

    use super::ScoreBreakdown;
    use super::ScoreComponents;

    fn breakdown() -> ScoreBreakdown {
        let components = ScoreComponents {
            stability: 0.05,
            historical: 0.02,
            role: 0.40,
            odds: 0.20,
            chaos: 0.15,
            field: 0.05,
            anchor_guard: 0.10,
            stability_reason: "STABLE_HIGH_IMPROVING_TOP".to_string(),
            historical_reason: "trainer:win_rate=0.220".to_string(),
        };
        ScoreBreakdown {
            total: components.numeric_sum(),
            components,
        }
    }

    #[test]
    fn components_sum_to_total() {
        assert!(breakdown().sum_matches_total());
    }

    #[test]
    fn drifted_total_fails_contract() {
        let mut drifted = breakdown();
        drifted.total += 0.02;
        assert!(!drifted.sum_matches_total());
    }
}
