// crates/furlong-core/src/runtime/chaos.rs
// ============================================================================
// Module: Furlong Chaos Signals
// Description: Concentration, inequality, and field-size chaos metrics.
// Purpose: Summarize market dispersion as a deterministic [0, 1] scalar.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Chaos is computed from a single odds snapshot, no history required:
//! implied probabilities feed a renormalized HHI (concentration) and a Gini
//! coefficient (inequality), blended with a field-size factor. Low HHI, low
//! Gini, and a large field all push chaos up; a dominant favorite pulls it
//! down. Manipulation risk is an explicit stub under the live-only regime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::core::context::Runner;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Chaos returned when the odds vector is empty or unusable.
pub const DEFAULT_CHAOS: f64 = 0.5;

/// HHI weight in the chaos blend.
const HHI_WEIGHT: f64 = 0.4;

/// Gini weight in the chaos blend.
const GINI_WEIGHT: f64 = 0.3;

/// Field-size weight in the chaos blend.
const FIELD_WEIGHT: f64 = 0.3;

// ============================================================================
// SECTION: Signal Output
// ============================================================================

/// Chaos signal with its inputs preserved for audit.
///
/// # Invariants
/// - All values are clamped to `[0, 1]`; no NaN propagates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChaosSignal {
    /// Blended chaos level.
    pub chaos_level: f64,
    /// Renormalized Herfindahl-Hirschman index.
    pub hhi: f64,
    /// Gini coefficient over implied probabilities.
    pub gini: f64,
    /// Field-size factor.
    pub field_factor: f64,
    /// Set when the input vector was empty and the default was returned.
    pub degraded_input: bool,
}

// ============================================================================
// SECTION: Component Metrics
// ============================================================================

/// Computes the Herfindahl-Hirschman index over implied probabilities.
///
/// Probabilities are renormalized to sum to 1 before squaring, so overround
/// in the book does not distort concentration. Range: `1/n` (flat) to `1.0`
/// (monopoly). Empty or zero-mass input returns [`DEFAULT_CHAOS`].
#[must_use]
pub fn calculate_hhi(implied_probs: &[f64]) -> f64 {
    if implied_probs.is_empty() {
        return DEFAULT_CHAOS;
    }
    let total: f64 = implied_probs.iter().sum();
    if total <= 0.0 {
        return DEFAULT_CHAOS;
    }
    implied_probs.iter().map(|p| (p / total) * (p / total)).sum()
}

/// Computes the Gini coefficient over implied probabilities.
///
/// Range: `0.0` (perfect equality) to `1.0` (perfect inequality). Inputs
/// shorter than two return `0.0`.
#[must_use]
pub fn calculate_gini(implied_probs: &[f64]) -> f64 {
    if implied_probs.len() < 2 {
        return 0.0;
    }
    let mut sorted = implied_probs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let total: f64 = sorted.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let mut cumsum = 0.0;
    for (index, prob) in sorted.iter().enumerate() {
        // Index weight 2(i+1) - n - 1 over the sorted vector.
        let weight = 2.0 * (index as f64 + 1.0) - n as f64 - 1.0;
        cumsum += weight * prob;
    }
    (cumsum / (n as f64 * total)).clamp(0.0, 1.0)
}

/// Computes the field-size factor: 0.0 at five runners, 1.0 at twenty.
#[must_use]
pub fn field_factor(field_size: usize) -> f64 {
    ((field_size as f64 - 5.0) / 15.0).clamp(0.0, 1.0)
}

// ============================================================================
// SECTION: Chaos Level
// ============================================================================

/// Computes the chaos signal from a decimal odds vector and field size.
///
/// Single-runner races return zero chaos. An empty vector returns
/// [`DEFAULT_CHAOS`] with `degraded_input` set; callers fail fast on invalid
/// odds before this point, so non-positive entries are skipped defensively
/// rather than poisoning the blend.
#[must_use]
pub fn calculate_chaos(odds: &[f64], field_size: usize) -> ChaosSignal {
    if odds.is_empty() || field_size == 0 {
        return ChaosSignal {
            chaos_level: DEFAULT_CHAOS,
            hhi: DEFAULT_CHAOS,
            gini: 0.0,
            field_factor: 0.0,
            degraded_input: true,
        };
    }
    if field_size == 1 {
        return ChaosSignal {
            chaos_level: 0.0,
            hhi: 1.0,
            gini: 0.0,
            field_factor: 0.0,
            degraded_input: false,
        };
    }

    let implied: Vec<f64> = odds
        .iter()
        .filter(|value| value.is_finite() && **value > 0.0)
        .map(|value| 1.0 / value)
        .collect();
    if implied.is_empty() {
        return ChaosSignal {
            chaos_level: DEFAULT_CHAOS,
            hhi: DEFAULT_CHAOS,
            gini: 0.0,
            field_factor: 0.0,
            degraded_input: true,
        };
    }

    let hhi = calculate_hhi(&implied);
    let gini = calculate_gini(&implied);
    let field = field_factor(field_size);

    // Low concentration and low inequality both read as chaos; a strong
    // favorite (high Gini) reads as structure.
    let chaos = HHI_WEIGHT * (1.0 - hhi) + GINI_WEIGHT * (1.0 - gini) + FIELD_WEIGHT * field;

    ChaosSignal {
        chaos_level: chaos.clamp(0.0, 1.0),
        hhi: hhi.clamp(0.0, 1.0),
        gini,
        field_factor: field,
        degraded_input: false,
    }
}

/// Computes the chaos signal from a runner list, skipping absent odds.
#[must_use]
pub fn calculate_chaos_for_runners(runners: &[Runner]) -> ChaosSignal {
    let odds: Vec<f64> = runners
        .iter()
        .filter_map(|runner| runner.odds_decimal)
        .filter(|value| *value > 0.0)
        .collect();
    calculate_chaos(&odds, odds.len())
}

// ============================================================================
// SECTION: Manipulation Risk
// ============================================================================

/// Returns the manipulation risk for a market snapshot.
///
/// Live-only regime: this is a stub returning 0.0. A time-series detector is
/// reserved for when odds history is available; until then hosts may inject
/// a value through [`EngineConfig::manipulation_override`] so downstream
/// thresholds remain exercisable.
#[must_use]
pub fn manipulation_risk(config: &EngineConfig) -> f64 {
    config.manipulation_override.map_or(0.0, |value| value.clamp(0.0, 1.0))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
