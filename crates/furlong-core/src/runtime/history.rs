// crates/furlong-core/src/runtime/history.rs
// ============================================================================
// Module: Furlong Historical-Stats Modifier
// Description: Bounded score adjustments from trainer/jockey strike rates.
// Purpose: Treat history as a confidence prior, never a predictor.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Historical strike rates contribute a bounded score adjustment: each source
//! deviates from a baseline, decays with sample size, and is capped per
//! source; the aggregate is hard-capped at ±0.05. Combo mode is mutually
//! exclusive with trainer+jockey. Missing stats contribute zero with a
//! `no_historical_stats` reason; stats can never override stability signals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::config::HistoricalStatsCaps;
use crate::core::context::HistoricalStats;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Baseline win rate against which deviations are measured.
const BASELINE_WIN_RATE: f64 = 0.10;

/// Sample size at which a source carries full weight.
const FULL_WEIGHT_SAMPLES: u32 = 10;

/// Hard cap on the aggregate modifier magnitude.
pub const AGGREGATE_CAP: f64 = 0.05;

// ============================================================================
// SECTION: Distance Bands
// ============================================================================

/// Classifies a race distance into the band used to scope stats.
#[must_use]
pub const fn classify_distance_band(distance_meters: u32) -> &'static str {
    if distance_meters < 1_400 {
        "SPRINT"
    } else if distance_meters < 1_800 {
        "MILE"
    } else if distance_meters < 2_400 {
        "MIDDLE"
    } else {
        "LONG"
    }
}

// ============================================================================
// SECTION: Modifier Output
// ============================================================================

/// Composite historical modifier with per-source audit values.
///
/// # Invariants
/// - `total_modifier` is within ±[`AGGREGATE_CAP`].
/// - `reason` always names the contributing sources or the absence of stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalModifier {
    /// Aggregate modifier applied to the composite score.
    pub total_modifier: f64,
    /// Trainer contribution.
    pub trainer_modifier: f64,
    /// Jockey contribution.
    pub jockey_modifier: f64,
    /// Combination contribution.
    pub combo_modifier: f64,
    /// Audit reason string.
    pub reason: String,
}

impl HistoricalModifier {
    /// Returns the zero modifier used when no stats are available.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            total_modifier: 0.0,
            trainer_modifier: 0.0,
            jockey_modifier: 0.0,
            combo_modifier: 0.0,
            reason: "no_historical_stats".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Calculation
// ============================================================================

/// Computes the sample-size weight with linear decay below the threshold.
#[must_use]
pub fn sample_weight(sample_size: u32) -> f64 {
    if sample_size == 0 {
        return 0.0;
    }
    (f64::from(sample_size) / f64::from(FULL_WEIGHT_SAMPLES)).min(1.0)
}

/// Computes one source's modifier and its audit reason.
///
/// `modifier = clamp((rate − baseline) · sample_weight, −cap, +cap)`.
#[must_use]
pub fn stat_modifier(win_rate: f64, sample_size: u32, cap: f64) -> (f64, String) {
    let weight = sample_weight(sample_size);
    if weight <= 0.0 {
        return (0.0, format!("insufficient_sample_size={sample_size}"));
    }
    let deviation = win_rate - BASELINE_WIN_RATE;
    let modifier = (deviation * weight).clamp(-cap, cap);
    let reason = format!(
        "win_rate={win_rate:.3},baseline={BASELINE_WIN_RATE:.3},samples={sample_size},weight={weight:.2}"
    );
    (modifier, reason)
}

/// Computes the composite historical modifier.
///
/// Combo mode is exclusive with trainer+jockey: when `use_combo` is set the
/// individual sources contribute nothing. The aggregate is hard-capped at
/// ±[`AGGREGATE_CAP`] even if per-source caps would allow more.
#[must_use]
pub fn historical_modifier(
    stats: Option<&HistoricalStats>,
    caps: &HistoricalStatsCaps,
    use_trainer: bool,
    use_jockey: bool,
    use_combo: bool,
) -> HistoricalModifier {
    let Some(stats) = stats else {
        return HistoricalModifier::absent();
    };

    let mut trainer_modifier = 0.0;
    let mut jockey_modifier = 0.0;
    let mut combo_modifier = 0.0;
    let reason;
    let total;

    if use_combo {
        let (modifier, combo_reason) =
            stat_modifier(stats.combo_win_rate, stats.combo_sample_size, caps.combo);
        combo_modifier = modifier;
        total = combo_modifier;
        reason = format!("combo:{combo_reason}");
    } else {
        let mut trainer_reason = "not_used".to_string();
        let mut jockey_reason = "not_used".to_string();
        if use_trainer {
            let (modifier, source_reason) = stat_modifier(
                stats.trainer_win_rate,
                stats.trainer_sample_size,
                caps.trainer,
            );
            trainer_modifier = modifier;
            trainer_reason = source_reason;
        }
        if use_jockey {
            let (modifier, source_reason) =
                stat_modifier(stats.jockey_win_rate, stats.jockey_sample_size, caps.jockey);
            jockey_modifier = modifier;
            jockey_reason = source_reason;
        }
        total = trainer_modifier + jockey_modifier;
        reason = format!("trainer:{trainer_reason};jockey:{jockey_reason}");
    }

    HistoricalModifier {
        total_modifier: total.clamp(-AGGREGATE_CAP, AGGREGATE_CAP),
        trainer_modifier,
        jockey_modifier,
        combo_modifier,
        reason,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
