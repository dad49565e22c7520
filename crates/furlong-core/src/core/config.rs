// crates/furlong-core/src/core/config.rs
// ============================================================================
// Module: Furlong Engine Configuration
// Description: Enumerated engine thresholds and caps with validated defaults.
// Purpose: Keep every tunable explicit; no behavior depends on undeclared
// options.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The engine configuration is a flat, fully enumerated set of thresholds and
//! caps. Unknown keys are rejected at deserialization time. Defaults match
//! the deployed doctrine; validation bounds every threshold to its sane
//! range before a pipeline will accept the config.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine configuration validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A threshold or cap is outside its valid range.
    #[error("config value out of range: {field} = {value} (expected {expected})")]
    OutOfRange {
        /// Offending field name.
        field: &'static str,
        /// Offending value rendered as text.
        value: String,
        /// Human description of the valid range.
        expected: &'static str,
    },
}

// ============================================================================
// SECTION: Historical Caps
// ============================================================================

/// Per-source caps on the historical-stats modifier.
///
/// # Invariants
/// - All caps are non-negative and at most 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoricalStatsCaps {
    /// Cap on the trainer modifier magnitude.
    #[serde(default = "default_trainer_cap")]
    pub trainer: f64,
    /// Cap on the jockey modifier magnitude.
    #[serde(default = "default_jockey_cap")]
    pub jockey: f64,
    /// Cap on the combination modifier magnitude.
    #[serde(default = "default_combo_cap")]
    pub combo: f64,
}

/// Returns the default trainer cap.
const fn default_trainer_cap() -> f64 {
    0.05
}

/// Returns the default jockey cap.
const fn default_jockey_cap() -> f64 {
    0.05
}

/// Returns the default combination cap.
const fn default_combo_cap() -> f64 {
    0.03
}

impl Default for HistoricalStatsCaps {
    fn default() -> Self {
        Self {
            trainer: default_trainer_cap(),
            jockey: default_jockey_cap(),
            combo: default_combo_cap(),
        }
    }
}

// ============================================================================
// SECTION: Engine Config
// ============================================================================

/// Engine thresholds, caps, and stage budgets.
///
/// # Invariants
/// - Unknown keys are rejected.
/// - `validate` must pass before a pipeline accepts the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Boundary between chaos and structure races.
    #[serde(default = "default_chaos_threshold")]
    pub chaos_threshold: f64,
    /// Manipulation gate for rejected learning.
    #[serde(default = "default_manipulation_threshold")]
    pub manipulation_threshold: f64,
    /// Convergence floor for stability in structure races.
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: f64,
    /// Convergence floor for pace geometry in structure races.
    #[serde(default = "default_pace_geometry_threshold")]
    pub pace_geometry_threshold: f64,
    /// Maximum ablation flips before fragility.
    #[serde(default = "default_ablation_max_flips")]
    pub ablation_max_flips: u32,
    /// Maximum ablation probability delta before fragility.
    #[serde(default = "default_ablation_max_prob_delta")]
    pub ablation_max_prob_delta: f64,
    /// Minimum implied probability for the anchor guard.
    #[serde(default = "default_anchor_guard_min_prob")]
    pub anchor_guard_min_prob: f64,
    /// Maximum manipulation risk for the anchor guard.
    #[serde(default = "default_anchor_guard_max_manip")]
    pub anchor_guard_max_manip: f64,
    /// Base TopStrike margin requirement.
    #[serde(default = "default_topstrike_base_margin")]
    pub topstrike_base_margin: f64,
    /// Chaos slope added to the TopStrike margin.
    #[serde(default = "default_topstrike_chaos_slope")]
    pub topstrike_chaos_slope: f64,
    /// Per-source historical modifier caps.
    #[serde(default)]
    pub historical_stats_caps: HistoricalStatsCaps,
    /// Cap on the stability-cluster trust modifier magnitude.
    #[serde(default = "default_stability_modifier_cap")]
    pub stability_modifier_cap: f64,
    /// Per-stage execution budget in milliseconds.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    /// Test-only override for the manipulation-risk stub; `None` keeps the
    /// live stub value of 0.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manipulation_override: Option<f64>,
    /// Whether the pipeline records wall-clock stage timings; off by default
    /// so replays stay byte-identical.
    #[serde(default)]
    pub record_timings: bool,
}

/// Returns the default chaos threshold.
const fn default_chaos_threshold() -> f64 {
    0.60
}

/// Returns the default manipulation threshold.
const fn default_manipulation_threshold() -> f64 {
    0.60
}

/// Returns the default stability threshold.
const fn default_stability_threshold() -> f64 {
    0.65
}

/// Returns the default pace-geometry threshold.
const fn default_pace_geometry_threshold() -> f64 {
    0.65
}

/// Returns the default ablation flip budget.
const fn default_ablation_max_flips() -> u32 {
    1
}

/// Returns the default ablation probability-delta budget.
const fn default_ablation_max_prob_delta() -> f64 {
    0.15
}

/// Returns the default anchor-guard minimum implied probability.
const fn default_anchor_guard_min_prob() -> f64 {
    0.62
}

/// Returns the default anchor-guard manipulation ceiling.
const fn default_anchor_guard_max_manip() -> f64 {
    0.45
}

/// Returns the default TopStrike base margin.
const fn default_topstrike_base_margin() -> f64 {
    0.12
}

/// Returns the default TopStrike chaos slope.
const fn default_topstrike_chaos_slope() -> f64 {
    0.10
}

/// Returns the default stability modifier cap.
const fn default_stability_modifier_cap() -> f64 {
    0.10
}

/// Returns the default per-stage budget in milliseconds.
const fn default_stage_timeout_ms() -> u64 {
    5_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chaos_threshold: default_chaos_threshold(),
            manipulation_threshold: default_manipulation_threshold(),
            stability_threshold: default_stability_threshold(),
            pace_geometry_threshold: default_pace_geometry_threshold(),
            ablation_max_flips: default_ablation_max_flips(),
            ablation_max_prob_delta: default_ablation_max_prob_delta(),
            anchor_guard_min_prob: default_anchor_guard_min_prob(),
            anchor_guard_max_manip: default_anchor_guard_max_manip(),
            topstrike_base_margin: default_topstrike_base_margin(),
            topstrike_chaos_slope: default_topstrike_chaos_slope(),
            historical_stats_caps: HistoricalStatsCaps::default(),
            stability_modifier_cap: default_stability_modifier_cap(),
            stage_timeout_ms: default_stage_timeout_ms(),
            manipulation_override: None,
            record_timings: false,
        }
    }
}

impl EngineConfig {
    /// Validates every threshold and cap against its range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        /// Checks that a unit-interval field is within `[0, 1]`.
        fn unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: value.to_string(),
                    expected: "[0, 1]",
                });
            }
            Ok(())
        }

        unit("chaos_threshold", self.chaos_threshold)?;
        unit("manipulation_threshold", self.manipulation_threshold)?;
        unit("stability_threshold", self.stability_threshold)?;
        unit("pace_geometry_threshold", self.pace_geometry_threshold)?;
        unit("ablation_max_prob_delta", self.ablation_max_prob_delta)?;
        unit("anchor_guard_min_prob", self.anchor_guard_min_prob)?;
        unit("anchor_guard_max_manip", self.anchor_guard_max_manip)?;
        unit("topstrike_base_margin", self.topstrike_base_margin)?;
        unit("topstrike_chaos_slope", self.topstrike_chaos_slope)?;
        unit("stability_modifier_cap", self.stability_modifier_cap)?;
        unit("historical_stats_caps.trainer", self.historical_stats_caps.trainer)?;
        unit("historical_stats_caps.jockey", self.historical_stats_caps.jockey)?;
        unit("historical_stats_caps.combo", self.historical_stats_caps.combo)?;
        if let Some(value) = self.manipulation_override {
            unit("manipulation_override", value)?;
        }
        if self.stage_timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "stage_timeout_ms",
                value: self.stage_timeout_ms.to_string(),
                expected: "greater than zero",
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
