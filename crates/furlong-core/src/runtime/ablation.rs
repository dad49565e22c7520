// crates/furlong-core/src/runtime/ablation.rs
// ============================================================================
// Module: Furlong Ablation Harness
// Description: Feature-domain silencing tests over a predict callback.
// Purpose: Measure decision fragility; fragile decisions must not train.
// Dependencies: crate::core, crate::interfaces, crate::runtime::features, serde
// ============================================================================

//! ## Overview
//! Five ablations silence one feature domain each (market, trainer/jockey,
//! form, pace, course/going/distance) by zeroing the domain's columns on a
//! copy of the frame, then re-run the model. A selection flip or a large
//! probability swing on the original top selection marks the decision
//! fragile. The harness is pure with respect to the model and never mutates
//! the input frame.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::interfaces::PredictModel;
use crate::interfaces::Prediction;
use crate::runtime::features::FeatureDomain;
use crate::runtime::features::FeatureFrame;

// ============================================================================
// SECTION: Ablation Set
// ============================================================================

/// The five domain ablations in declaration order.
pub const ABLATION_SET: &[(&str, FeatureDomain)] = &[
    ("remove_market", FeatureDomain::Market),
    ("remove_trainer_jockey", FeatureDomain::TrainerJockey),
    ("remove_form", FeatureDomain::Form),
    ("remove_pace", FeatureDomain::Pace),
    ("remove_course_going", FeatureDomain::CourseGoingDistance),
];

// ============================================================================
// SECTION: Results
// ============================================================================

/// Result of one domain ablation.
///
/// # Invariants
/// - `selection_flipped` iff the ablated top differs from the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AblationResult {
    /// Ablation name from [`ABLATION_SET`].
    pub ablation_name: String,
    /// Feature names that were silenced.
    pub features_removed: Vec<String>,
    /// Original top selection.
    pub original_top_selection: String,
    /// Top selection after silencing.
    pub ablated_top_selection: String,
    /// Whether the top selection changed.
    pub selection_flipped: bool,
    /// Absolute probability change on the original top selection.
    pub prob_delta: f64,
    /// How far the original top fell in the ablated ranking.
    pub rank_delta: usize,
    /// Model error recorded for this ablation, when one occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate ablation suite result.
///
/// # Invariants
/// - `fragile` iff `flip_count >= max_flips` threshold crossing or
///   `prob_delta_max` exceeds the configured budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AblationSuite {
    /// Every ablation result in declaration order.
    pub ablations: Vec<AblationResult>,
    /// Count of ablations that flipped the selection.
    pub flip_count: u32,
    /// Maximum probability delta across ablations.
    pub prob_delta_max: f64,
    /// Maximum rank delta across ablations.
    pub rank_delta_max: usize,
    /// Whether the decision is fragile.
    pub fragile: bool,
    /// Explanation when fragile; empty otherwise.
    pub fragility_reason: String,
}

impl AblationSuite {
    /// Returns the clean suite used when no model callback is configured.
    #[must_use]
    pub fn clean() -> Self {
        Self {
            ablations: Vec::new(),
            flip_count: 0,
            prob_delta_max: 0.0,
            rank_delta_max: 0,
            fragile: false,
            fragility_reason: String::new(),
        }
    }

    /// Builds a suite summary from externally supplied counts.
    ///
    /// Used by backtests and scenario fixtures that carry precomputed
    /// ablation outcomes.
    #[must_use]
    pub fn from_summary(flip_count: u32, prob_delta_max: f64, config: &EngineConfig) -> Self {
        let mut suite = Self::clean();
        suite.flip_count = flip_count;
        suite.prob_delta_max = prob_delta_max;
        apply_fragility(&mut suite, config);
        suite
    }
}

/// Applies the fragility rule to a suite in place.
fn apply_fragility(suite: &mut AblationSuite, config: &EngineConfig) {
    let flips_over = suite.flip_count >= config.ablation_max_flips.max(1);
    let delta_over = suite.prob_delta_max > config.ablation_max_prob_delta;
    suite.fragile = flips_over || delta_over;
    if suite.fragile {
        let mut reasons = Vec::new();
        if flips_over {
            reasons.push(format!(
                "{} flips (max {})",
                suite.flip_count,
                config.ablation_max_flips
            ));
        }
        if delta_over {
            reasons.push(format!(
                "prob delta {:.2} (max {:.2})",
                suite.prob_delta_max, config.ablation_max_prob_delta
            ));
        }
        suite.fragility_reason = reasons.join("; ");
    } else {
        suite.fragility_reason = String::new();
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Runs one domain ablation against the model.
fn run_single_ablation(
    frame: &FeatureFrame,
    model: &dyn PredictModel,
    name: &str,
    domain: FeatureDomain,
    original: &Prediction,
) -> AblationResult {
    let features: Vec<&str> = domain.features().to_vec();
    let silenced = frame.with_columns_zeroed(&features);

    match model.predict(&silenced) {
        Ok(ablated) => {
            let flipped = ablated.top_selection != original.top_selection;
            let original_prob = original.probability_of(&original.top_selection);
            let ablated_prob = ablated.probability_of(&original.top_selection);
            let rank_delta = ablated.rank_of(&original.top_selection).unwrap_or(0);
            AblationResult {
                ablation_name: name.to_string(),
                features_removed: features.iter().map(|f| (*f).to_string()).collect(),
                original_top_selection: original.top_selection.to_string(),
                ablated_top_selection: ablated.top_selection.to_string(),
                selection_flipped: flipped,
                prob_delta: (original_prob - ablated_prob).abs(),
                rank_delta,
                error: None,
            }
        }
        // A model failure reads as a conservative non-flip with the error
        // preserved for the audit trail.
        Err(err) => AblationResult {
            ablation_name: name.to_string(),
            features_removed: features.iter().map(|f| (*f).to_string()).collect(),
            original_top_selection: original.top_selection.to_string(),
            ablated_top_selection: original.top_selection.to_string(),
            selection_flipped: false,
            prob_delta: 0.0,
            rank_delta: 0,
            error: Some(err.to_string()),
        },
    }
}

/// Runs the full ablation suite over a frame and model.
///
/// The input frame is never mutated; every ablation silences a copy.
#[must_use]
pub fn run_ablation_suite(
    frame: &FeatureFrame,
    model: &dyn PredictModel,
    original: &Prediction,
    config: &EngineConfig,
) -> AblationSuite {
    let ablations: Vec<AblationResult> = ABLATION_SET
        .iter()
        .map(|(name, domain)| run_single_ablation(frame, model, name, *domain, original))
        .collect();

    let flip_count =
        u32::try_from(ablations.iter().filter(|a| a.selection_flipped).count()).unwrap_or(u32::MAX);
    let prob_delta_max = ablations.iter().map(|a| a.prob_delta).fold(0.0, f64::max);
    let rank_delta_max = ablations.iter().map(|a| a.rank_delta).max().unwrap_or(0);

    let mut suite = AblationSuite {
        ablations,
        flip_count,
        prob_delta_max,
        rank_delta_max,
        fragile: false,
        fragility_reason: String::new(),
    };
    apply_fragility(&mut suite, config);
    suite
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

    use std::collections::BTreeMap;

    use super::ABLATION_SET;
    use super::AblationSuite;
    use super::run_ablation_suite;
    use crate::core::config::EngineConfig;
    use crate::core::identifiers::RunnerId;
    use crate::interfaces::ModelError;
    use crate::interfaces::PredictModel;
    use crate::interfaces::Prediction;
    use crate::runtime::features::FeatureFrame;

    /// Picks the runner with the highest `rpr`; falls back to odds rank.
    struct RprModel;

    impl PredictModel for RprModel {
        fn predict(&self, frame: &FeatureFrame) -> Result<Prediction, ModelError> {
            let column = frame
                .column("rpr")
                .ok_or_else(|| ModelError::Prediction("rpr column missing".to_string()))?;
            let mut best = 0usize;
            for (index, value) in column.values.iter().enumerate() {
                if *value > column.values[best] {
                    best = index;
                }
            }
            let ids = frame.row_ids();
            let total: f64 = column.values.iter().map(|v| v.max(1.0)).sum();
            let probabilities: BTreeMap<RunnerId, f64> = ids
                .iter()
                .zip(&column.values)
                .map(|(id, value)| (id.clone(), value.max(1.0) / total))
                .collect();
            Ok(Prediction {
                top_selection: ids[best].clone(),
                probabilities,
            })
        }
    }

    /// Always fails; exercises the conservative error path.
    struct FailingModel;

    impl PredictModel for FailingModel {
        fn predict(&self, _frame: &FeatureFrame) -> Result<Prediction, ModelError> {
            Err(ModelError::Prediction("backend offline".to_string()))
        }
    }

    fn frame() -> FeatureFrame {
        let mut frame = FeatureFrame::new(vec![
            RunnerId::new("r1"),
            RunnerId::new("r2"),
            RunnerId::new("r3"),
        ]);
        frame.push_column("rpr", vec![95.0, 92.0, 88.0]).expect("rpr");
        frame.push_column("odds_decimal", vec![3.5, 5.0, 8.0]).expect("odds");
        frame.push_column("consistency_score", vec![0.8, 0.6, 0.4]).expect("consistency");
        frame
    }

    #[test]
    fn stable_model_survives_all_ablations() {
        // The model reads rpr (CORE domain), which no ablation silences.
        let frame = frame();
        let model = RprModel;
        let original = model.predict(&frame).expect("original");
        let suite = run_ablation_suite(&frame, &model, &original, &EngineConfig::default());
        assert_eq!(suite.ablations.len(), ABLATION_SET.len());
        assert_eq!(suite.flip_count, 0);
        assert!(!suite.fragile);
        assert!(suite.fragility_reason.is_empty());
    }

    #[test]
    fn harness_never_mutates_the_input_frame() {
        let frame = frame();
        let before = frame.clone();
        let model = RprModel;
        let original = model.predict(&frame).expect("original");
        let _ = run_ablation_suite(&frame, &model, &original, &EngineConfig::default());
        assert_eq!(frame, before);
    }

    #[test]
    fn model_errors_read_as_conservative_non_flips() {
        let frame = frame();
        let original = RprModel.predict(&frame).expect("original");
        let suite =
            run_ablation_suite(&frame, &FailingModel, &original, &EngineConfig::default());
        assert_eq!(suite.flip_count, 0);
        assert!(suite.ablations.iter().all(|a| a.error.is_some()));
        assert!(!suite.fragile);
    }

    #[test]
    fn summary_applies_the_fragility_rule() {
        let config = EngineConfig::default();
        let clean = AblationSuite::from_summary(0, 0.05, &config);
        assert!(!clean.fragile);

        let flipped = AblationSuite::from_summary(2, 0.05, &config);
        assert!(flipped.fragile);
        assert!(flipped.fragility_reason.contains("flips"));

        let swung = AblationSuite::from_summary(0, 0.18, &config);
        assert!(swung.fragile);
        assert!(swung.fragility_reason.contains("prob delta"));
    }

    #[test]
    fn one_flip_marks_fragile_under_default_config() {
        let suite = AblationSuite::from_summary(1, 0.0, &EngineConfig::default());
        assert!(suite.fragile);
    }
}
