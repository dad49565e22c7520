// crates/furlong-core/src/runtime/learning_gate.rs
// ============================================================================
// Module: Furlong Learning Gate (ADLG)
// Description: Gate conditions deciding whether race learnings may commit.
// Purpose: Prevent the engine from being trained into losing.
// Dependencies: crate::core, crate::runtime::ablation, serde
// ============================================================================

//! ## Overview
//! Five scored conditions guard learning: signal convergence, manipulation,
//! ablation robustness, verified outcome, and integrity. All pass commits;
//! a manipulation failure rejects outright; anything else quarantines. The
//! gate is the only component allowed to declare that a race may update
//! state, and it never mutates state itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::core::context::RaceOutcome;
use crate::core::gate::GateCondition;
use crate::core::gate::LearningGateResult;
use crate::core::gate::LearningStatus;
use crate::runtime::ablation::AblationSuite;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Convergence floor for the blended signal score.
const SIGNAL_CONVERGENCE_THRESHOLD: f64 = 0.70;

/// Floor for the ablation robustness score used in quarantine reasoning.
const ABLATION_SCORE_THRESHOLD: f64 = 0.70;

// ============================================================================
// SECTION: Gate Inputs
// ============================================================================

/// Signal scores feeding the convergence condition.
///
/// # Invariants
/// - All values are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateSignals {
    /// Signal quality & pattern engine score.
    pub sqpe_score: f64,
    /// Stable-signal evaluation score.
    pub sses_score: f64,
    /// Trainer-intent engine score.
    pub tie_score: f64,
    /// Stability signal for the race.
    pub stability_score: f64,
    /// Manipulation risk for the market.
    pub manipulation_risk: f64,
}

impl GateSignals {
    /// Derives gate signals from the race-level signal bundle.
    ///
    /// Until the dedicated SQPE/SSES/TIE engines land, SQPE and TIE mirror
    /// the stability signal and SSES mirrors pace geometry; this is the
    /// placeholder wiring, not a modeling claim.
    #[must_use]
    pub const fn from_race_signals(signals: &crate::runtime::ranker::RaceSignals) -> Self {
        Self {
            sqpe_score: signals.stability_score,
            sses_score: signals.pace_geometry_score,
            tie_score: signals.stability_score,
            stability_score: signals.stability_score,
            manipulation_risk: signals.manipulation_risk,
        }
    }
}

/// Integrity check outcome consumed by condition five.
///
/// # Invariants
/// - `flags` is empty for a clean race; `pending` marks the pre-race state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntegrityCheck {
    /// Integrity flags raised for the race.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Whether the check is still pending (pre-race).
    #[serde(default)]
    pub pending: bool,
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Condition 1: blended signal convergence at or above the floor.
fn check_signal_convergence(signals: &GateSignals) -> GateCondition {
    let convergence = (signals.sqpe_score
        + signals.sses_score
        + signals.tie_score
        + signals.stability_score)
        / 4.0;
    let passed = convergence >= SIGNAL_CONVERGENCE_THRESHOLD;
    GateCondition {
        name: "signal_convergence".to_string(),
        passed,
        score: convergence,
        threshold: SIGNAL_CONVERGENCE_THRESHOLD,
        reason: if passed {
            String::new()
        } else {
            format!("Convergence {convergence:.2}")
        },
    }
}

/// Condition 2: manipulation risk at or below the configured ceiling.
fn check_manipulation(signals: &GateSignals, config: &EngineConfig) -> GateCondition {
    let passed = signals.manipulation_risk <= config.manipulation_threshold;
    GateCondition {
        name: "manipulation_check".to_string(),
        passed,
        // Inverted so lower risk reads as a higher score.
        score: 1.0 - signals.manipulation_risk,
        threshold: 1.0 - config.manipulation_threshold,
        reason: if passed {
            String::new()
        } else {
            format!("Manipulation risk {:.2}", signals.manipulation_risk)
        },
    }
}

/// Condition 3: the decision survives feature-family silencing.
fn check_ablation_robustness(ablation: &AblationSuite, config: &EngineConfig) -> GateCondition {
    let passed = ablation.flip_count <= config.ablation_max_flips
        && ablation.prob_delta_max < config.ablation_max_prob_delta;
    let score =
        (1.0 - f64::from(ablation.flip_count) / 5.0 - ablation.prob_delta_max).max(0.0);
    GateCondition {
        name: "ablation_robustness".to_string(),
        passed,
        score,
        threshold: ABLATION_SCORE_THRESHOLD,
        reason: if passed {
            String::new()
        } else {
            format!(
                "{} flips, max delta {:.2}",
                ablation.flip_count, ablation.prob_delta_max
            )
        },
    }
}

/// Condition 4: the outcome is verified with a known winner.
fn check_outcome_verified(outcome: Option<&RaceOutcome>) -> GateCondition {
    let passed = outcome.is_some_and(|o| o.verified && o.winner_id.is_some());
    GateCondition {
        name: "outcome_verified".to_string(),
        passed,
        score: if passed { 1.0 } else { 0.0 },
        threshold: 1.0,
        reason: if passed {
            String::new()
        } else {
            "Outcome not verified or incomplete".to_string()
        },
    }
}

/// Condition 5: no integrity red flags.
fn check_integrity(integrity: &IntegrityCheck) -> GateCondition {
    let passed = integrity.flags.is_empty();
    GateCondition {
        name: "integrity_check".to_string(),
        passed,
        score: if passed { 1.0 } else { 0.0 },
        threshold: 1.0,
        reason: if passed {
            String::new()
        } else {
            format!("{} integrity flags", integrity.flags.len())
        },
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates the learning gate over a race's signals and outcome.
///
/// Pre-race callers pass `outcome = None` and a pending integrity check;
/// the result is then at best Quarantined until finalization re-evaluates
/// with the verified outcome.
#[must_use]
pub fn evaluate_learning_gate(
    signals: &GateSignals,
    ablation: &AblationSuite,
    outcome: Option<&RaceOutcome>,
    integrity: &IntegrityCheck,
    config: &EngineConfig,
) -> LearningGateResult {
    let conditions = vec![
        check_signal_convergence(signals),
        check_manipulation(signals, config),
        check_ablation_robustness(ablation, config),
        check_outcome_verified(outcome),
        check_integrity(integrity),
    ];

    let gate_score = conditions.iter().map(|c| c.score).sum::<f64>() / conditions.len() as f64;
    let all_passed = conditions.iter().all(|c| c.passed);
    let manipulation_failed = conditions
        .iter()
        .any(|c| c.name == "manipulation_check" && !c.passed);
    let ablation_weak = conditions
        .iter()
        .any(|c| c.name == "ablation_robustness" && c.score < 0.5);

    let (status, mut reasons) = if all_passed {
        (LearningStatus::Committed, vec!["All gate conditions passed".to_string()])
    } else if manipulation_failed {
        (LearningStatus::Rejected, vec!["High manipulation detected".to_string()])
    } else if ablation_weak {
        (
            LearningStatus::Quarantined,
            vec!["Ablation robustness failed - decision too fragile".to_string()],
        )
    } else {
        (
            LearningStatus::Quarantined,
            vec![format!("Gate score {gate_score:.2} below threshold")],
        )
    };

    for condition in &conditions {
        if !condition.passed && !condition.reason.is_empty() {
            reasons.push(format!("{}: {}", condition.name, condition.reason));
        }
    }

    LearningGateResult {
        learning_status: status,
        learning_gate_score: gate_score,
        conditions,
        gate_reasons: reasons,
        ablation_flips: ablation.flip_count,
        integrity_flags: integrity.flags.clone(),
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

    use std::collections::BTreeMap;

    use super::GateSignals;
    use super::IntegrityCheck;
    use super::evaluate_learning_gate;
    use crate::core::config::EngineConfig;
    use crate::core::context::RaceOutcome;
    use crate::core::gate::LearningStatus;
    use crate::core::identifiers::RaceId;
    use crate::core::identifiers::RunnerId;
    use crate::runtime::ablation::AblationSuite;

    fn signals(manipulation: f64) -> GateSignals {
        GateSignals {
            sqpe_score: 0.85,
            sses_score: 0.78,
            tie_score: 0.72,
            stability_score: 0.80,
            manipulation_risk: manipulation,
        }
    }

    fn verified_outcome() -> RaceOutcome {
        RaceOutcome {
            race_id: RaceId::new("R1"),
            winner_id: Some(RunnerId::new("r1")),
            positions: BTreeMap::new(),
            verified: true,
            starting_prices: None,
        }
    }

    #[test]
    fn all_conditions_passing_commits() {
        let result = evaluate_learning_gate(
            &signals(0.25),
            &AblationSuite::clean(),
            Some(&verified_outcome()),
            &IntegrityCheck::default(),
            &EngineConfig::default(),
        );
        assert_eq!(result.learning_status, LearningStatus::Committed);
        assert_eq!(result.gate_reasons, vec!["All gate conditions passed".to_string()]);
    }

    #[test]
    fn high_manipulation_rejects_with_reason() {
        let result = evaluate_learning_gate(
            &signals(0.70),
            &AblationSuite::clean(),
            Some(&verified_outcome()),
            &IntegrityCheck::default(),
            &EngineConfig::default(),
        );
        assert_eq!(result.learning_status, LearningStatus::Rejected);
        assert!(result.gate_reasons.iter().any(|r| r.to_lowercase().contains("manipulation")));
    }

    #[test]
    fn fragile_ablation_quarantines_with_reason() {
        let config = EngineConfig::default();
        let fragile = AblationSuite::from_summary(2, 0.18, &config);
        let result = evaluate_learning_gate(
            &signals(0.25),
            &fragile,
            Some(&verified_outcome()),
            &IntegrityCheck::default(),
            &config,
        );
        assert_eq!(result.learning_status, LearningStatus::Quarantined);
        assert!(result.gate_reasons.iter().any(|r| r.contains("ablation")));
        assert_eq!(result.ablation_flips, 2);
    }

    #[test]
    fn pre_race_evaluation_quarantines_on_pending_outcome() {
        let result = evaluate_learning_gate(
            &signals(0.25),
            &AblationSuite::clean(),
            None,
            &IntegrityCheck {
                flags: Vec::new(),
                pending: true,
            },
            &EngineConfig::default(),
        );
        assert_eq!(result.learning_status, LearningStatus::Quarantined);
        assert!(result.gate_reasons.iter().any(|r| r.contains("outcome_verified")));
    }

    #[test]
    fn integrity_flags_block_commit() {
        let result = evaluate_learning_gate(
            &signals(0.25),
            &AblationSuite::clean(),
            Some(&verified_outcome()),
            &IntegrityCheck {
                flags: vec!["late_non_runner_chaos".to_string()],
                pending: false,
            },
            &EngineConfig::default(),
        );
        assert_ne!(result.learning_status, LearningStatus::Committed);
        assert_eq!(result.integrity_flags.len(), 1);
    }

    #[test]
    fn weak_convergence_quarantines() {
        let weak = GateSignals {
            sqpe_score: 0.4,
            sses_score: 0.5,
            tie_score: 0.4,
            stability_score: 0.5,
            manipulation_risk: 0.2,
        };
        let result = evaluate_learning_gate(
            &weak,
            &AblationSuite::clean(),
            Some(&verified_outcome()),
            &IntegrityCheck::default(),
            &EngineConfig::default(),
        );
        assert_eq!(result.learning_status, LearningStatus::Quarantined);
        assert!(result.gate_reasons.iter().any(|r| r.contains("signal_convergence")));
    }

    #[test]
    fn conditions_are_recorded_in_declaration_order() {
        let result = evaluate_learning_gate(
            &signals(0.25),
            &AblationSuite::clean(),
            Some(&verified_outcome()),
            &IntegrityCheck::default(),
            &EngineConfig::default(),
        );
        let names: Vec<&str> = result.conditions.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![
            "signal_convergence",
            "manipulation_check",
            "ablation_robustness",
            "outcome_verified",
            "integrity_check"
        ]);
    }
}
