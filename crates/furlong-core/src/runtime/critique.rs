// crates/furlong-core/src/runtime/critique.rs
// ============================================================================
// Module: Furlong Post-Race Critique
// Description: Retrospective validation of roles, gate decisions, and
// thresholds.
// Purpose: Produce the why-won/why-lost record when a result arrives.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! When a result arrives the critique validates assigned market roles
//! against finishing positions (a release horse should place top-3, an
//! anchor second to fourth), labels whether the learning gate's decision
//! matched outcome quality, updates quarantine counters, writes why-won and
//! why-lost reason lists, and proposes bounded threshold nudges. Nudges are
//! recorded for governance review, never applied automatically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::context::RaceOutcome;
use crate::core::engine_run::EngineRun;
use crate::core::gate::LearningGateResult;
use crate::core::gate::LearningStatus;
use crate::core::identifiers::EngineRunId;
use crate::core::identifiers::RaceId;
use crate::core::identifiers::RunnerId;
use crate::core::profile::MarketRole;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Magnitude of a proposed threshold nudge.
const THRESHOLD_NUDGE: f64 = 0.02;

/// Fallback finishing position for runners missing from the result.
const UNPLACED: u32 = 99;

// ============================================================================
// SECTION: Critique Record
// ============================================================================

/// Post-race critique record.
///
/// # Invariants
/// - `threshold_adjustments` values are bounded to ±[`THRESHOLD_NUDGE`] and
///   are recommendations only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRaceCritique {
    /// Race the critique belongs to.
    pub race_id: RaceId,
    /// Engine run the critique reviews.
    pub engine_run_id: EngineRunId,
    /// Instant the critique was produced.
    pub critique_timestamp: Timestamp,
    /// Actual winner, when known.
    pub actual_winner: Option<RunnerId>,
    /// Predicted winner (TopStrike), when one was emitted.
    pub predicted_winner: Option<RunnerId>,
    /// Whether the TopStrike prediction matched the winner.
    pub prediction_correct: bool,
    /// Whether the winner appeared in the Top-4 structure.
    pub top_4_hit: bool,
    /// Roles as assigned at decision time.
    pub market_roles_assigned: BTreeMap<RunnerId, MarketRole>,
    /// Per-runner retrospective role validation verdicts.
    pub market_roles_validated: BTreeMap<RunnerId, bool>,
    /// Whether the gate decision matched outcome quality.
    pub gate_decision_correct: bool,
    /// Explanation of the gate-decision label.
    pub gate_decision_reason: String,
    /// Reasons behind a correct prediction.
    pub why_won: Vec<String>,
    /// Reasons behind a failed prediction.
    pub why_lost: Vec<String>,
    /// Bounded threshold nudges recorded for governance review.
    pub threshold_adjustments: BTreeMap<String, f64>,
    /// Quarantine promotions proposed by this race.
    pub quarantine_promotions: u32,
    /// Quarantine rejections proposed by this race.
    pub quarantine_rejections: u32,
}

// ============================================================================
// SECTION: Critique Engine
// ============================================================================

/// Performs the full post-race critique.
#[must_use]
pub fn perform_post_race_critique(
    engine_run: &EngineRun,
    outcome: &RaceOutcome,
    gate_result: &LearningGateResult,
    critique_timestamp: Timestamp,
) -> PostRaceCritique {
    let predicted_winner = engine_run
        .verdict
        .as_ref()
        .and_then(|verdict| verdict.top_strike_selection.clone());
    let actual_winner = outcome.winner_id.clone();

    let prediction_correct = match (&predicted_winner, &actual_winner) {
        (Some(predicted), Some(actual)) => predicted == actual,
        _ => false,
    };
    let top_4_hit = match (&actual_winner, engine_run.verdict.as_ref()) {
        (Some(winner), Some(verdict)) => verdict.top_4_structure.contains(winner),
        _ => false,
    };

    let (assigned, validated) = validate_market_roles(engine_run, outcome);
    let (gate_decision_correct, gate_decision_reason) =
        evaluate_gate_decision(gate_result.learning_status, prediction_correct, top_4_hit);
    let (quarantine_promotions, quarantine_rejections) = quarantine_counters(
        gate_result.learning_status,
        prediction_correct,
        top_4_hit,
    );
    let (why_won, why_lost) =
        analyze_why(engine_run, outcome, prediction_correct, &assigned);
    let threshold_adjustments =
        propose_threshold_nudges(gate_decision_correct, prediction_correct);

    PostRaceCritique {
        race_id: engine_run.race_ctx.race_id.clone(),
        engine_run_id: engine_run.engine_run_id.clone(),
        critique_timestamp,
        actual_winner,
        predicted_winner,
        prediction_correct,
        top_4_hit,
        market_roles_assigned: assigned,
        market_roles_validated: validated,
        gate_decision_correct,
        gate_decision_reason,
        why_won,
        why_lost,
        threshold_adjustments,
        quarantine_promotions,
        quarantine_rejections,
    }
}

/// Validates assigned roles against finishing positions.
///
/// A release horse should place top-3; an anchor should place second to
/// fourth. Other roles validate neutrally.
fn validate_market_roles(
    engine_run: &EngineRun,
    outcome: &RaceOutcome,
) -> (BTreeMap<RunnerId, MarketRole>, BTreeMap<RunnerId, bool>) {
    let mut assigned = BTreeMap::new();
    let mut validated = BTreeMap::new();
    for score in &engine_run.runner_scores {
        let position = outcome
            .positions
            .get(&score.runner_id)
            .copied()
            .unwrap_or(UNPLACED);
        let ok = match score.market_role {
            MarketRole::ReleaseHorse => position <= 3,
            MarketRole::LiquidityAnchor => (2..=4).contains(&position),
            _ => true,
        };
        assigned.insert(score.runner_id.clone(), score.market_role);
        validated.insert(score.runner_id.clone(), ok);
    }
    (assigned, validated)
}

/// Labels whether the gate decision matched outcome quality.
fn evaluate_gate_decision(
    status: LearningStatus,
    prediction_correct: bool,
    top_4_hit: bool,
) -> (bool, String) {
    match status {
        LearningStatus::Committed => {
            if prediction_correct || top_4_hit {
                (true, "Committed and prediction was good".to_string())
            } else {
                (false, "Committed but prediction failed".to_string())
            }
        }
        LearningStatus::Quarantined => {
            if prediction_correct {
                (
                    false,
                    "Quarantined but prediction was correct (missed opportunity)".to_string(),
                )
            } else {
                (true, "Quarantined and prediction failed (correct)".to_string())
            }
        }
        LearningStatus::Rejected => {
            if prediction_correct {
                (
                    false,
                    "Rejected but prediction was correct (too conservative)".to_string(),
                )
            } else {
                (true, "Rejected and prediction failed (correct)".to_string())
            }
        }
    }
}

/// Updates quarantine promotion/rejection counters for this race.
const fn quarantine_counters(
    status: LearningStatus,
    prediction_correct: bool,
    top_4_hit: bool,
) -> (u32, u32) {
    match status {
        LearningStatus::Quarantined => {
            if prediction_correct || top_4_hit {
                (1, 0)
            } else {
                (0, 1)
            }
        }
        LearningStatus::Committed | LearningStatus::Rejected => (0, 0),
    }
}

/// Writes the why-won / why-lost reason lists.
fn analyze_why(
    engine_run: &EngineRun,
    outcome: &RaceOutcome,
    prediction_correct: bool,
    assigned: &BTreeMap<RunnerId, MarketRole>,
) -> (Vec<String>, Vec<String>) {
    let Some(verdict) = engine_run.verdict.as_ref() else {
        return (Vec::new(), vec!["No verdict was emitted".to_string()]);
    };

    if prediction_correct {
        let mut reasons = Vec::new();
        if !verdict.win_suppressed {
            reasons.push("Win not suppressed - confidence justified".to_string());
        }
        if let Some(winner) = verdict.top_strike_selection.as_ref()
            && assigned.get(winner) == Some(&MarketRole::ReleaseHorse)
        {
            reasons.push("Correctly identified Release Horse".to_string());
        }
        if engine_run.chaos_level < 0.60 {
            reasons.push("Structure race - stable prediction".to_string());
        }
        return (reasons, Vec::new());
    }

    let mut reasons = Vec::new();
    if verdict.win_suppressed {
        reasons.push(format!(
            "Win suppressed: {}",
            verdict.suppression_reason.as_deref().unwrap_or("unknown")
        ));
    }
    if engine_run.chaos_level >= 0.60 {
        reasons.push("Chaos race - high variance".to_string());
    }
    if verdict.notes.manipulation_risk >= 0.60 {
        reasons.push("High manipulation risk detected".to_string());
    }
    if let Some(winner) = outcome.winner_id.as_ref()
        && assigned.get(winner) == Some(&MarketRole::LiquidityAnchor)
    {
        reasons.push("Winner was Liquidity Anchor - trap race".to_string());
    }
    (Vec::new(), reasons)
}

/// Proposes bounded threshold nudges, never applying them.
fn propose_threshold_nudges(
    gate_decision_correct: bool,
    prediction_correct: bool,
) -> BTreeMap<String, f64> {
    let mut adjustments = BTreeMap::new();
    if !gate_decision_correct && prediction_correct {
        // Gate was too conservative: loosen both thresholds slightly.
        adjustments.insert("chaos_threshold".to_string(), -THRESHOLD_NUDGE);
        adjustments.insert("manipulation_threshold".to_string(), -THRESHOLD_NUDGE);
    } else if gate_decision_correct && !prediction_correct {
        // Gate was right to hold back: tighten both thresholds slightly.
        adjustments.insert("chaos_threshold".to_string(), THRESHOLD_NUDGE);
        adjustments.insert("manipulation_threshold".to_string(), THRESHOLD_NUDGE);
    }
    adjustments
}

// ============================================================================
// SECTION: Tests
// ============================================================================
