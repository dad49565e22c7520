// crates/furlong-core/src/runtime/policy.rs
// ============================================================================
// Module: Furlong Decision Policy
// Description: Anti-house chassis selection and win suppression.
// Purpose: Decide the structural shape of the wager with explicit reasons.
// Dependencies: crate::core, crate::runtime::{ablation, ranker, traps}
// ============================================================================

//! ## Overview
//! The policy builds the score-based Top-4 and then decides the chassis. In
//! chaos races the default is the Top-4 structure; a win overlay needs a
//! release horse with win intent in a clean, robust market. In structure
//! races a win overlay needs stability, pace geometry, and intent to
//! converge. Every suppression concatenates all failing conditions, and the
//! TopStrike margin check runs last.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::config::EngineConfig;
use crate::core::context::MarketContext;
use crate::core::context::Runner;
use crate::core::context::UserContext;
use crate::core::decision::ChassisType;
use crate::core::decision::DecisionNotes;
use crate::core::decision::DecisionOutput;
use crate::core::errors::EngineError;
use crate::core::identifiers::RunnerId;
use crate::core::profile::IntentClass;
use crate::core::profile::MarketRole;
use crate::core::profile::OpponentProfile;
use crate::runtime::ablation::AblationSuite;
use crate::runtime::form::StabilityProfile;
use crate::runtime::ranker::RaceSignals;
use crate::runtime::ranker::Ranking;
use crate::runtime::ranker::evaluate_top_strike;
use crate::runtime::ranker::rank_top4;
use crate::runtime::traps::CtfReport;
use crate::runtime::traps::apply_mitigations;
use crate::runtime::traps::scan_cognitive_traps;

// ============================================================================
// SECTION: Confidence Levels
// ============================================================================

/// Confidence for a chaos-race win overlay.
const CHAOS_WIN_CONFIDENCE: f64 = 0.75;

/// Confidence for a chaos-race Top-4 chassis.
const CHAOS_TOP4_CONFIDENCE: f64 = 0.60;

/// Confidence for a structure-race win overlay.
const STRUCTURE_WIN_CONFIDENCE: f64 = 0.80;

/// Confidence for a structure-race Top-4 chassis.
const STRUCTURE_TOP4_CONFIDENCE: f64 = 0.65;

// ============================================================================
// SECTION: Policy Outcome
// ============================================================================

/// Full policy result: the verdict plus the ranking and CTF report behind
/// it.
///
/// # Invariants
/// - `decision.top_4_structure` equals `ranking.top4`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    /// Final verdict.
    pub decision: DecisionOutput,
    /// Score-based ranking behind the verdict.
    pub ranking: Ranking,
    /// Cognitive-trap report produced during the decision.
    pub ctf_report: CtfReport,
}

// ============================================================================
// SECTION: Decision Policy
// ============================================================================

/// Runs the full anti-house decision policy.
///
/// Steps: score-based Top-4 (with contract validation), CTF scan over the
/// provisional top selection, chaos or structure branch, mitigation
/// application, then the TopStrike margin check.
///
/// # Errors
///
/// Returns [`EngineError`] when the ranking contracts are breached.
#[allow(
    clippy::too_many_arguments,
    reason = "The policy is the convergence point of every upstream stage."
)]
pub fn decide(
    profiles: &[OpponentProfile],
    runners: &[Runner],
    market_ctx: &MarketContext,
    stability_profiles: &BTreeMap<RunnerId, StabilityProfile>,
    signals: &RaceSignals,
    ablation: &AblationSuite,
    user_ctx: Option<&UserContext>,
    config: &EngineConfig,
) -> Result<PolicyOutcome, EngineError> {
    let ranking = rank_top4(
        profiles,
        runners,
        market_ctx,
        stability_profiles,
        signals,
        config,
    )?;
    let top_selection = ranking.ordered.first().cloned();

    let favorite = market_ctx.shortest_price().map(|line| line.runner_id.clone());
    let ctf_report = scan_cognitive_traps(
        runners,
        profiles,
        stability_profiles,
        top_selection.as_ref(),
        favorite.as_ref(),
        user_ctx,
    );

    let is_chaos = signals.chaos_level >= config.chaos_threshold;
    let is_manipulated = signals.manipulation_risk >= config.manipulation_threshold;
    let is_fragile = ablation.fragile;
    let ctf_adjusted = ctf_report.decision_adjusted;

    let top_profile = top_selection
        .as_ref()
        .and_then(|id| profiles.iter().find(|p| &p.runner_id == id));

    let mut decision = if is_chaos {
        decide_chaos_race(
            top_selection.as_ref(),
            &ranking,
            top_profile,
            is_manipulated,
            is_fragile,
            ctf_adjusted,
        )
    } else {
        decide_structure_race(
            top_selection.as_ref(),
            &ranking,
            top_profile,
            signals,
            is_fragile,
            ctf_adjusted,
            config,
        )
    };

    decision.market_roles = profiles
        .iter()
        .map(|p| (p.runner_id.clone(), p.market_role))
        .collect();
    decision.notes.chaos_level = signals.chaos_level;
    decision.notes.manipulation_risk = signals.manipulation_risk;
    decision.notes.stability_score = signals.stability_score;
    decision.notes.pace_geometry_score = signals.pace_geometry_score;
    decision.notes.is_chaos = is_chaos;
    decision.notes.is_manipulated = is_manipulated;
    decision.notes.is_fragile = is_fragile;
    decision.notes.ctf_adjusted = ctf_adjusted;

    apply_mitigations(&ctf_report, &mut decision);

    // TopStrike margin check tightens the win bet after everything else.
    if !decision.win_suppressed && ranking.ordered.len() >= 2 {
        let strike = evaluate_top_strike(&ranking, signals.chaos_level, config);
        if let Some(selection) = strike.selection {
            decision.top_strike_selection = Some(selection);
        } else {
            decision.top_strike_selection = None;
            decision.win_suppressed = true;
            if let Some(reason) = strike.suppression_reason {
                decision.push_suppression_reason(&reason);
            }
        }
    }

    Ok(PolicyOutcome {
        decision,
        ranking,
        ctf_report,
    })
}

/// Chaos-race branch: Top-4 by default, win only for a clean release bid.
fn decide_chaos_race(
    top_selection: Option<&RunnerId>,
    ranking: &Ranking,
    top_profile: Option<&OpponentProfile>,
    is_manipulated: bool,
    is_fragile: bool,
    ctf_adjusted: bool,
) -> DecisionOutput {
    let is_release = top_profile.is_some_and(|p| p.market_role == MarketRole::ReleaseHorse);
    let intent_win = top_profile.is_some_and(|p| p.intent_class == IntentClass::Win);

    if is_release && intent_win && !is_manipulated && !is_fragile && !ctf_adjusted {
        return DecisionOutput {
            chassis_type: ChassisType::WinOverlay,
            top_strike_selection: top_selection.cloned(),
            top_4_structure: ranking.top4.clone(),
            value_ew: Vec::new(),
            fade_zone: Vec::new(),
            market_roles: BTreeMap::new(),
            win_suppressed: false,
            suppression_reason: None,
            confidence: CHAOS_WIN_CONFIDENCE,
            learning_gate_status: None,
            notes: DecisionNotes {
                reason: "Release + Intent + Clean".to_string(),
                ..DecisionNotes::default()
            },
        };
    }

    let mut reasons = Vec::new();
    if !is_release {
        reasons.push("Not Release Horse");
    }
    if !intent_win {
        reasons.push("Intent not Win");
    }
    if is_manipulated {
        reasons.push("Manipulation detected");
    }
    if is_fragile {
        reasons.push("Ablation fragile");
    }
    if ctf_adjusted {
        reasons.push("CTF adjusted");
    }

    DecisionOutput {
        chassis_type: ChassisType::Top4Structure,
        top_strike_selection: None,
        top_4_structure: ranking.top4.clone(),
        value_ew: Vec::new(),
        fade_zone: Vec::new(),
        market_roles: BTreeMap::new(),
        win_suppressed: true,
        suppression_reason: Some(reasons.join("; ")),
        confidence: CHAOS_TOP4_CONFIDENCE,
        learning_gate_status: None,
        notes: DecisionNotes {
            reason: "Chaos race - Top-4 only".to_string(),
            ..DecisionNotes::default()
        },
    }
}

/// Structure-race branch: win overlay only on full convergence.
fn decide_structure_race(
    top_selection: Option<&RunnerId>,
    ranking: &Ranking,
    top_profile: Option<&OpponentProfile>,
    signals: &RaceSignals,
    is_fragile: bool,
    ctf_adjusted: bool,
    config: &EngineConfig,
) -> DecisionOutput {
    let intent_win = top_profile.is_some_and(|p| p.intent_class == IntentClass::Win);
    let convergence = signals.stability_score >= config.stability_threshold
        && signals.pace_geometry_score >= config.pace_geometry_threshold
        && intent_win
        && !is_fragile
        && !ctf_adjusted;

    if convergence {
        return DecisionOutput {
            chassis_type: ChassisType::WinOverlay,
            top_strike_selection: top_selection.cloned(),
            top_4_structure: ranking.top4.clone(),
            value_ew: Vec::new(),
            fade_zone: Vec::new(),
            market_roles: BTreeMap::new(),
            win_suppressed: false,
            suppression_reason: None,
            confidence: STRUCTURE_WIN_CONFIDENCE,
            learning_gate_status: None,
            notes: DecisionNotes {
                reason: "Structure + Convergence".to_string(),
                ..DecisionNotes::default()
            },
        };
    }

    DecisionOutput {
        chassis_type: ChassisType::Top4Structure,
        top_strike_selection: None,
        top_4_structure: ranking.top4.clone(),
        value_ew: Vec::new(),
        fade_zone: Vec::new(),
        market_roles: BTreeMap::new(),
        win_suppressed: true,
        suppression_reason: Some("Convergence failed".to_string()),
        confidence: STRUCTURE_TOP4_CONFIDENCE,
        learning_gate_status: None,
        notes: DecisionNotes {
            reason: "Structure race - convergence not met".to_string(),
            ..DecisionNotes::default()
        },
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
