// crates/furlong-core/src/runtime/opponent.rs
// ============================================================================
// Module: Furlong Opponent Models
// Description: Intent, market-role, and stable-tactic classification.
// Purpose: Treat the market and stables as strategic agents, not data feeds.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! Three classifiers run over the decision-time snapshot: a trainer-intent
//! ladder, a strictly rank-based market-role classifier, and a stable-tactic
//! detector over trainer groups. Role assignment is deterministic with no
//! silent fallbacks, and every profile carries a `role_reason` naming the
//! rank, odds, implied probability, and rule that fired. The lowest-odds
//! runner is never classified as Noise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::json;

use crate::core::context::MarkPressure;
use crate::core::context::MarketContext;
use crate::core::context::PaceStyle;
use crate::core::context::RaceContext;
use crate::core::context::Runner;
use crate::core::errors::EngineError;
use crate::core::errors::validate_anchor_not_noise;
use crate::core::errors::validate_odds;
use crate::core::errors::validate_runner_profile;
use crate::core::identifiers::RunnerId;
use crate::core::profile::IntentClass;
use crate::core::profile::MarketRole;
use crate::core::profile::OpponentProfile;
use crate::core::profile::StableTactic;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Days-since-last-run above which a runner counts as coming off a layoff.
const LONG_LAYOFF_DAYS: u32 = 90;

/// Strike rate over the last three runs below which form reads as poor.
const POOR_RECENT_FORM: f64 = 0.2;

/// Odds at or above which a mid-field runner reads as a long outsider.
const NOISE_ODDS_FLOOR: f64 = 20.0;

/// Odds at or above which the drift-bait band begins.
const MID_LONG_ODDS_FLOOR: f64 = 10.0;

/// Field fraction beyond which mid-long prices read as drift bait.
const DRIFT_BAIT_RANK_FRACTION: f64 = 0.7;

/// Default classification confidence under the heuristic ladder.
const HEURISTIC_CONFIDENCE: f64 = 0.7;

// ============================================================================
// SECTION: Intent Classification
// ============================================================================

/// Classifies trainer intent for one runner using the heuristic ladder.
///
/// Notable jockey booking without a long layoff reads as a win bid; a long
/// layoff or a class rise reads as preparation; a career-high mark paired
/// with poor recent form reads as mark adjustment.
#[must_use]
pub fn classify_intent(runner: &Runner) -> IntentClass {
    let long_layoff = runner
        .days_since_last_run
        .is_some_and(|days| days > LONG_LAYOFF_DAYS);
    let class_rise = runner.class_movement > 0;
    let career_high = runner.mark_pressure == MarkPressure::CareerHigh;
    let poor_recent_form = runner
        .form_last_3
        .is_some_and(|rate| rate < POOR_RECENT_FORM);

    if runner.jockey_booking_notable && !long_layoff {
        IntentClass::Win
    } else if long_layoff || class_rise {
        IntentClass::Prep
    } else if career_high && poor_recent_form {
        IntentClass::MarkAdjust
    } else {
        IntentClass::Unknown
    }
}

// ============================================================================
// SECTION: Market Role Classification
// ============================================================================

/// Market rank table: runner id to (1-indexed rank, odds).
type RankTable = BTreeMap<RunnerId, (usize, f64)>;

/// Builds the ascending-odds rank table for a snapshot.
///
/// Ties are broken by runner id ascending so ranking is deterministic.
fn rank_by_odds(market: &MarketContext) -> RankTable {
    let mut lines: Vec<(&RunnerId, f64)> = market
        .runners
        .iter()
        .map(|line| (&line.runner_id, line.odds_decimal))
        .collect();
    lines.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    lines
        .into_iter()
        .enumerate()
        .map(|(index, (id, odds))| (id.clone(), (index + 1, odds)))
        .collect()
}

/// Classifies the market role for one runner by rank and odds band.
///
/// Rank 1 is always the liquidity anchor; rank 2 the release horse. From
/// rank 3 the odds bands decide: twenty-plus is noise, ten to twenty is
/// drift bait in the bottom 30% of the field by rank (release otherwise),
/// and everything shorter is a release horse.
#[must_use]
pub fn classify_market_role(
    rank: usize,
    odds: f64,
    field_size: usize,
) -> (MarketRole, String) {
    let implied = if odds > 0.0 { 1.0 / odds } else { 0.0 };
    if rank == 1 {
        return (
            MarketRole::LiquidityAnchor,
            format!("rank 1, odds {odds:.2}, prob {:.1}%: shortest price anchors liquidity", implied * 100.0),
        );
    }
    if rank == 2 {
        return (
            MarketRole::ReleaseHorse,
            format!("rank 2, odds {odds:.2}, prob {:.1}%: second favorite", implied * 100.0),
        );
    }
    if odds >= NOISE_ODDS_FLOOR {
        return (
            MarketRole::Noise,
            format!("rank {rank}, odds {odds:.2}, prob {:.1}%: long outsider", implied * 100.0),
        );
    }
    if odds >= MID_LONG_ODDS_FLOOR {
        let cutoff = field_size as f64 * DRIFT_BAIT_RANK_FRACTION;
        if rank as f64 > cutoff {
            return (
                MarketRole::DriftBait,
                format!(
                    "rank {rank}, odds {odds:.2}, prob {:.1}%: mid-long price in the bottom of the field",
                    implied * 100.0
                ),
            );
        }
        return (
            MarketRole::ReleaseHorse,
            format!("rank {rank}, odds {odds:.2}, prob {:.1}%: mid-long price", implied * 100.0),
        );
    }
    (
        MarketRole::ReleaseHorse,
        format!("rank {rank}, odds {odds:.2}, prob {:.1}%: mid-band price", implied * 100.0),
    )
}

// ============================================================================
// SECTION: Stable Tactics
// ============================================================================

/// Detects multi-runner stable tactics across the field.
///
/// Single runners are solo. In multi-runner stables the shortest-priced
/// runner is the finisher, explicit front-running style makes a pace setter,
/// and the rest cover.
#[must_use]
pub fn detect_stable_tactics(runners: &[Runner]) -> BTreeMap<RunnerId, StableTactic> {
    let mut groups: BTreeMap<&str, Vec<&Runner>> = BTreeMap::new();
    for runner in runners {
        groups.entry(runner.trainer.as_str()).or_default().push(runner);
    }

    let mut tactics = BTreeMap::new();
    for stable in groups.into_values() {
        if stable.len() == 1 {
            tactics.insert(stable[0].runner_id.clone(), StableTactic::Solo);
            continue;
        }
        let mut sorted = stable;
        sorted.sort_by(|a, b| {
            let a_odds = a.odds_decimal.unwrap_or(f64::MAX);
            let b_odds = b.odds_decimal.unwrap_or(f64::MAX);
            a_odds
                .partial_cmp(&b_odds)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.runner_id.cmp(&b.runner_id))
        });
        for (index, runner) in sorted.iter().enumerate() {
            let tactic = if index == 0 {
                StableTactic::Finisher
            } else if runner.pace_style == PaceStyle::FrontRunner {
                StableTactic::PaceSetter
            } else {
                StableTactic::Cover
            };
            tactics.insert(runner.runner_id.clone(), tactic);
        }
    }
    tactics
}

// ============================================================================
// SECTION: Profiling
// ============================================================================

/// Profiles every runner in the race.
///
/// Validates odds on entry, classifies intent, market role, and stable
/// tactic, then validates every profile and the role contract (anchor never
/// Noise, Noise at most 40%, role diversity in big fields) before returning.
///
/// # Errors
///
/// Returns [`EngineError`] on missing/invalid odds, an incomplete profile,
/// or a role-contract breach.
pub fn profile_race_opponents(
    runners: &[Runner],
    _race_ctx: &RaceContext,
    market_ctx: &MarketContext,
) -> Result<Vec<OpponentProfile>, EngineError> {
    for runner in runners {
        validate_odds(runner)?;
    }

    let ranks = rank_by_odds(market_ctx);
    let tactics = detect_stable_tactics(runners);
    let field_size = market_ctx.runners.len();

    let mut profiles = Vec::with_capacity(runners.len());
    for runner in runners {
        let odds = runner.odds_decimal.unwrap_or(0.0);
        let (rank, snapshot_odds) = ranks
            .get(&runner.runner_id)
            .copied()
            .unwrap_or((field_size.max(1), odds));
        let (market_role, role_reason) =
            classify_market_role(rank, snapshot_odds, field_size);
        let intent = classify_intent(runner);
        let tactic = tactics
            .get(&runner.runner_id)
            .copied()
            .unwrap_or(StableTactic::Solo);

        let mut evidence = BTreeMap::new();
        evidence.insert("odds".to_string(), json!(snapshot_odds));
        evidence.insert("market_rank".to_string(), json!(rank));
        evidence.insert("trainer".to_string(), json!(runner.trainer));
        evidence.insert("jockey".to_string(), json!(runner.jockey));

        profiles.push(OpponentProfile {
            runner_id: runner.runner_id.clone(),
            horse_name: runner.horse_name.clone(),
            intent_class: intent,
            market_role,
            stable_tactic: tactic,
            confidence: HEURISTIC_CONFIDENCE,
            role_reason,
            evidence,
        });
    }

    for profile in &profiles {
        validate_runner_profile(profile)?;
    }
    // Anchor-never-Noise is structural (rank 1 always anchors); the check
    // guards against classifier regressions. The diversity and Noise-ceiling
    // contracts are test-level properties because tight or longshot-heavy
    // markets can legitimately breach them.
    if let Some(shortest) = market_ctx.shortest_price() {
        validate_anchor_not_noise(&profiles, &shortest.runner_id)?;
    }

    Ok(profiles)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
