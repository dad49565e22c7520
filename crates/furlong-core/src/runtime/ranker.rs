// crates/furlong-core/src/runtime/ranker.rs
// ============================================================================
// Module: Furlong Top-4 Ranker
// Description: Deterministic score composition and score-based ranking.
// Purpose: Every runner gets a real score; no positional defaults, ever.
// Dependencies: crate::core, crate::runtime::{form, history}
// ============================================================================

//! ## Overview
//! The ranker composes a deterministic score per runner: stability and
//! historical modifiers, weighted market-role strength plus an anchor guard,
//! an odds-derived probability component, a chaos adjustment, and a
//! field-size component. Sorting is stable and descending with runner-id
//! tiebreaks, so identical inputs always rank identically. The score and
//! Top-4 contracts are validated unconditionally after every ranking, and
//! the TopStrike margin decides whether a single win selection survives.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::core::context::MarketContext;
use crate::core::context::Runner;
use crate::core::errors::EngineError;
use crate::core::errors::validate_scores;
use crate::core::errors::validate_top4;
use crate::core::identifiers::RunnerId;
use crate::core::profile::MarketRole;
use crate::core::profile::OpponentProfile;
use crate::core::score::ScoreBreakdown;
use crate::core::score::ScoreComponents;
use crate::runtime::form::StabilityProfile;
use crate::runtime::form::cluster_trust_modifier;
use crate::runtime::history::historical_modifier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Weight applied to the market-role strength component.
const ROLE_WEIGHT: f64 = 0.40;

/// Weight applied to the odds-derived probability component.
const ODDS_WEIGHT: f64 = 0.30;

/// Weight applied to the field-size component.
const FIELD_WEIGHT: f64 = 0.10;

/// Implied-probability ceiling for the odds component.
const ODDS_PROB_CEILING: f64 = 0.80;

/// Anchor guard boost for strong favorites in clean markets.
const ANCHOR_GUARD_BOOST: f64 = 0.10;

/// Short-price boundary in the chaos adjustment bands.
const SHORT_ODDS: f64 = 3.0;

/// Mid-band ceiling in the chaos adjustment bands.
const MID_ODDS: f64 = 8.0;

// ============================================================================
// SECTION: Signals Input
// ============================================================================

/// Race-level signals consumed by scoring and policy.
///
/// # Invariants
/// - All values are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaceSignals {
    /// Chaos level from the odds snapshot.
    pub chaos_level: f64,
    /// Manipulation risk (stub under the live-only regime).
    pub manipulation_risk: f64,
    /// Stability signal for the race.
    pub stability_score: f64,
    /// Pace-geometry signal for the race.
    pub pace_geometry_score: f64,
}

// ============================================================================
// SECTION: Ranking Output
// ============================================================================

/// Result of a full score-based ranking.
///
/// # Invariants
/// - `ordered` covers the whole field; `top4` is its first
///   `min(4, field_size)` entries.
/// - `breakdowns` holds one validated entry per runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    /// Every runner, best score first.
    pub ordered: Vec<RunnerId>,
    /// The supported Top-4 set.
    pub top4: Vec<RunnerId>,
    /// Score breakdowns keyed by runner.
    pub breakdowns: BTreeMap<RunnerId, ScoreBreakdown>,
}

/// TopStrike margin evaluation.
///
/// # Invariants
/// - `selection` is present iff `margin >= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopStrike {
    /// The single favored runner, when the margin holds.
    pub selection: Option<RunnerId>,
    /// Score margin between first and second.
    pub margin: f64,
    /// Margin threshold after the chaos slope.
    pub threshold: f64,
    /// Suppression reason when the margin is insufficient.
    pub suppression_reason: Option<String>,
}

// ============================================================================
// SECTION: Score Composition
// ============================================================================

/// Returns the table-driven weight for a market role.
#[must_use]
pub const fn role_strength(role: MarketRole) -> f64 {
    match role {
        MarketRole::LiquidityAnchor => 1.0,
        MarketRole::ReleaseHorse => 0.75,
        MarketRole::Steam => 0.70,
        MarketRole::DriftBait => 0.40,
        MarketRole::Spoiler => 0.30,
        MarketRole::Noise => 0.20,
    }
}

/// Returns the chaos adjustment for the odds band and regime.
///
/// High chaos boosts mid-band prices and penalizes short favorites; low
/// chaos does the opposite.
#[must_use]
pub fn chaos_adjustment(odds: f64, chaos_level: f64, chaos_threshold: f64) -> f64 {
    if chaos_level > chaos_threshold {
        if (SHORT_ODDS..=MID_ODDS).contains(&odds) {
            0.20
        } else if odds < SHORT_ODDS {
            0.10
        } else {
            0.05
        }
    } else if odds < SHORT_ODDS {
        0.20
    } else if (SHORT_ODDS..=MID_ODDS).contains(&odds) {
        0.15
    } else {
        0.05
    }
}

/// Composes the score breakdown for one runner.
///
/// The anchor guard adds [`ANCHOR_GUARD_BOOST`] only for a liquidity anchor
/// whose implied probability clears the configured floor in a market whose
/// manipulation risk stays under the configured ceiling; this prevents
/// systematic bias against strong favorites in otherwise clean markets.
#[must_use]
pub fn score_runner(
    profile: &OpponentProfile,
    odds: f64,
    stability: Option<&StabilityProfile>,
    runner: Option<&Runner>,
    signals: &RaceSignals,
    field_size: usize,
    config: &EngineConfig,
) -> ScoreBreakdown {
    let implied_prob = if odds > 0.0 { 1.0 / odds } else { 0.0 };

    let (stability_mod, stability_reason) = stability.map_or_else(
        || (0.0, "not_available".to_string()),
        |profile| {
            let modifier = cluster_trust_modifier(&profile.cluster_id)
                .clamp(-config.stability_modifier_cap, config.stability_modifier_cap);
            (modifier, profile.cluster_id.clone())
        },
    );

    let historical = historical_modifier(
        runner.and_then(|r| r.historical_stats.as_ref()),
        &config.historical_stats_caps,
        true,
        true,
        false,
    );

    let is_strong_favorite = implied_prob >= config.anchor_guard_min_prob
        && signals.manipulation_risk < config.anchor_guard_max_manip;
    let anchor_guard = if is_strong_favorite && profile.market_role == MarketRole::LiquidityAnchor
    {
        ANCHOR_GUARD_BOOST
    } else {
        0.0
    };

    let role = role_strength(profile.market_role) * ROLE_WEIGHT;
    let odds_component = (implied_prob / ODDS_PROB_CEILING).min(1.0) * ODDS_WEIGHT;
    let chaos = chaos_adjustment(odds, signals.chaos_level, config.chaos_threshold);
    let field = ((20.0 - field_size as f64) / 20.0).clamp(0.0, 1.0) * FIELD_WEIGHT;

    let components = ScoreComponents {
        stability: stability_mod,
        historical: historical.total_modifier,
        role,
        odds: odds_component,
        chaos,
        field,
        anchor_guard,
        stability_reason,
        historical_reason: historical.reason,
    };

    ScoreBreakdown {
        total: components.numeric_sum(),
        components,
    }
}

// ============================================================================
// SECTION: Ranking
// ============================================================================

/// Ranks the field by composite score and returns the Top-4.
///
/// Sorting is descending by score with ties broken by runner id ascending
/// for determinism. The score and Top-4 contracts are validated before the
/// ranking is returned.
///
/// # Errors
///
/// Returns [`EngineError`] when the score contract or Top-4 cardinality
/// contract is breached.
pub fn rank_top4(
    profiles: &[OpponentProfile],
    runners: &[Runner],
    market_ctx: &MarketContext,
    stability_profiles: &BTreeMap<RunnerId, StabilityProfile>,
    signals: &RaceSignals,
    config: &EngineConfig,
) -> Result<Ranking, EngineError> {
    let field_size = profiles.len();
    let mut breakdowns = BTreeMap::new();
    let mut scored: Vec<(RunnerId, f64)> = Vec::with_capacity(field_size);

    for profile in profiles {
        let odds = market_ctx
            .line_for(&profile.runner_id)
            .map_or(0.0, |line| line.odds_decimal);
        let runner = runners.iter().find(|r| r.runner_id == profile.runner_id);
        let breakdown = score_runner(
            profile,
            odds,
            stability_profiles.get(&profile.runner_id),
            runner,
            signals,
            field_size,
            config,
        );
        scored.push((profile.runner_id.clone(), breakdown.total));
        breakdowns.insert(profile.runner_id.clone(), breakdown);
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let ordered: Vec<RunnerId> = scored.into_iter().map(|(id, _)| id).collect();
    let top4: Vec<RunnerId> = ordered.iter().take(field_size.min(4)).cloned().collect();

    validate_scores(&breakdowns, field_size)?;
    validate_top4(&top4, field_size)?;

    Ok(Ranking {
        ordered,
        top4,
        breakdowns,
    })
}

/// Evaluates the TopStrike margin over a completed ranking.
///
/// The margin threshold tightens with chaos:
/// `threshold = base + slope * chaos_level`. A single-runner field always
/// strikes; an insufficient margin suppresses with an explicit reason.
#[must_use]
pub fn evaluate_top_strike(
    ranking: &Ranking,
    chaos_level: f64,
    config: &EngineConfig,
) -> TopStrike {
    let threshold =
        config.topstrike_base_margin + config.topstrike_chaos_slope * chaos_level;

    let Some(first) = ranking.ordered.first() else {
        return TopStrike {
            selection: None,
            margin: 0.0,
            threshold,
            suppression_reason: Some("Empty ranking".to_string()),
        };
    };
    let Some(second) = ranking.ordered.get(1) else {
        return TopStrike {
            selection: Some(first.clone()),
            margin: f64::INFINITY,
            threshold,
            suppression_reason: None,
        };
    };

    let first_score = ranking.breakdowns.get(first).map_or(0.0, |b| b.total);
    let second_score = ranking.breakdowns.get(second).map_or(0.0, |b| b.total);
    let margin = first_score - second_score;

    if margin >= threshold {
        TopStrike {
            selection: Some(first.clone()),
            margin,
            threshold,
            suppression_reason: None,
        }
    } else {
        TopStrike {
            selection: None,
            margin,
            threshold,
            suppression_reason: Some(format!(
                "Insufficient margin: {margin:.3} < {threshold:.3}"
            )),
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

    use std::collections::BTreeMap;

    use super::RaceSignals;
    use super::chaos_adjustment;
    use super::evaluate_top_strike;
    use super::rank_top4;
    use super::role_strength;
    use super::score_runner;
    use crate::core::config::EngineConfig;
    use crate::core::context::MarketContext;
    use crate::core::context::RunnerMarket;
    use crate::core::identifiers::RaceId;
    use crate::core::identifiers::RunnerId;
    use crate::core::profile::IntentClass;
    use crate::core::profile::MarketRole;
    use crate::core::profile::OpponentProfile;
    use crate::core::profile::StableTactic;
    use crate::core::time::Timestamp;

    fn profile(id: &str, role: MarketRole) -> OpponentProfile {
        OpponentProfile {
            runner_id: RunnerId::new(id),
            horse_name: format!("Horse {id}"),
            intent_class: IntentClass::Unknown,
            market_role: role,
            stable_tactic: StableTactic::Solo,
            confidence: 0.7,
            role_reason: "rank-based".to_string(),
            evidence: BTreeMap::new(),
        }
    }

    fn market(odds: &[(&str, f64)]) -> MarketContext {
        MarketContext {
            race_id: RaceId::new("R1"),
            snapshot_timestamp: Timestamp::from_unix_millis(0),
            runners: odds
                .iter()
                .map(|(id, value)| RunnerMarket {
                    runner_id: RunnerId::new(*id),
                    odds_decimal: *value,
                    volume: None,
                    is_favorite: None,
                })
                .collect(),
        }
    }

    fn signals(chaos: f64, manipulation: f64) -> RaceSignals {
        RaceSignals {
            chaos_level: chaos,
            manipulation_risk: manipulation,
            stability_score: 0.72,
            pace_geometry_score: 0.68,
        }
    }

    #[test]
    fn role_strengths_follow_the_table() {
        assert!((role_strength(MarketRole::LiquidityAnchor) - 1.0).abs() < f64::EPSILON);
        assert!((role_strength(MarketRole::ReleaseHorse) - 0.75).abs() < f64::EPSILON);
        assert!((role_strength(MarketRole::Steam) - 0.70).abs() < f64::EPSILON);
        assert!((role_strength(MarketRole::DriftBait) - 0.40).abs() < f64::EPSILON);
        assert!((role_strength(MarketRole::Spoiler) - 0.30).abs() < f64::EPSILON);
        assert!((role_strength(MarketRole::Noise) - 0.20).abs() < f64::EPSILON);
    }

    #[test]
    fn chaos_bands_flip_with_regime() {
        // High chaos boosts the mid band and penalizes short favorites.
        assert!((chaos_adjustment(5.0, 0.7, 0.6) - 0.20).abs() < f64::EPSILON);
        assert!((chaos_adjustment(2.0, 0.7, 0.6) - 0.10).abs() < f64::EPSILON);
        assert!((chaos_adjustment(15.0, 0.7, 0.6) - 0.05).abs() < f64::EPSILON);
        // Low chaos boosts favorites.
        assert!((chaos_adjustment(2.0, 0.3, 0.6) - 0.20).abs() < f64::EPSILON);
        assert!((chaos_adjustment(5.0, 0.3, 0.6) - 0.15).abs() < f64::EPSILON);
        assert!((chaos_adjustment(15.0, 0.3, 0.6) - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn anchor_guard_requires_all_three_conditions() {
        let config = EngineConfig::default();
        let anchor = profile("r1", MarketRole::LiquidityAnchor);

        // Strong favorite (1.5 => 0.667 implied) in a clean market.
        let clean = score_runner(&anchor, 1.5, None, None, &signals(0.3, 0.2), 6, &config);
        assert!((clean.components.anchor_guard - 0.10).abs() < f64::EPSILON);

        // Implied probability below the floor.
        let weak = score_runner(&anchor, 2.0, None, None, &signals(0.3, 0.2), 6, &config);
        assert!((weak.components.anchor_guard - 0.0).abs() < f64::EPSILON);

        // Manipulation at the ceiling.
        let dirty = score_runner(&anchor, 1.5, None, None, &signals(0.3, 0.5), 6, &config);
        assert!((dirty.components.anchor_guard - 0.0).abs() < f64::EPSILON);

        // Not the anchor.
        let release = profile("r2", MarketRole::ReleaseHorse);
        let not_anchor = score_runner(&release, 1.5, None, None, &signals(0.3, 0.2), 6, &config);
        assert!((not_anchor.components.anchor_guard - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn components_always_sum_to_total() {
        let config = EngineConfig::default();
        let breakdown = score_runner(
            &profile("r1", MarketRole::ReleaseHorse),
            4.0,
            None,
            None,
            &signals(0.45, 0.0),
            8,
            &config,
        );
        assert!(breakdown.sum_matches_total());
    }

    #[test]
    fn ranking_is_score_based_and_validated() {
        let profiles = vec![
            profile("r1", MarketRole::LiquidityAnchor),
            profile("r2", MarketRole::ReleaseHorse),
            profile("r3", MarketRole::ReleaseHorse),
            profile("r4", MarketRole::ReleaseHorse),
            profile("r5", MarketRole::Noise),
            profile("r6", MarketRole::Noise),
        ];
        let market = market(&[
            ("r1", 1.44),
            ("r2", 3.75),
            ("r3", 9.0),
            ("r4", 19.0),
            ("r5", 29.0),
            ("r6", 34.0),
        ]);
        let ranking = rank_top4(
            &profiles,
            &[],
            &market,
            &BTreeMap::new(),
            &signals(0.43, 0.0),
            &EngineConfig::default(),
        )
        .expect("ranking");
        assert_eq!(ranking.top4.len(), 4);
        assert_eq!(ranking.ordered.len(), 6);
        assert_eq!(ranking.top4[0].as_str(), "r1");
        assert_eq!(ranking.breakdowns.len(), 6);
    }

    #[test]
    fn equal_scores_rank_by_runner_id() {
        let profiles = vec![
            profile("r2", MarketRole::ReleaseHorse),
            profile("r1", MarketRole::ReleaseHorse),
        ];
        let market = market(&[("r1", 5.0), ("r2", 5.0)]);
        let ranking = rank_top4(
            &profiles,
            &[],
            &market,
            &BTreeMap::new(),
            &signals(0.3, 0.0),
            &EngineConfig::default(),
        )
        .expect("ranking");
        assert_eq!(ranking.ordered[0].as_str(), "r1");
        assert_eq!(ranking.ordered[1].as_str(), "r2");
    }

    #[test]
    fn small_field_returns_field_size_runners() {
        let profiles = vec![
            profile("r1", MarketRole::LiquidityAnchor),
            profile("r2", MarketRole::ReleaseHorse),
        ];
        let market = market(&[("r1", 2.0), ("r2", 4.0)]);
        let ranking = rank_top4(
            &profiles,
            &[],
            &market,
            &BTreeMap::new(),
            &signals(0.3, 0.0),
            &EngineConfig::default(),
        )
        .expect("ranking");
        assert_eq!(ranking.top4.len(), 2);
    }

    #[test]
    fn topstrike_margin_tightens_with_chaos() {
        let profiles = vec![
            profile("r1", MarketRole::LiquidityAnchor),
            profile("r2", MarketRole::Noise),
        ];
        let market = market(&[("r1", 1.5), ("r2", 34.0)]);
        let config = EngineConfig::default();
        let ranking = rank_top4(
            &profiles,
            &[],
            &market,
            &BTreeMap::new(),
            &signals(0.0, 0.0),
            &config,
        )
        .expect("ranking");

        let calm = evaluate_top_strike(&ranking, 0.0, &config);
        assert!((calm.threshold - 0.12).abs() < f64::EPSILON);
        let stormy = evaluate_top_strike(&ranking, 1.0, &config);
        assert!((stormy.threshold - 0.22).abs() < 1e-9);
    }

    #[test]
    fn insufficient_margin_suppresses_with_reason() {
        let profiles = vec![
            profile("r1", MarketRole::ReleaseHorse),
            profile("r2", MarketRole::ReleaseHorse),
        ];
        let market = market(&[("r1", 5.0), ("r2", 5.2)]);
        let config = EngineConfig::default();
        let ranking = rank_top4(
            &profiles,
            &[],
            &market,
            &BTreeMap::new(),
            &signals(0.3, 0.0),
            &config,
        )
        .expect("ranking");
        let strike = evaluate_top_strike(&ranking, 0.3, &config);
        assert!(strike.selection.is_none());
        let reason = strike.suppression_reason.expect("reason");
        assert!(reason.starts_with("Insufficient margin:"));
    }
}
