// crates/furlong-core/tests/contracts.rs
// ============================================================================
// Module: Engine Contract Tests
// Description: Quantified invariants P1 through P7, P9, P14, and P15.
// Purpose: Pin the published contracts over the full engine pipeline.
// Dependencies: furlong-core, proptest
// ============================================================================

//! Contract suite over full pipeline runs: Top-4 cardinality, complete
//! scoring, role invariants, chaos bounds and monotonicity, leakage
//! rejection, component sums, and the anchor guard.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;

use furlong_core::EngineConfig;
use furlong_core::ErrorCode;
use furlong_core::MarketContext;
use furlong_core::MarketRole;
use furlong_core::RaceContext;
use furlong_core::RaceId;
use furlong_core::Runner;
use furlong_core::RunnerId;
use furlong_core::RunnerMarket;
use furlong_core::Timestamp;
use furlong_core::core::context::MarkPressure;
use furlong_core::core::context::PaceStyle;
use furlong_core::runtime::InMemoryEngineRunStore;
use furlong_core::runtime::Pipeline;
use furlong_core::runtime::PipelineContext;
use furlong_core::runtime::calculate_chaos;
use proptest::prelude::ProptestConfig;
use proptest::prelude::proptest;
use proptest::prop_assert;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn decision_time() -> Timestamp {
    Timestamp::from_unix_millis(1_773_498_000_000)
}

fn runner(id: &str, odds: f64) -> Runner {
    Runner {
        runner_id: RunnerId::new(id),
        horse_name: format!("Horse {id}"),
        age: 5,
        sex: "G".to_string(),
        trainer: format!("Trainer {id}"),
        jockey: format!("Jockey {id}"),
        form_string: Some("21312".to_string()),
        odds_decimal: Some(odds),
        or_rating: Some(82),
        rpr: Some(88),
        ts: Some(74),
        days_since_last_run: Some(21),
        class_movement: 0,
        class_rating: None,
        first_time_headgear: false,
        jockey_booking_notable: false,
        jockey_upgrade: false,
        stable_form_last_14: None,
        mark_pressure: MarkPressure::Normal,
        form_last_3: None,
        pace_style: PaceStyle::MidPack,
        trainer_strike_rate: None,
        jockey_strike_rate: None,
        odds_drift: None,
        last_run_position: None,
        avg_position_last_5: None,
        distance_record: None,
        historical_stats: None,
    }
}

fn run_card(card: &[(&str, f64)]) -> PipelineContext {
    let race_id = RaceId::new("CONTRACT_RACE");
    let runners: Vec<Runner> = card.iter().map(|(id, odds)| runner(id, *odds)).collect();
    let race_ctx = RaceContext {
        race_id: race_id.clone(),
        course: "Newmarket".to_string(),
        decision_time: decision_time(),
        distance_meters: 1_600,
        going: "Good".to_string(),
        class_level: 3,
        surface: "Turf".to_string(),
        field_size: runners.len(),
        age_band: None,
        sex_restriction: None,
        stability_score: Some(0.75),
        pace_geometry_score: Some(0.70),
    };
    let market_ctx = MarketContext {
        race_id: race_id.clone(),
        snapshot_timestamp: decision_time(),
        runners: card
            .iter()
            .map(|(id, odds)| RunnerMarket {
                runner_id: RunnerId::new(*id),
                odds_decimal: *odds,
                volume: None,
                is_favorite: None,
            })
            .collect(),
    };
    let pipeline =
        Pipeline::new(EngineConfig::default(), Arc::new(InMemoryEngineRunStore::new()))
            .expect("pipeline");
    pipeline
        .run(&race_id, race_ctx, market_ctx, runners, None)
        .expect("run")
}

const SIX_RUNNER_CARD: &[(&str, f64)] = &[
    ("r1", 2.2),
    ("r2", 4.0),
    ("r3", 6.0),
    ("r4", 11.0),
    ("r5", 16.0),
    ("r6", 34.0),
];

// ============================================================================
// SECTION: Ranking Contracts
// ============================================================================

#[test]
fn p1_top4_cardinality_is_min_of_four_and_field() {
    let big = run_card(SIX_RUNNER_CARD);
    assert_eq!(big.ranking.expect("ranking").top4.len(), 4);

    let small = run_card(&[("r1", 1.8), ("r2", 3.2), ("r3", 7.5)]);
    assert_eq!(small.ranking.expect("ranking").top4.len(), 3);
}

#[test]
fn p2_every_runner_receives_a_finite_score() {
    let ctx = run_card(SIX_RUNNER_CARD);
    let ranking = ctx.ranking.expect("ranking");
    assert_eq!(ranking.breakdowns.len(), SIX_RUNNER_CARD.len());
    for (id, _) in SIX_RUNNER_CARD {
        let breakdown = ranking.breakdowns.get(&RunnerId::new(*id)).expect("breakdown");
        assert!(breakdown.total.is_finite());
    }
}

#[test]
fn p3_lowest_odds_runner_is_never_noise() {
    let ctx = run_card(SIX_RUNNER_CARD);
    let anchor = ctx
        .opponent_profiles
        .iter()
        .find(|profile| profile.runner_id.as_str() == "r1")
        .expect("anchor profile");
    assert_ne!(anchor.market_role, MarketRole::Noise);
    assert_eq!(anchor.market_role, MarketRole::LiquidityAnchor);
}

#[test]
fn p4_every_profile_carries_a_role_reason() {
    let ctx = run_card(SIX_RUNNER_CARD);
    for profile in &ctx.opponent_profiles {
        assert!(!profile.role_reason.is_empty(), "runner {}", profile.runner_id);
    }
}

#[test]
fn p5_fields_of_six_or_more_show_three_roles() {
    let ctx = run_card(SIX_RUNNER_CARD);
    let mut roles: Vec<MarketRole> =
        ctx.opponent_profiles.iter().map(|profile| profile.market_role).collect();
    roles.sort();
    roles.dedup();
    assert!(roles.len() >= 3, "got {roles:?}");
}

#[test]
fn p14_score_components_sum_to_totals() {
    let ctx = run_card(SIX_RUNNER_CARD);
    for breakdown in ctx.ranking.expect("ranking").breakdowns.values() {
        assert!(breakdown.sum_matches_total());
        assert!(
            (breakdown.components.numeric_sum() - breakdown.total).abs() < 0.01,
            "sum drifted"
        );
    }
}

#[test]
fn p15_anchor_guard_fires_only_under_all_three_conditions() {
    // Strong favorite (1.5 => 0.667 implied), clean market (stub risk 0).
    let ctx = run_card(&[("r1", 1.5), ("r2", 6.0), ("r3", 9.0), ("r4", 15.0)]);
    let ranking = ctx.ranking.expect("ranking");
    let guarded = ranking.breakdowns.get(&RunnerId::new("r1")).expect("anchor");
    assert!((guarded.components.anchor_guard - 0.10).abs() < f64::EPSILON);

    // Favorite below the probability floor gets no boost.
    let ctx = run_card(&[("r1", 2.5), ("r2", 6.0), ("r3", 9.0), ("r4", 15.0)]);
    let ranking = ctx.ranking.expect("ranking");
    let plain = ranking.breakdowns.get(&RunnerId::new("r1")).expect("anchor");
    assert!((plain.components.anchor_guard - 0.0).abs() < f64::EPSILON);

    // Non-anchors never get the boost even at short prices.
    for (id, _) in &SIX_RUNNER_CARD[1 ..] {
        let ctx = run_card(SIX_RUNNER_CARD);
        let ranking = ctx.ranking.expect("ranking");
        let other = ranking.breakdowns.get(&RunnerId::new(*id)).expect("runner");
        assert!((other.components.anchor_guard - 0.0).abs() < f64::EPSILON);
    }
}

// ============================================================================
// SECTION: Chaos Contracts
// ============================================================================

#[test]
fn p7_concentration_lowers_chaos_at_fixed_field_size() {
    let concentrated = calculate_chaos(&[1.3, 10.0, 14.0, 20.0, 28.0, 40.0], 6);
    let flat = calculate_chaos(&[5.5, 5.5, 5.5, 5.5, 5.5, 5.5], 6);
    assert!(concentrated.chaos_level < flat.chaos_level);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn p6_chaos_is_bounded_for_any_odds_vector(
        odds in proptest::collection::vec(1.01f64..500.0, 1..30)
    ) {
        let signal = calculate_chaos(&odds, odds.len());
        prop_assert!((0.0..=1.0).contains(&signal.chaos_level));
    }
}

// ============================================================================
// SECTION: Leakage Contract
// ============================================================================

#[test]
fn p9_post_decision_snapshot_never_reaches_downstream_stages() {
    let race_id = RaceId::new("LEAKY_RACE");
    let runners = vec![runner("r1", 2.0), runner("r2", 5.0)];
    let race_ctx = RaceContext {
        race_id: race_id.clone(),
        course: "Newmarket".to_string(),
        decision_time: decision_time(),
        distance_meters: 1_600,
        going: "Good".to_string(),
        class_level: 3,
        surface: "Turf".to_string(),
        field_size: runners.len(),
        age_band: None,
        sex_restriction: None,
        stability_score: None,
        pace_geometry_score: None,
    };
    let market_ctx = MarketContext {
        race_id: race_id.clone(),
        // Stamped five minutes after decision time.
        snapshot_timestamp: decision_time().plus_minutes(5),
        runners: runners
            .iter()
            .map(|r| RunnerMarket {
                runner_id: r.runner_id.clone(),
                odds_decimal: r.odds_decimal.unwrap_or(10.0),
                volume: None,
                is_favorite: None,
            })
            .collect(),
    };
    let pipeline =
        Pipeline::new(EngineConfig::default(), Arc::new(InMemoryEngineRunStore::new()))
            .expect("pipeline");
    let err = pipeline
        .run(&race_id, race_ctx, market_ctx, runners, None)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Leakage);
}

// ============================================================================
// SECTION: Run Record Contract
// ============================================================================

#[test]
fn engine_run_embeds_scores_in_ranked_order() {
    let ctx = run_card(SIX_RUNNER_CARD);
    let ranking = ctx.ranking.clone().expect("ranking");
    let run = ctx.engine_run.expect("engine run");
    let recorded: Vec<RunnerId> =
        run.runner_scores.iter().map(|score| score.runner_id.clone()).collect();
    assert_eq!(recorded, ranking.ordered);
    assert_eq!(
        run.metadata.get("features_hash").and_then(serde_json::Value::as_str),
        Some(ctx.features_hash.as_str())
    );
}
