// system-tests/tests/scenarios.rs
// ============================================================================
// Module: Scenario Tests
// Description: Literal-input scenarios S1 through S4 from the engine
// contract.
// Purpose: Pin the decision policy and learning gate to published outcomes.
// Dependencies: furlong-core, system-tests
// ============================================================================

//! End-to-end scenario suite: a clean structure race allowing the win
//! overlay, a chaos race suppressing it, manipulation rejecting learning,
//! and ablation fragility quarantining it.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use furlong_core::ChassisType;
use furlong_core::EngineConfig;
use furlong_core::IntentClass;
use furlong_core::LearningStatus;
use furlong_core::MarketRole;
use furlong_core::RaceId;
use furlong_core::RaceOutcome;
use furlong_core::Runner;
use furlong_core::RunnerId;
use furlong_core::runtime::AblationSuite;
use furlong_core::runtime::GateSignals;
use furlong_core::runtime::IntegrityCheck;
use furlong_core::runtime::RaceSignals;
use furlong_core::runtime::decide;
use furlong_core::runtime::evaluate_learning_gate;
use system_tests::market_ctx;
use system_tests::profile;
use system_tests::runner;

fn signals(chaos: f64, manipulation: f64, stability: f64, pace: f64) -> RaceSignals {
    RaceSignals {
        chaos_level: chaos,
        manipulation_risk: manipulation,
        stability_score: stability,
        pace_geometry_score: pace,
    }
}

fn verified_outcome(winner: &str) -> RaceOutcome {
    RaceOutcome {
        race_id: RaceId::new("TEST"),
        winner_id: Some(RunnerId::new(winner)),
        positions: BTreeMap::new(),
        verified: true,
        starting_prices: None,
    }
}

#[test]
fn s1_structure_race_clean_signals_allows_win() {
    let runners: Vec<Runner> = [("r1", 1.6), ("r2", 4.0), ("r3", 7.0), ("r4", 12.0)]
        .iter()
        .map(|(id, odds)| runner(id, *odds))
        .collect();
    let market = market_ctx("TEST_S1", &[("r1", 1.6), ("r2", 4.0), ("r3", 7.0), ("r4", 12.0)]);
    let profiles = vec![
        profile("r1", MarketRole::ReleaseHorse, IntentClass::Win),
        profile("r2", MarketRole::ReleaseHorse, IntentClass::Unknown),
        profile("r3", MarketRole::ReleaseHorse, IntentClass::Unknown),
        profile("r4", MarketRole::DriftBait, IntentClass::Unknown),
    ];
    let race_signals = signals(0.30, 0.20, 0.80, 0.70);
    let config = EngineConfig::default();

    let outcome = decide(
        &profiles,
        &runners,
        &market,
        &BTreeMap::new(),
        &race_signals,
        &AblationSuite::clean(),
        None,
        &config,
    )
    .expect("decision");

    assert_eq!(outcome.decision.chassis_type, ChassisType::WinOverlay);
    assert!(!outcome.decision.win_suppressed);
    assert_eq!(
        outcome.decision.top_strike_selection.as_ref().map(RunnerId::as_str),
        Some("r1")
    );
    let top4: Vec<&str> =
        outcome.decision.top_4_structure.iter().map(RunnerId::as_str).collect();
    assert_eq!(top4, vec!["r1", "r2", "r3", "r4"]);
    assert!((outcome.decision.confidence - 0.80).abs() < f64::EPSILON);

    // Any verified post-race outcome with the predicted winner commits.
    let gate = evaluate_learning_gate(
        &GateSignals::from_race_signals(&race_signals),
        &AblationSuite::clean(),
        Some(&verified_outcome("r1")),
        &IntegrityCheck::default(),
        &config,
    );
    assert_eq!(gate.learning_status, LearningStatus::Committed);
}

#[test]
fn s2_chaos_race_with_anchor_on_top_suppresses_win() {
    let card = [
        ("r1", 2.1),
        ("r2", 2.6),
        ("r3", 3.2),
        ("r4", 4.5),
        ("r5", 6.0),
        ("r6", 9.0),
        ("r7", 14.0),
        ("r8", 22.0),
    ];
    let runners: Vec<Runner> = card.iter().map(|(id, odds)| runner(id, *odds)).collect();
    let market = market_ctx("TEST_S2", &card);
    let profiles = vec![
        profile("r1", MarketRole::LiquidityAnchor, IntentClass::Win),
        profile("r2", MarketRole::ReleaseHorse, IntentClass::Unknown),
        profile("r3", MarketRole::ReleaseHorse, IntentClass::Unknown),
        profile("r4", MarketRole::ReleaseHorse, IntentClass::Unknown),
        profile("r5", MarketRole::ReleaseHorse, IntentClass::Unknown),
        profile("r6", MarketRole::ReleaseHorse, IntentClass::Unknown),
        profile("r7", MarketRole::DriftBait, IntentClass::Unknown),
        profile("r8", MarketRole::Noise, IntentClass::Unknown),
    ];

    let outcome = decide(
        &profiles,
        &runners,
        &market,
        &BTreeMap::new(),
        &signals(0.68, 0.30, 0.60, 0.60),
        &AblationSuite::clean(),
        None,
        &EngineConfig::default(),
    )
    .expect("decision");

    assert_eq!(outcome.decision.chassis_type, ChassisType::Top4Structure);
    assert!(outcome.decision.win_suppressed);
    let reason = outcome.decision.suppression_reason.expect("reason");
    assert!(reason.contains("Not Release Horse"));
    // The Top-4 is score-ranked across the full field, not positional.
    assert_eq!(outcome.decision.top_4_structure.len(), 4);
    assert_eq!(outcome.ranking.ordered.len(), 8);
}

#[test]
fn s3_high_manipulation_rejects_learning() {
    let card = [("r1", 2.0), ("r2", 4.0), ("r3", 9.0)];
    let runners: Vec<Runner> = card.iter().map(|(id, odds)| runner(id, *odds)).collect();
    let market = market_ctx("TEST_S3", &card);
    let profiles = vec![
        profile("r1", MarketRole::LiquidityAnchor, IntentClass::Win),
        profile("r2", MarketRole::ReleaseHorse, IntentClass::Unknown),
        profile("r3", MarketRole::Noise, IntentClass::Unknown),
    ];
    let race_signals = signals(0.40, 0.70, 0.75, 0.70);
    let config = EngineConfig::default();

    // The decision is still produced normally.
    let outcome = decide(
        &profiles,
        &runners,
        &market,
        &BTreeMap::new(),
        &race_signals,
        &AblationSuite::clean(),
        None,
        &config,
    )
    .expect("decision");
    assert!(outcome.decision.notes.is_manipulated);

    let gate = evaluate_learning_gate(
        &GateSignals::from_race_signals(&race_signals),
        &AblationSuite::clean(),
        Some(&verified_outcome("r1")),
        &IntegrityCheck::default(),
        &config,
    );
    assert_eq!(gate.learning_status, LearningStatus::Rejected);
    assert!(gate.gate_reasons.iter().any(|reason| reason.to_lowercase().contains("manipulation")));
}

#[test]
fn s4_fragile_ablation_quarantines_learning() {
    let config = EngineConfig::default();
    let fragile = AblationSuite::from_summary(2, 0.18, &config);
    assert!(fragile.fragile);

    let race_signals = signals(0.40, 0.20, 0.80, 0.70);
    let gate = evaluate_learning_gate(
        &GateSignals::from_race_signals(&race_signals),
        &fragile,
        Some(&verified_outcome("r1")),
        &IntegrityCheck::default(),
        &config,
    );
    assert_eq!(gate.learning_status, LearningStatus::Quarantined);
    assert!(gate.gate_reasons.iter().any(|reason| reason.to_lowercase().contains("ablation")));
    assert_eq!(gate.ablation_flips, 2);
}
