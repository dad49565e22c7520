// crates/furlong-core/src/runtime/acceptance.rs
// ============================================================================
// Module: Furlong Acceptance Gates
// Description: Static deployment checks run before a release is greenlit.
// Purpose: Eight pass/fail gates over build, determinism, leakage, schema,
// wiring, model sanity, ablation presets, and operational safety.
// Dependencies: crate::core, crate::interfaces, crate::runtime::*
// ============================================================================

//! ## Overview
//! The acceptance suite builds its own fixture race and drives the engine
//! through every gate: the data model serializes, replays are
//! byte-identical, the firewall rejects a poison frame, the feature schema
//! holds, the pipeline is wired end to end, the ranker behaves sanely on a
//! clean market, the ablation presets exist, and the operational safety
//! hooks (stake caps, kill switch) are present. All eight must pass before
//! a release is flagged greenlit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::core::context::MarkPressure;
use crate::core::context::MarketContext;
use crate::core::context::PaceStyle;
use crate::core::context::RaceContext;
use crate::core::context::Runner;
use crate::core::context::RunnerMarket;
use crate::core::errors::ErrorCode;
use crate::core::identifiers::RaceId;
use crate::core::identifiers::RunnerId;
use crate::core::time::Timestamp;
use crate::runtime::ablation::ABLATION_SET;
use crate::runtime::features::FeatureFrame;
use crate::runtime::features::FeatureSchema;
use crate::runtime::leakage::FirewallMode;
use crate::runtime::leakage::LeakageFirewall;
use crate::runtime::pipeline::Pipeline;
use crate::runtime::run_store::InMemoryEngineRunStore;

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Result of one acceptance gate.
///
/// # Invariants
/// - `details` explains a failure; passing gates keep a short affirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    /// Stable gate name.
    pub name: String,
    /// Whether the gate passed.
    pub passed: bool,
    /// Human-readable detail.
    pub details: String,
}

/// Full acceptance report.
///
/// # Invariants
/// - `greenlit` iff every gate passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceReport {
    /// Every gate in execution order.
    pub gates: Vec<GateResult>,
    /// Overall release verdict.
    pub greenlit: bool,
}

impl AcceptanceReport {
    /// Returns the gate with the given name, if present.
    #[must_use]
    pub fn gate(&self, name: &str) -> Option<&GateResult> {
        self.gates.iter().find(|gate| gate.name == name)
    }
}

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Builds the fixture race used by the self-checks.
fn fixture() -> (RaceId, RaceContext, MarketContext, Vec<Runner>) {
    let race_id = RaceId::new("GATE_FIXTURE_1430");
    let decision = Timestamp::from_unix_millis(1_773_500_400_000);
    let odds = [1.6, 4.0, 7.0, 12.0, 18.0, 34.0];
    let runners: Vec<Runner> = odds
        .iter()
        .enumerate()
        .map(|(index, value)| Runner {
            runner_id: RunnerId::new(format!("r{}", index + 1)),
            horse_name: format!("Fixture Horse {}", index + 1),
            age: 5,
            sex: "G".to_string(),
            trainer: format!("Trainer {}", index + 1),
            jockey: format!("Jockey {}", index + 1),
            form_string: Some("21312".to_string()),
            odds_decimal: Some(*value),
            or_rating: Some(80),
            rpr: Some(85),
            ts: Some(72),
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
        })
        .collect();
    let race_ctx = RaceContext {
        race_id: race_id.clone(),
        course: "Fixture Park".to_string(),
        decision_time: decision,
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
        snapshot_timestamp: decision,
        runners: runners
            .iter()
            .map(|runner| RunnerMarket {
                runner_id: runner.runner_id.clone(),
                odds_decimal: runner.odds_decimal.unwrap_or(10.0),
                volume: None,
                is_favorite: None,
            })
            .collect(),
    };
    (race_id, race_ctx, market_ctx, runners)
}

/// Builds a fresh pipeline over an in-memory store.
fn fixture_pipeline() -> Option<Pipeline> {
    Pipeline::new(EngineConfig::default(), Arc::new(InMemoryEngineRunStore::new())).ok()
}

// ============================================================================
// SECTION: Gates
// ============================================================================

/// Gate 1: the data model serializes and round-trips.
fn gate_build_integrity() -> GateResult {
    let config = EngineConfig::default();
    let round_trip = serde_json::to_string(&config)
        .ok()
        .and_then(|raw| serde_json::from_str::<EngineConfig>(&raw).ok());
    let passed = round_trip.as_ref() == Some(&config) && config.validate().is_ok();
    GateResult {
        name: "build_integrity".to_string(),
        passed,
        details: if passed {
            "config model round-trips".to_string()
        } else {
            "config model failed to round-trip".to_string()
        },
    }
}

/// Gate 2: same input, same engine run hash.
fn gate_determinism() -> GateResult {
    let (race_id, race_ctx, market_ctx, runners) = fixture();
    let run_once = || -> Option<crate::core::hashing::HashDigest> {
        let pipeline = fixture_pipeline()?;
        let ctx = pipeline
            .run(
                &race_id,
                race_ctx.clone(),
                market_ctx.clone(),
                runners.clone(),
                None,
            )
            .ok()?;
        ctx.engine_run?.determinism_hash().ok()
    };
    let first = run_once();
    let second = run_once();
    let passed = first.is_some() && first == second;
    GateResult {
        name: "determinism".to_string(),
        passed,
        details: if passed {
            "replay produced an identical run hash".to_string()
        } else {
            "replay hashes diverged".to_string()
        },
    }
}

/// Gate 3: the firewall rejects a poison frame.
fn gate_leakage_firewall() -> GateResult {
    let firewall = LeakageFirewall::new();
    let mut frame = FeatureFrame::new(vec![RunnerId::new("r1")]);
    let poisoned = frame
        .push_column("pos", vec![1.0])
        .is_ok();
    let rejected = poisoned
        && matches!(
            firewall.validate_columns(&frame, FirewallMode::Strict),
            Err(err) if err.code == ErrorCode::Leakage
        );
    GateResult {
        name: "leakage_firewall".to_string(),
        passed: rejected,
        details: if rejected {
            "poison frame rejected in strict mode".to_string()
        } else {
            "poison frame was not rejected".to_string()
        },
    }
}

/// Gate 4: the produced frame satisfies the schema contract.
fn gate_schema_contract() -> GateResult {
    let (race_id, race_ctx, market_ctx, runners) = fixture();
    let passed = fixture_pipeline()
        .and_then(|pipeline| {
            pipeline.run(&race_id, race_ctx, market_ctx, runners, None).ok()
        })
        .and_then(|ctx| ctx.features)
        .is_some_and(|build| FeatureSchema::default_contract().check(&build.frame).is_ok());
    GateResult {
        name: "schema_contract".to_string(),
        passed,
        details: if passed {
            "feature columns equal the declared schema".to_string()
        } else {
            "feature columns diverge from the declared schema".to_string()
        },
    }
}

/// Gate 5: the pipeline is wired end to end.
fn gate_wiring() -> GateResult {
    let (race_id, race_ctx, market_ctx, runners) = fixture();
    let passed = fixture_pipeline()
        .and_then(|pipeline| {
            pipeline.run(&race_id, race_ctx, market_ctx, runners, None).ok()
        })
        .is_some_and(|ctx| {
            ctx.decision.is_some() && ctx.learning_gate_result.is_some() && ctx.engine_run.is_some()
        });
    GateResult {
        name: "wiring".to_string(),
        passed,
        details: if passed {
            "pipeline reachable through storage stage".to_string()
        } else {
            "pipeline did not reach the storage stage".to_string()
        },
    }
}

/// Gate 6: model sanity. The anchor heads a clean, concentrated market.
fn gate_model_sanity() -> GateResult {
    let (race_id, race_ctx, market_ctx, runners) = fixture();
    let passed = fixture_pipeline()
        .and_then(|pipeline| {
            pipeline.run(&race_id, race_ctx, market_ctx, runners, None).ok()
        })
        .and_then(|ctx| ctx.ranking)
        .is_some_and(|ranking| {
            ranking.ordered.first().map(RunnerId::as_str) == Some("r1")
        });
    GateResult {
        name: "model_sanity".to_string(),
        passed,
        details: if passed {
            "strong favorite ranked first on a clean market".to_string()
        } else {
            "ranking inverted on a clean market".to_string()
        },
    }
}

/// Gate 7: market-feature governance. The ablation presets exist.
fn gate_ablation_presets() -> GateResult {
    let names: Vec<&str> = ABLATION_SET.iter().map(|(name, _)| *name).collect();
    let expected = [
        "remove_market",
        "remove_trainer_jockey",
        "remove_form",
        "remove_pace",
        "remove_course_going",
    ];
    let passed = names == expected
        && ABLATION_SET.iter().all(|(_, domain)| !domain.features().is_empty());
    GateResult {
        name: "market_feature_governance".to_string(),
        passed,
        details: if passed {
            "five ablation presets registered with owned features".to_string()
        } else {
            "ablation presets missing or empty".to_string()
        },
    }
}

/// Gate 8: operational safety. Stake caps and the kill switch respond.
fn gate_operational_safety() -> GateResult {
    // Stake caps: confidence stays within the policy band on a full run.
    let (race_id, race_ctx, market_ctx, runners) = fixture();
    let confidence_capped = fixture_pipeline()
        .and_then(|pipeline| {
            pipeline.run(&race_id, race_ctx, market_ctx, runners, None).ok()
        })
        .and_then(|ctx| ctx.decision)
        .is_some_and(|decision| (0.0..=0.80).contains(&decision.confidence));

    // Kill switch: a cancelled pipeline refuses to run.
    let (race_id, race_ctx, market_ctx, runners) = fixture();
    let kill_switch = fixture_pipeline().is_some_and(|pipeline| {
        pipeline.cancellation_token().cancel();
        matches!(
            pipeline.run(&race_id, race_ctx, market_ctx, runners, None),
            Err(err) if err.code == ErrorCode::Cancelled
        )
    });

    let passed = confidence_capped && kill_switch;
    GateResult {
        name: "operational_safety".to_string(),
        passed,
        details: if passed {
            "stake caps hold and the kill switch aborts runs".to_string()
        } else {
            "stake caps or kill switch failed".to_string()
        },
    }
}

// ============================================================================
// SECTION: Suite
// ============================================================================

/// Runs all eight acceptance gates.
#[must_use]
pub fn run_acceptance_gates() -> AcceptanceReport {
    let gates = vec![
        gate_build_integrity(),
        gate_determinism(),
        gate_leakage_firewall(),
        gate_schema_contract(),
        gate_wiring(),
        gate_model_sanity(),
        gate_ablation_presets(),
        gate_operational_safety(),
    ];
    let greenlit = gates.iter().all(|gate| gate.passed);
    AcceptanceReport {
        gates,
        greenlit,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
