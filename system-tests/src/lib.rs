// system-tests/src/lib.rs
// ============================================================================
// Module: Furlong System Test Fixtures
// Description: Shared race fixtures for end-to-end suites.
// Purpose: One place to build realistic cards, snapshots, and profiles.
// Dependencies: furlong-core
// ============================================================================

//! ## Overview
//! Fixture builders shared by the system-test suites: runners with sensible
//! card data, market snapshots pinned at decision time, and opponent
//! profiles for policy-level scenarios.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use furlong_core::IntentClass;
use furlong_core::MarketContext;
use furlong_core::MarketRole;
use furlong_core::OpponentProfile;
use furlong_core::RaceContext;
use furlong_core::RaceId;
use furlong_core::Runner;
use furlong_core::RunnerId;
use furlong_core::RunnerMarket;
use furlong_core::StableTactic;
use furlong_core::Timestamp;
use furlong_core::core::context::MarkPressure;
use furlong_core::core::context::PaceStyle;

// ============================================================================
// SECTION: Fixture Builders
// ============================================================================

/// Fixed decision instant used across suites.
#[must_use]
pub fn decision_time() -> Timestamp {
    // 2026-03-14T14:20:00Z.
    Timestamp::from_unix_millis(1_773_498_000_000)
}

/// Builds a runner with sensible card defaults.
#[must_use]
pub fn runner(id: &str, odds: f64) -> Runner {
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

/// Builds a race context with host-supplied stability and pace signals.
#[must_use]
pub fn race_ctx(race_id: &str, field_size: usize, stability: f64, pace: f64) -> RaceContext {
    RaceContext {
        race_id: RaceId::new(race_id),
        course: "Newmarket".to_string(),
        decision_time: decision_time(),
        distance_meters: 1_600,
        going: "Good".to_string(),
        class_level: 3,
        surface: "Turf".to_string(),
        field_size,
        age_band: None,
        sex_restriction: None,
        stability_score: Some(stability),
        pace_geometry_score: Some(pace),
    }
}

/// Builds a market snapshot at decision time from (id, odds) pairs.
#[must_use]
pub fn market_ctx(race_id: &str, odds: &[(&str, f64)]) -> MarketContext {
    MarketContext {
        race_id: RaceId::new(race_id),
        snapshot_timestamp: decision_time(),
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

/// Builds an opponent profile for policy-level scenarios.
#[must_use]
pub fn profile(id: &str, role: MarketRole, intent: IntentClass) -> OpponentProfile {
    OpponentProfile {
        runner_id: RunnerId::new(id),
        horse_name: format!("Horse {id}"),
        intent_class: intent,
        market_role: role,
        stable_tactic: StableTactic::Solo,
        confidence: 0.7,
        role_reason: format!("scenario fixture role {}", role.as_str()),
        evidence: BTreeMap::new(),
    }
}
