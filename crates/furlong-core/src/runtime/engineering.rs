// crates/furlong-core/src/runtime/engineering.rs
// ============================================================================
// Module: Furlong Race Engineering Features
// Description: Condition targeting, entry intent, stable coupling, mark
// strategy.
// Purpose: Capture how a race is constructed, not just how horses have run.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Four deterministic per-runner features describe race construction: CTI
//! measures how well the runner matches the race-conditions template, EIM
//! sums signed entry-intent markers, MSC labels multi-runner stable
//! coupling, and HMS detects handicap-mark strategy. All four are pure
//! transforms over the snapshot plus the historical slice carried on the
//! runner; there is no stochastic component.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::context::MarkPressure;
use crate::core::context::PaceStyle;
use crate::core::context::RaceContext;
use crate::core::context::Runner;
use crate::core::identifiers::RunnerId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// CTI score above which conditions read as targeted.
const CTI_TARGETED: f64 = 0.7;

/// Odds drift below which the market reads as supporting the runner.
const MARKET_SUPPORT_DRIFT: f64 = -0.2;

// ============================================================================
// SECTION: Feature Record
// ============================================================================

/// Stable-coupling role within a multi-runner stable.
///
/// # Invariants
/// - Variants are stable for serialization and coupling analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingRole {
    /// Only runner from its stable.
    #[default]
    Solo,
    /// The stable's intended finisher.
    Finisher,
    /// Sets the pace for a stablemate.
    PaceSetter,
    /// Market decoy.
    Decoy,
}

/// Race-engineering features for one runner.
///
/// # Invariants
/// - `cti_score` in `[0, 1]`; `eim_score` and `hms_signal` in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeringFeatures {
    /// Runner identifier.
    pub runner_id: RunnerId,
    /// Condition Targeting Index.
    pub cti_score: f64,
    /// Entry Intent Markers sum.
    pub eim_score: f64,
    /// Whether the runner belongs to a multi-runner stable.
    pub msc_threat_flag: bool,
    /// Coupling role within the stable.
    pub msc_role: CouplingRole,
    /// Handicap Mark Strategy signal.
    pub hms_signal: f64,
}

// ============================================================================
// SECTION: Condition Targeting Index
// ============================================================================

/// Checks whether a runner age matches an age-band restriction.
fn age_matches_band(age: u8, band: &str) -> bool {
    match band {
        "2yo" => age == 2,
        "3yo" => age == 3,
        "3yo+" => age >= 3,
        "4yo+" => age >= 4,
        _ => true,
    }
}

/// Computes the Condition Targeting Index in `[0, 1]`.
///
/// Blends age-band match, sex-restriction match, class delta, and the
/// runner's historical win rate at this exact distance. Each contributing
/// dimension is averaged so missing history does not punish the score.
#[must_use]
pub fn condition_targeting_index(runner: &Runner, race_ctx: &RaceContext) -> f64 {
    let mut score = 0.0;
    let mut count = 0u32;

    let band = race_ctx.age_band.as_deref().unwrap_or("open");
    if band == "open" || age_matches_band(runner.age, band) {
        score += 1.0;
    }
    count += 1;

    let restriction = race_ctx.sex_restriction.as_deref().unwrap_or("open");
    if restriction == "open" || restriction.contains(runner.sex.as_str()) {
        score += 1.0;
    }
    count += 1;

    if let Some(class_rating) = runner.class_rating {
        let delta = (class_rating - race_ctx.class_level).abs();
        if delta == 0 {
            score += 1.0;
        } else if delta == 1 {
            score += 0.5;
        }
        count += 1;
    }

    if let Some(record) = runner.distance_record
        && record.runs > 0
    {
        score += f64::from(record.wins) / f64::from(record.runs);
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }
    (score / f64::from(count)).clamp(0.0, 1.0)
}

// ============================================================================
// SECTION: Entry Intent Markers
// ============================================================================

/// Computes the Entry Intent Markers score in `[-1, 1]`.
///
/// Signed markers: a days-since-last sweet spot (+0.3), a long layoff
/// (−0.2), first-time headgear (+0.4), a notable jockey booking (+0.5), a
/// jockey upgrade (+0.3), class drop (+0.4) or rise (−0.2), and a hot stable
/// (+0.3).
#[must_use]
pub fn entry_intent_markers(runner: &Runner) -> f64 {
    let mut total: f64 = 0.0;

    if let Some(days) = runner.days_since_last_run {
        if (7..=14).contains(&days) {
            total += 0.3;
        }
        if days > 90 {
            total -= 0.2;
        }
    }
    if runner.first_time_headgear {
        total += 0.4;
    }
    if runner.jockey_booking_notable {
        total += 0.5;
    }
    if runner.jockey_upgrade {
        total += 0.3;
    }
    match runner.class_movement.cmp(&0) {
        // Dropping in class reads as a go signal; rising reads as a prep.
        std::cmp::Ordering::Less => total += 0.4,
        std::cmp::Ordering::Greater => total -= 0.2,
        std::cmp::Ordering::Equal => {}
    }
    if runner.stable_form_last_14.is_some_and(|rate| rate > 0.25) {
        total += 0.3;
    }

    total.clamp(-1.0, 1.0)
}

// ============================================================================
// SECTION: Handicap Mark Strategy
// ============================================================================

/// Computes the Handicap Mark Strategy signal in `[-1, 1]`.
///
/// A career-high mark reads negative; a floor mark reads positive. A
/// descending-effort sequence over the last three runs ("drop program")
/// reads strongly positive, and a floor mark with matching conditions plus
/// market support reads as "today is the go".
#[must_use]
pub fn handicap_mark_strategy(runner: &Runner, cti_score: f64) -> f64 {
    let mut signal: f64 = 0.0;

    match runner.mark_pressure {
        MarkPressure::CareerHigh => signal -= 0.5,
        MarkPressure::Floor => signal += 0.5,
        MarkPressure::Normal => {}
    }

    // Drop program: strictly worsening recent positions from the parsed form.
    if let Some(form) = runner.form_string.as_deref() {
        let positions: Vec<u32> = crate::runtime::form::parse_form_string(form)
            .into_iter()
            .take(3)
            .flatten()
            .collect();
        // Positions arrive most recent first; chronological decline means
        // the most recent run is the worst of the three.
        if positions.len() == 3 && positions[0] > positions[1] && positions[1] > positions[2] {
            signal += 0.6;
        }
    }

    let conditions_match = cti_score > CTI_TARGETED;
    let market_support = runner
        .odds_drift
        .is_some_and(|drift| drift < MARKET_SUPPORT_DRIFT);
    if conditions_match && market_support && runner.mark_pressure == MarkPressure::Floor {
        signal += 0.8;
    }

    signal.clamp(-1.0, 1.0)
}

// ============================================================================
// SECTION: Feature Builder
// ============================================================================

/// Builds race-engineering features for every runner.
///
/// CTI, EIM, and HMS are per-runner; MSC requires the whole field and is
/// applied in a second pass over trainer groups sorted by odds.
#[must_use]
pub fn build_engineering_features(
    runners: &[Runner],
    race_ctx: &RaceContext,
) -> Vec<EngineeringFeatures> {
    let mut features: Vec<EngineeringFeatures> = runners
        .iter()
        .map(|runner| {
            let cti = condition_targeting_index(runner, race_ctx);
            EngineeringFeatures {
                runner_id: runner.runner_id.clone(),
                cti_score: cti,
                eim_score: entry_intent_markers(runner),
                msc_threat_flag: false,
                msc_role: CouplingRole::Solo,
                hms_signal: handicap_mark_strategy(runner, cti),
            }
        })
        .collect();

    apply_stable_coupling(&mut features, runners);
    features
}

/// Applies multi-runner stable coupling labels in place.
fn apply_stable_coupling(features: &mut [EngineeringFeatures], runners: &[Runner]) {
    let mut groups: std::collections::BTreeMap<&str, Vec<usize>> =
        std::collections::BTreeMap::new();
    for (index, runner) in runners.iter().enumerate() {
        groups.entry(runner.trainer.as_str()).or_default().push(index);
    }

    for indices in groups.into_values() {
        if indices.len() < 2 {
            continue;
        }
        let mut sorted = indices;
        sorted.sort_by(|a, b| {
            let a_odds = runners[*a].odds_decimal.unwrap_or(f64::MAX);
            let b_odds = runners[*b].odds_decimal.unwrap_or(f64::MAX);
            a_odds
                .partial_cmp(&b_odds)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| runners[*a].runner_id.cmp(&runners[*b].runner_id))
        });
        for (position, index) in sorted.iter().enumerate() {
            features[*index].msc_threat_flag = true;
            features[*index].msc_role = if position == 0 {
                CouplingRole::Finisher
            } else if runners[*index].pace_style == PaceStyle::FrontRunner {
                CouplingRole::PaceSetter
            } else {
                CouplingRole::Decoy
            };
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

    use super::CouplingRole;
    use super::build_engineering_features;
    use super::condition_targeting_index;
    use super::entry_intent_markers;
    use super::handicap_mark_strategy;
    use crate::core::context::DistanceRecord;
    use crate::core::context::MarkPressure;
    use crate::core::context::PaceStyle;
    use crate::core::context::RaceContext;
    use crate::core::context::Runner;
    use crate::core::identifiers::RaceId;
    use crate::core::identifiers::RunnerId;
    use crate::core::time::Timestamp;

    fn race_ctx() -> RaceContext {
        RaceContext {
            race_id: RaceId::new("R1"),
            course: "Newmarket".to_string(),
            decision_time: Timestamp::from_unix_millis(0),
            distance_meters: 1600,
            going: "Good".to_string(),
            class_level: 85,
            surface: "Turf".to_string(),
            field_size: 3,
            age_band: Some("3yo+".to_string()),
            sex_restriction: None,
            stability_score: None,
            pace_geometry_score: None,
        }
    }

    fn runner(id: &str, trainer: &str, odds: f64) -> Runner {
        Runner {
            runner_id: RunnerId::new(id),
            horse_name: format!("Horse {id}"),
            age: 4,
            sex: "G".to_string(),
            trainer: trainer.to_string(),
            jockey: format!("Jockey {id}"),
            form_string: None,
            odds_decimal: Some(odds),
            or_rating: None,
            rpr: None,
            ts: None,
            days_since_last_run: Some(21),
            class_movement: 0,
            class_rating: Some(85),
            first_time_headgear: false,
            jockey_booking_notable: false,
            jockey_upgrade: false,
            stable_form_last_14: None,
            mark_pressure: MarkPressure::Normal,
            form_last_3: None,
            pace_style: PaceStyle::Unknown,
            trainer_strike_rate: None,
            jockey_strike_rate: None,
            odds_drift: None,
            last_run_position: None,
            avg_position_last_5: None,
            distance_record: None,
            historical_stats: None,
        }
    }

    #[test]
    fn cti_rewards_exact_condition_match() {
        let mut entry = runner("r1", "T", 4.0);
        entry.distance_record = Some(DistanceRecord {
            runs: 4,
            wins: 2,
        });
        let score = condition_targeting_index(&entry, &race_ctx());
        // Age match 1.0 + sex open 1.0 + class exact 1.0 + distance 0.5 over
        // four dimensions.
        assert!((score - 0.875).abs() < 1e-9);
    }

    #[test]
    fn cti_penalizes_class_mismatch() {
        let mut entry = runner("r1", "T", 4.0);
        entry.class_rating = Some(80);
        let score = condition_targeting_index(&entry, &race_ctx());
        assert!(score < 0.7);
    }

    #[test]
    fn eim_sums_signed_markers_and_clamps() {
        let mut entry = runner("r1", "T", 4.0);
        entry.days_since_last_run = Some(10);
        entry.first_time_headgear = true;
        entry.jockey_booking_notable = true;
        entry.jockey_upgrade = true;
        entry.class_movement = -1;
        entry.stable_form_last_14 = Some(0.3);
        // 0.3 + 0.4 + 0.5 + 0.3 + 0.4 + 0.3 = 2.2, clamped to 1.0.
        assert!((entry_intent_markers(&entry) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn layoff_and_class_rise_read_negative() {
        let mut entry = runner("r1", "T", 4.0);
        entry.days_since_last_run = Some(150);
        entry.class_movement = 1;
        assert!((entry_intent_markers(&entry) + 0.4).abs() < 1e-9);
    }

    #[test]
    fn hms_detects_drop_program() {
        let mut entry = runner("r1", "T", 4.0);
        // Most recent first 6, 4, 2: chronologically 2 then 4 then 6, a
        // strictly declining effort sequence.
        entry.form_string = Some("642".to_string());
        let signal = handicap_mark_strategy(&entry, 0.0);
        assert!((signal - 0.6).abs() < 1e-9);
    }

    #[test]
    fn hms_flags_today_is_the_go() {
        let mut entry = runner("r1", "T", 4.0);
        entry.mark_pressure = MarkPressure::Floor;
        entry.odds_drift = Some(-0.3);
        let signal = handicap_mark_strategy(&entry, 0.8);
        // Floor 0.5 + convergence 0.8 clamped to 1.0.
        assert!((signal - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn msc_labels_multi_runner_stables() {
        let mut pacer = runner("r2", "Stable X", 8.0);
        pacer.pace_style = PaceStyle::FrontRunner;
        let runners = vec![runner("r1", "Stable X", 3.5), pacer, runner("r3", "Stable Y", 6.0)];
        let features = build_engineering_features(&runners, &race_ctx());
        assert!(features[0].msc_threat_flag);
        assert_eq!(features[0].msc_role, CouplingRole::Finisher);
        assert_eq!(features[1].msc_role, CouplingRole::PaceSetter);
        assert!(!features[2].msc_threat_flag);
        assert_eq!(features[2].msc_role, CouplingRole::Solo);
    }
}
