// crates/furlong-core/src/core/context.rs
// ============================================================================
// Module: Furlong Race & Market Contexts
// Description: Validated race, market, runner, and outcome input structures.
// Purpose: Capture everything known at decision time as immutable snapshots.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Contexts are the authoritative inputs to the pipeline: the race card at
//! decision time, the market snapshot taken at or before decision time, and
//! the runner list. They are immutable once constructed and embedded verbatim
//! into every engine run record. Outcome data only exists in the post-race
//! path and must never reach pre-decision stages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RaceId;
use crate::core::identifiers::RunnerId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Race Context
// ============================================================================

/// Identity of a race at decision time.
///
/// # Invariants
/// - Immutable once constructed; referenced by every downstream artifact.
/// - `field_size >= 1` and matches the runner list handed to the pipeline.
/// - `decision_time` is the knowledge cutoff for every downstream read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceContext {
    /// Globally unique race identifier.
    pub race_id: RaceId,
    /// Course name.
    pub course: String,
    /// Decision instant (off time minus ten minutes in shadow mode).
    pub decision_time: Timestamp,
    /// Race distance in meters.
    pub distance_meters: u32,
    /// Going description (e.g. "Good", "Soft").
    pub going: String,
    /// Race class level.
    pub class_level: i32,
    /// Surface (e.g. "Turf", "AW").
    pub surface: String,
    /// Number of declared runners.
    pub field_size: usize,
    /// Optional age-band restriction (e.g. "3yo+"); `None` means open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_band: Option<String>,
    /// Optional sex restriction; `None` means open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex_restriction: Option<String>,
    /// Optional host-supplied stability signal for the race, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_score: Option<f64>,
    /// Optional host-supplied pace-geometry signal for the race, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace_geometry_score: Option<f64>,
}

// ============================================================================
// SECTION: Market Context
// ============================================================================

/// Wire helper serializing decimal odds as exact strings.
///
/// Market odds are decimal prices where exactness matters in audit records,
/// so the wire form is a string (`"4.5"`), while the in-memory form stays a
/// float for scoring arithmetic.
mod odds_string {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use serde::de::Error as DeError;

    /// Serializes odds as a decimal string.
    pub fn serialize<S>(odds: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_odds(*odds))
    }

    /// Accepts both string and numeric odds on input.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Raw wire forms accepted for odds values.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            /// Exact decimal string form.
            Text(String),
            /// Plain numeric form.
            Number(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text
                .parse::<f64>()
                .map_err(|err| DeError::custom(format!("invalid odds string {text:?}: {err}"))),
            Raw::Number(value) => Ok(value),
        }
    }
}

/// Formats decimal odds with a minimal but non-integer textual form.
#[must_use]
pub fn format_odds(odds: f64) -> String {
    let rendered = format!("{odds}");
    if rendered.contains('.') || rendered.contains('e') {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

/// One runner's market line inside a snapshot.
///
/// # Invariants
/// - `odds_decimal > 0` (enforced by stage-boundary validators).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerMarket {
    /// Runner identifier.
    pub runner_id: RunnerId,
    /// Decimal odds at snapshot time; serialized as an exact string.
    #[serde(with = "odds_string")]
    pub odds_decimal: f64,
    /// Matched volume when the venue reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Favorite flag as reported by the venue, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

/// Market snapshot taken at a fixed instant at or before decision time.
///
/// # Invariants
/// - `snapshot_timestamp <= decision_time` of the owning race.
/// - When any `is_favorite` flag is set, it matches the lowest-odds runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// Race this snapshot belongs to.
    pub race_id: RaceId,
    /// Instant the snapshot was taken.
    pub snapshot_timestamp: Timestamp,
    /// Ordered market lines, one per runner.
    pub runners: Vec<RunnerMarket>,
}

impl MarketContext {
    /// Returns the market line for a runner, if present.
    #[must_use]
    pub fn line_for(&self, runner_id: &RunnerId) -> Option<&RunnerMarket> {
        self.runners.iter().find(|line| &line.runner_id == runner_id)
    }

    /// Returns the lowest-odds line in the snapshot, if any.
    #[must_use]
    pub fn shortest_price(&self) -> Option<&RunnerMarket> {
        self.runners
            .iter()
            .min_by(|a, b| {
                a.odds_decimal
                    .partial_cmp(&b.odds_decimal)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.runner_id.cmp(&b.runner_id))
            })
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Handicap mark pressure classification for a runner.
///
/// # Invariants
/// - Variants are stable for serialization and feature matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkPressure {
    /// Mark in a normal band.
    #[default]
    Normal,
    /// Running from a career-high mark.
    CareerHigh,
    /// Dropped to a floor mark.
    Floor,
}

/// Observed pace style for a runner.
///
/// # Invariants
/// - Variants are stable for serialization and tactic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceStyle {
    /// Leads early.
    FrontRunner,
    /// Races in the middle of the field.
    MidPack,
    /// Finishes from behind.
    Closer,
    /// No reliable pace data.
    #[default]
    Unknown,
}

/// Historical strike-rate statistics scoped to track, distance band, surface,
/// and a recency window.
///
/// # Invariants
/// - Win rates in `[0, 1]`; sample sizes are non-negative counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalStats {
    /// Trainer win rate in the scoped window.
    pub trainer_win_rate: f64,
    /// Jockey win rate in the scoped window.
    pub jockey_win_rate: f64,
    /// Trainer+jockey combination win rate in the scoped window.
    pub combo_win_rate: f64,
    /// Trainer sample size.
    pub trainer_sample_size: u32,
    /// Jockey sample size.
    pub jockey_sample_size: u32,
    /// Combination sample size.
    pub combo_sample_size: u32,
    /// Track code the stats are scoped to.
    pub track: String,
    /// Distance band the stats are scoped to.
    pub distance_band: String,
    /// Surface the stats are scoped to.
    pub surface: String,
    /// Recency window in days.
    pub recency_days: u32,
}

/// Career record of a runner at one exact distance.
///
/// # Invariants
/// - `wins <= runs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceRecord {
    /// Career runs at this distance.
    pub runs: u32,
    /// Career wins at this distance.
    pub wins: u32,
}

/// Race participant with everything known at decision time.
///
/// # Invariants
/// - `runner_id` is stable across all stages of the race.
/// - Odds, when present, are positive (validators enforce presence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    /// Runner identifier, unique within the race.
    pub runner_id: RunnerId,
    /// Horse name.
    pub horse_name: String,
    /// Age in years (2..=15 on valid cards).
    pub age: u8,
    /// Sex code (e.g. "G", "M", "F").
    pub sex: String,
    /// Trainer name.
    pub trainer: String,
    /// Jockey name.
    pub jockey: String,
    /// Compact form string, most recent run leftmost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_string: Option<String>,
    /// Decimal odds at decision time; validators reject absence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds_decimal: Option<f64>,
    /// Official rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or_rating: Option<i32>,
    /// Racing Post rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpr: Option<i32>,
    /// Topspeed rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i32>,
    /// Days since the last run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_since_last_run: Option<u32>,
    /// Class movement relative to the last run (negative = dropping).
    #[serde(default)]
    pub class_movement: i32,
    /// Class rating for condition matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_rating: Option<i32>,
    /// First-time headgear marker.
    #[serde(default)]
    pub first_time_headgear: bool,
    /// Notable jockey booking marker.
    #[serde(default)]
    pub jockey_booking_notable: bool,
    /// Jockey switch to a higher-rated rider.
    #[serde(default)]
    pub jockey_upgrade: bool,
    /// Stable strike rate over the last fourteen days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_form_last_14: Option<f64>,
    /// Handicap mark pressure classification.
    #[serde(default)]
    pub mark_pressure: MarkPressure,
    /// Strike rate over the last three runs, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_last_3: Option<f64>,
    /// Observed pace style.
    #[serde(default)]
    pub pace_style: PaceStyle,
    /// Trainer strike rate for narrative detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_strike_rate: Option<f64>,
    /// Jockey strike rate for narrative detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jockey_strike_rate: Option<f64>,
    /// Recent odds drift (negative = shortening).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds_drift: Option<f64>,
    /// Finishing position of the last run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_position: Option<u32>,
    /// Mean finishing position over the last five runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_position_last_5: Option<f64>,
    /// Career record at today's exact distance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_record: Option<DistanceRecord>,
    /// Scoped historical strike-rate statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_stats: Option<HistoricalStats>,
}

// ============================================================================
// SECTION: User Context
// ============================================================================

/// Optional user context consumed by the sunk-cost bias detector.
///
/// # Invariants
/// - Snapshot values; the engine never mutates them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// Recent profit and loss in account currency units.
    pub recent_pnl: f64,
    /// Current consecutive losing-race count.
    pub losing_streak: u32,
}

// ============================================================================
// SECTION: Race Outcome
// ============================================================================

/// Verified post-race outcome used only by the finalization path.
///
/// # Invariants
/// - Never available to pre-decision stages; the leakage firewall rejects
///   any outcome-derived columns upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceOutcome {
    /// Race the outcome belongs to.
    pub race_id: RaceId,
    /// Winning runner, when the result is complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<RunnerId>,
    /// Finishing positions by runner.
    #[serde(default)]
    pub positions: BTreeMap<RunnerId, u32>,
    /// Whether the result has been verified against the official record.
    pub verified: bool,
    /// Starting prices by runner, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_prices: Option<BTreeMap<RunnerId, f64>>,
}

// ============================================================================
// SECTION: Engine Mode
// ============================================================================

/// Execution mode recorded on every engine run.
///
/// # Invariants
/// - Variants are stable for serialization and replay matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineMode {
    /// Live race analysis.
    #[default]
    Race,
    /// Historical backtest replay.
    Backtest,
    /// Synthetic simulation input.
    Simulation,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
