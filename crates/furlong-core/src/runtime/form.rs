// crates/furlong-core/src/runtime/form.rs
// ============================================================================
// Module: Furlong Form Parser & Stability Clusters
// Description: Compact form-string parsing and rule-based stability labels.
// Purpose: Turn raw form into auditable consistency metrics and clusters.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Form strings are parsed character by character, most recent run leftmost:
//! digits are finishing positions, `0` is unplaced, `-` is a season gap, and
//! letters (fall, pulled-up, and similar codes) read as no position. Derived
//! metrics feed a rule-based stability cluster; clusters are descriptive
//! labels, not predictions, and the trust modifier derives only from the
//! cluster label, never from raw positions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RunnerId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Recent-run window for the recent-form metric.
const RECENT_FORM_LOOKBACK: usize = 3;

/// Recent-run window for the trend classification.
const TREND_LOOKBACK: usize = 5;

/// Top-N finishing position counted as a place.
const PLACE_THRESHOLD: u32 = 3;

/// Minimum valid races for a stability classification.
const MIN_VALID_RACES: usize = 3;

/// Bound on the cluster trust modifier magnitude.
pub const TRUST_MODIFIER_CAP: f64 = 0.10;

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a compact form string into positions, most recent first.
///
/// `None` entries are gaps, unplaced runs, or letter codes. An empty string
/// or a bare `-` parses to an empty vector.
#[must_use]
pub fn parse_form_string(form: &str) -> Vec<Option<u32>> {
    if form.is_empty() || form == "-" {
        return Vec::new();
    }
    let mut positions = Vec::with_capacity(form.len());
    for ch in form.chars() {
        match ch {
            '-' | '0' => positions.push(None),
            digit if digit.is_ascii_digit() => {
                positions.push(digit.to_digit(10));
            }
            // Letter codes (F, P, U, R, ...) read as no position.
            _ => positions.push(None),
        }
    }
    positions
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Derived form metrics for one runner.
///
/// # Invariants
/// - All rates are in `[0, 1]`; `valid_races` counts non-null positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormMetrics {
    /// Consistency score (1 − stddev/3 over valid positions).
    pub consistency: f64,
    /// Recent-form score over the last three runs.
    pub recent_form: f64,
    /// Win rate over valid positions.
    pub win_rate: f64,
    /// Place rate (top three) over valid positions.
    pub place_rate: f64,
    /// Count of valid (non-null) positions.
    pub valid_races: usize,
}

/// Computes the consistency score from parsed positions.
///
/// Fewer than two valid positions yields zero. Standard deviation is
/// normalized against 3.0, so positions spread across the card read as
/// fully inconsistent.
#[must_use]
pub fn consistency_score(positions: &[Option<u32>]) -> f64 {
    let valid: Vec<f64> = positions.iter().flatten().map(|p| f64::from(*p)).collect();
    if valid.len() < 2 {
        return 0.0;
    }
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    let variance = valid.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / valid.len() as f64;
    (1.0 - variance.sqrt() / 3.0).max(0.0)
}

/// Computes the recent-form score over the last [`RECENT_FORM_LOOKBACK`]
/// runs. Position 1 maps toward 1.0, position 9 toward 0.0; no valid recent
/// positions yields the neutral 0.5.
#[must_use]
pub fn recent_form_score(positions: &[Option<u32>]) -> f64 {
    let recent: Vec<f64> = positions
        .iter()
        .take(RECENT_FORM_LOOKBACK)
        .flatten()
        .map(|p| f64::from(*p))
        .collect();
    if recent.is_empty() {
        return 0.5;
    }
    let mean = recent.iter().sum::<f64>() / recent.len() as f64;
    ((10.0 - mean) / 9.0).clamp(0.0, 1.0)
}

/// Computes the win rate over valid positions.
#[must_use]
pub fn win_rate(positions: &[Option<u32>]) -> f64 {
    let valid: Vec<u32> = positions.iter().flatten().copied().collect();
    if valid.is_empty() {
        return 0.0;
    }
    let wins = valid.iter().filter(|p| **p == 1).count();
    wins as f64 / valid.len() as f64
}

/// Computes the place rate (top [`PLACE_THRESHOLD`]) over valid positions.
#[must_use]
pub fn place_rate(positions: &[Option<u32>]) -> f64 {
    let valid: Vec<u32> = positions.iter().flatten().copied().collect();
    if valid.is_empty() {
        return 0.0;
    }
    let places = valid.iter().filter(|p| **p <= PLACE_THRESHOLD).count();
    places as f64 / valid.len() as f64
}

/// Runs the full form analysis over a form string.
#[must_use]
pub fn analyze_form(form: &str) -> FormMetrics {
    let positions = parse_form_string(form);
    let valid_races = positions.iter().flatten().count();
    FormMetrics {
        consistency: consistency_score(&positions),
        recent_form: recent_form_score(&positions),
        win_rate: win_rate(&positions),
        place_rate: place_rate(&positions),
        valid_races,
    }
}

// ============================================================================
// SECTION: Stability Classification
// ============================================================================

/// Rule-based stability class.
///
/// # Invariants
/// - Variants are stable for serialization and cluster-id composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StabilityClass {
    /// Consistency at or above 0.7 with enough valid races.
    Stable,
    /// Between the stable and volatile bands.
    Moderate,
    /// Consistency at or below 0.4.
    Volatile,
    /// Fewer than three valid races.
    InsufficientData,
}

impl StabilityClass {
    /// Returns the stable wire label used in cluster ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::Moderate => "MODERATE",
            Self::Volatile => "VOLATILE",
            Self::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

/// Consistency band used in cluster ids.
///
/// # Invariants
/// - Variants are stable for serialization and cluster-id composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyBand {
    /// Consistency at or above 0.7.
    High,
    /// Consistency in `[0.4, 0.7)`.
    Medium,
    /// Consistency below 0.4.
    Low,
}

impl ConsistencyBand {
    /// Returns the stable wire label used in cluster ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Recent form trend from comparing older and newer halves.
///
/// # Invariants
/// - Variants are stable for serialization and cluster-id composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormTrend {
    /// Newer positions at least one place better than older ones.
    Improving,
    /// No material movement between halves.
    Stable,
    /// Newer positions at least one place worse than older ones.
    Declining,
    /// Too few valid positions to classify.
    Unknown,
}

impl FormTrend {
    /// Returns the stable wire label used in cluster ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "IMPROVING",
            Self::Stable => "STABLE",
            Self::Declining => "DECLINING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Field-relative rank band used in cluster ids.
///
/// # Invariants
/// - Variants are stable for serialization and cluster-id composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldRankBand {
    /// Top third of the field by market rank.
    Top,
    /// Middle third.
    Mid,
    /// Bottom third.
    Bottom,
}

impl FieldRankBand {
    /// Returns the stable wire label used in cluster ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Top => "TOP",
            Self::Mid => "MID",
            Self::Bottom => "BOTTOM",
        }
    }
}

/// Classifies stability from consistency and sample size.
#[must_use]
pub fn classify_stability(consistency: f64, valid_races: usize) -> StabilityClass {
    if valid_races < MIN_VALID_RACES {
        return StabilityClass::InsufficientData;
    }
    if consistency >= 0.7 {
        StabilityClass::Stable
    } else if consistency <= 0.4 {
        StabilityClass::Volatile
    } else {
        StabilityClass::Moderate
    }
}

/// Classifies the consistency band.
#[must_use]
pub fn classify_consistency_band(consistency: f64) -> ConsistencyBand {
    if consistency >= 0.7 {
        ConsistencyBand::High
    } else if consistency >= 0.4 {
        ConsistencyBand::Medium
    } else {
        ConsistencyBand::Low
    }
}

/// Classifies the form trend over the last [`TREND_LOOKBACK`] runs.
///
/// Positions arrive most recent first; the comparison runs chronologically,
/// older half against newer half, with a one-position threshold.
#[must_use]
pub fn classify_form_trend(positions: &[Option<u32>]) -> FormTrend {
    if positions.len() < MIN_VALID_RACES {
        return FormTrend::Unknown;
    }
    let valid: Vec<f64> = positions
        .iter()
        .take(TREND_LOOKBACK)
        .flatten()
        .map(|p| f64::from(*p))
        .collect();
    if valid.len() < MIN_VALID_RACES {
        return FormTrend::Unknown;
    }
    let chronological: Vec<f64> = valid.iter().rev().copied().collect();
    let mid = chronological.len() / 2;
    let older = &chronological[.. mid];
    let newer = &chronological[mid ..];
    let avg_older = older.iter().sum::<f64>() / older.len() as f64;
    let avg_newer = newer.iter().sum::<f64>() / newer.len() as f64;
    // Lower position is better, so a positive difference reads as improving.
    let diff = avg_older - avg_newer;
    if diff > 1.0 {
        FormTrend::Improving
    } else if diff < -1.0 {
        FormTrend::Declining
    } else {
        FormTrend::Stable
    }
}

/// Classifies the field-relative rank band (1-indexed market rank).
#[must_use]
pub fn classify_field_rank_band(field_position: usize, field_size: usize) -> FieldRankBand {
    if field_size == 0 {
        return FieldRankBand::Bottom;
    }
    let percentile = (field_position.saturating_sub(1)) as f64 / field_size as f64;
    if percentile < 0.33 {
        FieldRankBand::Top
    } else if percentile < 0.67 {
        FieldRankBand::Mid
    } else {
        FieldRankBand::Bottom
    }
}

// ============================================================================
// SECTION: Stability Profile
// ============================================================================

/// Complete stability profile for one runner.
///
/// # Invariants
/// - `cluster_id` is the composite
///   `{stability}_{consistency_band}_{trend}_{rank_band}` label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityProfile {
    /// Runner identifier.
    pub runner_id: RunnerId,
    /// Stability classification.
    pub stability_class: StabilityClass,
    /// Consistency band.
    pub consistency_band: ConsistencyBand,
    /// Form trend.
    pub form_trend: FormTrend,
    /// Field-relative rank band.
    pub field_rank_band: FieldRankBand,
    /// Composite cluster identifier.
    pub cluster_id: String,
    /// Raw consistency score.
    pub consistency_score: f64,
    /// Raw recent-form score.
    pub recent_form_score: f64,
    /// Raw win rate.
    pub win_rate: f64,
    /// Raw place rate.
    pub place_rate: f64,
}

/// Composes the cluster identifier from its four dimensions.
#[must_use]
pub fn cluster_id(
    stability: StabilityClass,
    band: ConsistencyBand,
    trend: FormTrend,
    rank: FieldRankBand,
) -> String {
    format!(
        "{}_{}_{}_{}",
        stability.as_str(),
        band.as_str(),
        trend.as_str(),
        rank.as_str()
    )
}

/// Builds the stability profile for a runner from its form string and
/// market rank.
#[must_use]
pub fn build_stability_profile(
    runner_id: &RunnerId,
    form: Option<&str>,
    field_position: usize,
    field_size: usize,
) -> StabilityProfile {
    let positions = form.map(parse_form_string).unwrap_or_default();
    let metrics = form.map_or(
        FormMetrics {
            consistency: 0.0,
            recent_form: 0.5,
            win_rate: 0.0,
            place_rate: 0.0,
            valid_races: 0,
        },
        analyze_form,
    );
    let stability = classify_stability(metrics.consistency, metrics.valid_races);
    let band = classify_consistency_band(metrics.consistency);
    let trend = classify_form_trend(&positions);
    let rank = classify_field_rank_band(field_position, field_size);
    StabilityProfile {
        runner_id: runner_id.clone(),
        stability_class: stability,
        consistency_band: band,
        form_trend: trend,
        field_rank_band: rank,
        cluster_id: cluster_id(stability, band, trend, rank),
        consistency_score: metrics.consistency,
        recent_form_score: metrics.recent_form,
        win_rate: metrics.win_rate,
        place_rate: metrics.place_rate,
    }
}

/// Identifies runners the market may undervalue: improving form from the
/// middle or bottom of the market with a stable or moderate base.
#[must_use]
pub fn identify_hidden_value(profiles: &[StabilityProfile]) -> Vec<RunnerId> {
    profiles
        .iter()
        .filter(|profile| {
            profile.form_trend == FormTrend::Improving
                && matches!(profile.field_rank_band, FieldRankBand::Mid | FieldRankBand::Bottom)
                && matches!(
                    profile.stability_class,
                    StabilityClass::Stable | StabilityClass::Moderate
                )
        })
        .map(|profile| profile.runner_id.clone())
        .collect()
}

/// Identifies potential liquidity traps: volatile runners at the top of the
/// market.
#[must_use]
pub fn identify_liquidity_traps(profiles: &[StabilityProfile]) -> Vec<RunnerId> {
    profiles
        .iter()
        .filter(|profile| {
            profile.stability_class == StabilityClass::Volatile
                && profile.field_rank_band == FieldRankBand::Top
        })
        .map(|profile| profile.runner_id.clone())
        .collect()
}

/// Returns the trust modifier for a cluster, derived only from the label.
///
/// Stability contributes ±0.05, consistency band ±0.03, trend ±0.02; the
/// result is clamped to [`TRUST_MODIFIER_CAP`]. Malformed cluster ids
/// contribute nothing.
#[must_use]
pub fn cluster_trust_modifier(cluster: &str) -> f64 {
    let parts: Vec<&str> = cluster.split('_').collect();
    // INSUFFICIENT_DATA splits into two segments, giving five parts total.
    let (stability, band, trend) = match parts.as_slice() {
        [stability, band, trend, _rank] => (*stability, *band, *trend),
        ["INSUFFICIENT", "DATA", band, trend, _rank] => ("INSUFFICIENT_DATA", *band, *trend),
        _ => return 0.0,
    };

    let mut modifier: f64 = 0.0;
    match stability {
        "STABLE" => modifier += 0.05,
        "VOLATILE" => modifier -= 0.05,
        _ => {}
    }
    match band {
        "HIGH" => modifier += 0.03,
        "LOW" => modifier -= 0.03,
        _ => {}
    }
    match trend {
        "IMPROVING" => modifier += 0.02,
        "DECLINING" => modifier -= 0.02,
        _ => {}
    }
    modifier.clamp(-TRUST_MODIFIER_CAP, TRUST_MODIFIER_CAP)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
