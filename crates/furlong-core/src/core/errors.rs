// crates/furlong-core/src/core/errors.rs
// ============================================================================
// Module: Furlong Error Taxonomy
// Description: Typed failure kinds and fail-fast stage-boundary validators.
// Purpose: Make every invariant breach explicit; silent skipping is forbidden.
// Dependencies: crate::core::{context, identifiers, profile, score}, serde, thiserror
// ============================================================================

//! ## Overview
//! A single failure type carries a stable error code, a human message, and a
//! sorted context map. Validators run at every stage boundary: missing odds,
//! incomplete profiles, score-count mismatches, and wrong Top-4 cardinality
//! all abort the run. Contract violations indicate code bugs and surface as
//! test failures in CI.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::context::RaceContext;
use crate::core::context::Runner;
use crate::core::identifiers::RunnerId;
use crate::core::profile::MarketRole;
use crate::core::profile::OpponentProfile;
use crate::core::score::ScoreBreakdown;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable error codes for engine failures.
///
/// # Invariants
/// - Codes are stable wire identifiers; matching is by code, never message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Runner has no odds field.
    #[serde(rename = "E001_MISSING_ODDS")]
    MissingOdds,
    /// Runner odds are zero or negative.
    #[serde(rename = "E002_ZERO_ODDS")]
    ZeroOdds,
    /// Opponent profile is missing required fields.
    #[serde(rename = "E003_INVALID_PROFILE")]
    InvalidProfile,
    /// Score breakdown missing or incomplete.
    #[serde(rename = "E004_MISSING_SCORE")]
    MissingScore,
    /// Top-4 cardinality contract breached.
    #[serde(rename = "E005_INVALID_TOP4")]
    InvalidTop4,
    /// Runner identifier absent or empty.
    #[serde(rename = "E006_MISSING_RUNNER_ID")]
    MissingRunnerId,
    /// Field size invalid or inconsistent with the runner list.
    #[serde(rename = "E007_INVALID_FIELD_SIZE")]
    InvalidFieldSize,
    /// Post-decision data found in a feature frame.
    #[serde(rename = "E008_LEAKAGE")]
    Leakage,
    /// Stage exceeded its execution budget.
    #[serde(rename = "E009_STAGE_TIMEOUT")]
    StageTimeout,
    /// Post-stage invariant breached; indicates a code bug.
    #[serde(rename = "E010_CONTRACT_VIOLATION")]
    ContractViolation,
    /// Run cancelled at a stage boundary.
    #[serde(rename = "E011_CANCELLED")]
    Cancelled,
}

impl ErrorCode {
    /// Returns the stable wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingOdds => "E001_MISSING_ODDS",
            Self::ZeroOdds => "E002_ZERO_ODDS",
            Self::InvalidProfile => "E003_INVALID_PROFILE",
            Self::MissingScore => "E004_MISSING_SCORE",
            Self::InvalidTop4 => "E005_INVALID_TOP4",
            Self::MissingRunnerId => "E006_MISSING_RUNNER_ID",
            Self::InvalidFieldSize => "E007_INVALID_FIELD_SIZE",
            Self::Leakage => "E008_LEAKAGE",
            Self::StageTimeout => "E009_STAGE_TIMEOUT",
            Self::ContractViolation => "E010_CONTRACT_VIOLATION",
            Self::Cancelled => "E011_CANCELLED",
        }
    }
}

// ============================================================================
// SECTION: Engine Error
// ============================================================================

/// Engine failure carrying a stable code, message, and context map.
///
/// # Invariants
/// - `context` keys iterate in sorted order for deterministic rendering.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("[{}] {message}", .code.as_str())]
pub struct EngineError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context values keyed by field name.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl EngineError {
    /// Creates an error with an empty context map.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Adds one context entry, returning the error for chaining.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// SECTION: Validators
// ============================================================================

/// Validates race context identity and field size.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidFieldSize`] when the declared field size is
/// zero or disagrees with the runner list, and
/// [`ErrorCode::MissingRunnerId`] when the race id is empty.
pub fn validate_race_context(ctx: &RaceContext, runners: &[Runner]) -> Result<(), EngineError> {
    if ctx.race_id.as_str().is_empty() {
        return Err(EngineError::new(
            ErrorCode::MissingRunnerId,
            "race context has an empty race_id",
        ));
    }
    if ctx.field_size == 0 {
        return Err(EngineError::new(
            ErrorCode::InvalidFieldSize,
            "race context declares a zero field size",
        )
        .with_context("race_id", ctx.race_id.as_str()));
    }
    if ctx.field_size != runners.len() {
        return Err(EngineError::new(
            ErrorCode::InvalidFieldSize,
            format!(
                "field size mismatch: context declares {} but {} runners supplied",
                ctx.field_size,
                runners.len()
            ),
        )
        .with_context("race_id", ctx.race_id.as_str())
        .with_context("declared", ctx.field_size.to_string())
        .with_context("supplied", runners.len().to_string()));
    }
    Ok(())
}

/// Validates market-snapshot consistency against the race decision time.
///
/// The snapshot must predate or coincide with decision time, and any
/// `is_favorite` flag set to true must sit on the lowest-odds runner.
///
/// # Errors
///
/// Returns [`ErrorCode::Leakage`] for a post-decision snapshot and
/// [`ErrorCode::ContractViolation`] for an inconsistent favorite flag.
pub fn validate_market_context(
    market_ctx: &crate::core::context::MarketContext,
    decision_time: crate::core::time::Timestamp,
) -> Result<(), EngineError> {
    if market_ctx.snapshot_timestamp > decision_time {
        return Err(EngineError::new(
            ErrorCode::Leakage,
            "market snapshot is timestamped after decision time",
        )
        .with_context("race_id", market_ctx.race_id.as_str())
        .with_context("snapshot_timestamp", market_ctx.snapshot_timestamp.to_string())
        .with_context("decision_time", decision_time.to_string()));
    }
    if let Some(shortest) = market_ctx.shortest_price() {
        for line in &market_ctx.runners {
            if line.is_favorite == Some(true) && line.runner_id != shortest.runner_id {
                return Err(EngineError::new(
                    ErrorCode::ContractViolation,
                    format!(
                        "favorite flag on {} disagrees with lowest-odds runner {}",
                        line.runner_id, shortest.runner_id
                    ),
                )
                .with_context("flagged_runner", line.runner_id.as_str())
                .with_context("shortest_priced", shortest.runner_id.as_str()));
            }
        }
    }
    Ok(())
}

/// Validates a runner's odds. Fails fast on absent or non-positive odds.
///
/// # Errors
///
/// Returns [`ErrorCode::MissingOdds`] when no odds are present and
/// [`ErrorCode::ZeroOdds`] when odds are zero, negative, or non-finite.
pub fn validate_odds(runner: &Runner) -> Result<(), EngineError> {
    let Some(odds) = runner.odds_decimal else {
        return Err(EngineError::new(
            ErrorCode::MissingOdds,
            format!(
                "runner {} ({}) has no odds_decimal field",
                runner.runner_id, runner.horse_name
            ),
        )
        .with_context("runner_id", runner.runner_id.as_str())
        .with_context("horse_name", runner.horse_name.clone()));
    };
    if !odds.is_finite() || odds <= 0.0 {
        return Err(EngineError::new(
            ErrorCode::ZeroOdds,
            format!(
                "runner {} ({}) has invalid odds: {odds}",
                runner.runner_id, runner.horse_name
            ),
        )
        .with_context("runner_id", runner.runner_id.as_str())
        .with_context("horse_name", runner.horse_name.clone())
        .with_context("odds", odds.to_string()));
    }
    Ok(())
}

/// Validates an opponent profile. Identity fields and the role reason are
/// mandatory.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidProfile`] when `runner_id`, `horse_name`, or
/// `role_reason` is empty.
pub fn validate_runner_profile(profile: &OpponentProfile) -> Result<(), EngineError> {
    if profile.runner_id.as_str().is_empty() {
        return Err(EngineError::new(
            ErrorCode::InvalidProfile,
            "profile missing required field: runner_id",
        ));
    }
    if profile.horse_name.is_empty() {
        return Err(EngineError::new(
            ErrorCode::InvalidProfile,
            "profile missing required field: horse_name",
        )
        .with_context("runner_id", profile.runner_id.as_str()));
    }
    if profile.role_reason.is_empty() {
        return Err(EngineError::new(
            ErrorCode::InvalidProfile,
            format!("profile for {} has an empty role_reason", profile.runner_id),
        )
        .with_context("runner_id", profile.runner_id.as_str())
        .with_context("market_role", profile.market_role.as_str()));
    }
    Ok(())
}

/// Validates the score contract: one finite breakdown per runner.
///
/// # Errors
///
/// Returns [`ErrorCode::MissingScore`] on a count mismatch, a non-finite
/// total, or a breakdown whose components do not sum to its total.
pub fn validate_scores(
    breakdowns: &BTreeMap<RunnerId, ScoreBreakdown>,
    field_size: usize,
) -> Result<(), EngineError> {
    if breakdowns.len() != field_size {
        return Err(EngineError::new(
            ErrorCode::MissingScore,
            format!(
                "score count mismatch: {} scores for {field_size} runners",
                breakdowns.len()
            ),
        )
        .with_context("score_count", breakdowns.len().to_string())
        .with_context("field_size", field_size.to_string()));
    }
    for (runner_id, breakdown) in breakdowns {
        if !breakdown.total.is_finite() {
            return Err(EngineError::new(
                ErrorCode::MissingScore,
                format!("runner {runner_id} has a non-finite total score"),
            )
            .with_context("runner_id", runner_id.as_str()));
        }
        if !breakdown.sum_matches_total() {
            return Err(EngineError::new(
                ErrorCode::MissingScore,
                format!(
                    "runner {runner_id} score components sum to {} but total is {}",
                    breakdown.components.numeric_sum(),
                    breakdown.total
                ),
            )
            .with_context("runner_id", runner_id.as_str()));
        }
    }
    Ok(())
}

/// Validates Top-4 cardinality: exactly `min(4, field_size)` entries.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidTop4`] on a cardinality mismatch.
pub fn validate_top4(top_4_ids: &[RunnerId], field_size: usize) -> Result<(), EngineError> {
    let expected = field_size.min(4);
    if top_4_ids.len() != expected {
        return Err(EngineError::new(
            ErrorCode::InvalidTop4,
            format!(
                "Top-4 count mismatch: {} runners, expected {expected}",
                top_4_ids.len()
            ),
        )
        .with_context("top4_count", top_4_ids.len().to_string())
        .with_context("expected", expected.to_string())
        .with_context("field_size", field_size.to_string()));
    }
    Ok(())
}

/// Validates that the lowest-odds runner is not classified as `Noise`.
///
/// # Errors
///
/// Returns [`ErrorCode::ContractViolation`] on a breach; this indicates a
/// classifier bug, never bad input.
pub fn validate_anchor_not_noise(
    profiles: &[OpponentProfile],
    shortest_priced: &RunnerId,
) -> Result<(), EngineError> {
    if let Some(anchor) = profiles.iter().find(|p| &p.runner_id == shortest_priced)
        && anchor.market_role == MarketRole::Noise
    {
        return Err(EngineError::new(
            ErrorCode::ContractViolation,
            format!("lowest-odds runner {shortest_priced} classified as Noise"),
        )
        .with_context("runner_id", shortest_priced.as_str()));
    }
    Ok(())
}

/// Validates the full role contract over a set of profiles.
///
/// The lowest-odds runner must never be `Noise`, `Noise` must not exceed 40%
/// of the field, and fields of six or more must show at least three distinct
/// roles. The diversity and ceiling clauses are contract-test properties;
/// tight or longshot-heavy markets can legitimately breach them, so the
/// runtime path checks only [`validate_anchor_not_noise`].
///
/// # Errors
///
/// Returns [`ErrorCode::ContractViolation`] on any breach.
pub fn validate_role_contract(
    profiles: &[OpponentProfile],
    shortest_priced: &RunnerId,
) -> Result<(), EngineError> {
    if profiles.is_empty() {
        return Ok(());
    }
    validate_anchor_not_noise(profiles, shortest_priced)?;

    let noise_count = profiles
        .iter()
        .filter(|p| p.market_role == MarketRole::Noise)
        .count();
    // 40% ceiling, checked as noise * 10 <= field * 4 to stay in integers.
    if noise_count * 10 > profiles.len() * 4 {
        return Err(EngineError::new(
            ErrorCode::ContractViolation,
            format!(
                "Noise role covers {noise_count} of {} runners (over 40%)",
                profiles.len()
            ),
        )
        .with_context("noise_count", noise_count.to_string())
        .with_context("field_size", profiles.len().to_string()));
    }

    if profiles.len() >= 6 {
        let mut roles: Vec<MarketRole> = profiles.iter().map(|p| p.market_role).collect();
        roles.sort();
        roles.dedup();
        if roles.len() < 3 {
            return Err(EngineError::new(
                ErrorCode::ContractViolation,
                format!(
                    "only {} distinct market roles across a field of {}",
                    roles.len(),
                    profiles.len()
                ),
            )
            .with_context("distinct_roles", roles.len().to_string())
            .with_context("field_size", profiles.len().to_string()));
        }
    }
    Ok(())
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

    use super::ErrorCode;
    use super::validate_odds;
    use super::validate_role_contract;
    use super::validate_runner_profile;
    use super::validate_scores;
    use super::validate_top4;
    use crate::core::context::MarkPressure;
    use crate::core::context::PaceStyle;
    use crate::core::context::Runner;
    use crate::core::identifiers::RunnerId;
    use crate::core::profile::IntentClass;
    use crate::core::profile::MarketRole;
    use crate::core::profile::OpponentProfile;
    use crate::core::profile::StableTactic;
    use crate::core::score::ScoreBreakdown;
    use crate::core::score::ScoreComponents;

    fn runner(odds: Option<f64>) -> Runner {
        Runner {
            runner_id: RunnerId::new("r1"),
            horse_name: "Aqua Bleu".to_string(),
            age: 5,
            sex: "G".to_string(),
            trainer: "Trainer X".to_string(),
            jockey: "Jockey A".to_string(),
            form_string: None,
            odds_decimal: odds,
            or_rating: None,
            rpr: None,
            ts: None,
            days_since_last_run: None,
            class_movement: 0,
            class_rating: None,
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

    fn breakdown(total_shift: f64) -> ScoreBreakdown {
        let components = ScoreComponents {
            stability: 0.0,
            historical: 0.0,
            role: 0.4,
            odds: 0.2,
            chaos: 0.15,
            field: 0.05,
            anchor_guard: 0.0,
            stability_reason: "not_available".to_string(),
            historical_reason: "no_historical_stats".to_string(),
        };
        ScoreBreakdown {
            total: components.numeric_sum() + total_shift,
            components,
        }
    }

    #[test]
    fn missing_odds_fails_with_e001() {
        let err = validate_odds(&runner(None)).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingOdds);
    }

    #[test]
    fn zero_odds_fails_with_e002() {
        let err = validate_odds(&runner(Some(0.0))).unwrap_err();
        assert_eq!(err.code, ErrorCode::ZeroOdds);
        let err = validate_odds(&runner(Some(-2.5))).unwrap_err();
        assert_eq!(err.code, ErrorCode::ZeroOdds);
    }

    #[test]
    fn positive_odds_pass() {
        assert!(validate_odds(&runner(Some(3.5))).is_ok());
    }

    #[test]
    fn empty_role_reason_fails_with_e003() {
        let mut bad = profile("r1", MarketRole::ReleaseHorse);
        bad.role_reason = String::new();
        let err = validate_runner_profile(&bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidProfile);
    }

    #[test]
    fn score_count_mismatch_fails_with_e004() {
        let mut breakdowns = BTreeMap::new();
        breakdowns.insert(RunnerId::new("r1"), breakdown(0.0));
        let err = validate_scores(&breakdowns, 2).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingScore);
    }

    #[test]
    fn drifted_component_sum_fails_with_e004() {
        let mut breakdowns = BTreeMap::new();
        breakdowns.insert(RunnerId::new("r1"), breakdown(0.05));
        let err = validate_scores(&breakdowns, 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingScore);
    }

    #[test]
    fn top4_cardinality_enforced() {
        let ids: Vec<RunnerId> = ["r1", "r2", "r3"].iter().map(|id| RunnerId::new(*id)).collect();
        let err = validate_top4(&ids, 6).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTop4);
        assert!(validate_top4(&ids, 3).is_ok());
    }

    #[test]
    fn favorite_flag_must_sit_on_the_shortest_price() {
        let market = crate::core::context::MarketContext {
            race_id: crate::core::identifiers::RaceId::new("R1"),
            snapshot_timestamp: crate::core::time::Timestamp::from_unix_millis(0),
            runners: vec![
                crate::core::context::RunnerMarket {
                    runner_id: RunnerId::new("r1"),
                    odds_decimal: 2.0,
                    volume: None,
                    is_favorite: None,
                },
                crate::core::context::RunnerMarket {
                    runner_id: RunnerId::new("r2"),
                    odds_decimal: 5.0,
                    volume: None,
                    is_favorite: Some(true),
                },
            ],
        };
        let err = super::validate_market_context(
            &market,
            crate::core::time::Timestamp::from_unix_millis(1_000),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContractViolation);
    }

    #[test]
    fn snapshot_after_decision_time_is_leakage() {
        let market = crate::core::context::MarketContext {
            race_id: crate::core::identifiers::RaceId::new("R1"),
            snapshot_timestamp: crate::core::time::Timestamp::from_unix_millis(5_000),
            runners: Vec::new(),
        };
        let err = super::validate_market_context(
            &market,
            crate::core::time::Timestamp::from_unix_millis(1_000),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Leakage);
    }

    #[test]
    fn anchor_as_noise_is_a_contract_violation() {
        let profiles = vec![profile("r1", MarketRole::Noise), profile("r2", MarketRole::ReleaseHorse)];
        let err = validate_role_contract(&profiles, &RunnerId::new("r1")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ContractViolation);
    }

    #[test]
    fn noise_ceiling_is_forty_percent() {
        let profiles = vec![
            profile("r1", MarketRole::LiquidityAnchor),
            profile("r2", MarketRole::Noise),
            profile("r3", MarketRole::Noise),
            profile("r4", MarketRole::ReleaseHorse),
        ];
        let err = validate_role_contract(&profiles, &RunnerId::new("r1")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ContractViolation);
    }

    #[test]
    fn diverse_field_passes_role_contract() {
        let profiles = vec![
            profile("r1", MarketRole::LiquidityAnchor),
            profile("r2", MarketRole::ReleaseHorse),
            profile("r3", MarketRole::ReleaseHorse),
            profile("r4", MarketRole::DriftBait),
            profile("r5", MarketRole::ReleaseHorse),
            profile("r6", MarketRole::Noise),
        ];
        assert!(validate_role_contract(&profiles, &RunnerId::new("r1")).is_ok());
    }
}
