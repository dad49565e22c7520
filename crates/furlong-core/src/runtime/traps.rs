// crates/furlong-core/src/runtime/traps.rs
// ============================================================================
// Module: Furlong Cognitive-Trap Firewall
// Description: Rule-based bias detectors with explicit mitigations.
// Purpose: Risk control against the traps that hypnotize human bettors.
// Dependencies: crate::core, crate::runtime::form, serde, serde_json
// ============================================================================

//! ## Overview
//! Four detectors fire after opponent modeling: anchoring (a favorite
//! selected without a release signal), recency (one good run over a shaky
//! base), narrative (big connections without intent), and sunk cost (a user
//! chasing losses). Each detection carries a severity and mitigation; only
//! medium-plus severity adjusts the decision. This is a risk-control module
//! for an adversarial market, not psychology decoration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::context::Runner;
use crate::core::context::UserContext;
use crate::core::decision::ChassisType;
use crate::core::decision::DecisionOutput;
use crate::core::identifiers::RunnerId;
use crate::core::profile::IntentClass;
use crate::core::profile::MarketRole;
use crate::core::profile::OpponentProfile;
use crate::runtime::form::StabilityProfile;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Severity below which a detection is informational only.
pub const SEVERITY_LOW: f64 = 0.3;

/// Severity at which mitigations engage.
pub const SEVERITY_MEDIUM: f64 = 0.6;

/// Severity marking a high-risk detection.
pub const SEVERITY_HIGH: f64 = 0.8;

/// Stability floor demanded when recency fires.
const RECENCY_STABILITY_FLOOR: f64 = 0.65;

/// Strike rate above which connections read as high-profile.
const BIG_NAME_STRIKE_RATE: f64 = 0.20;

/// Recent loss total that reads as tilt.
const TILT_PNL_FLOOR: f64 = -100.0;

/// Losing streak length that reads as tilt.
const TILT_STREAK: u32 = 3;

/// Win-confidence multiplier applied under anchoring.
const ANCHORING_CONFIDENCE_FACTOR: f64 = 0.7;

/// Stake multiplier forced under sunk cost.
const SUNK_COST_STAKE_MULTIPLIER: f64 = 0.5;

// ============================================================================
// SECTION: Detections
// ============================================================================

/// Cognitive bias kinds the firewall detects.
///
/// # Invariants
/// - Variants are stable for serialization and mitigation matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasType {
    /// Favorite over-weighted without a release signal.
    Anchoring,
    /// Last run over-influencing the selection.
    Recency,
    /// Big-stable narrative without intent markers.
    Narrative,
    /// User chasing losses.
    SunkCost,
}

impl BiasType {
    /// Returns the stable wire label for the bias.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anchoring => "anchoring",
            Self::Recency => "recency",
            Self::Narrative => "narrative",
            Self::SunkCost => "sunk_cost",
        }
    }
}

/// Severity band labels for reporting.
///
/// # Invariants
/// - Bands follow the published thresholds (0.3 / 0.6 / 0.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityBand {
    /// Below 0.3.
    Low,
    /// 0.3 up to 0.6.
    Medium,
    /// 0.6 up to 0.8.
    High,
    /// Above 0.8.
    Critical,
}

/// Classifies a raw severity into its band.
#[must_use]
pub fn severity_band(severity: f64) -> SeverityBand {
    if severity > SEVERITY_HIGH {
        SeverityBand::Critical
    } else if severity >= SEVERITY_MEDIUM {
        SeverityBand::High
    } else if severity >= SEVERITY_LOW {
        SeverityBand::Medium
    } else {
        SeverityBand::Low
    }
}

/// One detected cognitive bias.
///
/// # Invariants
/// - `severity` is in `[0, 1]`; `mitigation` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasDetection {
    /// Bias kind.
    pub bias_type: BiasType,
    /// Severity in `[0, 1]`.
    pub severity: f64,
    /// Runner the bias attaches to, when runner-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_runner: Option<RunnerId>,
    /// Mitigation applied or demanded.
    pub mitigation: String,
    /// Supporting evidence values.
    #[serde(default)]
    pub evidence: BTreeMap<String, Value>,
}

/// Cognitive-trap firewall report.
///
/// # Invariants
/// - `decision_adjusted` iff `max_severity >= `[`SEVERITY_MEDIUM`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CtfReport {
    /// Every detected bias.
    pub biases_detected: Vec<BiasDetection>,
    /// Maximum severity across detections.
    pub max_severity: f64,
    /// Mitigations collected from detections.
    pub mitigations_applied: Vec<String>,
    /// Whether the decision must be adjusted.
    pub decision_adjusted: bool,
}

impl CtfReport {
    /// Returns whether a given bias kind was detected.
    #[must_use]
    pub fn detected(&self, bias: BiasType) -> bool {
        self.biases_detected.iter().any(|d| d.bias_type == bias)
    }
}

// ============================================================================
// SECTION: Detectors
// ============================================================================

/// Detects anchoring: the favorite selected without a release signal.
fn detect_anchoring(
    top_selection: Option<&RunnerId>,
    favorite: Option<&RunnerId>,
    profiles: &[OpponentProfile],
) -> Option<BiasDetection> {
    let top = top_selection?;
    let favorite = favorite?;
    if top != favorite {
        return None;
    }
    let profile = profiles.iter().find(|p| &p.runner_id == favorite)?;
    if profile.market_role == MarketRole::ReleaseHorse {
        return None;
    }
    let mut evidence = BTreeMap::new();
    evidence.insert("is_favorite".to_string(), json!(true));
    evidence.insert("market_role".to_string(), json!(profile.market_role.as_str()));
    Some(BiasDetection {
        bias_type: BiasType::Anchoring,
        severity: 0.7,
        affected_runner: Some(favorite.clone()),
        mitigation: "Downweight win confidence; require release signal".to_string(),
        evidence,
    })
}

/// Detects recency: last run much better than the five-run base with a
/// shaky stability score.
fn detect_recency(
    top_selection: Option<&RunnerId>,
    runners: &[Runner],
    stability: &BTreeMap<RunnerId, StabilityProfile>,
) -> Option<BiasDetection> {
    let top = top_selection?;
    let runner = runners.iter().find(|r| &r.runner_id == top)?;
    let last = runner.last_run_position?;
    let average = runner.avg_position_last_5?;
    if last > 2 || average <= 4.0 {
        return None;
    }
    let stability_score = stability.get(top).map_or(0.0, |p| p.consistency_score);
    if stability_score >= RECENCY_STABILITY_FLOOR {
        return None;
    }
    let mut evidence = BTreeMap::new();
    evidence.insert("last_run_position".to_string(), json!(last));
    evidence.insert("avg_position_last_5".to_string(), json!(average));
    evidence.insert("stability_score".to_string(), json!(stability_score));
    Some(BiasDetection {
        bias_type: BiasType::Recency,
        severity: 0.6,
        affected_runner: Some(top.clone()),
        mitigation: "Require stability cluster confirmation (>= 0.70)".to_string(),
        evidence,
    })
}

/// Detects narrative: high-profile connections with unknown intent.
fn detect_narrative(
    top_selection: Option<&RunnerId>,
    runners: &[Runner],
    profiles: &[OpponentProfile],
) -> Option<BiasDetection> {
    let top = top_selection?;
    let runner = runners.iter().find(|r| &r.runner_id == top)?;
    let big_stable = runner
        .trainer_strike_rate
        .is_some_and(|rate| rate > BIG_NAME_STRIKE_RATE);
    let top_jockey = runner
        .jockey_strike_rate
        .is_some_and(|rate| rate > BIG_NAME_STRIKE_RATE);
    if !big_stable && !top_jockey {
        return None;
    }
    let intent = profiles
        .iter()
        .find(|p| &p.runner_id == top)
        .map_or(IntentClass::Unknown, |p| p.intent_class);
    if intent != IntentClass::Unknown {
        return None;
    }
    let mut evidence = BTreeMap::new();
    evidence.insert("trainer".to_string(), json!(runner.trainer));
    evidence.insert("jockey".to_string(), json!(runner.jockey));
    evidence.insert("big_stable".to_string(), json!(big_stable));
    evidence.insert("top_jockey".to_string(), json!(top_jockey));
    Some(BiasDetection {
        bias_type: BiasType::Narrative,
        severity: 0.5,
        affected_runner: Some(top.clone()),
        mitigation: "Require intent markers (Win signal)".to_string(),
        evidence,
    })
}

/// Detects sunk cost: the user is chasing losses.
fn detect_sunk_cost(user_ctx: &UserContext) -> Option<BiasDetection> {
    if user_ctx.recent_pnl >= TILT_PNL_FLOOR && user_ctx.losing_streak < TILT_STREAK {
        return None;
    }
    let mut evidence = BTreeMap::new();
    evidence.insert("recent_pnl".to_string(), json!(user_ctx.recent_pnl));
    evidence.insert("losing_streak".to_string(), json!(user_ctx.losing_streak));
    Some(BiasDetection {
        bias_type: BiasType::SunkCost,
        severity: 0.8,
        affected_runner: None,
        mitigation: "Force conservative chassis (Top-4 only); reduce stake suggestions"
            .to_string(),
        evidence,
    })
}

// ============================================================================
// SECTION: Scan & Mitigation
// ============================================================================

/// Scans for cognitive traps over the modeled race.
///
/// `top_selection` is the provisional top-ranked runner; `favorite` is the
/// lowest-odds runner from the snapshot.
#[must_use]
pub fn scan_cognitive_traps(
    runners: &[Runner],
    profiles: &[OpponentProfile],
    stability: &BTreeMap<RunnerId, StabilityProfile>,
    top_selection: Option<&RunnerId>,
    favorite: Option<&RunnerId>,
    user_ctx: Option<&UserContext>,
) -> CtfReport {
    let mut biases = Vec::new();
    if let Some(detection) = detect_anchoring(top_selection, favorite, profiles) {
        biases.push(detection);
    }
    if let Some(detection) = detect_recency(top_selection, runners, stability) {
        biases.push(detection);
    }
    if let Some(detection) = detect_narrative(top_selection, runners, profiles) {
        biases.push(detection);
    }
    if let Some(user_ctx) = user_ctx
        && let Some(detection) = detect_sunk_cost(user_ctx)
    {
        biases.push(detection);
    }

    let max_severity = biases.iter().map(|b| b.severity).fold(0.0, f64::max);
    let mitigations = biases.iter().map(|b| b.mitigation.clone()).collect();
    CtfReport {
        max_severity,
        decision_adjusted: max_severity >= SEVERITY_MEDIUM,
        mitigations_applied: mitigations,
        biases_detected: biases,
    }
}

/// Applies mitigations to a decision in place.
///
/// Anchoring downweights win confidence; sunk cost forces the Top-4 chassis
/// with a halved stake. Recency and narrative gate win overlays upstream in
/// the policy via `decision_adjusted`, so they leave the verdict body
/// untouched here.
pub fn apply_mitigations(report: &CtfReport, decision: &mut DecisionOutput) {
    if !report.decision_adjusted {
        return;
    }
    for bias in &report.biases_detected {
        match bias.bias_type {
            BiasType::Anchoring => {
                decision.confidence *= ANCHORING_CONFIDENCE_FACTOR;
            }
            BiasType::SunkCost => {
                decision.chassis_type = ChassisType::Top4Structure;
                decision.top_strike_selection = None;
                if !decision.win_suppressed {
                    decision.win_suppressed = true;
                }
                decision.push_suppression_reason("Sunk-cost tilt: conservative chassis forced");
                decision.notes.stake_multiplier = Some(SUNK_COST_STAKE_MULTIPLIER);
            }
            BiasType::Recency | BiasType::Narrative => {}
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
