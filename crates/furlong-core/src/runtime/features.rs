// crates/furlong-core/src/runtime/features.rs
// ============================================================================
// Module: Furlong Feature Frame & Registry
// Description: Column-oriented feature frame, domain registry, schema contract.
// Purpose: Build engineered features with an exact, auditable column set.
// Dependencies: crate::core, crate::runtime::{engineering, form}, serde
// ============================================================================

//! ## Overview
//! Engineered features live in a small column-oriented frame: named numeric
//! columns over the runner rows, with optional per-row observation
//! timestamps for the leakage firewall. Every feature belongs to exactly one
//! domain so ablation can silence a whole family at once. The schema
//! contract demands that a built frame's column set equals the declared
//! schema exactly, no extras and no missing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::context::MarketContext;
use crate::core::context::PaceStyle;
use crate::core::context::RaceContext;
use crate::core::context::Runner;
use crate::core::hashing::HashError;
use crate::core::hashing::derive_features_hash;
use crate::core::identifiers::RunnerId;
use crate::core::time::Timestamp;
use crate::runtime::engineering::EngineeringFeatures;
use crate::runtime::form::StabilityProfile;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Feature frame construction and contract errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Column length disagrees with the frame's row count.
    #[error("column {name} has {actual} values for {expected} rows")]
    ColumnLength {
        /// Offending column name.
        name: String,
        /// Expected row count.
        expected: usize,
        /// Actual value count.
        actual: usize,
    },
    /// Column already present in the frame.
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    /// Frame columns do not equal the schema set.
    #[error("feature schema contract breached: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaContract {
        /// Schema columns absent from the frame.
        missing: Vec<String>,
        /// Frame columns absent from the schema.
        unexpected: Vec<String>,
    },
    /// Context payloads could not be hashed.
    #[error("features hash failed: {0}")]
    Hash(String),
}

impl From<HashError> for FeatureError {
    fn from(err: HashError) -> Self {
        Self::Hash(err.to_string())
    }
}

// ============================================================================
// SECTION: Feature Frame
// ============================================================================

/// One named numeric feature column.
///
/// # Invariants
/// - `values.len()` equals the owning frame's row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    /// Column name.
    pub name: String,
    /// One value per runner row.
    pub values: Vec<f64>,
}

/// Column-oriented feature frame over runner rows.
///
/// # Invariants
/// - Column names are unique; every column spans all rows.
/// - Row timestamps, when present, are observation instants for the
///   leakage firewall's timestamp guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// Runner identifier per row.
    row_ids: Vec<RunnerId>,
    /// Named feature columns.
    columns: Vec<FeatureColumn>,
    /// Optional observation timestamp per row.
    row_timestamps: Option<Vec<Timestamp>>,
}

impl FeatureFrame {
    /// Creates an empty frame over the given runner rows.
    #[must_use]
    pub fn new(row_ids: Vec<RunnerId>) -> Self {
        Self {
            row_ids,
            columns: Vec::new(),
            row_timestamps: None,
        }
    }

    /// Stamps every row with the same observation timestamp.
    #[must_use]
    pub fn with_uniform_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.row_timestamps = Some(vec![timestamp; self.row_ids.len()]);
        self
    }

    /// Stamps rows with individual observation timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::ColumnLength`] when the timestamp count
    /// disagrees with the row count.
    pub fn with_row_timestamps(
        mut self,
        timestamps: Vec<Timestamp>,
    ) -> Result<Self, FeatureError> {
        if timestamps.len() != self.row_ids.len() {
            return Err(FeatureError::ColumnLength {
                name: "row_timestamps".to_string(),
                expected: self.row_ids.len(),
                actual: timestamps.len(),
            });
        }
        self.row_timestamps = Some(timestamps);
        Ok(self)
    }

    /// Adds a column to the frame.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::ColumnLength`] on a row-count mismatch and
    /// [`FeatureError::DuplicateColumn`] when the name is already present.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), FeatureError> {
        let name = name.into();
        if values.len() != self.row_ids.len() {
            return Err(FeatureError::ColumnLength {
                name,
                expected: self.row_ids.len(),
                actual: values.len(),
            });
        }
        if self.columns.iter().any(|column| column.name == name) {
            return Err(FeatureError::DuplicateColumn(name));
        }
        self.columns.push(FeatureColumn {
            name,
            values,
        });
        Ok(())
    }

    /// Returns the number of runner rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_ids.len()
    }

    /// Returns the runner identifiers per row.
    #[must_use]
    pub fn row_ids(&self) -> &[RunnerId] {
        &self.row_ids
    }

    /// Returns the observation timestamps, when stamped.
    #[must_use]
    pub fn row_timestamps(&self) -> Option<&[Timestamp]> {
        self.row_timestamps.as_deref()
    }

    /// Returns a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns whether a column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Returns the column name set.
    #[must_use]
    pub fn column_names(&self) -> BTreeSet<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    /// Returns a copy with the named columns zeroed (silenced).
    ///
    /// Unknown names are ignored; the receiver is never mutated.
    #[must_use]
    pub fn with_columns_zeroed(&self, names: &[&str]) -> Self {
        let mut silenced = self.clone();
        for column in &mut silenced.columns {
            if names.contains(&column.name.as_str()) {
                column.values = vec![0.0; column.values.len()];
            }
        }
        silenced
    }

    /// Returns the value at (row, column), when both exist.
    #[must_use]
    pub fn value(&self, runner_id: &RunnerId, column: &str) -> Option<f64> {
        let row = self.row_ids.iter().position(|id| id == runner_id)?;
        self.column(column)?.values.get(row).copied()
    }
}

// ============================================================================
// SECTION: Feature Domains
// ============================================================================

/// Feature domain categories for modular ablation.
///
/// # Invariants
/// - Every feature belongs to exactly one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureDomain {
    /// Ratings and card fundamentals.
    Core,
    /// Form-derived metrics.
    Form,
    /// Pace and coupling.
    Pace,
    /// Trainer and jockey strike rates.
    TrainerJockey,
    /// Course, going, and distance fit.
    CourseGoingDistance,
    /// Class movement.
    Class,
    /// Layoff recency.
    Recency,
    /// Weight and age.
    WeightAge,
    /// Market-derived values.
    Market,
}

impl FeatureDomain {
    /// Returns the stable wire label for the domain.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "CORE",
            Self::Form => "FORM",
            Self::Pace => "PACE",
            Self::TrainerJockey => "TRAINER_JOCKEY",
            Self::CourseGoingDistance => "COURSE_GOING_DISTANCE",
            Self::Class => "CLASS",
            Self::Recency => "RECENCY",
            Self::WeightAge => "WEIGHT_AGE",
            Self::Market => "MARKET",
        }
    }

    /// Returns the feature names owned by this domain.
    #[must_use]
    pub const fn features(self) -> &'static [&'static str] {
        match self {
            Self::Core => &["or_rating", "rpr", "ts"],
            Self::Form => &["consistency_score", "recent_form", "win_rate", "place_rate"],
            Self::Pace => &["pace_style_code", "msc_threat"],
            Self::TrainerJockey => &["trainer_strike_rate", "jockey_strike_rate"],
            Self::CourseGoingDistance => &["cti_score", "distance_win_rate"],
            Self::Class => &["class_movement", "hms_signal"],
            Self::Recency => &["days_since_last_run", "eim_score"],
            Self::WeightAge => &["age"],
            Self::Market => &["odds_decimal", "implied_prob", "odds_rank", "is_favorite", "odds_drift"],
        }
    }
}

/// All domains in declaration order.
pub const ALL_DOMAINS: &[FeatureDomain] = &[
    FeatureDomain::Core,
    FeatureDomain::Form,
    FeatureDomain::Pace,
    FeatureDomain::TrainerJockey,
    FeatureDomain::CourseGoingDistance,
    FeatureDomain::Class,
    FeatureDomain::Recency,
    FeatureDomain::WeightAge,
    FeatureDomain::Market,
];

/// Returns the owning domain for a feature name, when registered.
#[must_use]
pub fn domain_of(feature: &str) -> Option<FeatureDomain> {
    ALL_DOMAINS
        .iter()
        .copied()
        .find(|domain| domain.features().contains(&feature))
}

// ============================================================================
// SECTION: Schema Contract
// ============================================================================

/// Declared feature schema: the exact engineered column set.
///
/// # Invariants
/// - A built frame's columns must equal this set exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Exact expected column names.
    pub columns: BTreeSet<String>,
}

impl FeatureSchema {
    /// Returns the schema covering every registered domain feature.
    #[must_use]
    pub fn default_contract() -> Self {
        let columns = ALL_DOMAINS
            .iter()
            .flat_map(|domain| domain.features().iter().map(|name| (*name).to_string()))
            .collect();
        Self {
            columns,
        }
    }

    /// Checks a frame against the contract: no extras, no missing.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::SchemaContract`] listing both difference
    /// sets when they are non-empty.
    pub fn check(&self, frame: &FeatureFrame) -> Result<(), FeatureError> {
        let actual = frame.column_names();
        let missing: Vec<String> = self.columns.difference(&actual).cloned().collect();
        let unexpected: Vec<String> = actual.difference(&self.columns).cloned().collect();
        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(FeatureError::SchemaContract {
                missing,
                unexpected,
            })
        }
    }
}

// ============================================================================
// SECTION: Frame Builder
// ============================================================================

/// Encodes a pace style as a numeric feature.
const fn pace_style_code(style: PaceStyle) -> f64 {
    match style {
        PaceStyle::FrontRunner => 1.0,
        PaceStyle::MidPack => 2.0,
        PaceStyle::Closer => 3.0,
        PaceStyle::Unknown => 0.0,
    }
}

/// Output of the feature-engineering stage.
///
/// # Invariants
/// - `features_hash` is the short digest over both canonical contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBuild {
    /// The engineered feature frame.
    pub frame: FeatureFrame,
    /// Short hash over canonical race and market contexts.
    pub features_hash: String,
}

/// Builds the engineered feature frame for a race.
///
/// Rows are stamped with the market snapshot timestamp; every registered
/// feature is produced (neutral zero when the source field is absent) so
/// the frame always satisfies the default schema contract.
///
/// # Errors
///
/// Returns [`FeatureError`] when column construction or context hashing
/// fails.
pub fn build_feature_frame(
    race_ctx: &RaceContext,
    market_ctx: &MarketContext,
    runners: &[Runner],
    engineering: &[EngineeringFeatures],
    stability: &[StabilityProfile],
) -> Result<FeatureBuild, FeatureError> {
    let row_ids: Vec<RunnerId> = runners.iter().map(|r| r.runner_id.clone()).collect();
    let mut frame = FeatureFrame::new(row_ids)
        .with_uniform_timestamp(market_ctx.snapshot_timestamp);

    // Market rank over the snapshot, ties by runner id.
    let mut ranked: Vec<(&RunnerId, f64)> = market_ctx
        .runners
        .iter()
        .map(|line| (&line.runner_id, line.odds_decimal))
        .collect();
    ranked.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let rank_of = |runner_id: &RunnerId| -> f64 {
        ranked
            .iter()
            .position(|(id, _)| *id == runner_id)
            .map_or(0.0, |index| index as f64 + 1.0)
    };

    let eng_for = |runner_id: &RunnerId| -> Option<&EngineeringFeatures> {
        engineering.iter().find(|f| &f.runner_id == runner_id)
    };
    let stab_for = |runner_id: &RunnerId| -> Option<&StabilityProfile> {
        stability.iter().find(|p| &p.runner_id == runner_id)
    };

    /// Collects one value per runner through an extractor.
    fn collect(runners: &[Runner], extract: impl Fn(&Runner) -> f64) -> Vec<f64> {
        runners.iter().map(extract).collect()
    }

    frame.push_column("or_rating", collect(runners, |r| r.or_rating.map_or(0.0, f64::from)))?;
    frame.push_column("rpr", collect(runners, |r| r.rpr.map_or(0.0, f64::from)))?;
    frame.push_column("ts", collect(runners, |r| r.ts.map_or(0.0, f64::from)))?;
    frame.push_column(
        "consistency_score",
        collect(runners, |r| stab_for(&r.runner_id).map_or(0.0, |p| p.consistency_score)),
    )?;
    frame.push_column(
        "recent_form",
        collect(runners, |r| stab_for(&r.runner_id).map_or(0.5, |p| p.recent_form_score)),
    )?;
    frame.push_column(
        "win_rate",
        collect(runners, |r| stab_for(&r.runner_id).map_or(0.0, |p| p.win_rate)),
    )?;
    frame.push_column(
        "place_rate",
        collect(runners, |r| stab_for(&r.runner_id).map_or(0.0, |p| p.place_rate)),
    )?;
    frame.push_column(
        "pace_style_code",
        collect(runners, |r| pace_style_code(r.pace_style)),
    )?;
    frame.push_column(
        "msc_threat",
        collect(runners, |r| {
            eng_for(&r.runner_id).map_or(0.0, |f| if f.msc_threat_flag { 1.0 } else { 0.0 })
        }),
    )?;
    frame.push_column(
        "trainer_strike_rate",
        collect(runners, |r| r.trainer_strike_rate.unwrap_or(0.0)),
    )?;
    frame.push_column(
        "jockey_strike_rate",
        collect(runners, |r| r.jockey_strike_rate.unwrap_or(0.0)),
    )?;
    frame.push_column(
        "cti_score",
        collect(runners, |r| eng_for(&r.runner_id).map_or(0.0, |f| f.cti_score)),
    )?;
    frame.push_column(
        "distance_win_rate",
        collect(runners, |r| {
            r.distance_record.map_or(0.0, |record| {
                if record.runs == 0 {
                    0.0
                } else {
                    f64::from(record.wins) / f64::from(record.runs)
                }
            })
        }),
    )?;
    frame.push_column(
        "class_movement",
        collect(runners, |r| f64::from(r.class_movement)),
    )?;
    frame.push_column(
        "hms_signal",
        collect(runners, |r| eng_for(&r.runner_id).map_or(0.0, |f| f.hms_signal)),
    )?;
    frame.push_column(
        "days_since_last_run",
        collect(runners, |r| r.days_since_last_run.map_or(0.0, f64::from)),
    )?;
    frame.push_column(
        "eim_score",
        collect(runners, |r| eng_for(&r.runner_id).map_or(0.0, |f| f.eim_score)),
    )?;
    frame.push_column("age", collect(runners, |r| f64::from(r.age)))?;
    frame.push_column(
        "odds_decimal",
        collect(runners, |r| r.odds_decimal.unwrap_or(0.0)),
    )?;
    frame.push_column(
        "implied_prob",
        collect(runners, |r| {
            r.odds_decimal.filter(|odds| *odds > 0.0).map_or(0.0, |odds| 1.0 / odds)
        }),
    )?;
    frame.push_column("odds_rank", collect(runners, |r| rank_of(&r.runner_id)))?;
    frame.push_column(
        "is_favorite",
        collect(runners, |r| {
            let is_fav = market_ctx
                .shortest_price()
                .is_some_and(|line| line.runner_id == r.runner_id);
            if is_fav { 1.0 } else { 0.0 }
        }),
    )?;
    frame.push_column("odds_drift", collect(runners, |r| r.odds_drift.unwrap_or(0.0)))?;

    let features_hash = derive_features_hash(race_ctx, market_ctx)?;

    Ok(FeatureBuild {
        frame,
        features_hash,
    })
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

    use super::FeatureDomain;
    use super::FeatureFrame;
    use super::FeatureSchema;
    use super::build_feature_frame;
    use super::domain_of;
    use crate::core::context::MarkPressure;
    use crate::core::context::MarketContext;
    use crate::core::context::PaceStyle;
    use crate::core::context::RaceContext;
    use crate::core::context::Runner;
    use crate::core::context::RunnerMarket;
    use crate::core::identifiers::RaceId;
    use crate::core::identifiers::RunnerId;
    use crate::core::time::Timestamp;

    fn runner(id: &str, odds: f64) -> Runner {
        Runner {
            runner_id: RunnerId::new(id),
            horse_name: format!("Horse {id}"),
            age: 4,
            sex: "G".to_string(),
            trainer: "T".to_string(),
            jockey: "J".to_string(),
            form_string: Some("123".to_string()),
            odds_decimal: Some(odds),
            or_rating: Some(80),
            rpr: Some(85),
            ts: Some(70),
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
            trainer_strike_rate: Some(0.15),
            jockey_strike_rate: Some(0.12),
            odds_drift: None,
            last_run_position: None,
            avg_position_last_5: None,
            distance_record: None,
            historical_stats: None,
        }
    }

    fn fixtures() -> (RaceContext, MarketContext, Vec<Runner>) {
        let decision = Timestamp::from_unix_millis(1_700_000_000_000);
        let runners = vec![runner("r1", 2.0), runner("r2", 5.0)];
        let race_ctx = RaceContext {
            race_id: RaceId::new("R1"),
            course: "Newmarket".to_string(),
            decision_time: decision,
            distance_meters: 1600,
            going: "Good".to_string(),
            class_level: 3,
            surface: "Turf".to_string(),
            field_size: 2,
            age_band: None,
            sex_restriction: None,
            stability_score: None,
            pace_geometry_score: None,
        };
        let market_ctx = MarketContext {
            race_id: RaceId::new("R1"),
            snapshot_timestamp: decision,
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
        (race_ctx, market_ctx, runners)
    }

    #[test]
    fn built_frame_satisfies_default_schema() {
        let (race_ctx, market_ctx, runners) = fixtures();
        let build =
            build_feature_frame(&race_ctx, &market_ctx, &runners, &[], &[]).expect("build");
        FeatureSchema::default_contract().check(&build.frame).expect("contract");
        assert_eq!(build.features_hash.len(), 16);
    }

    #[test]
    fn schema_contract_rejects_extras_and_missing() {
        let (race_ctx, market_ctx, runners) = fixtures();
        let build =
            build_feature_frame(&race_ctx, &market_ctx, &runners, &[], &[]).expect("build");
        let mut frame = build.frame;
        frame
            .push_column("smuggled", vec![0.0, 0.0])
            .expect("push");
        assert!(FeatureSchema::default_contract().check(&frame).is_err());
    }

    #[test]
    fn zeroing_returns_a_copy() {
        let (race_ctx, market_ctx, runners) = fixtures();
        let build =
            build_feature_frame(&race_ctx, &market_ctx, &runners, &[], &[]).expect("build");
        let silenced = build.frame.with_columns_zeroed(&["odds_decimal"]);
        let original = build
            .frame
            .value(&RunnerId::new("r1"), "odds_decimal")
            .expect("original");
        let zeroed = silenced
            .value(&RunnerId::new("r1"), "odds_decimal")
            .expect("zeroed");
        assert!((original - 2.0).abs() < f64::EPSILON);
        assert!((zeroed - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn every_feature_has_exactly_one_domain() {
        for domain in super::ALL_DOMAINS {
            for feature in domain.features() {
                assert_eq!(domain_of(feature), Some(*domain), "feature {feature}");
            }
        }
    }

    #[test]
    fn duplicate_columns_rejected() {
        let mut frame = FeatureFrame::new(vec![RunnerId::new("r1")]);
        frame.push_column("a", vec![1.0]).expect("first");
        assert!(frame.push_column("a", vec![2.0]).is_err());
    }

    #[test]
    fn column_length_mismatch_rejected() {
        let mut frame = FeatureFrame::new(vec![RunnerId::new("r1"), RunnerId::new("r2")]);
        assert!(frame.push_column("a", vec![1.0]).is_err());
    }

    #[test]
    fn market_domain_owns_odds_features() {
        assert_eq!(domain_of("odds_decimal"), Some(FeatureDomain::Market));
        assert_eq!(domain_of("implied_prob"), Some(FeatureDomain::Market));
        assert_eq!(domain_of("unknown_feature"), None);
    }
}
