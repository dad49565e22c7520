// crates/furlong-governance/src/shadow.rs
// ============================================================================
// Module: Episodic Shadow Runner
// Description: Observe-only race episodes with critics and finalization.
// Purpose: Run the engine on live cards, persist proposals, never mutate
// doctrine.
// Dependencies: crate::*, furlong-core, serde_json
// ============================================================================

//! ## Overview
//! For each observable race the runner creates an episode pinned to its
//! epistemic decision time (off time minus ten minutes), writes the
//! PRE_STATE artifact, runs the engine, writes the INFERENCE artifact, and
//! persists critic findings as DRAFT proposals. When the outcome arrives it
//! writes the OUTCOME artifact, finalizes the episode, and transitions the
//! episode's drafts to PENDING. Constitutional guarantees on this path: no
//! auto-apply, no learning, no doctrine mutation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use furlong_core::EpisodeId;
use furlong_core::MarketContext;
use furlong_core::RaceContext;
use furlong_core::RaceId;
use furlong_core::RaceOutcome;
use furlong_core::Runner;
use furlong_core::Timestamp;
use furlong_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use furlong_core::core::hashing::canonical_json_bytes;
use furlong_core::core::hashing::derive_context_hash;
use furlong_core::core::hashing::hash_bytes;
use furlong_core::runtime::Pipeline;
use furlong_core::runtime::PipelineContext;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::proposals::persist_proposals;
use crate::proposals::transition_to_pending;
use crate::store::GovernanceError;
use crate::store::GovernanceStore;
use crate::types::ArtifactType;
use crate::types::CriticType;
use crate::types::Episode;
use crate::types::EpisodeArtifact;
use crate::types::ProposalDraft;
use crate::types::Severity;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Shadow runner errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ShadowError {
    /// Governance store failure.
    #[error(transparent)]
    Store(#[from] GovernanceError),
    /// Engine pipeline failure.
    #[error("engine run failed: {0}")]
    Engine(String),
    /// Artifact payload could not be serialized.
    #[error("artifact serialization failed: {0}")]
    Serialization(String),
}

// ============================================================================
// SECTION: Shadow Runner
// ============================================================================

/// Observe-only episodic runner.
///
/// # Invariants
/// - Never applies proposals, never updates models, never mutates doctrine.
pub struct ShadowRunner {
    /// Governance store for episodes, artifacts, and proposals.
    store: Arc<dyn GovernanceStore>,
    /// The engine pipeline.
    pipeline: Pipeline,
}

impl ShadowRunner {
    /// Creates a runner over a governance store and an engine pipeline.
    #[must_use]
    pub fn new(store: Arc<dyn GovernanceStore>, pipeline: Pipeline) -> Self {
        Self {
            store,
            pipeline,
        }
    }

    /// Derives the canonical episode id: `race_{date}_{race_id}`.
    ///
    /// The date is the decision date (epistemic time), never the creation
    /// date.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::Serialization`] when the decision instant
    /// cannot be rendered.
    pub fn episode_id_for(
        race_id: &RaceId,
        decision_time: Timestamp,
    ) -> Result<EpisodeId, ShadowError> {
        let date = decision_time
            .utc_date()
            .map_err(|err| ShadowError::Serialization(err.to_string()))?;
        Ok(EpisodeId::new(format!("race_{date}_{race_id}")))
    }

    /// Runs the shadow flow for one race: episode, artifacts, engine,
    /// critics.
    ///
    /// `off_time` is the advertised start; the decision time is ten minutes
    /// earlier and overrides whatever the caller left in the race context.
    /// `created_at` is the wall-clock creation instant supplied by the host.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError`] on storage, serialization, or engine
    /// failure.
    pub fn run_race(
        &self,
        race_id: &RaceId,
        off_time: Timestamp,
        mut race_ctx: RaceContext,
        market_ctx: MarketContext,
        runners: Vec<Runner>,
        created_at: Timestamp,
    ) -> Result<(EpisodeId, PipelineContext), ShadowError> {
        let decision_time = Timestamp::shadow_decision_time(off_time);
        race_ctx.decision_time = decision_time;

        // 1. Create the episode idempotently, pinned to epistemic time.
        let episode_id = Self::episode_id_for(race_id, decision_time)?;
        let context = json!({
            "course": race_ctx.course,
            "distance": race_ctx.distance_meters,
            "going": race_ctx.going,
            "class": race_ctx.class_level,
        });
        let context_hash = derive_context_hash(&context)
            .map_err(|err| ShadowError::Serialization(err.to_string()))?;
        self.store.insert_episode_if_absent(&Episode {
            id: episode_id.clone(),
            decision_time,
            created_at,
            context_hash,
            finalized: false,
            finalized_at: None,
        })?;

        // 2. PRE_STATE artifact: exactly what the engine is about to see.
        let pre_state = json!({
            "runners": runners,
            "market": market_ctx,
        });
        self.write_artifact(&episode_id, ArtifactType::PreState, pre_state, created_at)?;

        // 3. Run the engine.
        let ctx = self
            .pipeline
            .run(race_id, race_ctx, market_ctx, runners, None)
            .map_err(|err| ShadowError::Engine(err.to_string()))?;

        // 4. INFERENCE artifact: the full engine run record.
        let inference = ctx
            .engine_run
            .as_ref()
            .map(furlong_core::EngineRun::to_value)
            .transpose()
            .map_err(|err| ShadowError::Serialization(err.to_string()))?
            .unwrap_or_else(|| json!(null));
        self.write_artifact(&episode_id, ArtifactType::Inference, inference, created_at)?;

        // 5. Critics emit DRAFT proposals from real engine outputs.
        self.run_critics(&episode_id, &ctx, created_at)?;

        Ok((episode_id, ctx))
    }

    /// Finalizes an episode after the race completes.
    ///
    /// Writes the OUTCOME artifact, marks the episode finalized, and
    /// transitions its drafts to PENDING. Returns the explicit count of
    /// proposals moved.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError`] on storage or serialization failure.
    pub fn finalize_race(
        &self,
        episode_id: &EpisodeId,
        outcome: &RaceOutcome,
        now: Timestamp,
    ) -> Result<u64, ShadowError> {
        let content = serde_json::to_value(outcome)
            .map_err(|err| ShadowError::Serialization(err.to_string()))?;
        self.write_artifact(episode_id, ArtifactType::Outcome, content, now)?;
        self.store.finalize_episode(episode_id, now)?;
        Ok(transition_to_pending(self.store.as_ref(), episode_id)?)
    }

    /// Writes one typed artifact with its canonical checksum.
    fn write_artifact(
        &self,
        episode_id: &EpisodeId,
        artifact_type: ArtifactType,
        content: Value,
        created_at: Timestamp,
    ) -> Result<(), ShadowError> {
        let bytes = canonical_json_bytes(&content)
            .map_err(|err| ShadowError::Serialization(err.to_string()))?;
        let checksum = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes).value;
        self.store.upsert_artifact(&EpisodeArtifact {
            id: format!("{episode_id}_{}", artifact_type.as_str()),
            episode_id: episode_id.clone(),
            artifact_type,
            content,
            checksum,
            created_at,
        })?;
        Ok(())
    }

    /// Runs the four critics over the completed pipeline context.
    fn run_critics(
        &self,
        episode_id: &EpisodeId,
        ctx: &PipelineContext,
        now: Timestamp,
    ) -> Result<(), ShadowError> {
        let leakage = leakage_critic(ctx);
        if !leakage.is_empty() {
            persist_proposals(self.store.as_ref(), episode_id, CriticType::Leakage, &leakage, now)?;
        }
        let bias = bias_critic(ctx);
        if !bias.is_empty() {
            persist_proposals(self.store.as_ref(), episode_id, CriticType::Bias, &bias, now)?;
        }
        let feature = feature_critic(ctx);
        if !feature.is_empty() {
            persist_proposals(self.store.as_ref(), episode_id, CriticType::Feature, &feature, now)?;
        }
        let decision = decision_critic(ctx);
        if !decision.is_empty() {
            persist_proposals(
                self.store.as_ref(),
                episode_id,
                CriticType::Decision,
                &decision,
                now,
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Critics
// ============================================================================

/// Leakage critic: a snapshot at the decision boundary needs an explicit
/// temporal-validation rule.
fn leakage_critic(ctx: &PipelineContext) -> Vec<ProposalDraft> {
    let boundary_snapshot =
        ctx.market_ctx.snapshot_timestamp == ctx.race_ctx.decision_time;
    let audit_clean = ctx.leakage_audit.as_ref().is_some_and(|audit| audit.passed);
    if !boundary_snapshot || !audit_clean {
        return Vec::new();
    }
    vec![ProposalDraft {
        severity: Severity::Critical,
        finding_type: "FUTURE_MARKET_LEAKAGE".to_string(),
        description: "Market snapshot coincides with decision time; enforce strict temporal \
                      validation on ingestion"
            .to_string(),
        proposed_change: json!({
            "rule_type": "temporal_validation",
            "condition": "market_snapshot.timestamp <= decision_time",
            "action": "reject_snapshot",
        }),
    }]
}

/// Bias critic: one finding per detected cognitive trap.
fn bias_critic(ctx: &PipelineContext) -> Vec<ProposalDraft> {
    let Some(report) = ctx.ctf_report.as_ref() else {
        return Vec::new();
    };
    report
        .biases_detected
        .iter()
        .map(|bias| {
            let severity = if bias.severity >= 0.8 {
                Severity::Critical
            } else if bias.severity >= 0.6 {
                Severity::High
            } else if bias.severity >= 0.3 {
                Severity::Medium
            } else {
                Severity::Low
            };
            ProposalDraft {
                severity,
                finding_type: format!("{}_BIAS", bias.bias_type.as_str().to_uppercase()),
                description: bias.mitigation.clone(),
                proposed_change: json!({
                    "rule_type": "confidence_calibration",
                    "bias": bias.bias_type.as_str(),
                }),
            }
        })
        .collect()
}

/// Feature critic: missing strike-rate coverage weakens the narrative
/// detectors.
fn feature_critic(ctx: &PipelineContext) -> Vec<ProposalDraft> {
    let missing_jockey = ctx.runners.iter().any(|runner| runner.jockey_strike_rate.is_none());
    if !missing_jockey {
        return Vec::new();
    }
    vec![ProposalDraft {
        severity: Severity::Medium,
        finding_type: "MISSING_FEATURE".to_string(),
        description: "Jockey strike rate absent for at least one runner".to_string(),
        proposed_change: json!({
            "rule_type": "feature_addition",
            "feature_name": "jockey_strike_rate",
        }),
    }]
}

/// Decision critic: suppressed verdicts must cite every failing condition.
fn decision_critic(ctx: &PipelineContext) -> Vec<ProposalDraft> {
    let Some(decision) = ctx.decision.as_ref() else {
        return Vec::new();
    };
    if !decision.win_suppressed {
        return Vec::new();
    }
    vec![ProposalDraft {
        severity: Severity::Low,
        finding_type: "SUPPRESSION_REVIEW".to_string(),
        description: format!(
            "Win suppressed: {}",
            decision.suppression_reason.as_deref().unwrap_or("unknown")
        ),
        proposed_change: json!({
            "rule_type": "rationale_validation",
            "requirement": "cite_failing_conditions",
        }),
    }]
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
    use std::sync::Arc;

    use furlong_core::EngineConfig;
    use furlong_core::MarketContext;
    use furlong_core::RaceContext;
    use furlong_core::RaceId;
    use furlong_core::RaceOutcome;
    use furlong_core::Runner;
    use furlong_core::RunnerId;
    use furlong_core::RunnerMarket;
    use furlong_core::Timestamp;
    use furlong_core::core::context::MarkPressure;
    use furlong_core::core::context::PaceStyle;
    use furlong_core::runtime::InMemoryEngineRunStore;
    use furlong_core::runtime::Pipeline;

    use super::ShadowRunner;
    use crate::store::GovernanceStore;
    use crate::store::MemoryGovernanceStore;
    use crate::types::ArtifactType;
    use crate::types::ProposalStatus;

    fn runner(id: &str, odds: f64) -> Runner {
        Runner {
            runner_id: RunnerId::new(id),
            horse_name: format!("Horse {id}"),
            age: 5,
            sex: "G".to_string(),
            trainer: format!("Trainer {id}"),
            jockey: format!("Jockey {id}"),
            form_string: Some("1213".to_string()),
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
            trainer_strike_rate: None,
            jockey_strike_rate: None,
            odds_drift: None,
            last_run_position: None,
            avg_position_last_5: None,
            distance_record: None,
            historical_stats: None,
        }
    }

    fn fixtures() -> (RaceId, Timestamp, RaceContext, MarketContext, Vec<Runner>) {
        let race_id = RaceId::new("ASC_2026-03-14_1430");
        let off_time = Timestamp::parse_rfc3339("2026-03-14T14:30:00Z").expect("parse");
        let decision = Timestamp::shadow_decision_time(off_time);
        let runners = vec![runner("r1", 1.6), runner("r2", 4.0), runner("r3", 7.0), runner("r4", 12.0)];
        let race_ctx = RaceContext {
            race_id: race_id.clone(),
            course: "Ascot".to_string(),
            decision_time: decision,
            distance_meters: 1_600,
            going: "Good".to_string(),
            class_level: 2,
            surface: "Turf".to_string(),
            field_size: runners.len(),
            age_band: None,
            sex_restriction: None,
            stability_score: Some(0.80),
            pace_geometry_score: Some(0.70),
        };
        let market_ctx = MarketContext {
            race_id: race_id.clone(),
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
        (race_id, off_time, race_ctx, market_ctx, runners)
    }

    fn shadow_runner(store: Arc<MemoryGovernanceStore>) -> ShadowRunner {
        let pipeline =
            Pipeline::new(EngineConfig::default(), Arc::new(InMemoryEngineRunStore::new()))
                .expect("pipeline");
        ShadowRunner::new(store, pipeline)
    }

    #[test]
    fn run_race_creates_episode_with_epistemic_time() {
        let store = Arc::new(MemoryGovernanceStore::new());
        let runner = shadow_runner(store.clone());
        let (race_id, off_time, race_ctx, market_ctx, runners) = fixtures();
        let created_at = off_time.plus_minutes(-9);
        let (episode_id, _) = runner
            .run_race(&race_id, off_time, race_ctx, market_ctx, runners, created_at)
            .expect("run");

        assert_eq!(episode_id.as_str(), "race_2026-03-14_ASC_2026-03-14_1430");
        let episode = store.get_episode(&episode_id).expect("get").expect("present");
        assert_eq!(episode.decision_time, Timestamp::shadow_decision_time(off_time));
        assert_ne!(episode.decision_time, episode.created_at);
        assert!(!episode.finalized);
        assert_eq!(episode.context_hash.len(), 16);
    }

    #[test]
    fn artifacts_carry_checksums_over_canonical_content() {
        let store = Arc::new(MemoryGovernanceStore::new());
        let runner = shadow_runner(store.clone());
        let (race_id, off_time, race_ctx, market_ctx, runners) = fixtures();
        let (episode_id, _) = runner
            .run_race(&race_id, off_time, race_ctx, market_ctx, runners, off_time)
            .expect("run");

        for artifact_type in [ArtifactType::PreState, ArtifactType::Inference] {
            let artifact = store
                .get_artifact(&episode_id, artifact_type)
                .expect("get")
                .expect("present");
            assert_eq!(artifact.checksum.len(), 64);
            assert_eq!(
                artifact.id,
                format!("{episode_id}_{}", artifact_type.as_str())
            );
        }
    }

    #[test]
    fn run_race_is_idempotent_on_episode_creation() {
        let store = Arc::new(MemoryGovernanceStore::new());
        let runner = shadow_runner(store.clone());
        let (race_id, off_time, race_ctx, market_ctx, runners) = fixtures();
        let (first, _) = runner
            .run_race(
                &race_id,
                off_time,
                race_ctx.clone(),
                market_ctx.clone(),
                runners.clone(),
                off_time,
            )
            .expect("first");
        let (second, _) = runner
            .run_race(&race_id, off_time, race_ctx, market_ctx, runners, off_time)
            .expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn finalize_transitions_drafts_to_pending_without_doctrine_mutation() {
        let store = Arc::new(MemoryGovernanceStore::new());
        let runner = shadow_runner(store.clone());
        let (race_id, off_time, race_ctx, market_ctx, runners) = fixtures();
        let (episode_id, ctx) = runner
            .run_race(&race_id, off_time, race_ctx, market_ctx, runners, off_time)
            .expect("run");

        // Shadow critics emitted drafts (missing jockey strike rates at
        // minimum), none beyond DRAFT.
        assert!(store.count_proposals_by_status(ProposalStatus::Draft).expect("count") > 0);
        assert_eq!(
            store.count_proposals_by_status(ProposalStatus::Pending).expect("count"),
            0
        );

        let winner = ctx.ranking.as_ref().expect("ranking").ordered[0].clone();
        let outcome = RaceOutcome {
            race_id,
            winner_id: Some(winner),
            positions: BTreeMap::new(),
            verified: true,
            starting_prices: None,
        };
        let moved = runner
            .finalize_race(&episode_id, &outcome, off_time.plus_minutes(20))
            .expect("finalize");
        assert!(moved > 0);

        let episode = store.get_episode(&episode_id).expect("get").expect("present");
        assert!(episode.finalized);
        assert!(episode.finalized_at.is_some());
        assert!(store
            .get_artifact(&episode_id, ArtifactType::Outcome)
            .expect("get")
            .is_some());

        // Constitutional guarantee: nothing auto-applied, doctrine untouched.
        assert_eq!(
            store.count_proposals_by_status(ProposalStatus::Accepted).expect("count"),
            0
        );
        assert!(store.get_active_doctrine().expect("doctrine").is_none());
    }
}
