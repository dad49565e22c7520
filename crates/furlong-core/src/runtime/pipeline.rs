// crates/furlong-core/src/runtime/pipeline.rs
// ============================================================================
// Module: Furlong Pipeline Orchestrator
// Description: Stage sequencing, context propagation, deterministic run ids.
// Purpose: Walk the nine stages with fail-fast validation and audit capture.
// Dependencies: crate::core, crate::interfaces, crate::runtime::*
// ============================================================================

//! ## Overview
//! The orchestrator owns the stage sequence: ingest, feature engineering,
//! leakage firewall, signal engines, strategic intelligence, decision
//! policy, learning gate, storage, and the deferred post-race critique.
//! Stages run in declared order; nothing downstream of the firewall reads
//! pre-firewall data. A validator failure aborts the run and persists an
//! error-tagged record without a verdict. Cancellation is honored at stage
//! boundaries, and every stage runs under a configurable budget. All
//! collaborators are injected at construction; there are no process-wide
//! singletons, so concurrent per-race pipelines are safe by construction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Instant;

use serde_json::json;

use crate::core::config::EngineConfig;
use crate::core::context::EngineMode;
use crate::core::context::MarketContext;
use crate::core::context::RaceContext;
use crate::core::context::RaceOutcome;
use crate::core::context::Runner;
use crate::core::context::UserContext;
use crate::core::decision::DecisionOutput;
use crate::core::engine_run::EngineRun;
use crate::core::engine_run::RunnerScore;
use crate::core::errors::EngineError;
use crate::core::errors::ErrorCode;
use crate::core::errors::validate_market_context;
use crate::core::errors::validate_odds;
use crate::core::errors::validate_race_context;
use crate::core::gate::LearningGateResult;
use crate::core::hashing::derive_engine_run_id;
use crate::core::identifiers::EngineRunId;
use crate::core::identifiers::PipelineVersion;
use crate::core::identifiers::RaceId;
use crate::core::identifiers::RunnerId;
use crate::core::profile::OpponentProfile;
use crate::core::time::Timestamp;
use crate::interfaces::EngineRunStore;
use crate::interfaces::PredictModel;
use crate::runtime::ablation::AblationSuite;
use crate::runtime::ablation::run_ablation_suite;
use crate::runtime::chaos::calculate_chaos_for_runners;
use crate::runtime::chaos::manipulation_risk;
use crate::runtime::critique::PostRaceCritique;
use crate::runtime::critique::perform_post_race_critique;
use crate::runtime::engineering::EngineeringFeatures;
use crate::runtime::engineering::build_engineering_features;
use crate::runtime::features::FeatureBuild;
use crate::runtime::features::FeatureSchema;
use crate::runtime::features::build_feature_frame;
use crate::runtime::form::StabilityProfile;
use crate::runtime::form::build_stability_profile;
use crate::runtime::leakage::FirewallMode;
use crate::runtime::leakage::LeakageAudit;
use crate::runtime::leakage::LeakageFirewall;
use crate::runtime::learning_gate::GateSignals;
use crate::runtime::learning_gate::IntegrityCheck;
use crate::runtime::learning_gate::evaluate_learning_gate;
use crate::runtime::opponent::profile_race_opponents;
use crate::runtime::policy::decide;
use crate::runtime::ranker::RaceSignals;
use crate::runtime::ranker::Ranking;
use crate::runtime::traps::CtfReport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder stability signal until the dedicated engine lands.
const PLACEHOLDER_STABILITY: f64 = 0.72;

/// Placeholder pace-geometry signal until the dedicated engine lands.
const PLACEHOLDER_PACE_GEOMETRY: f64 = 0.68;

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cooperative cancellation token checked at stage boundaries.
///
/// # Invariants
/// - Cancellation aborts the next stage boundary; the executing stage
///   completes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Pipeline Context
// ============================================================================

/// Context object threaded through the stages of one race run.
///
/// # Invariants
/// - Stage outputs are only present once their stage has completed.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Race identifier.
    pub race_id: RaceId,
    /// Derived engine run identifier.
    pub engine_run_id: EngineRunId,
    /// Decision instant the run is pinned to.
    pub decision_timestamp: Timestamp,
    /// Race context input.
    pub race_ctx: RaceContext,
    /// Market snapshot input.
    pub market_ctx: MarketContext,
    /// Runner list input.
    pub runners: Vec<Runner>,
    /// Stage 2 output: engineered features.
    pub features: Option<FeatureBuild>,
    /// Stage 2 output: short hash over canonical contexts.
    pub features_hash: String,
    /// Stage 2 output: per-runner stability profiles.
    pub stability_profiles: BTreeMap<RunnerId, StabilityProfile>,
    /// Stage 2 output: race-engineering features.
    pub engineering: Vec<EngineeringFeatures>,
    /// Stage 3 output: firewall audit blob.
    pub leakage_audit: Option<LeakageAudit>,
    /// Stage 4 output: race-level signals.
    pub signals: Option<RaceSignals>,
    /// Stage 5 output: opponent profiles.
    pub opponent_profiles: Vec<OpponentProfile>,
    /// Stage 5 output: ablation suite.
    pub ablation: Option<AblationSuite>,
    /// Stage 6 output: cognitive-trap report.
    pub ctf_report: Option<CtfReport>,
    /// Stage 6 output: score-based ranking.
    pub ranking: Option<Ranking>,
    /// Stage 6 output: verdict.
    pub decision: Option<DecisionOutput>,
    /// Stage 7 output: learning-gate result.
    pub learning_gate_result: Option<LearningGateResult>,
    /// Stage 8 output: persisted run record.
    pub engine_run: Option<EngineRun>,
    /// Wall-clock stage timings, when timing is enabled.
    pub stage_timings_ms: BTreeMap<String, f64>,
}

/// Finalization output produced when the outcome arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    /// Re-evaluated learning gate with the verified outcome.
    pub gate_result: LearningGateResult,
    /// Post-race critique record.
    pub critique: PostRaceCritique,
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// The staged race-analysis pipeline.
///
/// # Invariants
/// - One instance serves one race at a time; workers own their own
///   instances and share only the injected stores.
pub struct Pipeline {
    /// Validated engine configuration.
    config: EngineConfig,
    /// Engine-run persistence.
    store: Arc<dyn EngineRunStore + Send + Sync>,
    /// Optional model callback for ablation.
    model: Option<Arc<dyn PredictModel + Send + Sync>>,
    /// Leakage firewall with its merged blocklist.
    firewall: LeakageFirewall,
    /// Feature schema contract.
    schema: FeatureSchema,
    /// Execution mode recorded on runs.
    mode: EngineMode,
    /// Pipeline version tag recorded on runs.
    version: PipelineVersion,
    /// Cooperative cancellation token.
    cancel: CancellationToken,
}

impl Pipeline {
    /// Creates a pipeline over a validated configuration and run store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the configuration fails validation.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn EngineRunStore + Send + Sync>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(|err| {
            EngineError::new(ErrorCode::ContractViolation, err.to_string())
        })?;
        Ok(Self {
            config,
            store,
            model: None,
            firewall: LeakageFirewall::new(),
            schema: FeatureSchema::default_contract(),
            mode: EngineMode::Race,
            version: PipelineVersion::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Attaches a model callback for the ablation harness.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn PredictModel + Send + Sync>) -> Self {
        self.model = Some(model);
        self
    }

    /// Replaces the leakage firewall (manifest-extended blocklists).
    #[must_use]
    pub fn with_firewall(mut self, firewall: LeakageFirewall) -> Self {
        self.firewall = firewall;
        self
    }

    /// Sets the execution mode recorded on runs.
    #[must_use]
    pub const fn with_mode(mut self, mode: EngineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the pipeline version tag.
    #[must_use]
    pub fn with_version(mut self, version: PipelineVersion) -> Self {
        self.version = version;
        self
    }

    /// Returns the cancellation token for this pipeline.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shares an external cancellation token (batch dispatch).
    #[must_use]
    pub fn with_shared_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the full pipeline for one race.
    ///
    /// On any stage failure the error is recorded into a persisted run
    /// skeleton (`metadata.error`) and propagated; no partial verdict is
    /// ever emitted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] from validators, the firewall, ranking
    /// contracts, stage timeouts, or cancellation.
    pub fn run(
        &self,
        race_id: &RaceId,
        race_ctx: RaceContext,
        market_ctx: MarketContext,
        runners: Vec<Runner>,
        user_ctx: Option<&UserContext>,
    ) -> Result<PipelineContext, EngineError> {
        let decision_timestamp = race_ctx.decision_time;
        let engine_run_id = derive_engine_run_id(race_id, decision_timestamp)
            .map_err(|err| EngineError::new(ErrorCode::ContractViolation, err.to_string()))?;

        let mut ctx = PipelineContext {
            race_id: race_id.clone(),
            engine_run_id,
            decision_timestamp,
            race_ctx,
            market_ctx,
            runners,
            features: None,
            features_hash: String::new(),
            stability_profiles: BTreeMap::new(),
            engineering: Vec::new(),
            leakage_audit: None,
            signals: None,
            opponent_profiles: Vec::new(),
            ablation: None,
            ctf_report: None,
            ranking: None,
            decision: None,
            learning_gate_result: None,
            engine_run: None,
            stage_timings_ms: BTreeMap::new(),
        };

        match self.run_stages(&mut ctx, user_ctx) {
            Ok(()) => Ok(ctx),
            Err(err) => {
                self.persist_failed_run(&mut ctx, &err);
                Err(err)
            }
        }
    }

    /// Walks stages two through eight over the context.
    fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        user_ctx: Option<&UserContext>,
    ) -> Result<(), EngineError> {
        self.stage(ctx, "ingest", Self::stage_ingest)?;
        self.stage(ctx, "feature_engineering", Self::stage_features)?;
        self.stage(ctx, "leakage_firewall", Self::stage_leakage)?;
        self.stage(ctx, "signal_engines", Self::stage_signals)?;
        self.stage(ctx, "strategic_intelligence", Self::stage_intelligence)?;
        self.stage(ctx, "decision_policy", |pipeline, ctx| {
            pipeline.stage_decision(ctx, user_ctx)
        })?;
        self.stage(ctx, "learning_gate", Self::stage_learning_gate)?;
        self.stage(ctx, "storage", Self::stage_storage)?;
        Ok(())
    }

    /// Runs one stage with cancellation, timing, and budget enforcement.
    fn stage(
        &self,
        ctx: &mut PipelineContext,
        name: &str,
        body: impl FnOnce(&Self, &mut PipelineContext) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::new(
                ErrorCode::Cancelled,
                format!("run cancelled before stage {name}"),
            )
            .with_context("stage", name));
        }
        let started = Instant::now();
        body(self, ctx).map_err(|err| err.with_context("stage", name))?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        if self.config.record_timings {
            ctx.stage_timings_ms.insert(name.to_string(), elapsed_ms);
        }
        if elapsed_ms > self.config.stage_timeout_ms as f64 {
            return Err(EngineError::new(
                ErrorCode::StageTimeout,
                format!(
                    "stage {name} took {elapsed_ms:.0} ms (budget {} ms)",
                    self.config.stage_timeout_ms
                ),
            )
            .with_context("stage", name));
        }
        Ok(())
    }

    /// Stage 1: validate materialized inputs.
    fn stage_ingest(&self, ctx: &mut PipelineContext) -> Result<(), EngineError> {
        validate_race_context(&ctx.race_ctx, &ctx.runners)?;
        validate_market_context(&ctx.market_ctx, ctx.race_ctx.decision_time)?;
        for runner in &ctx.runners {
            validate_odds(runner)?;
        }
        Ok(())
    }

    /// Stage 2: stability profiles, engineering features, feature frame.
    fn stage_features(&self, ctx: &mut PipelineContext) -> Result<(), EngineError> {
        // Market rank drives the field-rank band of the stability cluster.
        let mut ranked: Vec<(RunnerId, f64)> = ctx
            .market_ctx
            .runners
            .iter()
            .map(|line| (line.runner_id.clone(), line.odds_decimal))
            .collect();
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let rank_of = |runner_id: &RunnerId| -> usize {
            ranked
                .iter()
                .position(|(id, _)| id == runner_id)
                .map_or(ctx.runners.len(), |index| index + 1)
        };

        ctx.stability_profiles = ctx
            .runners
            .iter()
            .map(|runner| {
                let profile = build_stability_profile(
                    &runner.runner_id,
                    runner.form_string.as_deref(),
                    rank_of(&runner.runner_id),
                    ctx.runners.len(),
                );
                (runner.runner_id.clone(), profile)
            })
            .collect();

        ctx.engineering = build_engineering_features(&ctx.runners, &ctx.race_ctx);

        let stability: Vec<StabilityProfile> =
            ctx.stability_profiles.values().cloned().collect();
        let build = build_feature_frame(
            &ctx.race_ctx,
            &ctx.market_ctx,
            &ctx.runners,
            &ctx.engineering,
            &stability,
        )
        .map_err(|err| EngineError::new(ErrorCode::ContractViolation, err.to_string()))?;

        self.schema
            .check(&build.frame)
            .map_err(|err| EngineError::new(ErrorCode::ContractViolation, err.to_string()))?;

        ctx.features_hash = build.features_hash.clone();
        ctx.features = Some(build);
        Ok(())
    }

    /// Stage 3: leakage firewall in strict mode.
    fn stage_leakage(&self, ctx: &mut PipelineContext) -> Result<(), EngineError> {
        let Some(features) = ctx.features.as_ref() else {
            return Err(EngineError::new(
                ErrorCode::ContractViolation,
                "leakage stage reached without a feature frame",
            ));
        };
        let audit = self.firewall.validate_frame(
            &features.frame,
            ctx.race_ctx.decision_time,
            FirewallMode::Strict,
        )?;
        ctx.leakage_audit = Some(audit);
        Ok(())
    }

    /// Stage 4: chaos and manipulation signal engines.
    fn stage_signals(&self, ctx: &mut PipelineContext) -> Result<(), EngineError> {
        let chaos = calculate_chaos_for_runners(&ctx.runners);
        ctx.signals = Some(RaceSignals {
            chaos_level: chaos.chaos_level,
            manipulation_risk: manipulation_risk(&self.config),
            stability_score: ctx.race_ctx.stability_score.unwrap_or(PLACEHOLDER_STABILITY),
            pace_geometry_score: ctx
                .race_ctx
                .pace_geometry_score
                .unwrap_or(PLACEHOLDER_PACE_GEOMETRY),
        });
        Ok(())
    }

    /// Stage 5: opponent models and ablation tests.
    fn stage_intelligence(&self, ctx: &mut PipelineContext) -> Result<(), EngineError> {
        ctx.opponent_profiles =
            profile_race_opponents(&ctx.runners, &ctx.race_ctx, &ctx.market_ctx)?;

        ctx.ablation = Some(match (&self.model, &ctx.features) {
            (Some(model), Some(features)) => {
                let original = model.predict(&features.frame).map_err(|err| {
                    EngineError::new(ErrorCode::ContractViolation, err.to_string())
                })?;
                run_ablation_suite(&features.frame, model.as_ref(), &original, &self.config)
            }
            // Without a model callback the suite is clean by definition.
            _ => AblationSuite::clean(),
        });
        Ok(())
    }

    /// Stage 6: decision policy (ranking, CTF scan, chassis, TopStrike).
    fn stage_decision(
        &self,
        ctx: &mut PipelineContext,
        user_ctx: Option<&UserContext>,
    ) -> Result<(), EngineError> {
        let signals = ctx.signals.ok_or_else(|| {
            EngineError::new(ErrorCode::ContractViolation, "decision stage before signals")
        })?;
        let ablation = ctx.ablation.clone().ok_or_else(|| {
            EngineError::new(ErrorCode::ContractViolation, "decision stage before ablation")
        })?;

        let outcome = decide(
            &ctx.opponent_profiles,
            &ctx.runners,
            &ctx.market_ctx,
            &ctx.stability_profiles,
            &signals,
            &ablation,
            user_ctx,
            &self.config,
        )?;
        ctx.ctf_report = Some(outcome.ctf_report);
        ctx.ranking = Some(outcome.ranking);
        ctx.decision = Some(outcome.decision);
        Ok(())
    }

    /// Stage 7: pre-race learning gate with a pending integrity check.
    fn stage_learning_gate(&self, ctx: &mut PipelineContext) -> Result<(), EngineError> {
        let signals = ctx.signals.ok_or_else(|| {
            EngineError::new(ErrorCode::ContractViolation, "gate stage before signals")
        })?;
        let ablation = ctx.ablation.clone().unwrap_or_else(AblationSuite::clean);
        let integrity = IntegrityCheck {
            flags: Vec::new(),
            pending: true,
        };
        let result = evaluate_learning_gate(
            &GateSignals::from_race_signals(&signals),
            &ablation,
            None,
            &integrity,
            &self.config,
        );
        if let Some(decision) = ctx.decision.as_mut() {
            decision.learning_gate_status = Some(result.learning_status);
        }
        ctx.learning_gate_result = Some(result);
        Ok(())
    }

    /// Stage 8: assemble and persist the engine run record.
    fn stage_storage(&self, ctx: &mut PipelineContext) -> Result<(), EngineError> {
        let run = self.assemble_run(ctx)?;
        self.store
            .save(&run)
            .map_err(|err| EngineError::new(ErrorCode::ContractViolation, err.to_string()))?;
        ctx.engine_run = Some(run);
        Ok(())
    }

    /// Builds the engine run record from completed stage outputs.
    fn assemble_run(&self, ctx: &PipelineContext) -> Result<EngineRun, EngineError> {
        let ranking = ctx.ranking.as_ref().ok_or_else(|| {
            EngineError::new(ErrorCode::ContractViolation, "storage stage before ranking")
        })?;

        let mut runner_scores = Vec::with_capacity(ranking.ordered.len());
        for runner_id in &ranking.ordered {
            let profile = ctx
                .opponent_profiles
                .iter()
                .find(|p| &p.runner_id == runner_id)
                .ok_or_else(|| {
                    EngineError::new(
                        ErrorCode::ContractViolation,
                        format!("ranked runner {runner_id} has no profile"),
                    )
                })?;
            let score = ranking.breakdowns.get(runner_id).ok_or_else(|| {
                EngineError::new(
                    ErrorCode::MissingScore,
                    format!("ranked runner {runner_id} has no breakdown"),
                )
            })?;
            runner_scores.push(RunnerScore {
                runner_id: runner_id.clone(),
                horse_name: profile.horse_name.clone(),
                market_role: profile.market_role,
                intent_class: profile.intent_class,
                score: score.clone(),
            });
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("features_hash".to_string(), json!(ctx.features_hash));
        metadata.insert("status".to_string(), json!("completed"));
        if let Some(audit) = ctx.leakage_audit.as_ref() {
            metadata.insert(
                "leakage_audit".to_string(),
                serde_json::to_value(audit).map_err(|err| {
                    EngineError::new(ErrorCode::ContractViolation, err.to_string())
                })?,
            );
        }
        if let Some(gate) = ctx.learning_gate_result.as_ref() {
            metadata.insert(
                "learning_gate".to_string(),
                serde_json::to_value(gate).map_err(|err| {
                    EngineError::new(ErrorCode::ContractViolation, err.to_string())
                })?,
            );
        }
        let execution_time_ms = if self.config.record_timings {
            Some(ctx.stage_timings_ms.values().sum())
        } else {
            None
        };

        Ok(EngineRun {
            engine_run_id: ctx.engine_run_id.clone(),
            decision_timestamp: ctx.decision_timestamp,
            race_ctx: ctx.race_ctx.clone(),
            market_ctx: ctx.market_ctx.clone(),
            runner_scores,
            verdict: ctx.decision.clone(),
            mode: self.mode,
            chaos_level: ctx.signals.map_or(0.0, |signals| signals.chaos_level),
            pipeline_version: self.version.clone(),
            execution_time_ms,
            metadata,
        })
    }

    /// Persists an error-tagged run skeleton after a stage failure.
    ///
    /// Best effort: a store failure here must not mask the original error.
    fn persist_failed_run(&self, ctx: &mut PipelineContext, error: &EngineError) {
        let stage = error
            .context
            .get("stage")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let status = if error.code == ErrorCode::Cancelled {
            "cancelled"
        } else {
            "failed"
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("status".to_string(), json!(status));
        metadata.insert("failed_stage".to_string(), json!(stage));
        metadata.insert(
            "error".to_string(),
            serde_json::to_value(error).unwrap_or_else(|_| json!(error.to_string())),
        );
        if !ctx.features_hash.is_empty() {
            metadata.insert("features_hash".to_string(), json!(ctx.features_hash));
        }

        let run = EngineRun {
            engine_run_id: ctx.engine_run_id.clone(),
            decision_timestamp: ctx.decision_timestamp,
            race_ctx: ctx.race_ctx.clone(),
            market_ctx: ctx.market_ctx.clone(),
            runner_scores: Vec::new(),
            verdict: None,
            mode: self.mode,
            chaos_level: ctx.signals.map_or(0.0, |signals| signals.chaos_level),
            pipeline_version: self.version.clone(),
            execution_time_ms: None,
            metadata,
        };
        let _ = self.store.save(&run);
        ctx.engine_run = Some(run);
    }

    /// Stage 9: post-race critique and gate re-evaluation on outcome
    /// arrival.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the context carries no persisted run.
    pub fn finalize(
        &self,
        ctx: &PipelineContext,
        outcome: &RaceOutcome,
        integrity: &IntegrityCheck,
        critique_timestamp: Timestamp,
    ) -> Result<Finalization, EngineError> {
        let engine_run = ctx.engine_run.as_ref().ok_or_else(|| {
            EngineError::new(ErrorCode::ContractViolation, "finalize before storage stage")
        })?;
        let signals = ctx.signals.ok_or_else(|| {
            EngineError::new(ErrorCode::ContractViolation, "finalize before signals stage")
        })?;
        let ablation = ctx.ablation.clone().unwrap_or_else(AblationSuite::clean);

        let gate_result = evaluate_learning_gate(
            &GateSignals::from_race_signals(&signals),
            &ablation,
            Some(outcome),
            integrity,
            &self.config,
        );
        let critique =
            perform_post_race_critique(engine_run, outcome, &gate_result, critique_timestamp);
        Ok(Finalization {
            gate_result,
            critique,
        })
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

    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::Pipeline;
    use crate::core::config::EngineConfig;
    use crate::core::context::MarkPressure;
    use crate::core::context::MarketContext;
    use crate::core::context::PaceStyle;
    use crate::core::context::RaceContext;
    use crate::core::context::RaceOutcome;
    use crate::core::context::Runner;
    use crate::core::context::RunnerMarket;
    use crate::core::errors::ErrorCode;
    use crate::core::gate::LearningStatus;
    use crate::core::identifiers::RaceId;
    use crate::core::identifiers::RunnerId;
    use crate::core::time::Timestamp;
    use crate::interfaces::EngineRunStore;
    use crate::runtime::learning_gate::IntegrityCheck;
    use crate::runtime::run_store::InMemoryEngineRunStore;

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

    fn fixtures(odds: &[f64]) -> (RaceId, RaceContext, MarketContext, Vec<Runner>) {
        let race_id = RaceId::new("CHE_2026-03-14_1430");
        let decision = Timestamp::parse_rfc3339("2026-03-14T14:20:00Z").expect("parse");
        let runners: Vec<Runner> = odds
            .iter()
            .enumerate()
            .map(|(index, value)| runner(&format!("r{}", index + 1), *value))
            .collect();
        let race_ctx = RaceContext {
            race_id: race_id.clone(),
            course: "Cheltenham".to_string(),
            decision_time: decision,
            distance_meters: 3_200,
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
        (race_id, race_ctx, market_ctx, runners)
    }

    fn pipeline() -> (Pipeline, Arc<InMemoryEngineRunStore>) {
        let store = Arc::new(InMemoryEngineRunStore::new());
        let pipeline =
            Pipeline::new(EngineConfig::default(), store.clone()).expect("pipeline");
        (pipeline, store)
    }

    #[test]
    fn full_run_produces_verdict_and_persists() {
        let (race_id, race_ctx, market_ctx, runners) = fixtures(&[1.6, 4.0, 7.0, 12.0]);
        let (pipeline, store) = pipeline();
        let ctx = pipeline
            .run(&race_id, race_ctx, market_ctx, runners, None)
            .expect("run");
        assert!(ctx.decision.is_some());
        assert_eq!(ctx.ranking.as_ref().expect("ranking").top4.len(), 4);
        assert_eq!(ctx.features_hash.len(), 16);
        let run = ctx.engine_run.as_ref().expect("run record");
        assert_eq!(run.runner_scores.len(), 4);
        assert!(store.load(&ctx.engine_run_id).expect("load").is_some());
        assert!(ctx
            .learning_gate_result
            .as_ref()
            .is_some_and(|gate| gate.learning_status != LearningStatus::Committed));
    }

    #[test]
    fn identical_inputs_produce_identical_records() {
        let (race_id, race_ctx, market_ctx, runners) = fixtures(&[1.6, 4.0, 7.0, 12.0]);
        let (pipeline, _) = pipeline();
        let first = pipeline
            .run(
                &race_id,
                race_ctx.clone(),
                market_ctx.clone(),
                runners.clone(),
                None,
            )
            .expect("first");
        let second = pipeline
            .run(&race_id, race_ctx, market_ctx, runners, None)
            .expect("second");
        let first_hash = first.engine_run.expect("first run").determinism_hash().expect("hash");
        let second_hash =
            second.engine_run.expect("second run").determinism_hash().expect("hash");
        assert_eq!(first_hash, second_hash);
    }

    #[test]
    fn missing_odds_abort_with_error_record() {
        let (race_id, race_ctx, market_ctx, mut runners) = fixtures(&[1.6, 4.0]);
        runners[1].odds_decimal = None;
        let (pipeline, store) = pipeline();
        let err = pipeline
            .run(&race_id, race_ctx, market_ctx, runners, None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingOdds);
        // An error-tagged skeleton is still queryable.
        let listed = store.list(1).expect("list");
        let skeleton = store.load(&listed[0]).expect("load").expect("present");
        assert!(skeleton.verdict.is_none());
        assert_eq!(
            skeleton.metadata.get("status"),
            Some(&serde_json::Value::String("failed".to_string()))
        );
    }

    #[test]
    fn post_decision_snapshot_fails_ingest() {
        let (race_id, race_ctx, mut market_ctx, runners) = fixtures(&[1.6, 4.0]);
        market_ctx.snapshot_timestamp = race_ctx.decision_time.plus_minutes(5);
        let (pipeline, _) = pipeline();
        let err = pipeline
            .run(&race_id, race_ctx, market_ctx, runners, None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Leakage);
    }

    #[test]
    fn cancellation_stops_at_the_next_boundary() {
        let (race_id, race_ctx, market_ctx, runners) = fixtures(&[1.6, 4.0]);
        let (pipeline, store) = pipeline();
        pipeline.cancellation_token().cancel();
        let err = pipeline
            .run(&race_id, race_ctx, market_ctx, runners, None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Cancelled);
        let listed = store.list(1).expect("list");
        let skeleton = store.load(&listed[0]).expect("load").expect("present");
        assert_eq!(
            skeleton.metadata.get("status"),
            Some(&serde_json::Value::String("cancelled".to_string()))
        );
    }

    #[test]
    fn finalize_reevaluates_gate_with_outcome() {
        let (race_id, race_ctx, market_ctx, runners) = fixtures(&[1.6, 4.0, 7.0, 12.0]);
        let (pipeline, _) = pipeline();
        let ctx = pipeline
            .run(&race_id, race_ctx, market_ctx, runners, None)
            .expect("run");

        let winner = ctx.ranking.as_ref().expect("ranking").ordered[0].clone();
        let outcome = RaceOutcome {
            race_id,
            winner_id: Some(winner),
            positions: BTreeMap::new(),
            verified: true,
            starting_prices: None,
        };
        let finalization = pipeline
            .finalize(
                &ctx,
                &outcome,
                &IntegrityCheck::default(),
                ctx.decision_timestamp.plus_minutes(30),
            )
            .expect("finalize");
        assert_eq!(
            finalization.gate_result.learning_status,
            LearningStatus::Committed
        );
        assert!(finalization.critique.top_4_hit);
    }
}
