// crates/furlong-core/src/lib.rs
// ============================================================================
// Module: Furlong Core
// Description: Deterministic race-analysis decision engine.
// Purpose: Data model, signal engines, decision policy, and pipeline.
// Dependencies: serde, serde_jcs, serde_json, sha2, thiserror, time
// ============================================================================

//! ## Overview
//! Furlong Core is a deterministic, audit-trailed decision engine for
//! horse-racing markets. Given a race card and a market snapshot frozen at
//! decision time it produces a scored Top-4 ranking, a bet-chassis verdict
//! with explicit reasons, and a reproducible engine-run record tying
//! inputs, signals, and verdict together.
//!
//! Structure:
//! - [`core`]: the data model with contexts, profiles, scores, verdicts, the
//!   engine-run record, errors, canonical hashing, and time.
//! - [`interfaces`]: backend-agnostic storage and model-callback traits.
//! - [`runtime`]: the stage engines and the pipeline orchestrator.
//!
//! The snapshot at decision time is authoritative: no data stamped after
//! decision time may influence output, and identical inputs under the same
//! active doctrine version produce byte-identical records.

/// Core data model.
pub mod core;
/// Backend-agnostic interfaces.
pub mod interfaces;
/// Stage engines and orchestration.
pub mod runtime;

pub use crate::core::ChassisType;
pub use crate::core::ConfigError;
pub use crate::core::DecisionNotes;
pub use crate::core::DecisionOutput;
pub use crate::core::EngineConfig;
pub use crate::core::EngineError;
pub use crate::core::EngineMode;
pub use crate::core::EngineRun;
pub use crate::core::EngineRunError;
pub use crate::core::EngineRunId;
pub use crate::core::EpisodeId;
pub use crate::core::ErrorCode;
pub use crate::core::GateCondition;
pub use crate::core::HashAlgorithm;
pub use crate::core::HashDigest;
pub use crate::core::HistoricalStats;
pub use crate::core::HistoricalStatsCaps;
pub use crate::core::IntentClass;
pub use crate::core::LearningGateResult;
pub use crate::core::LearningStatus;
pub use crate::core::MarketContext;
pub use crate::core::MarketRole;
pub use crate::core::OpponentProfile;
pub use crate::core::PipelineVersion;
pub use crate::core::ProposalId;
pub use crate::core::RaceContext;
pub use crate::core::RaceId;
pub use crate::core::RaceOutcome;
pub use crate::core::Runner;
pub use crate::core::RunnerId;
pub use crate::core::RunnerMarket;
pub use crate::core::RunnerScore;
pub use crate::core::ScoreBreakdown;
pub use crate::core::ScoreComponents;
pub use crate::core::StableTactic;
pub use crate::core::Timestamp;
pub use crate::core::UserContext;
pub use crate::interfaces::EngineRunStore;
pub use crate::interfaces::ModelError;
pub use crate::interfaces::PredictModel;
pub use crate::interfaces::Prediction;
pub use crate::interfaces::RunStoreError;
pub use crate::runtime::CancellationToken;
pub use crate::runtime::Pipeline;
pub use crate::runtime::PipelineContext;
