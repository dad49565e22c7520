// crates/furlong-core/src/core/engine_run.rs
// ============================================================================
// Module: Furlong Engine Run Record
// Description: Canonical input + signal + verdict artifact for one race run.
// Purpose: Make every verdict reproducible from its stored inputs.
// Dependencies: crate::core::{context, decision, hashing, identifiers, profile,
// score, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! An [`EngineRun`] is the single source of truth for one pipeline execution:
//! the contexts it consumed, every runner's score breakdown, the verdict, and
//! run metadata. Serialization is canonical (RFC 8785 sorted keys, RFC 3339
//! UTC timestamps, odds as exact decimal strings) so identical inputs always
//! produce byte-identical records. The reproducibility contract is
//! `EngineRun::from_value(run.to_value()?)? == run`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::context::EngineMode;
use crate::core::context::MarketContext;
use crate::core::context::RaceContext;
use crate::core::decision::DecisionOutput;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hash_bytes;
use crate::core::identifiers::EngineRunId;
use crate::core::identifiers::PipelineVersion;
use crate::core::identifiers::RunnerId;
use crate::core::profile::IntentClass;
use crate::core::profile::MarketRole;
use crate::core::score::ScoreBreakdown;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine-run serialization errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum EngineRunError {
    /// Record could not be serialized or canonicalized.
    #[error("engine run serialization failed: {0}")]
    Serialization(String),
    /// Record could not be deserialized.
    #[error("engine run deserialization failed: {0}")]
    Deserialization(String),
}

impl From<HashError> for EngineRunError {
    fn from(err: HashError) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ============================================================================
// SECTION: Runner Scores
// ============================================================================

/// Per-runner scoring output embedded in the run record.
///
/// # Invariants
/// - One entry per runner in the input; validated by the score contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerScore {
    /// Runner identifier.
    pub runner_id: RunnerId,
    /// Horse name.
    pub horse_name: String,
    /// Market role assigned by the opponent models.
    pub market_role: MarketRole,
    /// Intent classification assigned by the opponent models.
    pub intent_class: IntentClass,
    /// Composite score with component breakdown.
    pub score: ScoreBreakdown,
}

// ============================================================================
// SECTION: Engine Run
// ============================================================================

/// Complete, reproducible record of one engine execution.
///
/// # Invariants
/// - Immutable once persisted.
/// - `engine_run_id` is derived from `race_id` and `decision_timestamp`.
/// - `execution_time_ms` is only recorded when the host opts into timing,
///   keeping replays byte-identical by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRun {
    /// Derived run identifier.
    pub engine_run_id: EngineRunId,
    /// Decision instant the run was pinned to.
    pub decision_timestamp: Timestamp,
    /// Race context consumed by the run.
    pub race_ctx: RaceContext,
    /// Market snapshot consumed by the run.
    pub market_ctx: MarketContext,
    /// Per-runner scores in ranked order.
    pub runner_scores: Vec<RunnerScore>,
    /// Verdict; absent when the run aborted before the policy stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<DecisionOutput>,
    /// Execution mode.
    pub mode: EngineMode,
    /// Chaos level computed for the race.
    pub chaos_level: f64,
    /// Pipeline version tag.
    pub pipeline_version: PipelineVersion,
    /// Wall-clock execution time in milliseconds, when timing was enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
    /// Serialized metadata (stage annotations, error records, status).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl EngineRun {
    /// Converts the record to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineRunError::Serialization`] when conversion fails.
    pub fn to_value(&self) -> Result<Value, EngineRunError> {
        serde_json::to_value(self).map_err(|err| EngineRunError::Serialization(err.to_string()))
    }

    /// Reconstructs a record from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineRunError::Deserialization`] when the value does not
    /// match the record shape.
    pub fn from_value(value: Value) -> Result<Self, EngineRunError> {
        serde_json::from_value(value)
            .map_err(|err| EngineRunError::Deserialization(err.to_string()))
    }

    /// Serializes the record as canonical JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineRunError::Serialization`] when canonicalization fails.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, EngineRunError> {
        Ok(canonical_json_bytes(self)?)
    }

    /// Hashes the record for determinism comparison.
    ///
    /// Wall-clock execution time is stripped before hashing so replays with
    /// timing enabled still compare equal on substance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineRunError::Serialization`] when canonicalization fails.
    pub fn determinism_hash(&self) -> Result<HashDigest, EngineRunError> {
        let mut stripped = self.clone();
        stripped.execution_time_ms = None;
        let bytes = canonical_json_bytes(&stripped)?;
        Ok(hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes))
    }

    /// Returns the score entry for a runner, if present.
    #[must_use]
    pub fn runner_score(&self, runner_id: &RunnerId) -> Option<&RunnerScore> {
        self.runner_scores.iter().find(|score| &score.runner_id == runner_id)
    }

    /// Marks the run as failed, recording the error without a verdict.
    pub fn record_error(&mut self, stage: &str, error_value: Value) {
        self.metadata.insert("status".to_string(), Value::String("failed".to_string()));
        self.metadata.insert("failed_stage".to_string(), Value::String(stage.to_string()));
        self.metadata.insert("error".to_string(), error_value);
        self.verdict = None;
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
