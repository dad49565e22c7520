// crates/furlong-core/src/interfaces/mod.rs
// ============================================================================
// Module: Furlong Interfaces
// Description: Backend-agnostic interfaces for storage and model callbacks.
// Purpose: Define the contract surfaces used by the Furlong runtime.
// Dependencies: crate::core, crate::runtime::features, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the engine integrates with external systems without
//! embedding backend-specific details. Implementations must be deterministic
//! and fail closed on missing or invalid data. Stores are constructed
//! explicitly and injected at the orchestrator boundary; there are no
//! process-wide singletons.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::engine_run::EngineRun;
use crate::core::identifiers::EngineRunId;
use crate::core::identifiers::RunnerId;
use crate::runtime::features::FeatureFrame;

// ============================================================================
// SECTION: Engine Run Store
// ============================================================================

/// Engine-run store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `Transient` failures may be retried; all other variants are terminal.
#[derive(Debug, Error)]
pub enum RunStoreError {
    /// Terminal store I/O error.
    #[error("engine run store io error: {0}")]
    Io(String),
    /// Transient write failure eligible for retry with backoff.
    #[error("engine run store transient failure: {0}")]
    Transient(String),
    /// Stored record is corrupted or fails to deserialize.
    #[error("engine run store corruption: {0}")]
    Corrupt(String),
}

/// Persistence interface for engine-run records.
pub trait EngineRunStore {
    /// Persists a run and returns its storage locator.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the record cannot be written.
    fn save(&self, run: &EngineRun) -> Result<String, RunStoreError>;

    /// Loads a run by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the store is unreachable or the record
    /// is corrupt; `Ok(None)` when the run does not exist.
    fn load(&self, engine_run_id: &EngineRunId) -> Result<Option<EngineRun>, RunStoreError>;

    /// Lists recent run identifiers, most recently written first.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the listing fails.
    fn list(&self, limit: usize) -> Result<Vec<EngineRunId>, RunStoreError>;
}

// ============================================================================
// SECTION: Predict Model
// ============================================================================

/// Model prediction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model reported an error for this frame.
    #[error("model prediction failed: {0}")]
    Prediction(String),
}

/// Prediction produced by a model over a feature frame.
///
/// # Invariants
/// - `probabilities` keys cover at least the top selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// The model's top selection.
    pub top_selection: RunnerId,
    /// Win probabilities by runner.
    pub probabilities: BTreeMap<RunnerId, f64>,
}

impl Prediction {
    /// Returns the probability assigned to a runner, defaulting to zero.
    #[must_use]
    pub fn probability_of(&self, runner_id: &RunnerId) -> f64 {
        self.probabilities.get(runner_id).copied().unwrap_or(0.0)
    }

    /// Returns the zero-based rank of a runner by descending probability
    /// (ties broken by runner id ascending), if the runner is known.
    #[must_use]
    pub fn rank_of(&self, runner_id: &RunnerId) -> Option<usize> {
        let mut ranked: Vec<(&RunnerId, f64)> =
            self.probabilities.iter().map(|(id, prob)| (id, *prob)).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.iter().position(|(id, _)| *id == runner_id)
    }
}

/// Model-like callback used by the ablation harness.
///
/// Implementations must be pure with respect to the frame: the harness
/// silences feature domains on copies and compares predictions, so a model
/// that mutates shared state would corrupt the fragility report.
pub trait PredictModel {
    /// Predicts over a feature frame.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when prediction fails for this frame.
    fn predict(&self, frame: &FeatureFrame) -> Result<Prediction, ModelError>;
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

    use super::Prediction;
    use crate::core::identifiers::RunnerId;

    #[test]
    fn rank_of_orders_by_descending_probability() {
        let mut probabilities = BTreeMap::new();
        probabilities.insert(RunnerId::new("r1"), 0.5);
        probabilities.insert(RunnerId::new("r2"), 0.3);
        probabilities.insert(RunnerId::new("r3"), 0.2);
        let prediction = Prediction {
            top_selection: RunnerId::new("r1"),
            probabilities,
        };
        assert_eq!(prediction.rank_of(&RunnerId::new("r1")), Some(0));
        assert_eq!(prediction.rank_of(&RunnerId::new("r3")), Some(2));
        assert_eq!(prediction.rank_of(&RunnerId::new("r9")), None);
    }

    #[test]
    fn probability_of_defaults_to_zero() {
        let prediction = Prediction {
            top_selection: RunnerId::new("r1"),
            probabilities: BTreeMap::new(),
        };
        assert!((prediction.probability_of(&RunnerId::new("r1")) - 0.0).abs() < f64::EPSILON);
    }
}
