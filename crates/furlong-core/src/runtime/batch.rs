// crates/furlong-core/src/runtime/batch.rs
// ============================================================================
// Module: Furlong Batch Runner
// Description: Bounded-parallel dispatch of the pipeline across races.
// Purpose: Daily shadow loops and backtests without shared mutable state.
// Dependencies: crate::core, crate::interfaces, crate::runtime::pipeline
// ============================================================================

//! ## Overview
//! Within a race the pipeline is a single-threaded cooperative sequence;
//! across races a bounded worker pool dispatches them concurrently. Each
//! worker owns its own pipeline instance and shares nothing mutable with
//! its peers. The run store is the only shared resource, and its writes
//! are idempotent. Results return in input order regardless of completion
//! order, and a shared cancellation token aborts remaining races at their
//! next stage boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use crate::core::config::EngineConfig;
use crate::core::context::MarketContext;
use crate::core::context::RaceContext;
use crate::core::context::Runner;
use crate::core::errors::EngineError;
use crate::core::errors::ErrorCode;
use crate::core::identifiers::RaceId;
use crate::interfaces::EngineRunStore;
use crate::runtime::pipeline::CancellationToken;
use crate::runtime::pipeline::Pipeline;
use crate::runtime::pipeline::PipelineContext;

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// One race's validated inputs for batch dispatch.
#[derive(Debug, Clone)]
pub struct RaceInput {
    /// Race identifier.
    pub race_id: RaceId,
    /// Race context.
    pub race_ctx: RaceContext,
    /// Market snapshot.
    pub market_ctx: MarketContext,
    /// Runner list.
    pub runners: Vec<Runner>,
}

// ============================================================================
// SECTION: Batch Runner
// ============================================================================

/// Outcome slot for one race in a batch.
pub type RaceResult = Result<PipelineContext, EngineError>;

/// Runs a batch of races with a bounded degree of parallelism.
///
/// Results are returned in input order. A cancelled token aborts races not
/// yet started and stops running ones at their next stage boundary; those
/// slots carry the cancellation error.
///
/// # Errors
///
/// Returns [`EngineError`] only when worker bookkeeping itself fails
/// (poisoned queue); per-race failures are carried in the result slots.
pub fn run_batch(
    config: &EngineConfig,
    store: &Arc<dyn EngineRunStore + Send + Sync>,
    races: Vec<RaceInput>,
    max_workers: usize,
    cancel: &CancellationToken,
) -> Result<Vec<RaceResult>, EngineError> {
    let total = races.len();
    let queue: Mutex<VecDeque<(usize, RaceInput)>> =
        Mutex::new(races.into_iter().enumerate().collect());
    let results: Mutex<Vec<Option<RaceResult>>> =
        Mutex::new((0 .. total).map(|_| None).collect());
    let workers = max_workers.clamp(1, total.max(1));

    thread::scope(|scope| {
        for _ in 0 .. workers {
            scope.spawn(|| {
                loop {
                    let next = {
                        let Ok(mut guard) = queue.lock() else {
                            return;
                        };
                        guard.pop_front()
                    };
                    let Some((index, input)) = next else {
                        return;
                    };
                    let result = run_one(config, store, input, cancel);
                    if let Ok(mut slots) = results.lock()
                        && let Some(slot) = slots.get_mut(index)
                    {
                        *slot = Some(result);
                    }
                }
            });
        }
    });

    let slots = results
        .into_inner()
        .map_err(|_| EngineError::new(ErrorCode::ContractViolation, "batch results poisoned"))?;
    Ok(slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(EngineError::new(
                    ErrorCode::Cancelled,
                    "race was never dispatched",
                ))
            })
        })
        .collect())
}

/// Runs one race on a worker-owned pipeline.
fn run_one(
    config: &EngineConfig,
    store: &Arc<dyn EngineRunStore + Send + Sync>,
    input: RaceInput,
    cancel: &CancellationToken,
) -> RaceResult {
    if cancel.is_cancelled() {
        return Err(EngineError::new(
            ErrorCode::Cancelled,
            format!("batch cancelled before race {}", input.race_id),
        ));
    }
    // Each worker constructs its own orchestrator; only the store is shared.
    let pipeline = Pipeline::new(config.clone(), store.clone())?
        .with_shared_cancellation(cancel.clone());
    pipeline.run(
        &input.race_id,
        input.race_ctx,
        input.market_ctx,
        input.runners,
        None,
    )
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

    use std::sync::Arc;

    use super::RaceInput;
    use super::run_batch;
    use crate::core::config::EngineConfig;
    use crate::core::context::MarkPressure;
    use crate::core::context::MarketContext;
    use crate::core::context::PaceStyle;
    use crate::core::context::RaceContext;
    use crate::core::context::Runner;
    use crate::core::context::RunnerMarket;
    use crate::core::errors::ErrorCode;
    use crate::core::identifiers::RaceId;
    use crate::core::identifiers::RunnerId;
    use crate::core::time::Timestamp;
    use crate::interfaces::EngineRunStore;
    use crate::runtime::pipeline::CancellationToken;
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

    fn race(name: &str) -> RaceInput {
        let race_id = RaceId::new(name);
        let decision = Timestamp::from_unix_millis(1_773_498_000_000);
        let runners = vec![runner("r1", 1.8), runner("r2", 4.0), runner("r3", 9.0)];
        RaceInput {
            race_id: race_id.clone(),
            race_ctx: RaceContext {
                race_id: race_id.clone(),
                course: "Newmarket".to_string(),
                decision_time: decision,
                distance_meters: 1_600,
                going: "Good".to_string(),
                class_level: 3,
                surface: "Turf".to_string(),
                field_size: runners.len(),
                age_band: None,
                sex_restriction: None,
                stability_score: Some(0.75),
                pace_geometry_score: Some(0.70),
            },
            market_ctx: MarketContext {
                race_id,
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
            },
            runners,
        }
    }

    #[test]
    fn batch_results_keep_input_order() {
        let store: Arc<dyn EngineRunStore + Send + Sync> =
            Arc::new(InMemoryEngineRunStore::new());
        let races = vec![race("B1"), race("B2"), race("B3"), race("B4")];
        let results = run_batch(
            &EngineConfig::default(),
            &store,
            races,
            2,
            &CancellationToken::new(),
        )
        .expect("batch");
        assert_eq!(results.len(), 4);
        let ids: Vec<String> = results
            .iter()
            .map(|result| result.as_ref().expect("ctx").race_id.to_string())
            .collect();
        assert_eq!(ids, vec!["B1", "B2", "B3", "B4"]);
    }

    #[test]
    fn cancelled_batch_carries_cancellation_errors() {
        let store: Arc<dyn EngineRunStore + Send + Sync> =
            Arc::new(InMemoryEngineRunStore::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = run_batch(
            &EngineConfig::default(),
            &store,
            vec![race("B1"), race("B2")],
            2,
            &cancel,
        )
        .expect("batch");
        for result in results {
            assert_eq!(result.unwrap_err().code, ErrorCode::Cancelled);
        }
    }

    #[test]
    fn workers_share_only_the_store() {
        let store = Arc::new(InMemoryEngineRunStore::new());
        let shared: Arc<dyn EngineRunStore + Send + Sync> = store.clone();
        let results = run_batch(
            &EngineConfig::default(),
            &shared,
            vec![race("B1"), race("B2"), race("B3")],
            3,
            &CancellationToken::new(),
        )
        .expect("batch");
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(store.len().expect("len"), 3);
    }
}
