// crates/furlong-core/src/core/gate.rs
// ============================================================================
// Module: Furlong Learning Gate Types
// Description: Learning status sum type and gate condition records.
// Purpose: Make COMMIT / QUARANTINE / REJECT decisions typed and auditable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The learning gate is the only component allowed to declare that a race's
//! learnings may update state. Its status is a sum type; the string form is
//! only for serialization. Every evaluation records each condition with its
//! score, threshold, and failure reason.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Learning Status
// ============================================================================

/// Learning status for a race's signals.
///
/// # Invariants
/// - Variants are stable for serialization and gate-decision evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStatus {
    /// All gate conditions passed; learnings may update state.
    Committed,
    /// Held back for later promotion or rejection.
    Quarantined,
    /// Discarded; the race must not influence state.
    Rejected,
}

impl LearningStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Quarantined => "quarantined",
            Self::Rejected => "rejected",
        }
    }
}

// ============================================================================
// SECTION: Gate Conditions
// ============================================================================

/// A single scored gate condition.
///
/// # Invariants
/// - `score` is in `[0, 1]`; `reason` is non-empty exactly when the
///   condition failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCondition {
    /// Stable condition name.
    pub name: String,
    /// Whether the condition passed.
    pub passed: bool,
    /// Condition score in `[0, 1]`.
    pub score: f64,
    /// Threshold the score was compared against.
    pub threshold: f64,
    /// Failure reason; empty when the condition passed.
    pub reason: String,
}

/// Result of a learning-gate evaluation.
///
/// # Invariants
/// - `gate_reasons` names every failing condition.
/// - The gate never mutates state; this record is its only output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningGateResult {
    /// Resolved learning status.
    pub learning_status: LearningStatus,
    /// Mean condition score in `[0, 1]`.
    pub learning_gate_score: f64,
    /// Every evaluated condition in declaration order.
    pub conditions: Vec<GateCondition>,
    /// Human-readable reasons, one per failing condition plus the resolution
    /// headline.
    pub gate_reasons: Vec<String>,
    /// Ablation flip count carried through for audit.
    pub ablation_flips: u32,
    /// Integrity flags raised by race-integrity checks.
    pub integrity_flags: Vec<String>,
}

impl LearningGateResult {
    /// Returns the condition with the given name, if evaluated.
    #[must_use]
    pub fn condition(&self, name: &str) -> Option<&GateCondition> {
        self.conditions.iter().find(|cond| cond.name == name)
    }
}
