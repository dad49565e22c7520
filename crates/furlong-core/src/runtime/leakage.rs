// crates/furlong-core/src/runtime/leakage.rs
// ============================================================================
// Module: Furlong Leakage Firewall
// Description: Column and timestamp guards against post-decision data.
// Purpose: Hard-block future information from contaminating inference.
// Dependencies: crate::core, crate::runtime::features, serde, serde_json
// ============================================================================

//! ## Overview
//! Two guards protect the feature path: a column guard rejecting any frame
//! carrying result-bearing fields (finishing positions, starting prices,
//! in-running data), and a timestamp guard rejecting rows observed after
//! decision time. Strict mode raises; audit mode records and returns false.
//! The built-in blocklist merges with a JSON schema manifest loaded once at
//! startup. Every check can emit an audit blob for the episode record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::errors::EngineError;
use crate::core::errors::ErrorCode;
use crate::core::time::Timestamp;
use crate::runtime::features::FeatureFrame;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Built-in blocklist of result-bearing fields.
pub const BLOCKED_FIELDS: &[&str] = &[
    "pos",
    "pos_num",
    "sp",
    "bfsp",
    "in_running_low",
    "in_running_high",
    "result",
    "finish_time",
    "winner",
    "placed",
];

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Schema manifest extending the built-in blocklist.
///
/// # Invariants
/// - Loaded once at startup; merged, never replacing the built-ins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakageManifest {
    /// Additional blocked field names.
    #[serde(default)]
    pub blocked_fields: Vec<String>,
}

impl LeakageManifest {
    /// Parses a manifest from its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error message when the JSON is invalid.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|err| err.to_string())
    }
}

// ============================================================================
// SECTION: Firewall
// ============================================================================

/// Guard mode for firewall checks.
///
/// # Invariants
/// - Strict raises on violation; Audit records and returns false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirewallMode {
    /// Violations abort the run.
    Strict,
    /// Violations are recorded and reported as a failed check.
    Audit,
}

/// Column check result listing both sides of the split.
///
/// # Invariants
/// - `blocked` and `allowed` partition the frame's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCheck {
    /// Columns intersecting the blocklist, sorted.
    pub blocked: Vec<String>,
    /// Columns outside the blocklist, sorted.
    pub allowed: Vec<String>,
}

/// Audit blob emitted by a full firewall pass.
///
/// # Invariants
/// - `passed` is true iff no blocked column and no future row was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageAudit {
    /// Decision instant the frame was checked against.
    pub decision_time: Timestamp,
    /// Row count of the checked frame.
    pub total_rows: usize,
    /// Column count of the checked frame.
    pub total_columns: usize,
    /// Column split against the blocklist.
    pub column_check: ColumnCheck,
    /// Count of rows observed after decision time.
    pub future_rows: usize,
    /// Active blocklist at check time, sorted.
    pub blocked_fields_config: Vec<String>,
    /// Overall verdict.
    pub passed: bool,
}

/// Leakage firewall with its merged blocklist.
///
/// # Invariants
/// - The blocklist always contains the built-in [`BLOCKED_FIELDS`].
#[derive(Debug, Clone)]
pub struct LeakageFirewall {
    /// Merged blocked field set.
    blocked: BTreeSet<String>,
}

impl Default for LeakageFirewall {
    fn default() -> Self {
        Self::new()
    }
}

impl LeakageFirewall {
    /// Creates a firewall with the built-in blocklist.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocked: BLOCKED_FIELDS.iter().map(|field| (*field).to_string()).collect(),
        }
    }

    /// Creates a firewall with the built-in blocklist merged with a
    /// manifest.
    #[must_use]
    pub fn with_manifest(manifest: &LeakageManifest) -> Self {
        let mut firewall = Self::new();
        firewall
            .blocked
            .extend(manifest.blocked_fields.iter().cloned());
        firewall
    }

    /// Returns the active blocklist, sorted.
    #[must_use]
    pub fn blocked_fields(&self) -> Vec<String> {
        self.blocked.iter().cloned().collect()
    }

    /// Splits a frame's columns into blocked and allowed sets.
    #[must_use]
    pub fn check_columns(&self, frame: &FeatureFrame) -> ColumnCheck {
        let names = frame.column_names();
        let blocked: Vec<String> =
            names.iter().filter(|name| self.blocked.contains(*name)).cloned().collect();
        let allowed: Vec<String> =
            names.iter().filter(|name| !self.blocked.contains(*name)).cloned().collect();
        ColumnCheck {
            blocked,
            allowed,
        }
    }

    /// Validates that a frame carries no blocked columns.
    ///
    /// # Errors
    ///
    /// In strict mode, returns [`ErrorCode::Leakage`] naming the blocked
    /// columns. Audit mode reports `Ok(false)` instead.
    pub fn validate_columns(
        &self,
        frame: &FeatureFrame,
        mode: FirewallMode,
    ) -> Result<bool, EngineError> {
        let check = self.check_columns(frame);
        if check.blocked.is_empty() {
            return Ok(true);
        }
        match mode {
            FirewallMode::Strict => Err(EngineError::new(
                ErrorCode::Leakage,
                format!("leakage detected: blocked columns found: {:?}", check.blocked),
            )
            .with_context("blocked_columns", check.blocked.join(","))),
            FirewallMode::Audit => Ok(false),
        }
    }

    /// Counts rows observed after the decision instant.
    #[must_use]
    pub fn count_future_rows(frame: &FeatureFrame, decision_time: Timestamp) -> usize {
        frame.row_timestamps().map_or(0, |timestamps| {
            timestamps.iter().filter(|ts| **ts > decision_time).count()
        })
    }

    /// Validates that no row is observed after the decision instant.
    ///
    /// Frames without timestamps pass; the column guard is the only defense
    /// for unstamped data.
    ///
    /// # Errors
    ///
    /// In strict mode, returns [`ErrorCode::Leakage`] with the future-row
    /// count. Audit mode reports `Ok(false)` instead.
    pub fn validate_timestamps(
        &self,
        frame: &FeatureFrame,
        decision_time: Timestamp,
        mode: FirewallMode,
    ) -> Result<bool, EngineError> {
        let future_rows = Self::count_future_rows(frame, decision_time);
        if future_rows == 0 {
            return Ok(true);
        }
        match mode {
            FirewallMode::Strict => Err(EngineError::new(
                ErrorCode::Leakage,
                format!("leakage detected: {future_rows} rows timestamped after decision time"),
            )
            .with_context("future_rows", future_rows.to_string())
            .with_context("decision_time", decision_time.to_string())),
            FirewallMode::Audit => Ok(false),
        }
    }

    /// Runs both guards and emits the audit blob.
    ///
    /// # Errors
    ///
    /// In strict mode, the first violated guard aborts with
    /// [`ErrorCode::Leakage`]; audit mode always returns the blob with
    /// `passed` reflecting the verdict.
    pub fn validate_frame(
        &self,
        frame: &FeatureFrame,
        decision_time: Timestamp,
        mode: FirewallMode,
    ) -> Result<LeakageAudit, EngineError> {
        let columns_ok = self.validate_columns(frame, mode)?;
        let timestamps_ok = self.validate_timestamps(frame, decision_time, mode)?;
        Ok(LeakageAudit {
            decision_time,
            total_rows: frame.row_count(),
            total_columns: frame.column_names().len(),
            column_check: self.check_columns(frame),
            future_rows: Self::count_future_rows(frame, decision_time),
            blocked_fields_config: self.blocked_fields(),
            passed: columns_ok && timestamps_ok,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
