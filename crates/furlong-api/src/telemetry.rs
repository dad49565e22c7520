// crates/furlong-api/src/telemetry.rs
// ============================================================================
// Module: API Telemetry
// Description: Observability hooks for review-API request handling.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A thin metrics interface for review-API request counters and latency
//! histograms, intentionally dependency-light so deployments can plug in
//! Prometheus or OpenTelemetry without redesign. Labels must never carry
//! raw rationale text or reviewer identities.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Latency buckets in milliseconds for review-API request histograms.
pub const API_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Review-API route classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRoute {
    /// `GET /proposals`.
    ListProposals,
    /// `GET /proposals/{id}`.
    GetProposal,
    /// `POST /proposals/{id}/accept`.
    AcceptProposal,
    /// `POST /proposals/{id}/reject`.
    RejectProposal,
    /// `POST /proposals/{id}/rollback`.
    RollbackProposal,
    /// `GET /ledger`.
    GetLedger,
    /// `GET /doctrine/versions`.
    GetDoctrineVersions,
    /// `GET /stats`.
    GetStats,
}

impl ApiRoute {
    /// Returns a stable label for the route.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListProposals => "proposals/list",
            Self::GetProposal => "proposals/get",
            Self::AcceptProposal => "proposals/accept",
            Self::RejectProposal => "proposals/reject",
            Self::RollbackProposal => "proposals/rollback",
            Self::GetLedger => "ledger/get",
            Self::GetDoctrineVersions => "doctrine/versions",
            Self::GetStats => "stats/get",
        }
    }
}

/// Request outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOutcome {
    /// Successful request.
    Ok,
    /// Failed request.
    Error,
}

/// Review-API request metric event payload.
///
/// # Invariants
/// - Carries labels and latency only; never payload content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiMetricEvent {
    /// Route classification.
    pub route: ApiRoute,
    /// Request outcome.
    pub outcome: ApiOutcome,
    /// HTTP status returned.
    pub status: u16,
    /// Handler latency.
    pub latency: Duration,
}

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Telemetry sink for review-API metric events.
pub trait TelemetrySink: Send + Sync {
    /// Records one request event.
    fn record(&self, event: ApiMetricEvent);
}

/// Sink that drops every event (default).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: ApiMetricEvent) {}
}

/// Sink that retains events in memory for tests.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    /// Captured events in arrival order.
    events: Mutex<Vec<ApiMetricEvent>>,
}

impl RecordingTelemetry {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every captured event.
    #[must_use]
    pub fn events(&self) -> Vec<ApiMetricEvent> {
        self.events.lock().map_or_else(|_| Vec::new(), |events| events.clone())
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, event: ApiMetricEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
