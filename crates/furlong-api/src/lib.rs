// crates/furlong-api/src/lib.rs
// ============================================================================
// Module: Furlong API
// Description: HTTP/JSON review API over the governance store.
// Purpose: Human review surface for proposals, doctrine, and the ledger.
// Dependencies: axum, furlong-core, furlong-governance, tokio
// ============================================================================

//! ## Overview
//! The review API is the human surface of governance: list and inspect
//! proposals, accept (bumping doctrine), reject, roll back, and read the
//! ledger and version history. Transport is plain HTTP/JSON; storage and
//! clock are injected so the surface stays test-friendly and free of
//! process-wide singletons.

/// Router, handlers, and server.
pub mod server;
/// Dependency-light request telemetry.
pub mod telemetry;

pub use server::ApiError;
pub use server::ApiState;
pub use server::Clock;
pub use server::FixedClock;
pub use server::SystemClock;
pub use server::router;
pub use server::serve;
pub use telemetry::ApiMetricEvent;
pub use telemetry::ApiOutcome;
pub use telemetry::ApiRoute;
pub use telemetry::NoopTelemetry;
pub use telemetry::RecordingTelemetry;
pub use telemetry::TelemetrySink;
