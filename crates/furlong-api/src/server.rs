// crates/furlong-api/src/server.rs
// ============================================================================
// Module: Review API Server
// Description: HTTP/JSON endpoints over the governance store.
// Purpose: Expose list/get/accept/reject/rollback/ledger/versions/stats.
// Dependencies: axum, furlong-core, furlong-governance, serde, serde_json,
// tokio
// ============================================================================

//! ## Overview
//! A thin HTTP/JSON mapping over the governance review facade. Governance
//! conflicts surface as 409 with state names, missing rows as 404,
//! validation problems as 400; the API never silently discards a failing
//! transition. Timestamps come from an injected clock so tests stay
//! deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use furlong_core::ProposalId;
use furlong_core::Timestamp;
use furlong_governance::CriticType;
use furlong_governance::GovernanceError;
use furlong_governance::GovernanceStore;
use furlong_governance::ProposalStatus;
use furlong_governance::accept_proposal;
use furlong_governance::get_doctrine_versions;
use furlong_governance::get_ledger;
use furlong_governance::get_proposal;
use furlong_governance::get_stats;
use furlong_governance::list_proposals;
use furlong_governance::reject_proposal;
use furlong_governance::rollback_proposal;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::telemetry::ApiMetricEvent;
use crate::telemetry::ApiOutcome;
use crate::telemetry::ApiRoute;
use crate::telemetry::NoopTelemetry;
use crate::telemetry::TelemetrySink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default page size for list endpoints.
const DEFAULT_LIMIT: usize = 100;

/// Default page size for ledger and doctrine listings.
const DEFAULT_HISTORY_LIMIT: usize = 50;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Clock supplying review timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// System wall-clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            });
        Timestamp::from_unix_millis(millis)
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// API error envelope.
///
/// # Invariants
/// - `code` is a stable machine label; `message` is for humans.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// HTTP status.
    pub status: StatusCode,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    /// Creates a 400 validation error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation",
            message: message.into(),
        }
    }
}

impl From<GovernanceError> for ApiError {
    fn from(err: GovernanceError) -> Self {
        match err {
            GovernanceError::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message,
            },
            GovernanceError::InvalidState {
                ..
            } => Self {
                status: StatusCode::CONFLICT,
                code: "invalid_state",
                message: err.to_string(),
            },
            GovernanceError::Conflict(message) => Self {
                status: StatusCode::CONFLICT,
                code: "conflict",
                message,
            },
            GovernanceError::Serialization(message) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "serialization",
                message,
            },
            GovernanceError::Io(message) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "storage",
                message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// SECTION: State & DTOs
// ============================================================================

/// Shared API state.
#[derive(Clone)]
pub struct ApiState {
    /// Governance store.
    pub store: Arc<dyn GovernanceStore>,
    /// Review clock.
    pub clock: Arc<dyn Clock>,
    /// Telemetry sink.
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl ApiState {
    /// Creates state over a store with the system clock and no telemetry.
    #[must_use]
    pub fn new(store: Arc<dyn GovernanceStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Records one handler observation.
    fn observe(&self, route: ApiRoute, status: StatusCode, started: Instant) {
        self.telemetry.record(ApiMetricEvent {
            route,
            outcome: if status.is_success() { ApiOutcome::Ok } else { ApiOutcome::Error },
            status: status.as_u16(),
            latency: started.elapsed(),
        });
    }
}

/// Query parameters for proposal listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Optional status filter (wire form, e.g. `PENDING`).
    #[serde(default)]
    pub status: Option<String>,
    /// Optional critic filter (wire form, e.g. `LEAKAGE`).
    #[serde(default)]
    pub critic_type: Option<String>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Page offset.
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Query parameters carrying only a limit.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    /// Page size.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Body of accept / reject / rollback requests.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    /// Reviewer identity.
    pub reviewer_id: String,
    /// Human rationale for the action.
    pub rationale: String,
    /// Optional additional context.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Response body for accepted proposals.
#[derive(Debug, Serialize)]
struct AcceptResponse {
    /// Always `accepted`.
    status: &'static str,
    /// New active doctrine version.
    doctrine_version: String,
    /// Version active before the accept.
    previous_version: String,
}

/// Parses an optional status filter.
fn parse_status(raw: Option<&str>) -> Result<Option<ProposalStatus>, ApiError> {
    raw.map(|value| {
        value
            .parse::<ProposalStatus>()
            .map_err(|_| ApiError::bad_request(format!("unknown status filter: {value}")))
    })
    .transpose()
}

/// Parses an optional critic filter.
fn parse_critic(raw: Option<&str>) -> Result<Option<CriticType>, ApiError> {
    raw.map(|value| match value {
        "LEAKAGE" => Ok(CriticType::Leakage),
        "BIAS" => Ok(CriticType::Bias),
        "FEATURE" => Ok(CriticType::Feature),
        "DECISION" => Ok(CriticType::Decision),
        other => Err(ApiError::bad_request(format!("unknown critic filter: {other}"))),
    })
    .transpose()
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Maps a handler result to the HTTP status it will produce.
fn status_of<T>(result: &Result<T, ApiError>) -> StatusCode {
    result.as_ref().map_or_else(|err| err.status, |_| StatusCode::OK)
}

/// `GET /proposals`.
async fn handle_list_proposals(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = list_proposals_inner(&state, &query);
    state.observe(ApiRoute::ListProposals, status_of(&result), started);
    result
}

/// Body of the proposal listing handler.
fn list_proposals_inner(state: &ApiState, query: &ListQuery) -> Result<Json<Value>, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    let critic = parse_critic(query.critic_type.as_deref())?;
    let proposals = list_proposals(
        state.store.as_ref(),
        status,
        critic,
        query.limit.unwrap_or(DEFAULT_LIMIT),
        query.offset.unwrap_or(0),
    )?;
    Ok(Json(json!({ "proposals": proposals })))
}

/// `GET /proposals/{id}`.
async fn handle_get_proposal(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = get_proposal_inner(&state, &id);
    state.observe(ApiRoute::GetProposal, status_of(&result), started);
    result
}

/// Body of the proposal detail handler.
fn get_proposal_inner(state: &ApiState, id: &str) -> Result<Json<Value>, ApiError> {
    let proposal = get_proposal(state.store.as_ref(), &ProposalId::new(id))?
        .ok_or_else(|| ApiError::from(GovernanceError::NotFound(format!("proposal {id}"))))?;
    let body = serde_json::to_value(&proposal)
        .map_err(|err| ApiError::from(GovernanceError::Serialization(err.to_string())))?;
    Ok(Json(body))
}

/// `POST /proposals/{id}/accept`.
async fn handle_accept(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = accept_inner(&state, &id, request);
    state.observe(ApiRoute::AcceptProposal, status_of(&result), started);
    result
}

/// Body of the accept handler.
fn accept_inner(
    state: &ApiState,
    id: &str,
    request: ReviewRequest,
) -> Result<Json<Value>, ApiError> {
    let outcome = accept_proposal(
        state.store.as_ref(),
        &ProposalId::new(id),
        &request.reviewer_id,
        &request.rationale,
        request.metadata,
        state.clock.now(),
    )?;
    let response = AcceptResponse {
        status: "accepted",
        doctrine_version: outcome.doctrine_version.to_string(),
        previous_version: outcome.previous_version.to_string(),
    };
    let body = serde_json::to_value(&response)
        .map_err(|err| ApiError::from(GovernanceError::Serialization(err.to_string())))?;
    Ok(Json(body))
}

/// `POST /proposals/{id}/reject`.
async fn handle_reject(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = reject_inner(&state, &id, request);
    state.observe(ApiRoute::RejectProposal, status_of(&result), started);
    result
}

/// Body of the reject handler.
fn reject_inner(
    state: &ApiState,
    id: &str,
    request: ReviewRequest,
) -> Result<Json<Value>, ApiError> {
    reject_proposal(
        state.store.as_ref(),
        &ProposalId::new(id),
        &request.reviewer_id,
        &request.rationale,
        request.metadata,
        state.clock.now(),
    )?;
    Ok(Json(json!({ "status": "rejected" })))
}

/// `POST /proposals/{id}/rollback`.
async fn handle_rollback(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = rollback_inner(&state, &id, request);
    state.observe(ApiRoute::RollbackProposal, status_of(&result), started);
    result
}

/// Body of the rollback handler.
fn rollback_inner(
    state: &ApiState,
    id: &str,
    request: ReviewRequest,
) -> Result<Json<Value>, ApiError> {
    rollback_proposal(
        state.store.as_ref(),
        &ProposalId::new(id),
        &request.reviewer_id,
        &request.rationale,
        request.metadata,
        state.clock.now(),
    )?;
    Ok(Json(json!({ "status": "rolled_back" })))
}

/// `GET /ledger`.
async fn handle_ledger(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = ledger_inner(&state, &query);
    state.observe(ApiRoute::GetLedger, status_of(&result), started);
    result
}

/// Body of the ledger handler.
fn ledger_inner(state: &ApiState, query: &LimitQuery) -> Result<Json<Value>, ApiError> {
    let entries = get_ledger(state.store.as_ref(), query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))?;
    Ok(Json(json!({ "entries": entries })))
}

/// `GET /doctrine/versions`.
async fn handle_doctrine_versions(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = doctrine_versions_inner(&state, &query);
    state.observe(ApiRoute::GetDoctrineVersions, status_of(&result), started);
    result
}

/// Body of the doctrine listing handler.
fn doctrine_versions_inner(state: &ApiState, query: &LimitQuery) -> Result<Json<Value>, ApiError> {
    let versions = get_doctrine_versions(
        state.store.as_ref(),
        query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
    )?;
    Ok(Json(json!({ "versions": versions })))
}

/// `GET /stats`.
async fn handle_stats(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = stats_inner(&state);
    state.observe(ApiRoute::GetStats, status_of(&result), started);
    result
}

/// Body of the stats handler.
fn stats_inner(state: &ApiState) -> Result<Json<Value>, ApiError> {
    let stats = get_stats(state.store.as_ref(), state.clock.now())?;
    let body = serde_json::to_value(&stats)
        .map_err(|err| ApiError::from(GovernanceError::Serialization(err.to_string())))?;
    Ok(Json(body))
}

// ============================================================================
// SECTION: Router & Server
// ============================================================================

/// Builds the review-API router.
#[must_use]
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/proposals", get(handle_list_proposals))
        .route("/proposals/{id}", get(handle_get_proposal))
        .route("/proposals/{id}/accept", post(handle_accept))
        .route("/proposals/{id}/reject", post(handle_reject))
        .route("/proposals/{id}/rollback", post(handle_rollback))
        .route("/ledger", get(handle_ledger))
        .route("/doctrine/versions", get(handle_doctrine_versions))
        .route("/stats", get(handle_stats))
        .with_state(state)
}

/// Serves the review API on the given bind address until the task is
/// aborted.
///
/// # Errors
///
/// Returns an I/O error message when binding or serving fails.
pub async fn serve(bind: &str, state: ApiState) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| format!("bind {bind}: {err}"))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|err| format!("serve {bind}: {err}"))
}
