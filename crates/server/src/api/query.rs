//! Read-model endpoints: events, dashboard, services, and rollups.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use pulse_core::{Event, ServiceHealth};
use pulse_engine::{AggregateSummary, DailyBucket, DashboardSnapshot, EngineStats, HourlyBucket};

use crate::state::AppState;

use super::ErrorResponse;

// ── Query params ────────────────────────────────────────────────

#[derive(Deserialize, utoipa::IntoParams)]
pub struct EventsQueryParams {
    /// Maximum number of events to return (default 100, capped at 1000).
    pub limit: Option<usize>,
    /// Filter by event type. Takes precedence over `service`.
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// Filter by producing service.
    pub service: Option<String>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct HourlyQueryParams {
    /// Look-back window in hours (default 24).
    pub hours: Option<i64>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct DailyQueryParams {
    /// Look-back window in days (default 7).
    pub days: Option<i64>,
}

// ── Response types ──────────────────────────────────────────────

#[derive(Serialize, utoipa::ToSchema)]
pub struct EventsResponse {
    pub count: usize,
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<Event>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ServicesResponse {
    pub count: usize,
    #[schema(value_type = Object)]
    pub services: HashMap<String, ServiceHealth>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LatencyResponse {
    pub service: String,
    pub percentile: f64,
    pub latency_ms: f64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HourlyResponse {
    pub count: usize,
    #[schema(value_type = Vec<Object>)]
    pub buckets: Vec<HourlyBucket>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DailyResponse {
    pub count: usize,
    #[schema(value_type = Vec<Object>)]
    pub buckets: Vec<DailyBucket>,
}

// ── Handlers ────────────────────────────────────────────────────

/// List recent events
///
/// Returns the most recent events, newest first, optionally filtered by
/// `type` or `service`.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "Query",
    params(EventsQueryParams),
    responses(
        (status = 200, description = "Recent events", body = EventsResponse)
    )
)]
pub async fn events_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsQueryParams>,
) -> Json<EventsResponse> {
    let limit = params.limit.unwrap_or(100);
    let events = state
        .engine
        .query_events(limit, params.event_type.as_deref(), params.service.as_deref())
        .await;
    Json(EventsResponse {
        count: events.len(),
        events,
    })
}

/// Fetch the dashboard snapshot
#[utoipa::path(
    get,
    path = "/api/dashboard",
    tag = "Query",
    responses(
        (status = 200, description = "Current dashboard snapshot")
    )
)]
pub async fn dashboard(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    Json(state.engine.snapshot().await)
}

/// List service health
#[utoipa::path(
    get,
    path = "/api/services",
    tag = "Query",
    responses(
        (status = 200, description = "Health of every known service", body = ServicesResponse)
    )
)]
pub async fn services_list(State(state): State<Arc<AppState>>) -> Json<ServicesResponse> {
    let services = state.engine.services().await;
    Json(ServicesResponse {
        count: services.len(),
        services,
    })
}

/// Fetch one service's health
#[utoipa::path(
    get,
    path = "/api/services/{name}",
    tag = "Query",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Service health"),
        (status = 404, description = "Service has never reported", body = ErrorResponse)
    )
)]
pub async fn service_health(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ServiceHealth>, (StatusCode, Json<ErrorResponse>)> {
    let health = state
        .engine
        .service_health(&name)
        .await
        .map_err(super::error_response)?;
    Ok(Json(health))
}

/// Fetch a latency percentile for one service
///
/// Nearest-rank over the service's recent latency samples; 0.0 when no
/// samples exist.
#[utoipa::path(
    get,
    path = "/api/services/{name}/latency/{percentile}",
    tag = "Query",
    params(
        ("name" = String, Path, description = "Service name"),
        ("percentile" = f64, Path, description = "Percentile in [0, 100]"),
    ),
    responses(
        (status = 200, description = "Latency percentile", body = LatencyResponse)
    )
)]
pub async fn service_latency(
    State(state): State<Arc<AppState>>,
    Path((name, percentile)): Path<(String, f64)>,
) -> Json<LatencyResponse> {
    let latency_ms = state.engine.latency_percentile(&name, percentile).await;
    Json(LatencyResponse {
        service: name,
        percentile,
        latency_ms,
    })
}

/// List hourly rollups
#[utoipa::path(
    get,
    path = "/api/aggregates/hourly",
    tag = "Query",
    params(HourlyQueryParams),
    responses(
        (status = 200, description = "Hourly buckets, newest first", body = HourlyResponse)
    )
)]
pub async fn aggregates_hourly(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HourlyQueryParams>,
) -> Json<HourlyResponse> {
    let buckets = state.engine.hourly(params.hours.unwrap_or(24)).await;
    Json(HourlyResponse {
        count: buckets.len(),
        buckets,
    })
}

/// List daily rollups
#[utoipa::path(
    get,
    path = "/api/aggregates/daily",
    tag = "Query",
    params(DailyQueryParams),
    responses(
        (status = 200, description = "Daily buckets, newest first", body = DailyResponse)
    )
)]
pub async fn aggregates_daily(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DailyQueryParams>,
) -> Json<DailyResponse> {
    let buckets = state.engine.daily(params.days.unwrap_or(7)).await;
    Json(DailyResponse {
        count: buckets.len(),
        buckets,
    })
}

/// Fetch the 24-hour rollup summary
#[utoipa::path(
    get,
    path = "/api/aggregates/summary",
    tag = "Query",
    responses(
        (status = 200, description = "Totals over the last 24 hours")
    )
)]
pub async fn aggregates_summary(State(state): State<Arc<AppState>>) -> Json<AggregateSummary> {
    Json(state.engine.aggregate_summary().await)
}

/// Fetch coarse service statistics
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "Query",
    responses(
        (status = 200, description = "Ingest totals and connection counts")
    )
)]
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine.stats().await)
}
