//! Ingest endpoints for events, metric samples, and heartbeats.
//!
//! Producers are fire-and-forget: accepted payloads return 202 before any
//! subscriber sees them, and validation failures are the only rejections.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use pulse_engine::{EventPayload, HeartbeatPayload, MetricPayload};

use crate::state::AppState;

use super::ErrorResponse;

#[derive(Serialize, utoipa::ToSchema)]
pub struct AcceptedResponse {
    pub status: &'static str,
}

fn accepted() -> (StatusCode, Json<AcceptedResponse>) {
    (StatusCode::ACCEPTED, Json(AcceptedResponse { status: "accepted" }))
}

/// Ingest an event
///
/// Validates `type` and `service` (non-empty, at most 64 bytes), stamps
/// the event, and broadcasts it to connected viewers.
#[utoipa::path(
    post,
    path = "/api/events",
    tag = "Ingest",
    responses(
        (status = 202, description = "Event accepted", body = AcceptedResponse),
        (status = 400, description = "Malformed event", body = ErrorResponse)
    )
)]
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EventPayload>,
) -> Result<(StatusCode, Json<AcceptedResponse>), (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .track_event(payload)
        .await
        .map_err(super::error_response)?;
    Ok(accepted())
}

/// Ingest a metric sample
///
/// Requires a non-empty `name` and a finite `value`. Samples named
/// `requests` or `errors` also feed the hourly/daily rollups.
#[utoipa::path(
    post,
    path = "/api/metrics",
    tag = "Ingest",
    responses(
        (status = 202, description = "Sample accepted", body = AcceptedResponse),
        (status = 400, description = "Malformed sample", body = ErrorResponse)
    )
)]
pub async fn ingest_metric(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MetricPayload>,
) -> Result<(StatusCode, Json<AcceptedResponse>), (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .record_metric(payload)
        .await
        .map_err(super::error_response)?;
    Ok(accepted())
}

/// Ingest a service heartbeat
///
/// Unknown status strings fall back to `unknown`; non-numeric metric
/// fields are ignored one by one.
#[utoipa::path(
    post,
    path = "/api/heartbeat",
    tag = "Ingest",
    responses(
        (status = 202, description = "Heartbeat accepted", body = AcceptedResponse),
        (status = 400, description = "Malformed heartbeat", body = ErrorResponse)
    )
)]
pub async fn ingest_heartbeat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HeartbeatPayload>,
) -> Result<(StatusCode, Json<AcceptedResponse>), (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .record_heartbeat(payload)
        .await
        .map_err(super::error_response)?;
    Ok(accepted())
}
