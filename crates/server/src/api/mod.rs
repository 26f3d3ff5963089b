//! HTTP API handlers.

pub mod doc;
pub mod health;
pub mod ingest;
pub mod query;

pub use doc::ApiDoc;
pub use health::*;
pub use ingest::*;
pub use query::*;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use pulse_core::PulseError;

/// Error body returned by rejecting handlers.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map an engine error onto its HTTP status: unknown lookups are 404,
/// everything else is a validation rejection.
fn error_response(err: PulseError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        PulseError::UnknownService(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}
