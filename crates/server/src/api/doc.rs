//! OpenAPI documentation aggregator.
//!
//! Collects the `#[utoipa::path]`-annotated handlers and `ToSchema`-derived
//! types into a single OpenAPI spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "fleetpulse API",
        version = "0.1.0",
        description = "Real-time analytics and telemetry engine: event, metric, and heartbeat ingest with a live dashboard stream.",
    ),
    tags(
        (name = "Ingest", description = "Fire-and-forget event, metric, and heartbeat intake"),
        (name = "Query", description = "Events, dashboard snapshot, service health, and rollups"),
    ),
    paths(
        // Ingest
        crate::api::ingest::ingest_event,
        crate::api::ingest::ingest_metric,
        crate::api::ingest::ingest_heartbeat,
        // Query
        crate::api::query::events_list,
        crate::api::query::dashboard,
        crate::api::query::services_list,
        crate::api::query::service_health,
        crate::api::query::service_latency,
        crate::api::query::aggregates_hourly,
        crate::api::query::aggregates_daily,
        crate::api::query::aggregates_summary,
        crate::api::query::stats,
    ),
    components(schemas(
        crate::api::ErrorResponse,
        crate::api::ingest::AcceptedResponse,
        crate::api::query::EventsResponse,
        crate::api::query::ServicesResponse,
        crate::api::query::LatencyResponse,
        crate::api::query::HourlyResponse,
        crate::api::query::DailyResponse,
    ))
)]
pub struct ApiDoc;
