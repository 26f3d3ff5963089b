//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single
//! `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::state::AppState;
use crate::{api, live};

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/events", post(api::ingest_event).get(api::events_list))
        .route("/api/metrics", post(api::ingest_metric))
        .route("/api/heartbeat", post(api::ingest_heartbeat))
        .route("/api/dashboard", get(api::dashboard))
        .route("/api/services", get(api::services_list))
        .route("/api/services/{name}", get(api::service_health))
        .route(
            "/api/services/{name}/latency/{percentile}",
            get(api::service_latency),
        )
        .route("/api/aggregates/hourly", get(api::aggregates_hourly))
        .route("/api/aggregates/daily", get(api::aggregates_daily))
        .route("/api/aggregates/summary", get(api::aggregates_summary))
        .route("/api/stats", get(api::stats))
        .route("/ws", get(live::ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use pulse_core::config::{EngineConfig, ServerConfig};
    use pulse_core::Config;
    use pulse_engine::AnalyticsEngine;

    fn test_router() -> Router {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origin: "*".to_string(),
            },
            engine: EngineConfig {
                default_services: Vec::new(),
                dashboard_tick_ms: 1_000,
                compaction_interval_secs: 60,
                retention_interval_secs: 300,
            },
        };
        let engine = Arc::new(AnalyticsEngine::new(Vec::new(), Utc::now()));
        build_router(AppState::new(engine, config))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = test_router().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn event_ingest_then_list() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/events",
                r#"{"type": "purchase", "service": "checkout", "user_id": "u1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = router
            .oneshot(get_req("/api/events?type=purchase&limit=10"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["events"][0]["service"], "checkout");
    }

    #[tokio::test]
    async fn malformed_event_is_rejected() {
        let response = test_router()
            .oneshot(post_json(
                "/api/events",
                r#"{"type": "", "service": "checkout"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("type"));
    }

    #[tokio::test]
    async fn non_finite_metric_is_rejected() {
        // JSON has no NaN literal, so a string value is the closest wire
        // malformation; serde rejects it before the facade runs.
        let response = test_router()
            .oneshot(post_json(
                "/api/metrics",
                r#"{"name": "latency", "value": "fast"}"#,
            ))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn metric_and_heartbeat_round_trip() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/metrics",
                r#"{"name": "requests", "value": 5, "tags": {"service": "gateway"}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/heartbeat",
                r#"{"service": "gateway", "status": "healthy"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = router
            .oneshot(get_req("/api/services/gateway"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["request_count"], 5);
    }

    #[tokio::test]
    async fn unknown_service_is_404() {
        let response = test_router()
            .oneshot(get_req("/api/services/ghost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dashboard_carries_contract_fields() {
        let response = test_router().oneshot(get_req("/api/dashboard")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        for key in ["overview", "services", "realtime_stats", "updated_at"] {
            assert!(json.get(key).is_some(), "snapshot missing {key}");
        }
        for key in [
            "total_requests",
            "active_users",
            "average_latency_ms",
            "error_rate",
            "requests_per_second",
        ] {
            assert!(json["overview"].get(key).is_some(), "overview missing {key}");
        }
        for key in [
            "requests_last_1min",
            "errors_last_1min",
            "active_connections",
            "top_endpoints",
            "recent_events",
        ] {
            assert!(
                json["realtime_stats"].get(key).is_some(),
                "realtime_stats missing {key}"
            );
        }
    }

    #[tokio::test]
    async fn stats_reports_totals() {
        let router = test_router();
        router
            .clone()
            .oneshot(post_json(
                "/api/events",
                r#"{"type": "view", "service": "catalog"}"#,
            ))
            .await
            .unwrap();

        let response = router.oneshot(get_req("/api/stats")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["total_events"], 1);
        assert_eq!(json["total_metrics"], 0);
        assert_eq!(json["connected_clients"], 0);
    }

    #[tokio::test]
    async fn latency_percentile_endpoint() {
        let router = test_router();
        for value in [100.0, 200.0, 300.0] {
            router
                .clone()
                .oneshot(post_json(
                    "/api/metrics",
                    &format!(
                        r#"{{"name": "latency", "value": {value}, "tags": {{"service": "api"}}}}"#
                    ),
                ))
                .await
                .unwrap();
        }

        let response = router
            .oneshot(get_req("/api/services/api/latency/100"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["latency_ms"], 300.0);
    }
}
