//! Public entry points: validation, timestamp allocation, and snapshot
//! assembly over the tracker, collector, and aggregator.
//!
//! Lock order for multi-lock operations is fixed: tracker → collector →
//! aggregates → subscribers, released in reverse. The snapshot path is the
//! only multi-lock reader; writers touch a single subsystem and never hold
//! two locks at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use pulse_core::{
    DataValue, Event, HeartbeatMetrics, MetricSample, PulseError, ServiceHealth, ServiceStatus,
};

use crate::aggregate::{AggregateSummary, Aggregator, DailyBucket, HourlyBucket};
use crate::broadcast::{Broadcaster, EventSink, SubscriberId};
use crate::collector::MetricsCollector;
use crate::snapshot::{DashboardSnapshot, EngineStats};
use crate::tracker::EventTracker;

/// Upper bound on `type` / `service` identifiers, in bytes.
const MAX_TAG_BYTES: usize = 64;

// ── Ingress payloads ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub service: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: Option<HashMap<String, DataValue>>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct MetricPayload {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct HeartbeatPayload {
    pub service: String,
    pub status: String,
    /// Free-form map so non-numeric junk is ignored field-by-field rather
    /// than rejecting the whole heartbeat.
    #[serde(default)]
    pub metrics: Option<HashMap<String, serde_json::Value>>,
}

// ── Egress envelope ─────────────────────────────────────────────

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    data: &'a T,
}

fn envelope<T: Serialize>(msg_type: &'static str, data: &T) -> String {
    serde_json::to_string(&Envelope { msg_type, data }).unwrap_or_default()
}

// ── Engine ──────────────────────────────────────────────────────

pub struct AnalyticsEngine {
    tracker: Arc<RwLock<EventTracker>>,
    collector: Arc<RwLock<MetricsCollector>>,
    aggregates: Arc<RwLock<Aggregator>>,
    broadcaster: Arc<Broadcaster>,
    /// Receiving end of the broadcast queue, handed out once by
    /// [`AnalyticsEngine::start_broadcast_loop`].
    broadcast_rx: Mutex<Option<mpsc::Receiver<String>>>,
    shutdown: Arc<AtomicBool>,
    started_at: DateTime<Utc>,
}

impl AnalyticsEngine {
    pub fn new(default_services: Vec<String>, process_start: DateTime<Utc>) -> Self {
        let (broadcaster, rx) = Broadcaster::new();
        Self {
            tracker: Arc::new(RwLock::new(EventTracker::new())),
            collector: Arc::new(RwLock::new(MetricsCollector::new(
                default_services,
                process_start,
            ))),
            aggregates: Arc::new(RwLock::new(Aggregator::new())),
            broadcaster: Arc::new(broadcaster),
            broadcast_rx: Mutex::new(Some(rx)),
            shutdown: Arc::new(AtomicBool::new(false)),
            started_at: process_start,
        }
    }

    /// Spawn the broadcaster's fan-out loop. Returns `None` if it was
    /// already started.
    pub fn start_broadcast_loop(&self) -> Option<JoinHandle<()>> {
        let rx = self.broadcast_rx.lock().unwrap().take()?;
        let broadcaster = Arc::clone(&self.broadcaster);
        let shutdown = Arc::clone(&self.shutdown);
        Some(tokio::spawn(async move {
            broadcaster.run(rx, shutdown).await;
        }))
    }

    /// Shared flag observed by the fan-out loop and every background tick.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn shutdown(&self) {
        info!("engine shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    // ── Ingest ──────────────────────────────────────────────────

    /// Validate and ingest an event, then broadcast it to subscribers
    /// (non-blocking; dropped under load).
    pub async fn track_event(&self, payload: EventPayload) -> Result<Event, PulseError> {
        validate_tag("type", &payload.event_type)?;
        validate_tag("service", &payload.service)?;

        let event = Event {
            event_type: payload.event_type,
            service: payload.service,
            user_id: payload.user_id.filter(|u| !u.is_empty()),
            // Placeholder; the tracker re-stamps under its write lock.
            timestamp: Utc::now(),
            data: payload.data.unwrap_or_default(),
        };

        let event = {
            let mut tracker = self.tracker.write().await;
            tracker.track(event)
        };

        self.broadcaster.publish(envelope("event", &event));
        Ok(event)
    }

    /// Validate and ingest a metric sample. `requests` and `errors`
    /// samples additionally synthesize an aggregator record so rollups
    /// stay in sync with the counters.
    pub async fn record_metric(&self, payload: MetricPayload) -> Result<(), PulseError> {
        if payload.name.is_empty() {
            return Err(PulseError::invalid("metric name must not be empty"));
        }
        if !payload.value.is_finite() {
            return Err(PulseError::invalid("metric value must be finite"));
        }

        let name = payload.name;
        let sample = MetricSample {
            name: name.clone(),
            value: payload.value,
            unit: payload.unit,
            tags: payload.tags.unwrap_or_default(),
            timestamp: Utc::now(),
        };

        {
            let mut collector = self.collector.write().await;
            collector.record(sample);
        }

        if name == "requests" || name == "errors" {
            let mut aggregates = self.aggregates.write().await;
            aggregates.record_request(Utc::now(), None, 0.0, name == "errors");
        }
        Ok(())
    }

    /// Validate and ingest a heartbeat. Unknown status strings fall back
    /// to `unknown`; non-numeric metric fields are ignored one by one.
    pub async fn record_heartbeat(&self, payload: HeartbeatPayload) -> Result<(), PulseError> {
        if payload.service.is_empty() {
            return Err(PulseError::invalid("heartbeat service must not be empty"));
        }
        let status = ServiceStatus::parse(&payload.status);
        let metrics = heartbeat_metrics(payload.metrics.as_ref());

        let mut collector = self.collector.write().await;
        collector.record_heartbeat(&payload.service, status, metrics);
        Ok(())
    }

    /// Fold a request observation into the hourly/daily rollups.
    pub async fn record_request(
        &self,
        user_id: Option<&str>,
        latency_ms: f64,
        is_error: bool,
    ) {
        let mut aggregates = self.aggregates.write().await;
        aggregates.record_request(Utc::now(), user_id, latency_ms, is_error);
    }

    // ── Snapshot & subscriptions ────────────────────────────────

    /// Assemble the dashboard snapshot. This is the sole multi-lock
    /// reader; read locks are acquired in the fixed order tracker →
    /// collector → aggregates → subscribers.
    pub async fn snapshot(&self) -> DashboardSnapshot {
        let tracker = self.tracker.read().await;
        let collector = self.collector.read().await;
        let aggregates = self.aggregates.read().await;
        let active_connections = self.broadcaster.subscriber_count().await;

        let overview = collector.overview(aggregates.unique_users_last_24h());
        let services = collector.services();
        let realtime_stats = tracker.realtime(active_connections);

        DashboardSnapshot {
            overview,
            services,
            realtime_stats,
            updated_at: Utc::now(),
        }
    }

    /// Register a subscriber; it receives the current snapshot first,
    /// then `dashboard_update` per tick and `event` per ingest.
    pub async fn subscribe(&self, sink: Arc<dyn EventSink>) -> SubscriberId {
        let snapshot = self.snapshot().await;
        self.broadcaster
            .subscribe(sink, envelope("snapshot", &snapshot))
            .await
    }

    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.broadcaster.unsubscribe(id).await;
    }

    /// Broadcast the current snapshot to every subscriber (the 1 s tick).
    pub async fn publish_snapshot(&self) {
        let snapshot = self.snapshot().await;
        self.broadcaster
            .publish(envelope("dashboard_update", &snapshot));
    }

    // ── Maintenance ─────────────────────────────────────────────

    /// Event-tracker compaction (the 60 s tick).
    pub async fn compact_events(&self) {
        self.tracker.write().await.compact(Utc::now());
    }

    /// Aggregate retention purge (the 5 m tick).
    pub async fn purge_aggregates(&self) {
        self.aggregates.write().await.purge(Utc::now());
    }

    // ── Read models ─────────────────────────────────────────────

    pub async fn query_events(
        &self,
        limit: usize,
        event_type: Option<&str>,
        service: Option<&str>,
    ) -> Vec<Event> {
        // An empty filter string means "no filter".
        let event_type = event_type.filter(|t| !t.is_empty());
        let service = service.filter(|s| !s.is_empty());
        self.tracker.read().await.query(limit, event_type, service)
    }

    pub async fn services(&self) -> HashMap<String, ServiceHealth> {
        self.collector.read().await.services()
    }

    pub async fn service_health(&self, name: &str) -> Result<ServiceHealth, PulseError> {
        self.collector
            .read()
            .await
            .service(name)
            .ok_or_else(|| PulseError::UnknownService(name.to_string()))
    }

    pub async fn latency_percentile(&self, service: &str, p: f64) -> f64 {
        self.collector.read().await.percentile(service, p)
    }

    pub async fn hourly(&self, hours_back: i64) -> Vec<HourlyBucket> {
        self.aggregates.read().await.hourly(hours_back)
    }

    pub async fn daily(&self, days_back: i64) -> Vec<DailyBucket> {
        self.aggregates.read().await.daily(days_back)
    }

    pub async fn aggregate_summary(&self) -> AggregateSummary {
        self.aggregates.read().await.summary()
    }

    /// Coarse operational counters for the stats endpoint.
    pub async fn stats(&self) -> EngineStats {
        let total_events = self.tracker.read().await.total_events();
        let total_metrics = self.collector.read().await.total_metrics();
        let connected_clients = self.broadcaster.subscriber_count().await;
        EngineStats {
            total_events,
            total_metrics,
            connected_clients,
            uptime_hours: (Utc::now() - self.started_at).num_milliseconds() as f64
                / 3_600_000.0,
        }
    }

    pub fn dropped_broadcasts(&self) -> u64 {
        self.broadcaster.dropped_broadcasts()
    }
}

fn validate_tag(field: &str, value: &str) -> Result<(), PulseError> {
    if value.is_empty() {
        return Err(PulseError::invalid(format!("{field} must not be empty")));
    }
    if value.len() > MAX_TAG_BYTES {
        return Err(PulseError::invalid(format!(
            "{field} exceeds {MAX_TAG_BYTES} bytes"
        )));
    }
    Ok(())
}

fn heartbeat_metrics(map: Option<&HashMap<String, serde_json::Value>>) -> HeartbeatMetrics {
    let get = |key: &str| {
        map.and_then(|m| m.get(key))
            .and_then(serde_json::Value::as_f64)
            .filter(|v| v.is_finite())
    };
    HeartbeatMetrics {
        request_count: get("request_count"),
        error_count: get("error_count"),
        avg_latency: get("avg_latency"),
    }
}
