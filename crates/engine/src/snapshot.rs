//! Wire types composing the dashboard snapshot.
//!
//! Field names are part of the subscriber contract; renames here break
//! every connected viewer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pulse_core::{Event, ServiceHealth};

/// Fleet-wide aggregate counters.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub total_requests: u64,
    pub active_users: u64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
    /// All-time request total amortized over a minute, not an
    /// instantaneous rate.
    pub requests_per_second: f64,
}

/// Hit count and mean latency for a single endpoint within the window.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStat {
    pub endpoint: String,
    pub count: u64,
    pub avg_latency_ms: f64,
}

/// Statistics over the rolling 1-minute window.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeStats {
    pub requests_last_1min: u64,
    pub errors_last_1min: u64,
    pub active_connections: usize,
    pub top_endpoints: Vec<EndpointStat>,
    pub recent_events: Vec<Event>,
}

/// Immutable composite view of the system at a moment in time, shipped to
/// subscribers on every tick.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub overview: Overview,
    pub services: HashMap<String, ServiceHealth>,
    pub realtime_stats: RealtimeStats,
    pub updated_at: DateTime<Utc>,
}

/// Coarse operational counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_events: u64,
    pub total_metrics: u64,
    pub connected_clients: usize,
    pub uptime_hours: f64,
}
