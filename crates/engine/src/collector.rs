//! Per-service counters, latency sample rings, and the heartbeat table.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use pulse_core::{HeartbeatMetrics, MetricSample, ServiceHealth, ServiceStatus};

use crate::snapshot::Overview;

/// Global sample ring capacity.
const METRIC_RING_CAP: usize = 10_000;
/// Per-service latency ring capacity.
const LATENCY_RING_CAP: usize = 1_000;

#[derive(Debug, Default)]
struct ServiceEntry {
    status: ServiceStatus,
    request_count: u64,
    error_count: u64,
    /// Most recent latency samples, oldest first.
    latencies: VecDeque<f64>,
    last_heartbeat: Option<DateTime<Utc>>,
    /// Heartbeat-reported mean latency, shadowed by the ring once samples exist.
    reported_avg_latency: f64,
}

impl ServiceEntry {
    fn avg_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return self.reported_avg_latency;
        }
        self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
    }
}

pub struct MetricsCollector {
    /// Global bounded sample ring, oldest first.
    ring: VecDeque<MetricSample>,
    services: HashMap<String, ServiceEntry>,
    /// Names pre-populated in `services()` with status `unknown`.
    default_services: Vec<String>,
    /// Injected so tests can manipulate uptime deterministically.
    process_start: DateTime<Utc>,
    /// All-time ingest counter for coarse stats.
    total_metrics: u64,
}

impl MetricsCollector {
    pub fn new(default_services: Vec<String>, process_start: DateTime<Utc>) -> Self {
        Self {
            ring: VecDeque::new(),
            services: HashMap::new(),
            default_services,
            process_start,
            total_metrics: 0,
        }
    }

    /// Append a sample to the global ring and fold `requests` / `errors` /
    /// `latency` samples into the tagged service's counters. The timestamp
    /// is assigned here, under the caller's write lock.
    pub fn record(&mut self, mut sample: MetricSample) {
        sample.timestamp = Utc::now();
        self.total_metrics += 1;

        if let Some(service) = sample.service().map(str::to_string) {
            let entry = self.services.entry(service).or_default();
            match sample.name.as_str() {
                "requests" => entry.request_count += sample.value as u64,
                "errors" => entry.error_count += sample.value as u64,
                "latency" => {
                    entry.latencies.push_back(sample.value);
                    if entry.latencies.len() > LATENCY_RING_CAP {
                        entry.latencies.pop_front();
                    }
                }
                _ => {}
            }
        }

        self.ring.push_back(sample);
        if self.ring.len() > METRIC_RING_CAP {
            self.ring.pop_front();
        }
    }

    /// Upsert a service's health from a heartbeat. Present, finite metric
    /// fields overwrite the stored counters; anything else leaves the
    /// record unchanged.
    pub fn record_heartbeat(
        &mut self,
        service: &str,
        status: ServiceStatus,
        metrics: HeartbeatMetrics,
    ) {
        let entry = self.services.entry(service.to_string()).or_default();
        entry.status = status;
        entry.last_heartbeat = Some(Utc::now());

        if let Some(v) = metrics.request_count.filter(|v| v.is_finite()) {
            entry.request_count = v as u64;
        }
        if let Some(v) = metrics.error_count.filter(|v| v.is_finite()) {
            entry.error_count = v as u64;
        }
        if let Some(v) = metrics.avg_latency.filter(|v| v.is_finite()) {
            entry.reported_avg_latency = v;
        }

        debug!(service, status = status.label(), "heartbeat recorded");
    }

    /// Fleet-wide aggregates. `active_users` is owned by the caller;
    /// the collector has no user identity.
    pub fn overview(&self, active_users: u64) -> Overview {
        let total_requests: u64 = self.services.values().map(|e| e.request_count).sum();
        let total_errors: u64 = self.services.values().map(|e| e.error_count).sum();

        let (latency_sum, latency_count) = self
            .services
            .values()
            .flat_map(|e| e.latencies.iter())
            .fold((0.0_f64, 0_u64), |(sum, n), v| (sum + v, n + 1));

        Overview {
            total_requests,
            active_users,
            average_latency_ms: if latency_count > 0 {
                latency_sum / latency_count as f64
            } else {
                0.0
            },
            error_rate: if total_requests > 0 {
                100.0 * total_errors as f64 / total_requests as f64
            } else {
                0.0
            },
            requests_per_second: total_requests as f64 / 60.0,
        }
    }

    /// Copy of the service table with derived fields filled in. Default
    /// service names that have not reported are merged in as `unknown`.
    pub fn services(&self) -> HashMap<String, ServiceHealth> {
        let now = Utc::now();
        let mut out: HashMap<String, ServiceHealth> =
            HashMap::with_capacity(self.services.len() + self.default_services.len());

        for (name, entry) in &self.services {
            out.insert(name.clone(), self.health_of(entry, now));
        }
        for name in &self.default_services {
            out.entry(name.clone()).or_insert_with(ServiceHealth::unknown);
        }
        out
    }

    /// Health of a single service, if it has ever reported.
    pub fn service(&self, name: &str) -> Option<ServiceHealth> {
        let entry = self.services.get(name)?;
        Some(self.health_of(entry, Utc::now()))
    }

    /// Nearest-rank percentile over the service's latency ring.
    /// `p` is clamped to [0, 100]; an empty ring yields 0.0.
    pub fn percentile(&self, service: &str, p: f64) -> f64 {
        let Some(entry) = self.services.get(service) else {
            return 0.0;
        };
        if entry.latencies.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f64> = entry.latencies.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let p = p.clamp(0.0, 100.0);
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let idx = rank.max(1) - 1;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn total_metrics(&self) -> u64 {
        self.total_metrics
    }

    fn health_of(&self, entry: &ServiceEntry, now: DateTime<Utc>) -> ServiceHealth {
        ServiceHealth {
            status: entry.status,
            uptime_hours: if entry.last_heartbeat.is_some() {
                (now - self.process_start).num_milliseconds() as f64 / 3_600_000.0
            } else {
                0.0
            },
            request_count: entry.request_count,
            error_count: entry.error_count,
            avg_latency_ms: entry.avg_latency_ms(),
            last_heartbeat: entry.last_heartbeat,
        }
    }
}
