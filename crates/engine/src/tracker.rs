//! Append-only event log with secondary indices and a rolling realtime window.
//!
//! The main log is trimmed by a high-water mark so appends stay O(1)
//! amortized; the trim deliberately leaves the by-type and by-service
//! indices alone. Compaction is the sole authority that re-synchronizes
//! them with the retained log.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use pulse_core::Event;

use crate::snapshot::{EndpointStat, RealtimeStats};

/// High-water mark for the main log.
const MAIN_LOG_CAP: usize = 10_000;
/// Oldest events dropped per trim once the high-water mark is crossed.
const TRIM_BATCH: usize = 1_000;
/// Main-log retention enforced by compaction.
const LOG_RETENTION_SECS: i64 = 3_600;
/// Width of the rolling realtime window.
const WINDOW_SECS: i64 = 60;
/// Upper clamp on `query` results.
const QUERY_LIMIT_MAX: usize = 1_000;
/// Endpoints reported in realtime stats.
const TOP_ENDPOINTS: usize = 10;
/// Events reported in realtime stats.
const RECENT_EVENTS: usize = 20;

pub struct EventTracker {
    /// Main log, oldest first.
    log: VecDeque<Arc<Event>>,
    /// Secondary index: event type → events, oldest first.
    by_type: HashMap<String, Vec<Arc<Event>>>,
    /// Secondary index: service → events, oldest first.
    by_service: HashMap<String, Vec<Arc<Event>>>,
    /// Rolling 1-minute window, oldest first.
    window: VecDeque<Arc<Event>>,
    /// All-time ingest counter for coarse stats.
    total_events: u64,
}

impl EventTracker {
    pub fn new() -> Self {
        Self {
            log: VecDeque::new(),
            by_type: HashMap::new(),
            by_service: HashMap::new(),
            window: VecDeque::new(),
            total_events: 0,
        }
    }

    /// Append an event to the log, both indices, and the rolling window.
    ///
    /// The timestamp is assigned here, under the caller's write lock,
    /// never trusted from the producer.
    pub fn track(&mut self, mut event: Event) -> Event {
        event.timestamp = Utc::now();
        let event = Arc::new(event);

        self.log.push_back(Arc::clone(&event));
        self.by_type
            .entry(event.event_type.clone())
            .or_default()
            .push(Arc::clone(&event));
        self.by_service
            .entry(event.service.clone())
            .or_default()
            .push(Arc::clone(&event));

        let window_cutoff = event.timestamp - Duration::seconds(WINDOW_SECS);
        self.window.push_back(Arc::clone(&event));
        while self
            .window
            .front()
            .is_some_and(|e| e.timestamp < window_cutoff)
        {
            self.window.pop_front();
        }

        self.total_events += 1;

        // High-water trim: indices re-sync at the next compaction.
        if self.log.len() > MAIN_LOG_CAP {
            self.log.drain(..TRIM_BATCH);
            debug!(retained = self.log.len(), "event log trimmed");
        }

        (*event).clone()
    }

    /// Up to `limit` most recent events, newest first. A set `type` filter
    /// scans the by-type index; otherwise a set `service` filter scans the
    /// by-service index; otherwise the main log. Unknown filters yield an
    /// empty list, as does `limit = 0`.
    pub fn query(
        &self,
        limit: usize,
        event_type: Option<&str>,
        service: Option<&str>,
    ) -> Vec<Event> {
        if limit == 0 {
            return Vec::new();
        }
        let limit = limit.min(QUERY_LIMIT_MAX);

        if let Some(t) = event_type {
            return match self.by_type.get(t) {
                Some(list) => newest_first(list.iter(), limit),
                None => Vec::new(),
            };
        }
        if let Some(s) = service {
            return match self.by_service.get(s) {
                Some(list) => newest_first(list.iter(), limit),
                None => Vec::new(),
            };
        }
        newest_first(self.log.iter(), limit)
    }

    /// Realtime statistics over the 1-minute window.
    pub fn realtime(&self, active_connections: usize) -> RealtimeStats {
        let cutoff = Utc::now() - Duration::seconds(WINDOW_SECS);
        let recent: Vec<&Arc<Event>> = self
            .window
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .collect();

        let requests = recent.iter().filter(|e| e.event_type == "request").count();
        let errors = recent.iter().filter(|e| e.event_type == "error").count();

        // endpoint → (hits, latency sum, latency samples)
        let mut endpoints: HashMap<&str, (u64, f64, u64)> = HashMap::new();
        for event in &recent {
            let Some(endpoint) = event.data.get("endpoint").and_then(|v| v.as_str()) else {
                continue;
            };
            let slot = endpoints.entry(endpoint).or_default();
            slot.0 += 1;
            if let Some(latency) = event.data.get("latency").and_then(|v| v.as_number()) {
                slot.1 += latency;
                slot.2 += 1;
            }
        }

        let mut top_endpoints: Vec<EndpointStat> = endpoints
            .into_iter()
            .map(|(endpoint, (count, sum, samples))| EndpointStat {
                endpoint: endpoint.to_string(),
                count,
                avg_latency_ms: if samples > 0 { sum / samples as f64 } else { 0.0 },
            })
            .collect();
        top_endpoints.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| {
                    b.avg_latency_ms
                        .partial_cmp(&a.avg_latency_ms)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.endpoint.cmp(&b.endpoint))
        });
        top_endpoints.truncate(TOP_ENDPOINTS);

        let recent_events = recent
            .iter()
            .rev()
            .take(RECENT_EVENTS)
            .map(|e| (***e).clone())
            .collect();

        RealtimeStats {
            requests_last_1min: requests as u64,
            errors_last_1min: errors as u64,
            active_connections,
            top_endpoints,
            recent_events,
        }
    }

    /// Enforce retention and rebuild the window and both secondary indices
    /// from the retained log. Runs under the caller's exclusive lock for
    /// the full rebuild so racing trims cannot interleave.
    pub fn compact(&mut self, now: DateTime<Utc>) {
        let log_cutoff = now - Duration::seconds(LOG_RETENTION_SECS);
        let window_cutoff = now - Duration::seconds(WINDOW_SECS);

        self.log.retain(|e| e.timestamp >= log_cutoff);

        self.window = self
            .log
            .iter()
            .filter(|e| e.timestamp >= window_cutoff)
            .cloned()
            .collect();

        self.by_type.clear();
        self.by_service.clear();
        for event in &self.log {
            self.by_type
                .entry(event.event_type.clone())
                .or_default()
                .push(Arc::clone(event));
            self.by_service
                .entry(event.service.clone())
                .or_default()
                .push(Arc::clone(event));
        }

        debug!(
            retained = self.log.len(),
            window = self.window.len(),
            "event log compacted"
        );
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    #[cfg(test)]
    fn log_len(&self) -> usize {
        self.log.len()
    }

    #[cfg(test)]
    fn indexed_len(&self, event_type: &str) -> usize {
        self.by_type.get(event_type).map_or(0, Vec::len)
    }
}

impl Default for EventTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first<'a>(
    iter: impl DoubleEndedIterator<Item = &'a Arc<Event>>,
    limit: usize,
) -> Vec<Event> {
    iter.rev().take(limit).map(|e| (**e).clone()).collect()
}
