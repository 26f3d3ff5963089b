//! Hourly and daily rollups keyed by truncated timestamps.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

/// Hourly buckets kept by the retention purge.
const HOURLY_RETENTION_DAYS: i64 = 7;
/// Daily buckets kept by the retention purge.
const DAILY_RETENTION_DAYS: i64 = 90;

fn unique_count<S: Serializer>(set: &HashSet<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(set.len() as u64)
}

/// Rollup of one wall-clock hour.
#[derive(Debug, Clone, Serialize)]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub requests: u64,
    pub errors: u64,
    pub total_latency_ms: f64,
    #[serde(serialize_with = "unique_count")]
    pub unique_users: HashSet<String>,
}

impl HourlyBucket {
    fn new(hour: DateTime<Utc>) -> Self {
        Self {
            hour,
            requests: 0,
            errors: 0,
            total_latency_ms: 0.0,
            unique_users: HashSet::new(),
        }
    }
}

/// Rollup of one wall-clock day, carrying the busiest hour seen so far.
#[derive(Debug, Clone, Serialize)]
pub struct DailyBucket {
    pub day: DateTime<Utc>,
    pub requests: u64,
    pub errors: u64,
    pub total_latency_ms: f64,
    #[serde(serialize_with = "unique_count")]
    pub unique_users: HashSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_hour: Option<DateTime<Utc>>,
    pub peak_requests: u64,
}

impl DailyBucket {
    fn new(day: DateTime<Utc>) -> Self {
        Self {
            day,
            requests: 0,
            errors: 0,
            total_latency_ms: 0.0,
            unique_users: HashSet::new(),
            peak_hour: None,
            peak_requests: 0,
        }
    }
}

/// Convenience rollup over the last 24 hours.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate_percent: f64,
    pub avg_latency_ms: f64,
    pub unique_users: u64,
}

#[derive(Default)]
pub struct Aggregator {
    hourly: HashMap<DateTime<Utc>, HourlyBucket>,
    daily: HashMap<DateTime<Utc>, DailyBucket>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one request into its hourly and daily buckets. The daily peak
    /// is reconsidered only for the hourly bucket just updated; a late
    /// sample for an earlier hour updates the peak once that hour's count
    /// actually exceeds the recorded one.
    pub fn record_request(
        &mut self,
        timestamp: DateTime<Utc>,
        user_id: Option<&str>,
        latency_ms: f64,
        is_error: bool,
    ) {
        let hour = timestamp
            .duration_trunc(Duration::hours(1))
            .unwrap_or(timestamp);
        let day = timestamp
            .duration_trunc(Duration::days(1))
            .unwrap_or(timestamp);
        let user = user_id.filter(|u| !u.is_empty());

        let hourly = self.hourly.entry(hour).or_insert_with(|| HourlyBucket::new(hour));
        hourly.requests += 1;
        hourly.total_latency_ms += latency_ms;
        if is_error {
            hourly.errors += 1;
        }
        if let Some(u) = user {
            hourly.unique_users.insert(u.to_string());
        }
        let hour_requests = hourly.requests;

        let daily = self.daily.entry(day).or_insert_with(|| DailyBucket::new(day));
        daily.requests += 1;
        daily.total_latency_ms += latency_ms;
        if is_error {
            daily.errors += 1;
        }
        if let Some(u) = user {
            daily.unique_users.insert(u.to_string());
        }
        if hour_requests > daily.peak_requests {
            daily.peak_hour = Some(hour);
            daily.peak_requests = hour_requests;
        }
    }

    /// Hourly buckets newer than `hours_back`, newest first.
    pub fn hourly(&self, hours_back: i64) -> Vec<HourlyBucket> {
        let cutoff = Utc::now() - Duration::hours(hours_back);
        let mut buckets: Vec<HourlyBucket> = self
            .hourly
            .values()
            .filter(|b| b.hour >= cutoff)
            .cloned()
            .collect();
        buckets.sort_by(|a, b| b.hour.cmp(&a.hour));
        buckets
    }

    /// Daily buckets newer than `days_back`, newest first.
    pub fn daily(&self, days_back: i64) -> Vec<DailyBucket> {
        let cutoff = Utc::now() - Duration::days(days_back);
        let mut buckets: Vec<DailyBucket> = self
            .daily
            .values()
            .filter(|b| b.day >= cutoff)
            .cloned()
            .collect();
        buckets.sort_by(|a, b| b.day.cmp(&a.day));
        buckets
    }

    /// Rollup over the last 24 hours of hourly buckets.
    pub fn summary(&self) -> AggregateSummary {
        let cutoff = Utc::now() - Duration::hours(24);
        let mut total_requests = 0u64;
        let mut total_errors = 0u64;
        let mut total_latency = 0.0f64;
        let mut users: HashSet<&str> = HashSet::new();

        for bucket in self.hourly.values().filter(|b| b.hour >= cutoff) {
            total_requests += bucket.requests;
            total_errors += bucket.errors;
            total_latency += bucket.total_latency_ms;
            users.extend(bucket.unique_users.iter().map(String::as_str));
        }

        AggregateSummary {
            total_requests,
            total_errors,
            error_rate_percent: if total_requests > 0 {
                100.0 * total_errors as f64 / total_requests as f64
            } else {
                0.0
            },
            avg_latency_ms: if total_requests > 0 {
                total_latency / total_requests as f64
            } else {
                0.0
            },
            unique_users: users.len() as u64,
        }
    }

    /// Union of unique users over the last 24 hours. Feeds
    /// `overview.active_users` through the facade.
    pub fn unique_users_last_24h(&self) -> u64 {
        let cutoff = Utc::now() - Duration::hours(24);
        let users: HashSet<&str> = self
            .hourly
            .values()
            .filter(|b| b.hour >= cutoff)
            .flat_map(|b| b.unique_users.iter().map(String::as_str))
            .collect();
        users.len() as u64
    }

    /// Drop buckets past retention: 7 days hourly, 90 days daily.
    pub fn purge(&mut self, now: DateTime<Utc>) {
        let hourly_cutoff = now - Duration::days(HOURLY_RETENTION_DAYS);
        let daily_cutoff = now - Duration::days(DAILY_RETENTION_DAYS);

        let before = self.hourly.len() + self.daily.len();
        self.hourly.retain(|hour, _| *hour >= hourly_cutoff);
        self.daily.retain(|day, _| *day >= daily_cutoff);
        let after = self.hourly.len() + self.daily.len();

        if after < before {
            debug!(purged = before - after, "aggregate buckets purged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn peak_hour_detection() {
        let mut agg = Aggregator::new();
        for _ in 0..10 {
            agg.record_request(at(14, 0), None, 0.0, false);
        }
        for _ in 0..50 {
            agg.record_request(at(15, 30), None, 0.0, false);
        }
        for _ in 0..20 {
            agg.record_request(at(16, 15), None, 0.0, false);
        }

        let daily = &agg.daily[&at(0, 0)];
        assert_eq!(daily.peak_hour, Some(at(15, 0)));
        assert_eq!(daily.peak_requests, 50);
        assert_eq!(daily.requests, 80);
    }

    #[test]
    fn late_samples_can_retake_the_peak() {
        let mut agg = Aggregator::new();
        for _ in 0..10 {
            agg.record_request(at(15, 0), None, 0.0, false);
        }
        // Late arrivals for the earlier hour overtake once they exceed.
        for _ in 0..11 {
            agg.record_request(at(14, 0), None, 0.0, false);
        }

        let daily = &agg.daily[&at(0, 0)];
        assert_eq!(daily.peak_hour, Some(at(14, 0)));
        assert_eq!(daily.peak_requests, 11);
    }

    #[test]
    fn buckets_fold_errors_latency_and_users() {
        let mut agg = Aggregator::new();
        agg.record_request(at(10, 0), Some("u1"), 100.0, false);
        agg.record_request(at(10, 5), Some("u2"), 300.0, true);
        agg.record_request(at(10, 10), Some("u1"), 200.0, false);
        agg.record_request(at(10, 15), Some(""), 0.0, false);

        let hourly = &agg.hourly[&at(10, 0)];
        assert_eq!(hourly.requests, 4);
        assert_eq!(hourly.errors, 1);
        assert_eq!(hourly.total_latency_ms, 600.0);
        assert_eq!(hourly.unique_users.len(), 2);
    }

    #[test]
    fn hourly_query_is_newest_first() {
        let mut agg = Aggregator::new();
        let now = Utc::now();
        agg.record_request(now - Duration::hours(2), None, 0.0, false);
        agg.record_request(now - Duration::hours(1), None, 0.0, false);
        agg.record_request(now, None, 0.0, false);

        let buckets = agg.hourly(24);
        assert_eq!(buckets.len(), 3);
        assert!(buckets[0].hour > buckets[1].hour);
        assert!(buckets[1].hour > buckets[2].hour);

        // A tight cutoff hides the older buckets.
        assert!(agg.hourly(1).len() < 3);
    }

    #[test]
    fn summary_over_last_24_hours() {
        let mut agg = Aggregator::new();
        let now = Utc::now();
        agg.record_request(now, Some("u1"), 100.0, false);
        agg.record_request(now, Some("u2"), 300.0, true);
        // Outside the summary window.
        agg.record_request(now - Duration::hours(30), Some("u3"), 900.0, true);

        let summary = agg.summary();
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.total_errors, 1);
        assert_eq!(summary.error_rate_percent, 50.0);
        assert_eq!(summary.avg_latency_ms, 200.0);
        assert_eq!(summary.unique_users, 2);
    }

    #[test]
    fn summary_empty_is_zeroes() {
        let agg = Aggregator::new();
        let summary = agg.summary();
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.error_rate_percent, 0.0);
        assert_eq!(summary.avg_latency_ms, 0.0);
    }

    #[test]
    fn purge_enforces_retention() {
        let mut agg = Aggregator::new();
        let now = Utc::now();
        agg.record_request(now, None, 0.0, false);
        agg.record_request(now - Duration::days(8), None, 0.0, false);
        agg.record_request(now - Duration::days(91), None, 0.0, false);

        assert_eq!(agg.hourly.len(), 3);
        assert_eq!(agg.daily.len(), 3);

        agg.purge(now);
        // 8d and 91d hourly buckets gone; only the 91d daily bucket gone.
        assert_eq!(agg.hourly.len(), 1);
        assert_eq!(agg.daily.len(), 2);
    }

    #[test]
    fn unique_users_serialize_as_count() {
        let mut agg = Aggregator::new();
        agg.record_request(at(10, 0), Some("u1"), 0.0, false);
        agg.record_request(at(10, 0), Some("u2"), 0.0, false);

        let json = serde_json::to_value(&agg.hourly[&at(10, 0)]).unwrap();
        assert_eq!(json["unique_users"], 2);
    }
}
