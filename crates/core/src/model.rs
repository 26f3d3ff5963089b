use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque event payload leaf. Ingress JSON carries plain string, number,
/// and boolean values, so the enum is untagged to match the wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
#[serde(untagged)]
pub enum DataValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl DataValue {
    /// Extract as string, returning None for other leaves.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Extract as f64, returning None for other leaves.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DataValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A structured record emitted by a producing service. Immutable once
/// created; the timestamp is assigned at ingest, never taken from the
/// producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, DataValue>,
}

/// A single numeric observation with a name, value, and tag set.
/// `tags["service"]` is the distinguished tag that routes the sample
/// into per-service counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// The service this sample is attributed to, if tagged.
    pub fn service(&self) -> Option<&str> {
        self.tags.get("service").map(String::as_str).filter(|s| !s.is_empty())
    }
}

/// Reported liveness state of a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl ServiceStatus {
    /// Parse a status string, falling back to `Unknown` for anything
    /// outside the known set.
    pub fn parse(s: &str) -> Self {
        match s {
            "healthy" => Self::Healthy,
            "degraded" => Self::Degraded,
            "unhealthy" => Self::Unhealthy,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

/// Health record for a single service, derived from heartbeats and
/// per-service metric folds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    pub uptime_hours: f64,
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ServiceHealth {
    /// Placeholder record for a configured service that has not reported yet.
    pub fn unknown() -> Self {
        Self {
            status: ServiceStatus::Unknown,
            uptime_hours: 0.0,
            request_count: 0,
            error_count: 0,
            avg_latency_ms: 0.0,
            last_heartbeat: None,
        }
    }
}

/// Optional aggregate counters carried by a heartbeat. Fields that are
/// missing or non-finite are ignored during the merge. A reported
/// `uptime` is not represented here: `uptime_hours` is always derived
/// from the process start, so a stored value could never be observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeartbeatMetrics {
    pub request_count: Option<f64>,
    pub error_count: Option<f64>,
    pub avg_latency: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_value_deserializes_untagged() {
        let v: DataValue = serde_json::from_str("\"checkout\"").unwrap();
        assert_eq!(v.as_str(), Some("checkout"));

        let v: DataValue = serde_json::from_str("42.5").unwrap();
        assert_eq!(v.as_number(), Some(42.5));

        let v: DataValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, DataValue::Bool(true));
    }

    #[test]
    fn event_serializes_type_field() {
        let event = Event {
            event_type: "purchase".to_string(),
            service: "checkout".to_string(),
            user_id: None,
            timestamp: Utc::now(),
            data: HashMap::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "purchase");
        assert!(json.get("user_id").is_none());
        assert!(json.get("data").is_none());
    }

    #[test]
    fn status_parse_falls_back_to_unknown() {
        assert_eq!(ServiceStatus::parse("healthy"), ServiceStatus::Healthy);
        assert_eq!(ServiceStatus::parse("degraded"), ServiceStatus::Degraded);
        assert_eq!(ServiceStatus::parse("on-fire"), ServiceStatus::Unknown);
        assert_eq!(ServiceStatus::parse(""), ServiceStatus::Unknown);
    }

    #[test]
    fn sample_service_tag_ignores_empty() {
        let mut tags = HashMap::new();
        tags.insert("service".to_string(), String::new());
        let sample = MetricSample {
            name: "latency".to_string(),
            value: 10.0,
            unit: None,
            tags,
            timestamp: Utc::now(),
        };
        assert_eq!(sample.service(), None);
    }
}
