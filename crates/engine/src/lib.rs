pub mod aggregate;
pub mod broadcast;
pub mod collector;
pub mod facade;
pub mod snapshot;
pub mod tracker;

pub use aggregate::{AggregateSummary, Aggregator, DailyBucket, HourlyBucket};
pub use broadcast::{Broadcaster, EventSink, SinkError, SubscriberId};
pub use collector::MetricsCollector;
pub use facade::{AnalyticsEngine, EventPayload, HeartbeatPayload, MetricPayload};
pub use snapshot::{DashboardSnapshot, EndpointStat, EngineStats, Overview, RealtimeStats};
pub use tracker::EventTracker;
