//! Background maintenance loops: dashboard broadcast, event-log
//! compaction, and aggregate retention.
//!
//! Every loop re-checks the engine's shutdown flag on each iteration, so
//! a raised flag stops all of them within one period.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::state::AppState;

/// Spawn the periodic engine maintenance tasks.
pub fn spawn_ticks(state: &Arc<AppState>) {
    let cfg = &state.config.engine;

    // Dashboard snapshot broadcast (1 s by default).
    {
        let engine = Arc::clone(&state.engine);
        let shutdown = engine.shutdown_signal();
        let period = Duration::from_millis(cfg.dashboard_tick_ms);
        tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "dashboard tick started");
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                engine.publish_snapshot().await;
            }
            info!("dashboard tick stopped");
        });
    }

    // Event-tracker compaction (60 s by default).
    {
        let engine = Arc::clone(&state.engine);
        let shutdown = engine.shutdown_signal();
        let period = Duration::from_secs(cfg.compaction_interval_secs);
        tokio::spawn(async move {
            info!(period_secs = period.as_secs(), "compaction tick started");
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                engine.compact_events().await;
            }
            info!("compaction tick stopped");
        });
    }

    // Aggregate retention purge (5 m by default).
    {
        let engine = Arc::clone(&state.engine);
        let shutdown = engine.shutdown_signal();
        let period = Duration::from_secs(cfg.retention_interval_secs);
        tokio::spawn(async move {
            info!(period_secs = period.as_secs(), "retention tick started");
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                engine.purge_aggregates().await;
            }
            info!("retention tick stopped");
        });
    }
}
