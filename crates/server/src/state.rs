use std::sync::Arc;

use pulse_core::Config;
use pulse_engine::AnalyticsEngine;

pub struct AppState {
    pub engine: Arc<AnalyticsEngine>,
    pub config: Config,
}

impl AppState {
    pub fn new(engine: Arc<AnalyticsEngine>, config: Config) -> Arc<Self> {
        Arc::new(Self { engine, config })
    }
}
