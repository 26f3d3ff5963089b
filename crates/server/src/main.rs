mod api;
mod background;
mod live;
mod router;
mod state;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use pulse_engine::AnalyticsEngine;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    pulse_core::config::load_dotenv();
    let config = pulse_core::Config::from_env();
    config.log_summary();

    let engine = Arc::new(AnalyticsEngine::new(
        config.engine.default_services.clone(),
        Utc::now(),
    ));
    engine.start_broadcast_loop();

    let state = AppState::new(Arc::clone(&engine), config.clone());
    background::spawn_ticks(&state);

    let app = router::build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let shutdown_engine = Arc::clone(&engine);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_engine.shutdown();
        })
        .await?;

    Ok(())
}
