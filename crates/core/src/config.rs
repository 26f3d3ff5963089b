use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  server:  host={}, port={}", self.server.host, self.server.port);
        tracing::info!(
            "  engine:  default_services={:?}, dashboard_tick_ms={}",
            self.engine.default_services,
            self.engine.dashboard_tick_ms
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_u16("PORT", 3001),
            cors_origin: env_or("CORS_ORIGIN", "*"),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Service names pre-populated in `services()` with status `unknown`
    /// before they report. Comma-separated in `DEFAULT_SERVICES`.
    pub default_services: Vec<String>,
    /// Interval between dashboard snapshot broadcasts.
    pub dashboard_tick_ms: u64,
    /// Interval between event-tracker compactions.
    pub compaction_interval_secs: u64,
    /// Interval between aggregate retention purges.
    pub retention_interval_secs: u64,
}

impl EngineConfig {
    fn from_env() -> Self {
        let default_services = env_or("DEFAULT_SERVICES", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            default_services,
            dashboard_tick_ms: env_u64("DASHBOARD_TICK_MS", 1_000),
            compaction_interval_secs: env_u64("COMPACTION_INTERVAL_SECS", 60),
            retention_interval_secs: env_u64("RETENTION_INTERVAL_SECS", 300),
        }
    }
}
