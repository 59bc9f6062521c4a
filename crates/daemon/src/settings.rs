// Daemon configuration loading
//
// Layers, lowest to highest precedence:
// 1. RecoveryConfig defaults
// 2. Optional TOML file (`resilience.toml`, or the path in RESILIENCE_CONFIG)
// 3. RESILIENCE_* environment variables (e.g. RESILIENCE_RECOVERY_MAX_QUEUE_SIZE)

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use resilience_core::config::RecoveryConfig;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "resilience.toml";
pub const ENV_PREFIX: &str = "RESILIENCE";

/// Period of the simulated workload (2s)
pub const DEFAULT_SIMULATION_INTERVAL: Duration = Duration::from_secs(2);

pub fn config_path() -> String {
    std::env::var("RESILIENCE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
}

pub fn load_recovery_config(path: &str) -> Result<RecoveryConfig> {
    let settings = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .with_context(|| format!("failed to read configuration from {}", path))?;

    let recovery: RecoveryConfig = settings
        .try_deserialize()
        .context("invalid recovery configuration")?;
    recovery
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid recovery configuration: {}", e))?;

    Ok(recovery)
}

pub fn simulation_interval() -> Duration {
    std::env::var("RESILIENCE_SIMULATION_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_SIMULATION_INTERVAL)
}
