use crate::backend::CachePolicy;
use crate::catalog::Catalog;
use crate::retry::RetryPolicy;
use crate::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Run backends concurrently, one thread per backend.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub cache_policy: CachePolicy,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub messages: Catalog,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Knobs for the probes the `vigil` binary registers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DemoConfig {
    /// Transient failures the flaky demo probe produces before succeeding.
    #[serde(default)]
    pub flaky_failures: u32,
    /// Make the always-down demo probe part of the cycle.
    #[serde(default)]
    pub include_down: bool,
}

fn default_log_level() -> String { "info".to_string() }
fn default_interval_secs() -> u64 { 30 }

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            parallel: false,
            cache_policy: CachePolicy::default(),
            interval_secs: default_interval_secs(),
            retry: RetryPolicy::default(),
            messages: Catalog::default(),
            demo: DemoConfig::default(),
        }
    }
}

/// Load configuration from `VIGIL_CONFIG` (TOML) if set, otherwise `vigil.toml`.
/// If the file doesn't exist, return safe defaults.
pub fn load_config() -> Result<Config> {
    let config_path = std::env::var("VIGIL_CONFIG").unwrap_or_else(|_| "vigil.toml".into());
    load_config_from(&config_path)
}

pub fn load_config_from<P: AsRef<std::path::Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&content)?;
        Ok(cfg)
    } else {
        Ok(Config::default())
    }
}
