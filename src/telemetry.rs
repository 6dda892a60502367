use tracing_subscriber::{fmt, filter::EnvFilter};
use crate::config::Config;
use crate::Result;

/// Initialize global logging based on env or config.
/// Order: VIGIL_LOG env -> cfg.log_level -> "info"
pub fn init_telemetry(cfg: &Config) -> Result<()> {
    let level_from_env = std::env::var("VIGIL_LOG").ok();
    let filter = match level_from_env {
        Some(s) => EnvFilter::try_new(s),
        None => EnvFilter::try_new(cfg.log_level.clone()),
    }.unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    tracing::debug!(
        parallel = cfg.parallel,
        cache_policy = ?cfg.cache_policy,
        "telemetry initialized"
    );
    Ok(())
}
