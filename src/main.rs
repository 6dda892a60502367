use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;

use vigil::{
    init_telemetry, load_config, CheckContext, HaloCli, HealthCheckError, Probe, ProbeError,
    ProbeResult, Result, RetryingProbe, Runner, Vaultline,
};

// Always healthy; shows the default no-op probe.
struct Hello;
impl Probe for Hello {}

// Fails transiently a fixed number of times per cycle, then recovers.
struct Flaky { failures: u32, seen: u32 }
impl RetryingProbe for Flaky {
    fn check_status_implementation(&mut self, _ctx: &CheckContext<'_>) -> ProbeResult {
        if self.seen < self.failures {
            self.seen += 1;
            let msg = format!("transient failure {}/{}", self.seen, self.failures);
            return Err(ProbeError::other(msg));
        }
        self.seen = 0;
        Ok(())
    }
}

// Confirmed down on every cycle.
struct Down;
impl Probe for Down {
    fn check_status(&mut self, _ctx: &CheckContext<'_>) -> ProbeResult {
        Err(HealthCheckError::unavailable("demo dependency is down").into())
    }
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "vigil failed");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<bool> {
    // Load config + init logs
    let cfg = load_config()?;
    init_telemetry(&cfg)?;
    tracing::info!(version = VERSION, "VIGIL starting");

    let cli = HaloCli::parse();

    let vault = Arc::new(Vaultline::new().echo(true));
    let mut runner = Runner::new(vault.clone(), cfg.messages.clone())
        .with_retry_policy(cfg.retry.clone())
        .with_cache_policy(cfg.cache_policy)
        .parallel(cfg.parallel);

    runner.register(Hello)?;
    runner.register_retrying(Flaky { failures: cfg.demo.flaky_failures, seen: 0 })?;
    if cfg.demo.include_down {
        runner.register(Down)?;
    }

    cli.run(&mut runner, &vault, Duration::from_secs(cfg.interval_secs))
}
