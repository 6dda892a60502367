use crate::{Report, Result, Runner, Vaultline};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// CLI definition
#[derive(Parser, Debug)]
#[command(name = "vigil", author, version, about = "Run health checks against registered backends")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one check cycle and print the report
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Run a single backend by identifier
        #[arg(long)]
        only: Option<String>,
    },

    /// List registered backends
    List,

    /// Run check cycles until Ctrl-C
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    // Run one cycle and show the captured log events
    Events {
        #[arg(long, default_value_t = 20)]
        tail: usize,
    },
}

impl Cli {
    /// Returns whether everything that ran was healthy.
    pub fn run(
        self,
        runner: &mut Runner,
        vault: &Vaultline,
        default_interval: Duration,
    ) -> Result<bool> {
        match self.command {
            Command::Check { json, only: Some(id) } => {
                let res = runner.run_one(&id)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&res)?);
                } else {
                    print_report(&Report::new(vec![res.clone()]), false)?;
                }
                Ok(res.is_healthy())
            }
            Command::Check { json, only: None } => {
                let report = runner.run_all()?;
                print_report(&report, json)?;
                Ok(report.is_healthy())
            }
            Command::List => {
                for id in runner.identifiers() {
                    println!("{id}");
                }
                Ok(true)
            }
            Command::Watch { interval_secs } => {
                let interval = interval_secs.map(Duration::from_secs).unwrap_or(default_interval);
                let stop = Arc::new(AtomicBool::new(false));
                install_stop_handler(&stop);
                tracing::info!(
                    interval_secs = interval.as_secs(),
                    "watching; press Ctrl-C to stop"
                );
                let mut healthy = true;
                let cycles = runner.watch(interval, &stop, |report| {
                    healthy = report.is_healthy();
                    if let Err(e) = print_report(report, false) {
                        tracing::warn!(error = %e, "could not print report");
                    }
                })?;
                tracing::info!(cycles, "watch stopped");
                Ok(healthy)
            }
            Command::Events { tail } => {
                let report = runner.run_all()?;
                for event in vault.tail(tail) {
                    let kv = if event.kv.is_null() {
                        String::new()
                    } else {
                        format!(" {}", event.kv)
                    };
                    println!(
                        "{} [{}] {}: {}{}",
                        event.ts_ms, event.level, event.source, event.message, kv
                    );
                }
                Ok(report.is_healthy())
            }
        }
    }
}

/// Set `stop` on Ctrl-C. Returns false (and logs) when no handler could be installed.
fn install_stop_handler(stop: &Arc<AtomicBool>) -> bool {
    let flag = stop.clone();
    match ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "could not install Ctrl-C handler");
            false
        }
    }
}

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}
