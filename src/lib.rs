//! Pluggable health-check execution.
//!
//! A [`Probe`] checks one dependency. The [`Runner`] wraps each probe in a
//! [`Backend`], runs them once per cycle and aggregates a [`Report`].
//! Probes that may fail transiently implement [`RetryingProbe`] and are
//! registered through [`Runner::register_retrying`].

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod halodeck;
pub mod result;
pub mod retry;
pub mod runner;
pub mod telemetry;
pub mod vaultline;

pub use backend::{Backend, CachePolicy, CheckContext, Probe};
pub use catalog::Catalog;
pub use config::{load_config, Config};
pub use error::{ErrorKind, Fault, HealthCheckError, ProbeError, ProbeResult};
pub use halodeck::Cli as HaloCli;
pub use result::{CheckResult, Report};
pub use retry::{Retry, RetryPolicy, RetryingProbe};
pub use runner::{RegistryError, RunError, Runner};
pub use telemetry::init_telemetry;
pub use vaultline::{Event, EventSink, TracingSink, Vaultline};

/// Common error/result aliases used outside the check path (config, CLI).
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
