use crate::backend::{Backend, CachePolicy, Probe};
use crate::catalog::Catalog;
use crate::error::Fault;
use crate::result::{CheckResult, Report};
use crate::retry::{Retry, RetryPolicy, RetryingProbe};
use crate::vaultline::{Event, EventSink, TracingSink, LEVEL_INFO, LEVEL_WARN};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const WATCH_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a backend named `{0}` is already registered")]
    Duplicate(String),
    #[error("no backend named `{0}`")]
    Unknown(String),
}

/// Owns the registered backends and runs check cycles over them.
pub struct Runner {
    backends: Vec<Backend>,
    sink: Arc<dyn EventSink>,
    catalog: Catalog,
    retry: RetryPolicy,
    cache_policy: CachePolicy,
    parallel: bool,
}

impl Default for Runner {
    fn default() -> Self { Self::new(Arc::new(TracingSink), Catalog::default()) }
}

impl Runner {
    pub fn new(sink: Arc<dyn EventSink>, catalog: Catalog) -> Self {
        Self {
            backends: Vec::new(),
            sink,
            catalog,
            retry: RetryPolicy::default(),
            cache_policy: CachePolicy::default(),
            parallel: false,
        }
    }

    /// Policy handed to backends added with `register_retrying`.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Run each backend on its own thread during a cycle.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn catalog(&self) -> &Catalog { &self.catalog }

    pub fn register<P: Probe + 'static>(&mut self, probe: P) -> Result<(), RegistryError> {
        let identifier = probe.identifier();
        self.register_as(identifier, probe)
    }

    pub fn register_as<P: Probe + 'static>(
        &mut self,
        identifier: impl Into<String>,
        probe: P,
    ) -> Result<(), RegistryError> {
        let identifier = identifier.into();
        if self.backends.iter().any(|b| b.identifier() == identifier) {
            return Err(RegistryError::Duplicate(identifier));
        }
        self.backends.push(Backend::named(identifier, probe).with_policy(self.cache_policy));
        Ok(())
    }

    pub fn register_retrying<P>(&mut self, probe: P) -> Result<(), RegistryError>
    where
        P: RetryingProbe + 'static,
    {
        let probe = Retry::with_policy(probe, self.retry.clone());
        self.register(probe)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(Backend::identifier)
    }

    pub fn backend(&self, identifier: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.identifier() == identifier)
    }

    pub fn len(&self) -> usize { self.backends.len() }
    pub fn is_empty(&self) -> bool { self.backends.is_empty() }

    /// Run every backend once and aggregate the results in registration order.
    pub fn run_all(&mut self) -> Result<Report, Fault> {
        let started = Instant::now();
        let results = if self.parallel { self.run_parallel()? } else { self.run_sequential()? };
        let report = Report::new(results);

        let failing: Vec<&str> = report.failing().map(|r| r.identifier.as_str()).collect();
        let level = if report.is_healthy() { LEVEL_INFO } else { LEVEL_WARN };
        self.sink.record(
            Event::now("runner", level, "check cycle finished").with_kv(serde_json::json!({
                "backends": report.results.len(),
                "failing": failing,
                "elapsed_ms": u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            })),
        );
        Ok(report)
    }

    pub fn run_one(&mut self, identifier: &str) -> Result<CheckResult, RunError> {
        let sink: &dyn EventSink = &*self.sink;
        let catalog = &self.catalog;
        let backend = self
            .backends
            .iter_mut()
            .find(|b| b.identifier() == identifier)
            .ok_or_else(|| RegistryError::Unknown(identifier.to_string()))?;
        Ok(backend.run_check(sink, catalog)?)
    }

    fn run_sequential(&mut self) -> Result<Vec<CheckResult>, Fault> {
        let sink: &dyn EventSink = &*self.sink;
        let catalog = &self.catalog;
        self.backends.iter_mut().map(|b| b.run_check(sink, catalog)).collect()
    }

    // One thread per backend instance; no instance is shared between threads.
    fn run_parallel(&mut self) -> Result<Vec<CheckResult>, Fault> {
        let sink: &dyn EventSink = &*self.sink;
        let catalog = &self.catalog;
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .backends
                .iter_mut()
                .map(|b| scope.spawn(move || b.run_check(sink, catalog)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    /// Run cycles every `interval` until `stop` is set. Returns the number of cycles run.
    pub fn watch<F>(
        &mut self,
        interval: Duration,
        stop: &AtomicBool,
        mut on_report: F,
    ) -> Result<usize, Fault>
    where
        F: FnMut(&Report),
    {
        let mut cycles = 0usize;
        while !stop.load(Ordering::SeqCst) {
            let report = self.run_all()?;
            cycles += 1;
            on_report(&report);

            let next = Instant::now() + interval;
            while Instant::now() < next && !stop.load(Ordering::SeqCst) {
                thread::sleep(WATCH_POLL.min(next.saturating_duration_since(Instant::now())));
            }
        }
        Ok(cycles)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Fault(#[from] Fault),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CheckContext;
    use crate::error::{HealthCheckError, ProbeError, ProbeResult};
    use crate::vaultline::Vaultline;

    struct Up;
    impl Probe for Up {}

    struct Down(&'static str);
    impl Probe for Down {
        fn check_status(&mut self, _ctx: &CheckContext<'_>) -> ProbeResult {
            Err(HealthCheckError::unavailable(self.0).into())
        }
    }

    struct Broken;
    impl Probe for Broken {
        fn check_status(&mut self, _ctx: &CheckContext<'_>) -> ProbeResult {
            Err(ProbeError::other("null pointer"))
        }
    }

    struct AlwaysFlaky;
    impl RetryingProbe for AlwaysFlaky {
        fn check_status_implementation(&mut self, _ctx: &CheckContext<'_>) -> ProbeResult {
            Err(ProbeError::other("socket closed"))
        }
    }

    fn runner() -> (Runner, Arc<Vaultline>) {
        let vault = Arc::new(Vaultline::new());
        (Runner::new(vault.clone(), Catalog::default()), vault)
    }

    #[test]
    fn runner_aggregates_in_registration_order() {
        let (mut rt, vault) = runner();
        rt.register(Up).unwrap();
        rt.register_as("db", Down("connection refused")).unwrap();
        assert_eq!(rt.identifiers().collect::<Vec<_>>(), vec!["Up", "db"]);

        let report = rt.run_all().unwrap();
        assert!(!report.is_healthy());
        assert_eq!(report.results[0].identifier, "Up");
        assert_eq!(report.results[1].pretty_status, "connection refused");
        assert_eq!(rt.backend("db").map(Backend::status), Some(0));

        let summary = vault.tail(1);
        assert_eq!(summary[0].message, "check cycle finished");
        assert_eq!(summary[0].kv["failing"][0], "db");
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let (mut rt, _) = runner();
        rt.register(Up).unwrap();
        assert_eq!(rt.register(Up), Err(RegistryError::Duplicate("Up".into())));
        assert_eq!(rt.len(), 1);
    }

    #[test]
    fn fault_stops_the_cycle() {
        let (mut rt, _) = runner();
        rt.register(Up).unwrap();
        rt.register(Broken).unwrap();
        let fault = rt.run_all().unwrap_err();
        assert_eq!(fault.identifier, "Broken");
    }

    #[test]
    fn run_one_by_identifier() {
        let (mut rt, _) = runner();
        rt.register(Down("disk full")).unwrap();
        let res = rt.run_one("Down").unwrap();
        assert_eq!(res.code, 0);
        assert!(matches!(rt.run_one("nope"), Err(RunError::Registry(RegistryError::Unknown(_)))));
    }

    #[test]
    fn retrying_backends_use_runner_policy() {
        let (rt, vault) = runner();
        let policy = RetryPolicy { retries: Some(2), ..RetryPolicy::default() };
        let mut rt = rt.with_retry_policy(policy);
        rt.register_retrying(AlwaysFlaky).unwrap();

        let report = rt.run_all().unwrap();
        assert_eq!(report.results[0].identifier, "AlwaysFlaky");
        assert_eq!(report.results[0].pretty_status, "Could not check status.");
        // two attempt warnings plus the unhealthy cycle summary
        assert_eq!(vault.count_level(LEVEL_WARN), 3);
    }

    #[test]
    fn parallel_matches_sequential() {
        let build = |parallel| {
            let (rt, _) = runner();
            let mut rt = rt.parallel(parallel);
            rt.register(Up).unwrap();
            rt.register(Down("gone")).unwrap();
            rt.register_retrying(AlwaysFlaky).unwrap();
            rt
        };
        let seq = build(false).run_all().unwrap();
        let par = build(true).run_all().unwrap();
        let strip = |r: &Report| {
            r.results
                .iter()
                .map(|c| (c.identifier.clone(), c.pretty_status.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&seq), strip(&par));
        assert_eq!(seq.code, par.code);
    }

    #[test]
    fn memoizing_runner_reports_first_result() {
        let (rt, _) = runner();
        let mut rt = rt.with_cache_policy(CachePolicy::Memoize);
        rt.register(Down("down")).unwrap();
        rt.run_all().unwrap();
        assert_eq!(rt.backend("Down").map(Backend::policy), Some(CachePolicy::Memoize));
        assert!(rt.backend("Down").and_then(Backend::last_result).is_some());
    }

    struct StopAfterFirst(Arc<AtomicBool>);
    impl Probe for StopAfterFirst {
        fn check_status(&mut self, _ctx: &CheckContext<'_>) -> ProbeResult {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn watch_runs_until_stopped() {
        let (mut rt, _) = runner();
        let stop = Arc::new(AtomicBool::new(false));
        rt.register(StopAfterFirst(stop.clone())).unwrap();

        let mut seen = 0;
        let cycles = rt.watch(Duration::from_secs(60), &stop, |r| {
            assert!(r.is_healthy());
            seen += 1;
        }).unwrap();
        assert_eq!(cycles, 1);
        assert_eq!(seen, 1);
    }
}
