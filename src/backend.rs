use crate::catalog::Catalog;
use crate::error::{ErrorInput, Fault, HealthCheckError, ProbeError, ProbeResult};
use crate::result::{self, CheckResult};
use crate::vaultline::{Event, EventSink, LEVEL_ERROR, LEVEL_WARN};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// What a probe gets to see while it runs.
pub struct CheckContext<'a> {
    pub identifier: &'a str,
    pub sink: &'a dyn EventSink,
    pub catalog: &'a Catalog,
}

impl CheckContext<'_> {
    pub fn warn(&self, message: impl Into<String>, kv: serde_json::Value) {
        self.sink.record(Event::now(self.identifier, LEVEL_WARN, message).with_kv(kv));
    }
}

/// A health probe for one dependency.
///
/// Return `Ok(())` when healthy, `ProbeError::Check` for a known failure and
/// `ProbeError::Other` for anything that is not a health signal.
pub trait Probe: Send {
    /// Stable name used to key results. Defaults to the type name.
    fn identifier(&self) -> String {
        short_type_name::<Self>()
    }

    fn check_status(&mut self, _ctx: &CheckContext<'_>) -> ProbeResult {
        Ok(())
    }
}

impl<P: Probe + ?Sized> Probe for Box<P> {
    fn identifier(&self) -> String { (**self).identifier() }
    fn check_status(&mut self, ctx: &CheckContext<'_>) -> ProbeResult { (**self).check_status(ctx) }
}

/// `a::b::Thing<c::D>` -> `Thing`
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Whether a backend re-runs its probe on every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Reset errors and probe again on every run.
    #[default]
    PerRun,
    /// Probe once, then keep returning the first result.
    Memoize,
}

/// A registered probe together with the errors of its latest run.
///
/// Not safe for concurrent re-entry; the runner hands each instance to at most one thread.
pub struct Backend {
    identifier: String,
    probe: Box<dyn Probe>,
    errors: Vec<HealthCheckError>,
    policy: CachePolicy,
    last: Option<CheckResult>,
}

impl Backend {
    pub fn new<P: Probe + 'static>(probe: P) -> Self {
        let identifier = probe.identifier();
        Self::named(identifier, probe)
    }

    pub fn named<P: Probe + 'static>(identifier: impl Into<String>, probe: P) -> Self {
        Self {
            identifier: identifier.into(),
            probe: Box::new(probe),
            errors: Vec::new(),
            policy: CachePolicy::default(),
            last: None,
        }
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn identifier(&self) -> &str { &self.identifier }
    pub fn policy(&self) -> CachePolicy { self.policy }
    pub fn errors(&self) -> &[HealthCheckError] { &self.errors }
    pub fn last_result(&self) -> Option<&CheckResult> { self.last.as_ref() }

    /// 1 when the current error list is empty, else 0.
    pub fn status(&self) -> u8 { result::status_of(&self.errors) }

    /// 1 when healthy, otherwise the code of the first error.
    pub fn status_code(&self) -> u8 { result::code_of(&self.errors) }

    pub fn pretty_status(&self, catalog: &Catalog) -> String {
        result::pretty_status_of(&self.errors, catalog)
    }

    /// Run the probe once. Known failures become recorded errors; anything
    /// else is logged and returned as a `Fault`.
    pub fn run_check(
        &mut self,
        sink: &dyn EventSink,
        catalog: &Catalog,
    ) -> Result<CheckResult, Fault> {
        if self.policy == CachePolicy::Memoize {
            if let Some(cached) = &self.last {
                return Ok(cached.clone());
            }
        }

        self.errors.clear();
        let started = Instant::now();
        let ctx = CheckContext { identifier: &self.identifier, sink, catalog };
        let outcome = self.probe.check_status(&ctx).map_err(ProbeError::classify);

        match outcome {
            Ok(()) => {}
            Err(ProbeError::Check(e)) => {
                let cause = e.clone();
                let cause: &(dyn std::error::Error + 'static) = &cause;
                self.add_error(e, Some(cause), sink, catalog);
            }
            Err(ProbeError::Other(source)) => {
                sink.record(
                    Event::now(self.identifier.as_str(), LEVEL_ERROR, "Unexpected Error!")
                        .with_kv(serde_json::json!({ "error": source.to_string() })),
                );
                return Err(Fault { identifier: self.identifier.clone(), source });
            }
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let res = CheckResult::new(self.identifier.as_str(), self.errors.clone(), catalog)
            .with_elapsed_ms(elapsed_ms);
        self.last = Some(res.clone());
        Ok(res)
    }

    /// Normalize `error`, log it and append it to the error list.
    ///
    /// Strings become `Unknown` errors carrying the string; any other error
    /// becomes `Unknown` with the catalog's "unknown error" text. When `cause`
    /// is given its source chain goes into the log record.
    pub fn add_error(
        &mut self,
        error: impl Into<ErrorInput>,
        cause: Option<&(dyn std::error::Error + 'static)>,
        sink: &dyn EventSink,
        catalog: &Catalog,
    ) {
        let error = match error.into() {
            ErrorInput::Check(e) => e,
            ErrorInput::Message(msg) => HealthCheckError::unknown(msg),
            ErrorInput::Other(other) => match other.downcast::<HealthCheckError>() {
                Ok(check) => *check,
                Err(other) => HealthCheckError::unknown(catalog.unknown_error.as_str())
                    .with_boxed_cause(other),
            },
        };

        let mut kv = serde_json::json!({ "kind": error.kind(), "code": error.code() });
        if let Some(cause) = cause {
            kv["trace"] = serde_json::Value::from(error_chain(cause));
        }
        let event = Event::now(self.identifier.as_str(), LEVEL_ERROR, error.to_string());
        sink.record(event.with_kv(kv));
        self.errors.push(error);
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut next = err.source();
    while let Some(e) = next {
        chain.push(e.to_string());
        next = e.source();
    }
    chain
}
