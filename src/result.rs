use crate::catalog::Catalog;
use crate::error::HealthCheckError;
use serde::Serialize;

/// Status value of a healthy backend.
pub const WORKING: u8 = 1;
/// Status value of a backend with at least one recorded error.
pub const FAILING: u8 = 0;

/// Outcome of one backend run. Built once from the error list and never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub identifier: String,
    pub status: u8,
    pub code: u8,
    /// Catalog text for `code`.
    pub label: String,
    pub pretty_status: String,
    pub errors: Vec<HealthCheckError>,
    pub elapsed_ms: u64,
}

impl CheckResult {
    pub fn new(
        identifier: impl Into<String>,
        errors: Vec<HealthCheckError>,
        catalog: &Catalog,
    ) -> Self {
        let status = status_of(&errors);
        let code = code_of(&errors);
        let label = catalog.status_label(code).to_string();
        let pretty_status = pretty_status_of(&errors, catalog);
        Self {
            identifier: identifier.into(),
            status,
            code,
            label,
            pretty_status,
            errors,
            elapsed_ms: 0,
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn is_healthy(&self) -> bool { self.status == WORKING }
}

pub(crate) fn status_of(errors: &[HealthCheckError]) -> u8 {
    if errors.is_empty() { WORKING } else { FAILING }
}

/// 1 when healthy, otherwise the code of the first recorded error.
pub(crate) fn code_of(errors: &[HealthCheckError]) -> u8 {
    errors.first().map_or(WORKING, HealthCheckError::code)
}

pub(crate) fn pretty_status_of(errors: &[HealthCheckError], catalog: &Catalog) -> String {
    if errors.is_empty() {
        return catalog.working.clone();
    }
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n")
}

/// Results of one check cycle, in registration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub status: u8,
    pub code: u8,
    pub results: Vec<CheckResult>,
}

impl Report {
    /// Aggregate (first non-working code wins).
    pub fn new(results: Vec<CheckResult>) -> Self {
        let code = results
            .iter()
            .find(|r| !r.is_healthy())
            .map_or(WORKING, |r| r.code);
        let status = if code == WORKING { WORKING } else { FAILING };
        Self { status, code, results }
    }

    pub fn is_healthy(&self) -> bool { self.status == WORKING }

    pub fn get(&self, identifier: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.identifier == identifier)
    }

    pub fn failing(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.is_healthy())
    }

    /// Plaintext rendering: `identifier: status` per backend, failures prefixed
    /// with the `[label]` of their code.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for r in &self.results {
            let mut lines = r.pretty_status.lines();
            let first = lines.next().unwrap_or_default();
            if r.is_healthy() {
                out.push_str(&format!("{}: {}\n", r.identifier, first));
            } else {
                out.push_str(&format!("{}: [{}] {}\n", r.identifier, r.label, first));
            }
            for rest in lines {
                out.push_str(&format!("{:width$}  {}\n", "", rest, width = r.identifier.len()));
            }
        }
        out
    }
}
