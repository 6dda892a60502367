use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error used for unclassified probe failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Kinds of health-check failure. The code is stable and safe to expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Dependency confirmed down or unreachable.
    Unavailable,
    /// Dependency reachable but answered with something invalid.
    UnexpectedResult,
    /// Anything else, wrapped before storage.
    Unknown,
}

impl ErrorKind {
    pub const fn code(self) -> u8 {
        match self {
            ErrorKind::Unavailable => 0,
            ErrorKind::UnexpectedResult => 2,
            ErrorKind::Unknown => 3,
        }
    }

    /// Unavailable and UnexpectedResult are authoritative signals from a probe.
    pub const fn is_classified(self) -> bool {
        matches!(self, ErrorKind::Unavailable | ErrorKind::UnexpectedResult)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::UnexpectedResult => "unexpected_result",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A recorded health-check failure: a kind, a message and an optional cause.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HealthCheckError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl HealthCheckError {
    pub fn new<M: Into<String>>(kind: ErrorKind, message: M) -> Self {
        Self { kind, message: message.into(), cause: None }
    }

    pub fn unavailable<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn unexpected_result<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorKind::UnexpectedResult, message)
    }

    pub fn unknown<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub(crate) fn with_boxed_cause(mut self, cause: BoxError) -> Self {
        self.cause = Some(Arc::from(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind { self.kind }
    pub fn code(&self) -> u8 { self.kind.code() }
    pub fn message(&self) -> &str { &self.message }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl PartialEq for HealthCheckError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl Serialize for HealthCheckError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut st = serializer.serialize_struct("HealthCheckError", 3)?;
        st.serialize_field("kind", &self.kind)?;
        st.serialize_field("code", &self.kind.code())?;
        st.serialize_field("message", &self.message)?;
        st.end()
    }
}

/// Anything `add_error` accepts. Normalized into a `HealthCheckError` before storage.
#[derive(Debug)]
pub enum ErrorInput {
    Check(HealthCheckError),
    Message(String),
    Other(BoxError),
}

impl From<HealthCheckError> for ErrorInput {
    fn from(e: HealthCheckError) -> Self { ErrorInput::Check(e) }
}

impl From<&str> for ErrorInput {
    fn from(s: &str) -> Self { ErrorInput::Message(s.to_string()) }
}

impl From<String> for ErrorInput {
    fn from(s: String) -> Self { ErrorInput::Message(s) }
}

impl From<BoxError> for ErrorInput {
    fn from(e: BoxError) -> Self {
        match e.downcast::<HealthCheckError>() {
            Ok(check) => ErrorInput::Check(*check),
            Err(other) => ErrorInput::Other(other),
        }
    }
}

/// Failure returned by a single probe call.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Domain failure, recorded against the backend.
    #[error(transparent)]
    Check(#[from] HealthCheckError),
    /// Unclassified failure: retried by `Retry`, re-raised by the base contract.
    #[error("{0}")]
    Other(#[source] BoxError),
}

impl ProbeError {
    /// Wrap an arbitrary error. A boxed `HealthCheckError` stays a `Check`.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ProbeError::Other(err.into()).classify()
    }

    /// Move a `HealthCheckError` hidden inside `Other` back to `Check`.
    pub fn classify(self) -> Self {
        match self {
            ProbeError::Other(boxed) => match boxed.downcast::<HealthCheckError>() {
                Ok(check) => ProbeError::Check(*check),
                Err(other) => ProbeError::Other(other),
            },
            check => check,
        }
    }

    /// Kind tag the retry loop branches on. `None` for unclassified failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ProbeError::Check(e) => Some(e.kind()),
            ProbeError::Other(_) => None,
        }
    }
}

pub type ProbeResult = std::result::Result<(), ProbeError>;

/// An unclassified failure escaping a backend. Treated as a bug, not as "service down".
#[derive(Debug, Error)]
#[error("backend `{identifier}` failed unexpectedly: {source}")]
pub struct Fault {
    pub identifier: String,
    #[source]
    pub source: BoxError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(ErrorKind::Unavailable.code(), 0);
        assert_eq!(ErrorKind::UnexpectedResult.code(), 2);
        assert_eq!(ErrorKind::Unknown.code(), 3);
        assert!(ErrorKind::Unavailable.is_classified());
        assert!(!ErrorKind::Unknown.is_classified());
    }

    #[test]
    fn error_displays_message_and_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = HealthCheckError::unavailable("db down").with_cause(io);
        assert_eq!(err.to_string(), "db down");
        assert_eq!(err.code(), 0);
        assert_eq!(err.cause().map(|c| c.to_string()).as_deref(), Some("refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn probe_error_kind_tag() {
        let p: ProbeError = HealthCheckError::unexpected_result("bad").into();
        assert_eq!(p.kind(), Some(ErrorKind::UnexpectedResult));
        let o = ProbeError::other("boom");
        assert_eq!(o.kind(), None);
        assert_eq!(o.to_string(), "boom");
    }

    #[test]
    fn boxed_check_error_keeps_its_kind() {
        let boxed: BoxError = Box::new(HealthCheckError::unavailable("db down"));
        let p = ProbeError::other(boxed);
        assert_eq!(p.kind(), Some(ErrorKind::Unavailable));
        assert_eq!(p.to_string(), "db down");

        let raw = ProbeError::Other(Box::new(HealthCheckError::unexpected_result("bad")));
        assert_eq!(raw.classify().kind(), Some(ErrorKind::UnexpectedResult));

        let boxed: BoxError = Box::new(HealthCheckError::unexpected_result("bad"));
        match ErrorInput::from(boxed) {
            ErrorInput::Check(e) => assert_eq!(e, HealthCheckError::unexpected_result("bad")),
            other => panic!("expected Check, got {other:?}"),
        }

        let io: BoxError = Box::new(std::io::Error::other("disk"));
        assert!(matches!(ErrorInput::from(io), ErrorInput::Other(_)));
    }

    #[test]
    fn serializes_with_code() {
        let v = serde_json::to_value(HealthCheckError::unexpected_result("bad")).unwrap();
        assert_eq!(v["kind"], "unexpected_result");
        assert_eq!(v["code"], 2);
        assert_eq!(v["message"], "bad");
    }
}
