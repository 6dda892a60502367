use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Display strings for statuses and error kinds. Loaded from `[messages]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default = "default_working")]
    pub working: String,
    #[serde(default = "default_unavailable")]
    pub unavailable: String,
    #[serde(default = "default_unexpected_result")]
    pub unexpected_result: String,
    #[serde(default = "default_unknown_error")]
    pub unknown_error: String,
}

fn default_working() -> String { "working".to_string() }
fn default_unavailable() -> String { "unavailable".to_string() }
fn default_unexpected_result() -> String { "unexpected result".to_string() }
fn default_unknown_error() -> String { "unknown error".to_string() }

impl Default for Catalog {
    fn default() -> Self {
        Self {
            working: default_working(),
            unavailable: default_unavailable(),
            unexpected_result: default_unexpected_result(),
            unknown_error: default_unknown_error(),
        }
    }
}

impl Catalog {
    pub fn label(&self, kind: ErrorKind) -> &str {
        match kind {
            ErrorKind::Unavailable => &self.unavailable,
            ErrorKind::UnexpectedResult => &self.unexpected_result,
            ErrorKind::Unknown => &self.unknown_error,
        }
    }

    /// Text for a status code (1 = working, otherwise an error kind code).
    pub fn status_label(&self, code: u8) -> &str {
        match code {
            1 => &self.working,
            0 => self.label(ErrorKind::Unavailable),
            2 => self.label(ErrorKind::UnexpectedResult),
            _ => self.label(ErrorKind::Unknown),
        }
    }
}
