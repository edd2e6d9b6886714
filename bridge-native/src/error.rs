use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One location the loader tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.reason)
    }
}

#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("Failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("{path} is missing required symbol `{symbol}`")]
    MissingSymbol { path: PathBuf, symbol: String },

    #[error("libuplink not found; tried {}", format_attempts(.attempts))]
    NotFound { attempts: Vec<Attempt> },
}

fn format_attempts(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(Attempt::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, LoadError>;
