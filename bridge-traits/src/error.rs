use thiserror::Error;

/// Failures of the host logging contract.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Unknown log level '{0}'")]
    UnknownLevel(String),

    /// The host pipeline refused the entry.
    #[error("Log sink rejected entry: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;
