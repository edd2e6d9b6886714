use thiserror::Error;

use crate::exception::TypedException;

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Bad argument shape or value; raised before any task exists.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("libuplink is unavailable: {0}")]
    LibraryUnavailable(String),

    #[error("Operation cancelled")]
    Cancelled,

    /// A failure reported by the foreign library.
    #[error(transparent)]
    Exception(#[from] TypedException),

    #[error("Bridge shut down before the operation settled")]
    Shutdown,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl BridgeError {
    /// Contract violations the call site reports synchronously.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidArgument(_) | BridgeError::InvalidHandle(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }

    pub fn exception(&self) -> Option<&TypedException> {
        match self {
            BridgeError::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    /// Foreign error code, when the failure came from the library.
    pub fn code(&self) -> Option<i32> {
        self.exception().map(TypedException::code)
    }
}

impl From<core_runtime::Error> for BridgeError {
    fn from(err: core_runtime::Error) -> Self {
        BridgeError::Runtime(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Runtime(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
