//! Synchronization primitives.
//!
//! Re-exports of the `tokio::sync` channels used to move completions between
//! the worker pool and the host loop.

pub use tokio::sync::{mpsc, oneshot};
