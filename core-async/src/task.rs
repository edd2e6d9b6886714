//! Task handle re-exports.
//!
//! Foreign calls only ever run through
//! [`WorkerPool::spawn_blocking`](crate::WorkerPool::spawn_blocking).

pub use tokio::task::{JoinError, JoinHandle};
