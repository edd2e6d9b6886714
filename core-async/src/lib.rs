//! Execution substrate for the uplink bridge.
//!
//! The bridge splits every foreign call in two: a blocking half that runs on a
//! fixed-size pool of worker threads and a completion half that runs on the
//! one thread allowed to build host-visible values. This crate provides both
//! sides and keeps the Tokio details out of the crates above it.
//!
//! # Modules
//!
//! - `pool`: [`WorkerPool`], the fixed-size blocking pool
//! - `host`: [`HostLoop`], the single-threaded completion queue
//! - `runtime`: runtime construction helpers
//! - `sync`: channel re-exports
//! - `task`: join handle re-exports
//!
//! # Examples
//!
//! ```rust
//! use core_async::{HostLoop, WorkerPool};
//!
//! let pool = WorkerPool::new(2).unwrap();
//! let mut host = HostLoop::new(String::from("host"));
//!
//! let answer = host
//!     .block_on(async move { pool.spawn_blocking(|| 40 + 2).await.unwrap() })
//!     .unwrap();
//! assert_eq!(answer, 42);
//! ```

pub mod host;
pub mod pool;
pub mod runtime;
pub mod sync;
pub mod task;

pub use host::{HostLoop, HostSender};
pub use pool::WorkerPool;
