//! Runtime utilities that wrap Tokio's runtime primitives so downstream crates
//! never depend on Tokio directly.

use std::io;

pub use tokio::runtime::Handle;
use tokio::runtime::Builder;

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// Must not be called from inside another runtime.
pub fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}

