//! Fixed-size worker pool for blocking foreign calls.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::task::JoinHandle;

/// Name prefix given to every pool thread.
pub const WORKER_THREAD_NAME: &str = "uplink-worker";

/// A pool of at most `size` threads that run blocking closures.
///
/// Closures submitted beyond `size` queue until a thread frees up. The pool
/// owns its own multi-threaded runtime, so it can be created and used from
/// threads that are not inside any runtime.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
    size: usize,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Starts a pool with `size` blocking threads.
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "worker pool needs at least one thread",
            ));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(size)
            .thread_name(WORKER_THREAD_NAME)
            .enable_all()
            .build()?;

        tracing::debug!(size, "worker pool started");

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            size,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Queue `job` on a worker thread.
    pub fn spawn_blocking<F, R>(&self, job: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.in_flight));
        self.handle.spawn_blocking(move || {
            let _guard = guard;
            job()
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Jobs already running finish on their own threads; queued ones are dropped.
            runtime.shutdown_background();
            tracing::debug!("worker pool stopped");
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
