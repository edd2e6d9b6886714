//! Single-threaded completion loop.
//!
//! The host runtime owns one thread on which every host-visible value is
//! built. Worker threads never touch that state directly; they post a job
//! through a [`HostSender`] and the [`HostLoop`] runs it with a shared
//! reference to the host context `C`.
//!
//! `C` does not need to be `Send`. Only the jobs cross threads.
//!
//! # Examples
//!
//! ```rust
//! use core_async::HostLoop;
//! use std::cell::Cell;
//!
//! let mut host = HostLoop::new(Cell::new(0));
//! let sender = host.sender();
//! std::thread::spawn(move || {
//!     sender.post(|count: &Cell<u32>| count.set(count.get() + 1));
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(host.run_until_idle(), 1);
//! assert_eq!(host.context().get(), 1);
//! ```

use std::fmt;
use std::future::Future;
use std::io;
use std::thread::{self, ThreadId};

use crate::sync::mpsc;

type Job<C> = Box<dyn FnOnce(&C) + Send + 'static>;

/// Cloneable handle for posting completion jobs onto a [`HostLoop`].
pub struct HostSender<C> {
    tx: mpsc::UnboundedSender<Job<C>>,
}

impl<C> HostSender<C> {
    /// Queue `job` for the host thread.
    ///
    /// Returns `false` when the loop is gone; the job is dropped unrun.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce(&C) + Send + 'static,
    {
        self.tx.send(Box::new(job)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<C> Clone for HostSender<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> fmt::Debug for HostSender<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// The host thread's completion queue.
pub struct HostLoop<C> {
    context: C,
    tx: mpsc::UnboundedSender<Job<C>>,
    rx: mpsc::UnboundedReceiver<Job<C>>,
    thread: ThreadId,
    processed: u64,
}

impl<C> HostLoop<C> {
    /// Creates a loop bound to the calling thread.
    pub fn new(context: C) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            context,
            tx,
            rx,
            thread: thread::current().id(),
            processed: 0,
        }
    }

    pub fn sender(&self) -> HostSender<C> {
        HostSender {
            tx: self.tx.clone(),
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// The thread the loop was created on.
    pub fn host_thread(&self) -> ThreadId {
        self.thread
    }

    pub fn is_host_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// Total number of jobs this loop has run.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Runs every job that is already queued, without waiting.
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            self.run(job);
            ran += 1;
        }
        ran
    }

    /// Polls `future` to completion, running posted jobs while it is pending.
    ///
    /// The future is polled before the queue on every turn, so a result that
    /// was settled by a job is observed as soon as that job returns.
    pub async fn drive<F>(&mut self, future: F) -> F::Output
    where
        F: Future,
    {
        let mut future = std::pin::pin!(future);
        loop {
            tokio::select! {
                biased;
                output = &mut future => return output,
                Some(job) = self.rx.recv() => self.run(job),
            }
        }
    }

    /// Blocks the host thread on `future` using a current-thread runtime.
    ///
    /// Must not be called from inside another runtime.
    pub fn block_on<F>(&mut self, future: F) -> io::Result<F::Output>
    where
        F: Future,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.drive(future)))
    }

    fn run(&mut self, job: Job<C>) {
        debug_assert!(self.is_host_thread(), "host job ran off the host thread");
        job(&self.context);
        self.processed += 1;
    }
}

impl<C> fmt::Debug for HostLoop<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLoop")
            .field("thread", &self.thread)
            .field("processed", &self.processed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_jobs_run_in_post_order() {
        let mut host = HostLoop::new(RefCell::new(Vec::new()));
        let sender = host.sender();
        for i in 0..3 {
            sender.post(move |log: &RefCell<Vec<i32>>| log.borrow_mut().push(i));
        }

        assert_eq!(host.run_until_idle(), 3);
        assert_eq!(*host.context().borrow(), vec![0, 1, 2]);
        assert_eq!(host.processed(), 3);
    }

    #[test]
    fn test_post_after_loop_dropped() {
        let host = HostLoop::new(());
        let sender = host.sender();
        drop(host);

        assert!(sender.is_closed());
        assert!(!sender.post(|_| {}));
    }
}
