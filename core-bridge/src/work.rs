//! # Async Work Bridge
//!
//! [`WorkBridge::submit`] turns one blocking foreign call into a
//! [`PendingFuture`]. A task has two phases:
//!
//! 1. **execute** runs on the worker pool with the task's owned input and
//!    produces a raw result. It never builds host values.
//! 2. **complete** runs on the host loop with a [`HostContext`], interprets the
//!    raw result (wrap a handle, project an error, marshal a record) and
//!    settles the future.
//!
//! Cancellation is honoured only while the task is still queued; it settles
//! the future with [`BridgeError::Cancelled`] at once and the execute phase
//! never runs. A task that already started runs to normal completion.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use core_async::{HostSender, WorkerPool};
use core_async::sync::oneshot;
use tracing::{debug, debug_span, info, warn};

use crate::error::{BridgeError, Result};
use crate::exception::TypedException;
use crate::foreign::{error_parts, Foreign};
use crate::handle::{Handle, HandleRegistry, Resource};
use crate::registry::ErrorRegistry;

use bridge_traits::ffi::UplinkError;

pub type TaskId = u64;

/// Everything a completion phase may touch. Only exists on the host loop
/// thread.
pub struct HostContext {
    handles: HandleRegistry,
    errors: Arc<ErrorRegistry>,
    _host_only: PhantomData<*const ()>,
}

impl HostContext {
    pub(crate) fn new(handles: HandleRegistry, errors: Arc<ErrorRegistry>) -> Self {
        Self {
            handles,
            errors,
            _host_only: PhantomData,
        }
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn errors(&self) -> &ErrorRegistry {
        &self.errors
    }

    /// Wraps an owned foreign resource into a new handle.
    pub fn wrap(&self, resource: Foreign<Resource>) -> Result<Handle> {
        let kind = resource.get().kind();
        let foreign_id = resource.get().foreign_id();
        self.handles.wrap(kind, foreign_id, Some(resource))
    }

    pub fn exception(&self, code: i32, message: &str) -> TypedException {
        self.errors.create_typed_exception(code, message)
    }

    /// Projects a foreign error, if there is one. The error stays owned by
    /// the caller's guard.
    pub fn foreign_failure(&self, error: *const UplinkError) -> Option<TypedException> {
        // SAFETY: callers pass error slots of results they still own.
        unsafe { error_parts(error) }.map(|(code, message)| self.exception(code, &message))
    }

    /// Projects a foreign error and frees it.
    pub fn take_failure(&self, error: Foreign<*mut UplinkError>) -> Option<TypedException> {
        self.foreign_failure(*error.get())
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("handles", &self.handles)
            .field("errors_initialized", &self.errors.is_initialized())
            .finish()
    }
}

/// Task lifecycle counters.
#[derive(Debug, Default)]
pub struct WorkStats {
    submitted: AtomicU64,
    executed: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkStatsSnapshot {
    pub submitted: u64,
    pub executed: u64,
    /// Settled futures, including cancelled ones.
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
}

impl WorkStats {
    pub fn snapshot(&self) -> WorkStatsSnapshot {
        WorkStatsSnapshot {
            submitted: self.submitted.load(Ordering::SeqCst),
            executed: self.executed.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// What the winner of the queued → running / cancelled race takes.
struct Payload<I, C, T> {
    input: I,
    complete: C,
    settle: oneshot::Sender<Result<T>>,
}

struct TaskCell<I, C, T> {
    id: TaskId,
    name: &'static str,
    state: AtomicU8,
    payload: Mutex<Option<Payload<I, C, T>>>,
    stats: Arc<WorkStats>,
}

impl<I, C, T> TaskCell<I, C, T> {
    fn take(&self) -> Option<Payload<I, C, T>> {
        self.payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn begin(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

trait Cancel: Send + Sync {
    fn cancel(&self) -> bool;
}

impl<I: Send, C: Send, T: Send> Cancel for TaskCell<I, C, T> {
    fn cancel(&self) -> bool {
        if self
            .state
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(payload) = self.take() {
            // Owned input (detached resources included) is freed here.
            drop(payload.input);
            WorkStats::bump(&self.stats.cancelled);
            WorkStats::bump(&self.stats.completed);
            let _ = payload.settle.send(Err(BridgeError::Cancelled));
            debug!(task = self.id, op = self.name, "Task cancelled before execution");
        }
        true
    }
}

/// The host-side view of a submitted task.
#[must_use = "the operation's outcome is only observable by awaiting the future"]
pub struct PendingFuture<T> {
    id: TaskId,
    receiver: oneshot::Receiver<Result<T>>,
    cell: Arc<dyn Cancel>,
}

impl<T> PendingFuture<T> {
    pub fn task_id(&self) -> TaskId {
        self.id
    }

    /// Cancels the task if its execute phase has not begun. Returns whether
    /// the cancellation took effect.
    pub fn cancel(&self) -> bool {
        self.cell.cancel()
    }
}

impl<T> Future for PendingFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::Shutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for PendingFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFuture").field("id", &self.id).finish()
    }
}

/// Schedules tasks on the worker pool and completes them on the host loop.
pub struct WorkBridge {
    pool: Arc<WorkerPool>,
    host: HostSender<HostContext>,
    stats: Arc<WorkStats>,
    next_id: AtomicU64,
}

impl WorkBridge {
    pub fn new(pool: Arc<WorkerPool>, host: HostSender<HostContext>) -> Self {
        Self {
            pool,
            host,
            stats: Arc::new(WorkStats::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn stats(&self) -> WorkStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Submits a task.
    ///
    /// `input` is moved into the task and owned by it until completion.
    /// `execute` runs on a worker thread; `complete` runs on the host loop and
    /// receives the input back together with the execute result.
    pub fn submit<I, R, T, E, C>(
        &self,
        name: &'static str,
        input: I,
        execute: E,
        complete: C,
    ) -> Result<PendingFuture<T>>
    where
        I: Send + 'static,
        R: Send + 'static,
        T: Send + 'static,
        E: FnOnce(&mut I) -> R + Send + 'static,
        C: FnOnce(&HostContext, I, R) -> Result<T> + Send + 'static,
    {
        if self.host.is_closed() {
            return Err(BridgeError::Shutdown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (settle, receiver) = oneshot::channel();
        let cell = Arc::new(TaskCell {
            id,
            name,
            state: AtomicU8::new(QUEUED),
            payload: Mutex::new(Some(Payload {
                input,
                complete,
                settle,
            })),
            stats: Arc::clone(&self.stats),
        });

        WorkStats::bump(&self.stats.submitted);
        debug!(task = id, op = name, "Task submitted");

        let job_cell = Arc::clone(&cell);
        let host = self.host.clone();
        let stats = Arc::clone(&self.stats);
        let _ = self.pool.spawn_blocking(move || {
            if !job_cell.begin() {
                return;
            }
            let Some(Payload {
                mut input,
                complete,
                settle,
            }) = job_cell.take()
            else {
                return;
            };

            let span = debug_span!("task", op = name, id);
            let result = span.in_scope(|| {
                debug!("Executing");
                execute(&mut input)
            });
            WorkStats::bump(&stats.executed);

            let posted = host.post(move |ctx: &HostContext| {
                let _entered = span.enter();
                let outcome = complete(ctx, input, result);
                WorkStats::bump(&stats.completed);
                match &outcome {
                    Ok(_) => info!("Completed"),
                    Err(err) => {
                        WorkStats::bump(&stats.failed);
                        debug!(error = %err, "Completed with failure");
                    }
                }
                let _ = settle.send(outcome);
            });
            if !posted {
                warn!(task = id, op = name, "Host loop gone; task result dropped");
            }
        });

        Ok(PendingFuture {
            id,
            receiver,
            cell,
        })
    }
}

impl fmt::Debug for WorkBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkBridge")
            .field("pool", &self.pool)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::HostLoop;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::time::Duration;

    fn setup(workers: usize) -> (WorkBridge, HostLoop<HostContext>) {
        let host = HostLoop::new(HostContext::new(
            HandleRegistry::new(),
            Arc::new(ErrorRegistry::new()),
        ));
        let pool = Arc::new(WorkerPool::new(workers).unwrap());
        (WorkBridge::new(pool, host.sender()), host)
    }

    #[test]
    fn test_completion_runs_on_host_thread_with_input() {
        let (work, mut host) = setup(2);
        let host_thread = std::thread::current().id();

        let pending = work
            .submit(
                "double",
                21u32,
                |n| *n * 2,
                move |_, input, doubled| {
                    assert_eq!(std::thread::current().id(), host_thread);
                    Ok((input, doubled))
                },
            )
            .unwrap();

        assert_eq!(host.block_on(pending).unwrap().unwrap(), (21, 42));
        let stats = work.stats();
        assert_eq!((stats.submitted, stats.executed, stats.completed), (1, 1, 1));
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_failed_completion_is_counted() {
        let (work, mut host) = setup(1);
        let pending = work
            .submit("fail", (), |_| (), |_, _, _| -> Result<()> {
                Err(BridgeError::Runtime("boom".to_string()))
            })
            .unwrap();

        let err = host.block_on(pending).unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Runtime(ref m) if m == "boom"));
        assert_eq!(work.stats().failed, 1);
    }

    #[test]
    fn test_cancel_before_execute_skips_both_phases() {
        let (work, mut host) = setup(1);
        let (release, blocked) = mpsc::channel::<()>();
        let (started_tx, started) = mpsc::channel::<()>();

        let first = work
            .submit(
                "block",
                (),
                move |_| {
                    let _ = started_tx.send(());
                    let _ = blocked.recv_timeout(Duration::from_secs(5));
                },
                |_, _, _| Ok("first"),
            )
            .unwrap();
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_task = Arc::clone(&ran);
        let second = work
            .submit(
                "queued",
                (),
                move |_| ran_in_task.store(true, Ordering::SeqCst),
                |_, _, _| Ok("second"),
            )
            .unwrap();

        assert!(second.cancel());
        assert!(!second.cancel());
        assert!(!first.cancel());
        release.send(()).unwrap();

        let second = host.block_on(second).unwrap();
        assert!(matches!(second, Err(BridgeError::Cancelled)));
        assert_eq!(host.block_on(first).unwrap().unwrap(), "first");

        // The cancelled job may still be dequeued; it must not execute.
        while work.pool().in_flight() > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!ran.load(Ordering::SeqCst));

        let stats = work.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.completed, 2);
    }

    #[test]
    fn test_dropped_host_loop_settles_with_shutdown() {
        let (work, host) = setup(1);
        let pending = work.submit("orphan", (), |_| (), |_, _, _| Ok(())).unwrap();
        drop(host);

        let outcome = core_async::runtime::block_on(pending).unwrap();
        assert!(matches!(outcome, Err(BridgeError::Shutdown)));
        assert!(matches!(
            work.submit("late", (), |_| (), |_, _, _| Ok(())),
            Err(BridgeError::Shutdown)
        ));
    }
}
