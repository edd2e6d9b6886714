//! Blocking gates for holding a foreign call in flight.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    entered: usize,
}

/// Holds every call of one operation until [`Gate::open`] is called.
///
/// Cloning shares the gate. Dropping the last clone does not open it; tests
/// should open gates explicitly so blocked workers can finish.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases every current and future caller.
    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap_or_else(PoisonError::into_inner).open = true;
        cvar.notify_all();
    }

    /// Number of callers that reached the gate so far.
    pub fn entered(&self) -> usize {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(PoisonError::into_inner).entered
    }

    /// Waits until at least `count` callers reached the gate.
    pub fn wait_entered(&self, count: usize, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |state| state.entered < count)
            .unwrap_or_else(PoisonError::into_inner);
        guard.entered >= count
    }

    pub(crate) fn pass(&self) {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        guard.entered += 1;
        cvar.notify_all();
        let _guard = cvar
            .wait_while(guard, |state| !state.open)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
