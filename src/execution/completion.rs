//! One-shot completion latch shared between a lifecycle driver and its waiters.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Handle observing the completion of a single trigger or refresh
///
/// Released by the lifecycle driver only after the final phase (Complete or
/// DataRefreshed) has been delivered, so a returned `wait` implies those
/// handlers have run.
#[derive(Clone, Default)]
pub struct Completion {
    state: Arc<CompletionState>,
}

#[derive(Default)]
struct CompletionState {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the calling thread until the completion is released
    pub fn wait(&self) {
        let mut done = self.state.done.lock();
        while !*done {
            self.state.signal.wait(&mut done);
        }
    }

    /// Block for at most `timeout`; returns whether the completion was released
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut done = self.state.done.lock();
        if *done {
            return true;
        }
        // Spurious wakeups are absorbed by re-checking the flag after the wait.
        let _ = self.state.signal.wait_for(&mut done, timeout);
        *done
    }

    pub fn is_complete(&self) -> bool {
        *self.state.done.lock()
    }

    pub(crate) fn release(&self) {
        let mut done = self.state.done.lock();
        *done = true;
        self.state.signal.notify_all();
    }

    /// Check whether two handles observe the same trigger
    pub fn same_as(&self, other: &Completion) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.is_complete())
            .finish()
    }
}
