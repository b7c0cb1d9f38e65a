//! Dedicated-thread affinity executor.
//!
//! Callbacks are sent over a `crossbeam` channel to a single named thread and
//! the dispatching thread waits on a per-call reply channel until the callback
//! has returned.

use crossbeam::channel::{self, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, warn};

use super::{AffinityCallback, AffinityExecutor};
use crate::error::{DispatchError, DispatchResult};

struct AffinityJob {
    callback: AffinityCallback,
    done: Sender<()>,
}

/// Executor that marshals every callback onto one designated thread
pub struct ThreadAffinityExecutor {
    sender: Option<Sender<AffinityJob>>,
    thread_id: ThreadId,
    join: Option<JoinHandle<()>>,
    name: String,
}

impl ThreadAffinityExecutor {
    /// Start the affinity thread
    pub fn spawn(name: &str) -> DispatchResult<Self> {
        let (sender, receiver) = channel::unbounded::<AffinityJob>();
        let thread_name = name.to_string();

        let join = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || Self::run_loop(receiver))
            .map_err(|e| {
                DispatchError::WorkerPool(format!("failed to spawn affinity thread '{name}': {e}"))
            })?;

        debug!(thread = %thread_name, "Affinity thread started");

        Ok(Self {
            sender: Some(sender),
            thread_id: join.thread().id(),
            join: Some(join),
            name: thread_name,
        })
    }

    fn run_loop(receiver: Receiver<AffinityJob>) {
        for job in receiver {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job.callback)) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());
                error!(panic_msg = %message, "Affinity callback panicked");
            }
            // The dispatcher may have given up waiting; nothing to report then.
            let _ = job.done.send(());
        }
    }

    /// Identity of the designated thread
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn is_affinity_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl AffinityExecutor for ThreadAffinityExecutor {
    fn run_on_affinity_context(&self, callback: AffinityCallback) {
        if self.is_affinity_thread() {
            callback();
            return;
        }

        let Some(sender) = &self.sender else {
            callback();
            return;
        };

        let (done_tx, done_rx) = channel::bounded(1);
        let job = AffinityJob {
            callback,
            done: done_tx,
        };

        match sender.send(job) {
            Ok(()) => {
                if done_rx.recv().is_err() {
                    warn!(thread = %self.name, "Affinity thread dropped a callback without running it");
                }
            }
            Err(channel::SendError(job)) => {
                warn!(
                    thread = %self.name,
                    "Affinity thread is gone, running callback on the dispatching thread"
                );
                (job.callback)();
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ThreadAffinityExecutor {
    fn drop(&mut self) {
        // Closing the channel ends the loop once queued callbacks have run.
        self.sender.take();
        if let Some(join) = self.join.take() {
            if join.thread().id() != thread::current().id() && join.join().is_err() {
                error!(thread = %self.name, "Affinity thread terminated abnormally");
            }
        }
    }
}
