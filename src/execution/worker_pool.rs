//! Worker Pool
//!
//! Runs Execute units and async refresh units off the caller's thread.
//! Handlers are synchronous and may block or poll a cancellation token, so
//! every unit is scheduled with `spawn_blocking` on a tokio runtime.

use std::fmt;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

use crate::config::WorkerPoolConfig;
use crate::error::{DispatchError, DispatchResult};

/// Pool of worker threads backed by a tokio runtime
pub struct WorkerPool {
    handle: Handle,
    /// Present only when the pool owns its runtime
    runtime: Option<Runtime>,
    name: String,
}

impl WorkerPool {
    /// Build a pool that owns a dedicated multi-thread runtime
    pub fn new(config: &WorkerPoolConfig) -> DispatchResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| DispatchError::WorkerPool(format!("failed to build runtime: {e}")))?;

        info!(
            worker_threads = config.worker_threads,
            max_blocking_threads = config.max_blocking_threads,
            thread_name = %config.thread_name,
            "Worker pool started"
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            name: config.thread_name.clone(),
        })
    }

    /// Wrap a runtime the host already runs; the pool never shuts it down
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
            name: "host-runtime".to_string(),
        }
    }

    /// Schedule a single unit of work on a worker thread
    pub fn spawn<F>(&self, unit: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // The join handle is dropped; completion is observed through the
        // lifecycle's own latch.
        drop(self.handle.spawn_blocking(unit));
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn owns_runtime(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("owns_runtime", &self.owns_runtime())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // The last reference may be released on one of the pool's own
            // threads, where a blocking shutdown would panic.
            runtime.shutdown_background();
            debug!(pool = %self.name, "Worker pool shut down");
        }
    }
}
