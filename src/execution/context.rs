use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::worker_pool::WorkerPool;
use crate::affinity::{self, AffinityCallback, AffinityExecutor, InlineExecutor};
use crate::config::DispatcherConfig;
use crate::error::DispatchResult;

static SHARED_CONTEXT: OnceLock<Arc<DispatchContext>> = OnceLock::new();

/// Worker pool plus affinity executor an event or message runs against
pub struct DispatchContext {
    workers: WorkerPool,
    affinity: Arc<dyn AffinityExecutor>,
}

impl DispatchContext {
    pub fn new(workers: WorkerPool, affinity: Arc<dyn AffinityExecutor>) -> Self {
        Self { workers, affinity }
    }

    /// Build a context from configuration
    pub fn from_config(config: &DispatcherConfig) -> DispatchResult<Self> {
        let workers = WorkerPool::new(&config.workers)?;
        let affinity = affinity::from_config(&config.affinity)?;
        Ok(Self::new(workers, affinity))
    }

    /// Process-wide context used by instances never attached through a manager
    pub fn shared() -> DispatchResult<Arc<DispatchContext>> {
        if let Some(context) = SHARED_CONTEXT.get() {
            return Ok(context.clone());
        }

        let context = Arc::new(Self::new(
            WorkerPool::new(&DispatcherConfig::default().workers)?,
            Arc::new(InlineExecutor),
        ));
        debug!("Initialized shared dispatch context");

        // A concurrent initializer may have won; its context is the one kept.
        Ok(SHARED_CONTEXT.get_or_init(|| context).clone())
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn affinity(&self) -> &Arc<dyn AffinityExecutor> {
        &self.affinity
    }

    /// Schedule a unit of work on the worker pool
    pub(crate) fn spawn<F>(&self, unit: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.workers.spawn(unit);
    }

    /// Hand a callback to the affinity executor and block until it ran
    pub(crate) fn deliver(&self, callback: AffinityCallback) {
        self.affinity.run_on_affinity_context(callback);
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("workers", &self.workers)
            .field("affinity", &self.affinity.name())
            .finish()
    }
}
