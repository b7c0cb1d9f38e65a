//! # Dispatch Manager
//!
//! Owns the handler registry and the dispatch context (worker pool plus
//! affinity executor). Every entry point delegates to the instance's own
//! lifecycle method and attaches the currently registered handlers once that
//! call owns the flight.
//!
//! ```text
//! DispatchManager::trigger(&event)
//!     └── event.trigger_with(..)
//!           ├── begin                       (InvalidState if in flight)
//!           ├── registry.attach_all(&event) (sweep, bind, attach)
//!           └── Prepare inline, Execute on worker
//! ```

use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

use super::discovery::HandlerDiscovery;
use crate::affinity::{self, AffinityExecutor};
use crate::config::{ConfigLoader, DispatcherConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::execution::{Completion, DispatchContext, WorkerPool};
use crate::lifecycle::Event;
use crate::messaging::Message;
use crate::registry::{Attachable, HandlerRegistry};

/// Entry point composing a [`HandlerRegistry`] with a [`DispatchContext`]
#[derive(Debug)]
pub struct DispatchManager {
    registry: Arc<HandlerRegistry>,
    context: Arc<DispatchContext>,
    config: DispatcherConfig,
}

impl DispatchManager {
    /// Build a manager with the executors selected by `config`
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: DispatcherConfig) -> DispatchManagerBuilder {
        DispatchManagerBuilder::new(config)
    }

    /// Load configuration from `path` (plus environment overrides) and build
    pub fn from_config_file(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let config = ConfigLoader::load_from_file(path.as_ref())?;
        Self::new(config)
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &Arc<DispatchContext> {
        &self.context
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Attach registered handlers onto `target` and bind it to this manager's context
    pub fn attach<A: Attachable>(&self, target: &A) -> usize {
        self.registry.attach_all(target, self.context.clone())
    }

    /// Attach handlers, then start the event's lifecycle
    ///
    /// Handlers are attached only after the trigger owns the flight; a
    /// rejected trigger leaves the running lifecycle's hooks untouched.
    pub fn trigger<T>(&self, event: &Event<T>) -> DispatchResult<Completion>
    where
        T: Send + Sync + 'static,
    {
        event.trigger_with(|event| {
            self.attach(event);
        })
    }

    /// Attach handlers, then refresh the message and wait for its result
    ///
    /// Concurrent callers on one message serialize on its request lock, the
    /// same as direct `Message::request` calls.
    pub fn request<T, R>(&self, message: &Message<T, R>) -> DispatchResult<Option<R>>
    where
        T: Send + Sync + 'static,
        R: Clone + Send + Sync + 'static,
    {
        message.request_with(|message| {
            self.attach(message);
        })
    }

    /// Attach handlers, then refresh the message without waiting for the async unit
    pub fn request_async<T, R>(&self, message: &Message<T, R>) -> DispatchResult<Completion>
    where
        T: Send + Sync + 'static,
        R: Clone + Send + Sync + 'static,
    {
        message.request_async_with(|message| {
            self.attach(message);
        })
    }
}

/// Builder for [`DispatchManager`]
pub struct DispatchManagerBuilder {
    config: DispatcherConfig,
    affinity: Option<Arc<dyn AffinityExecutor>>,
    handle: Option<Handle>,
    registry: Option<Arc<HandlerRegistry>>,
    discoveries: Vec<Box<dyn HandlerDiscovery>>,
}

impl DispatchManagerBuilder {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            affinity: None,
            handle: None,
            registry: None,
            discoveries: Vec::new(),
        }
    }

    /// Use a host-supplied affinity executor instead of the configured one
    pub fn with_affinity(mut self, affinity: Arc<dyn AffinityExecutor>) -> Self {
        self.affinity = Some(affinity);
        self
    }

    /// Run units on a runtime the host already owns
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Share an existing registry between managers
    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a discovery step; steps run in the order added
    pub fn with_discovery(mut self, discovery: impl HandlerDiscovery + 'static) -> Self {
        self.discoveries.push(Box::new(discovery));
        self
    }

    pub fn build(self) -> DispatchResult<DispatchManager> {
        self.config.validate()?;

        let workers = match self.handle {
            Some(handle) => WorkerPool::from_handle(handle),
            None => WorkerPool::new(&self.config.workers)?,
        };
        let affinity = match self.affinity {
            Some(affinity) => affinity,
            None => affinity::from_config(&self.config.affinity)?,
        };
        let context = Arc::new(DispatchContext::new(workers, affinity));
        let registry = self.registry.unwrap_or_default();

        for discovery in &self.discoveries {
            discovery
                .discover(&registry)
                .map_err(|e| DispatchError::Discovery {
                    source_name: discovery.name().to_string(),
                    reason: format!("{e:#}"),
                })?;
        }

        let stats = registry.stats();
        info!(
            workers = %context.workers().name(),
            affinity = %context.affinity().name(),
            discovery_steps = self.discoveries.len(),
            static_handlers = stats.static_handlers,
            dynamic_handlers = stats.dynamic_handlers,
            "🚀 Dispatch manager ready"
        );

        Ok(DispatchManager {
            registry,
            context,
            config: self.config,
        })
    }
}
