//! Startup handler discovery.
//!
//! A discovery step bulk-registers handlers before the manager is handed to
//! callers. Hosts typically implement it over their own plugin tables or
//! generated registration lists. Each step runs exactly once, during
//! [`DispatchManagerBuilder::build`](super::DispatchManagerBuilder::build).

use crate::registry::HandlerRegistry;

/// A bulk registration step run once while a manager is built
pub trait HandlerDiscovery: Send {
    /// Name used in logs and discovery errors
    fn name(&self) -> &str {
        "handler_discovery"
    }

    /// Register handlers; an error aborts manager construction
    fn discover(&self, registry: &HandlerRegistry) -> anyhow::Result<()>;
}

impl<F> HandlerDiscovery for F
where
    F: Fn(&HandlerRegistry) -> anyhow::Result<()> + Send,
{
    fn discover(&self, registry: &HandlerRegistry) -> anyhow::Result<()> {
        self(registry)
    }
}

/// A discovery step with an explicit name
pub struct NamedDiscovery<F> {
    name: String,
    step: F,
}

impl<F> NamedDiscovery<F>
where
    F: Fn(&HandlerRegistry) -> anyhow::Result<()> + Send,
{
    pub fn new(name: impl Into<String>, step: F) -> Self {
        Self {
            name: name.into(),
            step,
        }
    }
}

impl<F> HandlerDiscovery for NamedDiscovery<F>
where
    F: Fn(&HandlerRegistry) -> anyhow::Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn discover(&self, registry: &HandlerRegistry) -> anyhow::Result<()> {
        (self.step)(registry)
    }
}
