//! # Handler Registry
//!
//! Process-wide store of phase handlers, keyed by (phase, hook type).
//!
//! ## Overview
//!
//! Each key maps to an append-only list of registrations kept in
//! registration order. A registration is either:
//!
//! - **static**: the hook itself, held strongly for the registry's lifetime
//! - **dynamic**: a weak reference to a subscriber object plus a binder that
//!   builds the hook from the live subscriber at attach time
//!
//! ## Liveness
//!
//! Dynamic registrations never keep their subscriber alive. [`HandlerRegistry::sweep`]
//! purges registrations whose subscriber has no strong owner left and runs
//! before every [`HandlerRegistry::attach_all`]. A subscriber dropped between
//! the sweep and its rebind is skipped for that attach only. Liveness is
//! checked by pulling, so a subscriber that dies after its hook was attached
//! still fires for the lifecycle it was attached to.
//!
//! ## Usage
//!
//! ```rust
//! use phase_dispatch::{EventHook, HandlerRegistry, Phase};
//! use std::sync::Arc;
//!
//! struct AuditLog;
//!
//! let registry = HandlerRegistry::new();
//! registry.register_static(EventHook::<String>::success(|_| Ok(())));
//!
//! let audit = Arc::new(AuditLog);
//! registry.register_dynamic(Phase::Complete, &audit, |_audit: Arc<AuditLog>| {
//!     EventHook::<String>::complete(|_| Ok(()))
//! });
//!
//! assert_eq!(registry.handler_count::<EventHook<String>>(Phase::Complete), 1);
//! drop(audit);
//! assert_eq!(registry.sweep(), 1);
//! ```

use dashmap::DashMap;
use serde::Serialize;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::hooks::{Attachable, Hook};
use crate::execution::DispatchContext;
use crate::lifecycle::states::Phase;
use crate::logging::log_registry_operation;

type ErasedHook = Box<dyn Any + Send + Sync>;
type Binder = Arc<dyn Fn() -> Option<ErasedHook> + Send + Sync>;

/// Registry key: one phase of one hook type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub phase: Phase,
    hook_type: TypeId,
    target: &'static str,
}

impl HandlerKey {
    pub fn of<H: Hook>(phase: Phase) -> Self {
        Self {
            phase,
            hook_type: TypeId::of::<H>(),
            target: type_name::<H>(),
        }
    }

    /// Type name of the hook this key stores
    pub fn target(&self) -> &'static str {
        self.target
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.phase)
    }
}

#[derive(Clone)]
enum Registration {
    Static(Arc<dyn Any + Send + Sync>),
    Dynamic {
        subscriber: Weak<dyn Any + Send + Sync>,
        bind: Binder,
    },
}

impl Registration {
    fn is_alive(&self) -> bool {
        match self {
            Self::Static(_) => true,
            Self::Dynamic { subscriber, .. } => subscriber.strong_count() > 0,
        }
    }

    fn is_static(&self) -> bool {
        matches!(self, Self::Static(_))
    }

    /// Rebuild the typed hook; `None` when a dynamic subscriber is gone
    fn bind<H: Hook>(&self) -> Option<H> {
        match self {
            Self::Static(hook) => hook.downcast_ref::<H>().cloned(),
            Self::Dynamic { bind, .. } => bind()?.downcast::<H>().ok().map(|hook| *hook),
        }
    }
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub keys: usize,
    pub static_handlers: usize,
    pub dynamic_handlers: usize,
    /// Dead dynamic registrations purged over the registry's lifetime
    pub dead_handlers_swept: u64,
}

/// Thread-safe registry of event and message handlers
pub struct HandlerRegistry {
    entries: DashMap<HandlerKey, Vec<Registration>>,
    swept: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            swept: AtomicU64::new(0),
        }
    }

    /// Append a process-lifetime handler; its phase comes from the hook
    pub fn register_static<H: Hook>(&self, hook: H) {
        let key = HandlerKey::of::<H>(hook.phase());
        self.push(key, Registration::Static(Arc::new(hook)), "static");
    }

    /// Append a handler bound to `subscriber`, held weakly
    ///
    /// `bind` runs on every attach while the subscriber is alive and must
    /// return a hook for `phase`.
    pub fn register_dynamic<S, H, F>(&self, phase: Phase, subscriber: &Arc<S>, bind: F)
    where
        S: Send + Sync + 'static,
        H: Hook,
        F: Fn(Arc<S>) -> H + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(subscriber);
        let liveness: Weak<dyn Any + Send + Sync> = weak.clone();
        let binder: Binder = Arc::new(move || {
            weak.upgrade()
                .map(|subscriber| Box::new(bind(subscriber)) as ErasedHook)
        });

        self.push(
            HandlerKey::of::<H>(phase),
            Registration::Dynamic {
                subscriber: liveness,
                bind: binder,
            },
            "dynamic",
        );
    }

    fn push(&self, key: HandlerKey, registration: Registration, kind: &str) {
        let position = {
            let mut registrations = self.entries.entry(key).or_default();
            registrations.push(registration);
            registrations.len()
        };

        log_registry_operation(
            "register",
            Some(key.target()),
            Some(key.phase.as_str()),
            "registered",
            Some(format!("{kind} handler #{position}").as_str()),
        );
    }

    /// Purge dynamic registrations whose subscriber was dropped
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, registrations| {
            let before = registrations.len();
            registrations.retain(Registration::is_alive);
            let dead = before - registrations.len();
            if dead > 0 {
                debug!(key = %key, removed = dead, "Swept dead dynamic handlers");
            }
            removed += dead;
            !registrations.is_empty()
        });

        if removed > 0 {
            self.swept.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Bind every live registration for `target`'s phases and attach them
    ///
    /// Returns the number of hooks attached. Previously attached registry
    /// hooks on `target` are replaced.
    pub fn attach_all<A: Attachable>(&self, target: &A, context: Arc<DispatchContext>) -> usize {
        let swept = self.sweep();

        // Snapshot first so binders never run under a map shard lock
        let snapshot: Vec<(Phase, Vec<Registration>)> = A::phases()
            .iter()
            .filter_map(|phase| {
                self.entries
                    .get(&HandlerKey::of::<A::Hook>(*phase))
                    .map(|registrations| (*phase, registrations.clone()))
            })
            .collect();

        let mut hooks = Vec::new();
        for (phase, registrations) in snapshot {
            for (index, registration) in registrations.iter().enumerate() {
                let Some(hook) = registration.bind::<A::Hook>() else {
                    debug!(
                        target_type = A::target_name(),
                        phase = %phase,
                        index = index,
                        "Subscriber dropped before bind, skipping handler"
                    );
                    continue;
                };
                if hook.phase() != phase {
                    warn!(
                        target_type = A::target_name(),
                        registered_phase = %phase,
                        hook_phase = %hook.phase(),
                        "Bound hook does not match its registered phase, skipping"
                    );
                    continue;
                }
                hooks.push(hook);
            }
        }

        let attached = hooks.len();
        target.attach(hooks, context);

        log_registry_operation(
            "attach_all",
            Some(A::target_name()),
            None,
            "attached",
            Some(format!("{attached} handlers, {swept} swept").as_str()),
        );
        attached
    }

    /// Registrations stored for one phase of hook type `H`, dead or alive
    pub fn handler_count<H: Hook>(&self, phase: Phase) -> usize {
        self.entries
            .get(&HandlerKey::of::<H>(phase))
            .map_or(0, |registrations| registrations.len())
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            keys: self.entries.len(),
            dead_handlers_swept: self.swept.load(Ordering::Relaxed),
            ..RegistryStats::default()
        };
        for entry in self.entries.iter() {
            let statics = entry.value().iter().filter(|r| r.is_static()).count();
            stats.static_handlers += statics;
            stats.dynamic_handlers += entry.value().len() - statics;
        }
        stats
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}
