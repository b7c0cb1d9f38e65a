//! # Registry Infrastructure
//!
//! Handler storage and the typed hook surfaces it stores.
//!
//! ```text
//! Registry Infrastructure
//! ├── hooks              (EventHook / MessageHook, per-instance hook slots)
//! └── handler_registry   (static + weak dynamic registrations, sweep, attach)
//! ```

pub mod handler_registry;
pub mod hooks;

pub use handler_registry::{HandlerKey, HandlerRegistry, RegistryStats};
pub use hooks::{Attachable, EventHook, Hook, MessageHook};
