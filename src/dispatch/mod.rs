//! # Dispatch
//!
//! The [`DispatchManager`] entry point and its startup discovery hook.

pub mod discovery;
pub mod manager;

pub use discovery::{HandlerDiscovery, NamedDiscovery};
pub use manager::{DispatchManager, DispatchManagerBuilder};
