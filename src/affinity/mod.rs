//! # Affinity Executors
//!
//! Outcome (Success / Error), Complete and DataRefreshed handlers are not
//! called directly by the lifecycle driver. They are handed to an
//! [`AffinityExecutor`], which decides whether to run them on the dispatching
//! thread or to marshal them onto a designated context such as a UI thread.
//!
//! ## Contract
//!
//! `run_on_affinity_context` must run the callback exactly once and must not
//! return before the callback has returned. The dispatching thread is blocked
//! for the duration of the hand-off.
//!
//! Blocking the affinity context itself on `Event::wait` or `Message::request`
//! while a delivery is pending deadlocks, because the delivery can never be
//! scheduled onto the blocked context.
//!
//! ## Provided implementations
//!
//! - [`InlineExecutor`]: runs every callback on the dispatching thread
//! - [`ThreadAffinityExecutor`]: marshals callbacks onto one dedicated thread

pub mod inline;
pub mod thread;

pub use inline::InlineExecutor;
pub use thread::ThreadAffinityExecutor;

use crate::config::{AffinityConfig, AffinityMode};
use crate::error::DispatchResult;
use std::sync::Arc;

/// Callback handed to an affinity executor; argument values are captured
pub type AffinityCallback = Box<dyn FnOnce() + Send + 'static>;

/// Capability that delivers callbacks onto a designated execution context
pub trait AffinityExecutor: Send + Sync {
    /// Run `callback` on the affinity context and block until it returns
    fn run_on_affinity_context(&self, callback: AffinityCallback);

    /// Name used in log output
    fn name(&self) -> &str {
        "affinity_executor"
    }
}

/// Build the executor selected by configuration
pub fn from_config(config: &AffinityConfig) -> DispatchResult<Arc<dyn AffinityExecutor>> {
    match config.mode {
        AffinityMode::Inline => Ok(Arc::new(InlineExecutor)),
        AffinityMode::DedicatedThread => Ok(Arc::new(ThreadAffinityExecutor::spawn(
            &config.thread_name,
        )?)),
    }
}
