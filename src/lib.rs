#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Phase Dispatch
//!
//! In-process event lifecycle dispatcher with typed phase handlers.
//!
//! ## Overview
//!
//! Triggering an [`Event`] runs it through an ordered set of phases and hands
//! each phase to its registered handlers:
//!
//! ```text
//! Prepare (caller thread) → Execute (worker) → Success | Error → Complete
//! ```
//!
//! Execution can be aborted cooperatively or short-circuited with a
//! [`CancelOutcome`], and outcome and completion handlers are delivered
//! through an [`AffinityExecutor`] so a host can pin them to one thread.
//!
//! A [`Message`] resolves a result value through a synchronous and an
//! asynchronous refresh path racing each other, and reports the result through
//! DataRefreshed handlers.
//!
//! ## Key Features
//!
//! - **Single-flight instances**: re-triggering an in-flight event fails with
//!   `InvalidState` instead of queueing
//! - **Guaranteed completion**: Complete fires exactly once per trigger, even
//!   when outcome handlers fail or panic
//! - **Weak dynamic handlers**: subscribers registered at runtime are held
//!   weakly and swept before every attach
//! - **Pluggable affinity**: inline delivery or a dedicated delivery thread
//!
//! ## Module Organization
//!
//! - [`lifecycle`] - Phase vocabulary and the event lifecycle
//! - [`messaging`] - Message refresh channel
//! - [`registry`] - Handler hooks and the handler registry
//! - [`dispatch`] - Dispatch manager, builder and discovery
//! - [`affinity`] - Affinity executor contract and implementations
//! - [`execution`] - Worker pool, completion latch and dispatch context
//! - [`config`] - Configuration structs and layered loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phase_dispatch::{DispatchManager, DispatcherConfig, Event, EventHook};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DispatchManager::new(DispatcherConfig::default())?;
//!
//! manager.registry().register_static(EventHook::<String>::execute(|event| {
//!     event.payload_mut().push_str(" processed");
//!     Ok(())
//! }));
//! manager.registry().register_static(EventHook::<String>::complete(|event| {
//!     println!("done: {}", *event.payload());
//!     Ok(())
//! }));
//!
//! let event = Event::new("order-42".to_string());
//! manager.trigger(&event)?;
//! event.wait()?;
//! # Ok(())
//! # }
//! ```

pub mod affinity;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod registry;

pub use affinity::{AffinityCallback, AffinityExecutor, InlineExecutor, ThreadAffinityExecutor};
pub use config::{
    AffinityConfig, AffinityMode, ConfigLoader, DispatcherConfig, LoggingConfig, WorkerPoolConfig,
};
pub use dispatch::{DispatchManager, DispatchManagerBuilder, HandlerDiscovery, NamedDiscovery};
pub use error::{
    CancelOutcome, DispatchError, DispatchResult, HandlerError, HandlerFailure, HandlerResult,
    Resolution,
};
pub use execution::{Completion, DispatchContext, WorkerPool};
pub use lifecycle::{Event, LifecyclePhase, Phase, RefreshPhase};
pub use logging::init_structured_logging;
pub use messaging::Message;
pub use registry::{
    Attachable, EventHook, HandlerKey, HandlerRegistry, Hook, MessageHook, RegistryStats,
};
