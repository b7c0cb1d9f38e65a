//! # Event Lifecycle
//!
//! Phase vocabulary shared by events and messages, and the [`Event`] type
//! that drives the Prepare → Execute → outcome → Complete pipeline.

pub mod event;
pub mod states;

pub use event::Event;
pub use states::{LifecyclePhase, Phase, RefreshPhase};
