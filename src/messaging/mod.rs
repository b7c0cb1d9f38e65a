//! # Messaging
//!
//! One-shot request/refresh channel: a [`Message`] resolves its result through
//! sync and async refresh handlers and reports through DataRefreshed.

pub mod message;

pub use message::Message;
