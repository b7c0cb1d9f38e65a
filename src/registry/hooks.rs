//! # Handler Hooks
//!
//! Typed subscriber surfaces for events and messages, plus the per-instance
//! storage that keeps registry-attached hooks separate from hooks the caller
//! subscribed directly on the instance.
//!
//! Every hook returns a [`HandlerResult`]. For Prepare, Execute and the two
//! refresh phases the result drives outcome classification; for delivered
//! phases (Success, Error, Complete, DataRefreshed) a failure is logged and
//! otherwise ignored, since no later phase exists to report it.

use std::sync::Arc;

use crate::error::{HandlerFailure, HandlerResult};
use crate::execution::DispatchContext;
use crate::lifecycle::states::Phase;
use crate::lifecycle::Event;
use crate::messaging::Message;

pub type EventFn<T> = Arc<dyn Fn(&Event<T>) -> HandlerResult + Send + Sync>;
pub type EventErrorFn<T> = Arc<dyn Fn(&Event<T>, &HandlerFailure) -> HandlerResult + Send + Sync>;
pub type MessageFn<T, R> = Arc<dyn Fn(&Message<T, R>) -> HandlerResult + Send + Sync>;
pub type RefreshedFn<T, R> =
    Arc<dyn Fn(&Message<T, R>, Option<&R>, Option<&HandlerFailure>) -> HandlerResult + Send + Sync>;

/// A handler that can be stored in the registry
pub trait Hook: Clone + Send + Sync + 'static {
    /// Phase this hook subscribes to
    fn phase(&self) -> Phase;
}

/// An instance the registry can attach hooks onto
pub trait Attachable {
    type Hook: Hook;

    /// Phases attached, in delivery order
    fn phases() -> &'static [Phase];

    /// Replace the registry-sourced hooks and bind the instance to `context`
    fn attach(&self, hooks: Vec<Self::Hook>, context: Arc<DispatchContext>);

    /// Human readable type name used in logs and statistics
    fn target_name() -> &'static str;
}

/// One phase hook of an [`Event`]
pub enum EventHook<T> {
    Prepare(EventFn<T>),
    Execute(EventFn<T>),
    Error(EventErrorFn<T>),
    Success(EventFn<T>),
    Complete(EventFn<T>),
}

impl<T: Send + Sync + 'static> EventHook<T> {
    pub fn prepare<F>(handler: F) -> Self
    where
        F: Fn(&Event<T>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Prepare(Arc::new(handler))
    }

    pub fn execute<F>(handler: F) -> Self
    where
        F: Fn(&Event<T>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Execute(Arc::new(handler))
    }

    pub fn error<F>(handler: F) -> Self
    where
        F: Fn(&Event<T>, &HandlerFailure) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Error(Arc::new(handler))
    }

    pub fn success<F>(handler: F) -> Self
    where
        F: Fn(&Event<T>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Success(Arc::new(handler))
    }

    pub fn complete<F>(handler: F) -> Self
    where
        F: Fn(&Event<T>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Complete(Arc::new(handler))
    }
}

impl<T> Clone for EventHook<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Prepare(f) => Self::Prepare(f.clone()),
            Self::Execute(f) => Self::Execute(f.clone()),
            Self::Error(f) => Self::Error(f.clone()),
            Self::Success(f) => Self::Success(f.clone()),
            Self::Complete(f) => Self::Complete(f.clone()),
        }
    }
}

impl<T: Send + Sync + 'static> Hook for EventHook<T> {
    fn phase(&self) -> Phase {
        match self {
            Self::Prepare(_) => Phase::Prepare,
            Self::Execute(_) => Phase::Execute,
            Self::Error(_) => Phase::Error,
            Self::Success(_) => Phase::Success,
            Self::Complete(_) => Phase::Complete,
        }
    }
}

/// One hook of a [`Message`]
pub enum MessageHook<T, R> {
    SyncRefresh(MessageFn<T, R>),
    AsyncRefresh(MessageFn<T, R>),
    DataRefreshed(RefreshedFn<T, R>),
}

impl<T, R> MessageHook<T, R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn sync_refresh<F>(handler: F) -> Self
    where
        F: Fn(&Message<T, R>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::SyncRefresh(Arc::new(handler))
    }

    pub fn async_refresh<F>(handler: F) -> Self
    where
        F: Fn(&Message<T, R>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::AsyncRefresh(Arc::new(handler))
    }

    pub fn data_refreshed<F>(handler: F) -> Self
    where
        F: Fn(&Message<T, R>, Option<&R>, Option<&HandlerFailure>) -> HandlerResult
            + Send
            + Sync
            + 'static,
    {
        Self::DataRefreshed(Arc::new(handler))
    }
}

impl<T, R> Clone for MessageHook<T, R> {
    fn clone(&self) -> Self {
        match self {
            Self::SyncRefresh(f) => Self::SyncRefresh(f.clone()),
            Self::AsyncRefresh(f) => Self::AsyncRefresh(f.clone()),
            Self::DataRefreshed(f) => Self::DataRefreshed(f.clone()),
        }
    }
}

impl<T, R> Hook for MessageHook<T, R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn phase(&self) -> Phase {
        match self {
            Self::SyncRefresh(_) => Phase::SyncRefresh,
            Self::AsyncRefresh(_) => Phase::AsyncRefresh,
            Self::DataRefreshed(_) => Phase::DataRefreshed,
        }
    }
}

/// Ordered hook lists of one instance, grouped by phase
pub(crate) trait HookSet: Default + Clone {
    type Hook;

    fn push(&mut self, hook: Self::Hook);

    fn append(&mut self, other: &Self);
}

pub(crate) struct EventHookSet<T> {
    pub prepare: Vec<EventFn<T>>,
    pub execute: Vec<EventFn<T>>,
    pub error: Vec<EventErrorFn<T>>,
    pub success: Vec<EventFn<T>>,
    pub complete: Vec<EventFn<T>>,
}

impl<T> Default for EventHookSet<T> {
    fn default() -> Self {
        Self {
            prepare: Vec::new(),
            execute: Vec::new(),
            error: Vec::new(),
            success: Vec::new(),
            complete: Vec::new(),
        }
    }
}

impl<T> Clone for EventHookSet<T> {
    fn clone(&self) -> Self {
        Self {
            prepare: self.prepare.clone(),
            execute: self.execute.clone(),
            error: self.error.clone(),
            success: self.success.clone(),
            complete: self.complete.clone(),
        }
    }
}

impl<T> HookSet for EventHookSet<T> {
    type Hook = EventHook<T>;

    fn push(&mut self, hook: EventHook<T>) {
        match hook {
            EventHook::Prepare(f) => self.prepare.push(f),
            EventHook::Execute(f) => self.execute.push(f),
            EventHook::Error(f) => self.error.push(f),
            EventHook::Success(f) => self.success.push(f),
            EventHook::Complete(f) => self.complete.push(f),
        }
    }

    fn append(&mut self, other: &Self) {
        self.prepare.extend(other.prepare.iter().cloned());
        self.execute.extend(other.execute.iter().cloned());
        self.error.extend(other.error.iter().cloned());
        self.success.extend(other.success.iter().cloned());
        self.complete.extend(other.complete.iter().cloned());
    }
}

pub(crate) struct MessageHookSet<T, R> {
    pub sync_refresh: Vec<MessageFn<T, R>>,
    pub async_refresh: Vec<MessageFn<T, R>>,
    pub data_refreshed: Vec<RefreshedFn<T, R>>,
}

impl<T, R> Default for MessageHookSet<T, R> {
    fn default() -> Self {
        Self {
            sync_refresh: Vec::new(),
            async_refresh: Vec::new(),
            data_refreshed: Vec::new(),
        }
    }
}

impl<T, R> Clone for MessageHookSet<T, R> {
    fn clone(&self) -> Self {
        Self {
            sync_refresh: self.sync_refresh.clone(),
            async_refresh: self.async_refresh.clone(),
            data_refreshed: self.data_refreshed.clone(),
        }
    }
}

impl<T, R> HookSet for MessageHookSet<T, R> {
    type Hook = MessageHook<T, R>;

    fn push(&mut self, hook: MessageHook<T, R>) {
        match hook {
            MessageHook::SyncRefresh(f) => self.sync_refresh.push(f),
            MessageHook::AsyncRefresh(f) => self.async_refresh.push(f),
            MessageHook::DataRefreshed(f) => self.data_refreshed.push(f),
        }
    }

    fn append(&mut self, other: &Self) {
        self.sync_refresh.extend(other.sync_refresh.iter().cloned());
        self.async_refresh.extend(other.async_refresh.iter().cloned());
        self.data_refreshed.extend(other.data_refreshed.iter().cloned());
    }
}

/// Attached and locally subscribed hooks of one instance
///
/// Attached hooks are replaced wholesale on every attach and released once the
/// lifecycle that used them completes, unless a newer attach happened in the
/// meantime (tracked by `generation`).
pub(crate) struct HookSlots<S> {
    attached: S,
    local: S,
    generation: u64,
}

impl<S: HookSet> Default for HookSlots<S> {
    fn default() -> Self {
        Self {
            attached: S::default(),
            local: S::default(),
            generation: 0,
        }
    }
}

impl<S: HookSet> HookSlots<S> {
    pub fn subscribe(&mut self, hook: S::Hook) {
        self.local.push(hook);
    }

    pub fn attach(&mut self, hooks: Vec<S::Hook>) {
        let mut attached = S::default();
        for hook in hooks {
            attached.push(hook);
        }
        self.attached = attached;
        self.generation += 1;
    }

    /// Attached hooks first, then local ones, tagged with the attach generation
    pub fn snapshot(&self) -> (Arc<S>, u64) {
        let mut merged = self.attached.clone();
        merged.append(&self.local);
        (Arc::new(merged), self.generation)
    }

    pub fn release_attached(&mut self, generation: u64) {
        if self.generation == generation {
            self.attached = S::default();
        }
    }
}
