//! # Message Refresh Channel
//!
//! A [`Message`] resolves a result value of type `R` for a request payload of
//! type `T` through two refresh paths that may run at the same time:
//!
//! - SyncRefresh handlers run inline on the requesting thread
//! - AsyncRefresh handlers run as one cancellable unit on a worker
//!
//! Both paths write the same result slot and the last writer wins. When a
//! SyncRefresh handler exists, the async unit is cancelled as soon as the
//! sync side finishes; the async handlers observe that through
//! [`Message::is_abort_requested`]. Once both sides are done, DataRefreshed
//! handlers receive the resolved result through the affinity executor.
//!
//! `request` holds the per-instance request lock until DataRefreshed has
//! been delivered, so concurrent requests on one instance serialize.
//! `request_async` releases it on return; a request made while that refresh
//! is still running fails with `InvalidState`. So does a request made from a
//! refresh or DataRefreshed handler of the same message, which would
//! otherwise wait on its own refresh.
//!
//! With no SyncRefresh handler the async unit is never cancelled by the
//! refresh itself; only [`Message::abort`] cancels it.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{
    CancelOutcome, DispatchError, DispatchResult, HandlerFailure, HandlerResult, Resolution,
};
use crate::execution::{notify_all, resolve_chain, run_chain, Completion, DispatchContext};
use crate::lifecycle::states::{Phase, RefreshPhase};
use crate::logging::log_lifecycle_operation;
use crate::registry::hooks::{Attachable, HookSlots, MessageHook, MessageHookSet};

/// A request payload `T` whose result `R` is produced by refresh handlers
pub struct Message<T, R> {
    inner: Arc<MessageInner<T, R>>,
}

struct MessageInner<T, R> {
    id: Uuid,
    payload: RwLock<T>,
    result: Mutex<Option<R>>,
    request_lock: Mutex<()>,
    state: Mutex<MessageState>,
    hooks: Mutex<HookSlots<MessageHookSet<T, R>>>,
    context: RwLock<Option<Arc<DispatchContext>>>,
}

#[derive(Default)]
struct MessageState {
    phase: RefreshPhase,
    token: Option<CancellationToken>,
    in_flight: Option<Completion>,
    last_failure: Option<HandlerFailure>,
    refreshes: u64,
}

impl<T, R> Clone for Message<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, R> Message<T, R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(payload: T) -> Self {
        Self::build(payload, None)
    }

    /// Create a message whose result starts out as `initial`
    pub fn with_result(payload: T, initial: R) -> Self {
        Self::build(payload, Some(initial))
    }

    fn build(payload: T, result: Option<R>) -> Self {
        Self {
            inner: Arc::new(MessageInner {
                id: Uuid::new_v4(),
                payload: RwLock::new(payload),
                result: Mutex::new(result),
                request_lock: Mutex::new(()),
                state: Mutex::new(MessageState::default()),
                hooks: Mutex::new(HookSlots::default()),
                context: RwLock::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn payload(&self) -> RwLockReadGuard<'_, T> {
        self.inner.payload.read()
    }

    pub fn payload_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.payload.write()
    }

    /// Current result value
    pub fn result(&self) -> Option<R> {
        self.inner.result.lock().clone()
    }

    /// Write the result; called by refresh handlers
    pub fn set_result(&self, value: R) {
        *self.inner.result.lock() = Some(value);
    }

    pub fn take_result(&self) -> Option<R> {
        self.inner.result.lock().take()
    }

    pub fn phase(&self) -> RefreshPhase {
        self.inner.state.lock().phase
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// Failure delivered with the most recent DataRefreshed, if any
    pub fn last_failure(&self) -> Option<HandlerFailure> {
        self.inner.state.lock().last_failure.clone()
    }

    pub fn refresh_count(&self) -> u64 {
        self.inner.state.lock().refreshes
    }

    pub fn subscribe(&self, hook: MessageHook<T, R>) {
        self.inner.hooks.lock().subscribe(hook);
    }

    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.inner.state.lock().token.clone()
    }

    pub fn is_abort_requested(&self) -> bool {
        self.inner
            .state
            .lock()
            .token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// For AsyncRefresh handlers: short-circuit with `outcome` once the unit was cancelled
    pub fn ensure_not_aborted(&self, outcome: CancelOutcome) -> HandlerResult {
        if self.is_abort_requested() {
            Err(outcome.into())
        } else {
            Ok(())
        }
    }

    /// Refresh and block until DataRefreshed was delivered, then return the result
    ///
    /// Fails with `InvalidState` when called from a handler of this message's
    /// own running refresh.
    pub fn request(&self) -> DispatchResult<Option<R>> {
        self.request_with(|_| {})
    }

    /// Refresh without waiting for the async unit
    ///
    /// SyncRefresh handlers have run when this returns. The returned
    /// completion is released after DataRefreshed handlers ran.
    pub fn request_async(&self) -> DispatchResult<Completion> {
        self.request_async_with(|_| {})
    }

    /// `request` with `prepare` run under the request lock, before the refresh starts
    pub(crate) fn request_with<F>(&self, prepare: F) -> DispatchResult<Option<R>>
    where
        F: FnOnce(&Self),
    {
        self.ensure_not_reentrant("request")?;
        let _guard = self.inner.request_lock.lock();
        let completion = self.refresh("request", prepare)?;
        completion.wait();
        Ok(self.result())
    }

    pub(crate) fn request_async_with<F>(&self, prepare: F) -> DispatchResult<Completion>
    where
        F: FnOnce(&Self),
    {
        self.ensure_not_reentrant("request_async")?;
        let _guard = self.inner.request_lock.lock();
        self.refresh("request_async", prepare)
    }

    /// A handler of the running refresh would wait on itself through the request lock
    fn ensure_not_reentrant(&self, operation: &'static str) -> DispatchResult<()> {
        if RefreshScope::is_active(self.id()) {
            return Err(DispatchError::invalid_state(
                operation,
                format!(
                    "message {} is requested from a handler of its own running refresh",
                    self.id()
                ),
            ));
        }
        Ok(())
    }

    /// Cancel the running async refresh unit
    pub fn abort(&self) -> DispatchResult<()> {
        let state = self.inner.state.lock();
        match &state.token {
            Some(token) if state.phase == RefreshPhase::Refreshing => {
                token.cancel();
                debug!(message_id = %self.id(), "Async refresh abort requested");
                Ok(())
            }
            _ => Err(DispatchError::invalid_state(
                "abort",
                format!("message {} has no async refresh running", self.id()),
            )),
        }
    }

    /// Start a refresh; the caller holds the request lock
    fn refresh<F>(&self, operation: &'static str, prepare: F) -> DispatchResult<Completion>
    where
        F: FnOnce(&Self),
    {
        // Under the request lock nothing else can begin, so checking first
        // keeps a rejected caller from attaching over the running refresh.
        if self.is_refreshing() {
            return Err(self.in_flight_error(operation));
        }
        prepare(self);
        let context = self.context()?;
        let completion = self.begin(operation)?;
        let (hooks, generation) = self.inner.hooks.lock().snapshot();
        let has_sync = !hooks.sync_refresh.is_empty();
        let has_async = !hooks.async_refresh.is_empty();

        let run = Arc::new(RefreshRun {
            message: self.clone(),
            context,
            hooks: Mutex::new(hooks),
            generation,
            completion: completion.clone(),
            join: Mutex::new(RefreshJoin {
                remaining: if has_async { 2 } else { 1 },
                failure: None,
            }),
        });

        let token = has_async.then(|| {
            let token = CancellationToken::new();
            self.inner.state.lock().token = Some(token.clone());
            let party = RefreshParty::new(run.clone(), Phase::AsyncRefresh);
            run.context.spawn(move || {
                let hooks = party.run.hooks();
                let result = {
                    let _scope = RefreshScope::enter(party.run.message.id());
                    run_chain(Phase::AsyncRefresh, &hooks.async_refresh, |hook| {
                        hook(&party.run.message)
                    })
                };
                drop(hooks);
                party.arrive(resolve_chain(Phase::AsyncRefresh, result));
            });
            token
        });

        let party = RefreshParty::new(run.clone(), Phase::SyncRefresh);
        let hooks = run.hooks();
        let result = {
            let _scope = RefreshScope::enter(self.id());
            run_chain(Phase::SyncRefresh, &hooks.sync_refresh, |hook| hook(self))
        };
        drop(hooks);

        if has_sync {
            if let Some(token) = token {
                token.cancel();
                debug!(message_id = %self.id(), "Sync refresh finished, cancelling async unit");
            }
        }
        party.arrive(resolve_chain(Phase::SyncRefresh, result));

        Ok(completion)
    }

    fn begin(&self, operation: &'static str) -> DispatchResult<Completion> {
        let mut state = self.inner.state.lock();
        if state.in_flight.is_some() {
            return Err(self.in_flight_error(operation));
        }

        let completion = Completion::new();
        state.in_flight = Some(completion.clone());
        state.phase = RefreshPhase::Refreshing;
        state.last_failure = None;
        state.refreshes += 1;
        Ok(completion)
    }

    fn in_flight_error(&self, operation: &'static str) -> DispatchError {
        DispatchError::invalid_state(
            operation,
            format!("message {} already has a refresh in flight", self.id()),
        )
    }

    fn context(&self) -> DispatchResult<Arc<DispatchContext>> {
        if let Some(context) = self.inner.context.read().as_ref() {
            return Ok(context.clone());
        }
        DispatchContext::shared()
    }
}

impl<T, R> Attachable for Message<T, R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    type Hook = MessageHook<T, R>;

    fn phases() -> &'static [Phase] {
        &Phase::MESSAGE_PHASES
    }

    fn attach(&self, hooks: Vec<MessageHook<T, R>>, context: Arc<DispatchContext>) {
        self.inner.hooks.lock().attach(hooks);
        *self.inner.context.write() = Some(context);
    }

    fn target_name() -> &'static str {
        type_name::<T>()
    }
}

impl<T, R> fmt::Debug for Message<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Message")
            .field("id", &self.inner.id)
            .field("type", &type_name::<T>())
            .field("phase", &state.phase)
            .field("refreshes", &state.refreshes)
            .finish()
    }
}

/// Countdown over the sync side and (optionally) the async side
struct RefreshJoin {
    remaining: usize,
    failure: Option<HandlerFailure>,
}

/// Shared state of one refresh; the last side to arrive finalizes it
struct RefreshRun<T, R> {
    message: Message<T, R>,
    context: Arc<DispatchContext>,
    /// Emptied on finalize so waiters never see subscribers kept alive by this run
    hooks: Mutex<Arc<MessageHookSet<T, R>>>,
    generation: u64,
    completion: Completion,
    join: Mutex<RefreshJoin>,
}

impl<T, R> RefreshRun<T, R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn hooks(&self) -> Arc<MessageHookSet<T, R>> {
        self.hooks.lock().clone()
    }

    fn arrive(self: &Arc<Self>, resolution: Resolution) {
        let failure = {
            let mut join = self.join.lock();
            if join.failure.is_none() {
                join.failure = resolution.failure().cloned();
            }
            join.remaining -= 1;
            if join.remaining > 0 {
                return;
            }
            join.failure.take()
        };
        self.finalize(failure);
    }

    fn finalize(self: &Arc<Self>, failure: Option<HandlerFailure>) {
        {
            let mut state = self.message.inner.state.lock();
            state.phase = RefreshPhase::Delivering;
            state.token = None;
        }

        let message = self.message.clone();
        let hooks = std::mem::take(&mut *self.hooks.lock());
        let result = message.result();
        let delivered_failure = failure.clone();
        let delivery = panic::catch_unwind(AssertUnwindSafe(|| {
            self.context.deliver(Box::new(move || {
                let _scope = RefreshScope::enter(message.id());
                notify_all(
                    Phase::DataRefreshed,
                    type_name::<T>(),
                    message.id(),
                    &hooks.data_refreshed,
                    |hook| hook(&message, result.as_ref(), delivered_failure.as_ref()),
                );
            }));
        }));
        if delivery.is_err() {
            warn!(message_id = %self.message.id(), "Affinity executor panicked delivering DataRefreshed");
        }

        self.message.inner.hooks.lock().release_attached(self.generation);
        {
            let mut state = self.message.inner.state.lock();
            state.phase = RefreshPhase::Idle;
            state.in_flight = None;
            state.last_failure = failure.clone();
        }
        self.completion.release();

        let details = failure.as_ref().map(ToString::to_string);
        log_lifecycle_operation(
            "refresh",
            type_name::<T>(),
            self.message.id(),
            &Phase::DataRefreshed.to_string(),
            if failure.is_some() { "failed" } else { "refreshed" },
            details.as_deref(),
        );
    }
}

thread_local! {
    static ACTIVE_REFRESHES: RefCell<Vec<Uuid>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as running handlers of one message's refresh
struct RefreshScope {
    message_id: Uuid,
}

impl RefreshScope {
    fn enter(message_id: Uuid) -> Self {
        ACTIVE_REFRESHES.with(|active| active.borrow_mut().push(message_id));
        Self { message_id }
    }

    fn is_active(message_id: Uuid) -> bool {
        ACTIVE_REFRESHES.with(|active| active.borrow().contains(&message_id))
    }
}

impl Drop for RefreshScope {
    fn drop(&mut self) {
        ACTIVE_REFRESHES.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(position) = active.iter().rposition(|id| *id == self.message_id) {
                active.remove(position);
            }
        });
    }
}

/// One side of a refresh; arrives with `Silent` if dropped without reporting
struct RefreshParty<T, R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    run: Arc<RefreshRun<T, R>>,
    phase: Phase,
    arrived: bool,
}

impl<T, R> RefreshParty<T, R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn new(run: Arc<RefreshRun<T, R>>, phase: Phase) -> Self {
        Self {
            run,
            phase,
            arrived: false,
        }
    }

    fn arrive(mut self, resolution: Resolution) {
        self.arrived = true;
        if let Resolution::Failed(failure) = &resolution {
            debug!(
                message_id = %self.run.message.id(),
                phase = %self.phase,
                error = %failure,
                "Refresh side failed"
            );
        }
        self.run.arrive(resolution);
    }
}

impl<T, R> Drop for RefreshParty<T, R>
where
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.arrived {
            warn!(
                message_id = %self.run.message.id(),
                phase = %self.phase,
                "Refresh unit dropped before it reported; finishing without outcome"
            );
            self.run.arrive(Resolution::Silent);
        }
    }
}
