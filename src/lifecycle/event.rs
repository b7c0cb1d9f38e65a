//! # Event Lifecycle
//!
//! Drives one event instance through
//! `Idle → Preparing → Executing → (Succeeded | Failed) → Completed → Idle`.
//!
//! ```text
//! trigger() ─► Prepare handlers (caller thread, in order)
//!                 │ error / cancel ──────────────────────────┐
//!                 ▼                                          │
//!              Execute handlers (one worker unit)            │
//!                 │ ok / error / cancel                      │
//!                 ▼                                          ▼
//!              classify ─► Success | Error | (silent) ─► Complete ─► Idle
//!                          └──────── affinity executor ────────┘
//! ```
//!
//! Only one trigger may be in flight per instance. Complete is delivered
//! exactly once per trigger from a drop guard, so it runs even when outcome
//! delivery itself fails.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::type_name;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::states::{LifecyclePhase, Phase};
use crate::error::{CancelOutcome, DispatchError, DispatchResult, HandlerResult, Resolution};
use crate::execution::{notify_all, resolve_chain, run_chain, Completion, DispatchContext};
use crate::logging::log_lifecycle_operation;
use crate::registry::hooks::{Attachable, EventHook, EventHookSet, HookSlots};

/// A triggerable event carrying a payload of type `T`
///
/// `Event` is a cheap handle; clones refer to the same instance.
pub struct Event<T> {
    inner: Arc<EventInner<T>>,
}

struct EventInner<T> {
    id: Uuid,
    payload: RwLock<T>,
    state: Mutex<EventState>,
    hooks: Mutex<HookSlots<EventHookSet<T>>>,
    context: RwLock<Option<Arc<DispatchContext>>>,
}

#[derive(Default)]
struct EventState {
    phase: LifecyclePhase,
    /// Tri-state outcome of the latest trigger; `None` while unresolved or silent
    succeeded: Option<bool>,
    token: Option<CancellationToken>,
    in_flight: Option<Completion>,
    last: Option<Completion>,
    triggers: u64,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Event<T> {
    pub fn new(payload: T) -> Self {
        Self {
            inner: Arc::new(EventInner {
                id: Uuid::new_v4(),
                payload: RwLock::new(payload),
                state: Mutex::new(EventState::default()),
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

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.state.lock().phase
    }

    /// Outcome of the latest trigger: `Some(true)` success, `Some(false)`
    /// failure, `None` when unresolved or silently cancelled
    pub fn succeeded(&self) -> Option<bool> {
        self.inner.state.lock().succeeded
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// Number of triggers accepted over the instance's lifetime
    pub fn trigger_count(&self) -> u64 {
        self.inner.state.lock().triggers
    }

    /// Add a handler that stays on this instance across triggers
    pub fn subscribe(&self, hook: EventHook<T>) {
        self.inner.hooks.lock().subscribe(hook);
    }

    /// Token of the running Execute unit, if any
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

    /// For Execute handlers: short-circuit with `outcome` once abort was requested
    ///
    /// ```rust,no_run
    /// # use phase_dispatch::{CancelOutcome, EventHook};
    /// let hook = EventHook::<Vec<u8>>::execute(|event| {
    ///     for _chunk in 0..64 {
    ///         event.ensure_not_aborted(CancelOutcome::Silent)?;
    ///         // process chunk
    ///     }
    ///     Ok(())
    /// });
    /// ```
    pub fn ensure_not_aborted(&self, outcome: CancelOutcome) -> HandlerResult {
        if self.is_abort_requested() {
            Err(outcome.into())
        } else {
            Ok(())
        }
    }

    /// Start the lifecycle
    ///
    /// Prepare handlers run before this returns; Execute handlers are
    /// scheduled on a worker and the call returns without waiting for them.
    /// Fails with `InvalidState` while a previous trigger is in flight.
    pub fn trigger(&self) -> DispatchResult<Completion> {
        self.trigger_with(|_| {})
    }

    /// Trigger, running `prepare` only once this caller owns the flight
    ///
    /// A caller rejected with `InvalidState` never runs `prepare`, so it
    /// cannot replace the hooks attached for the running lifecycle.
    pub(crate) fn trigger_with<F>(&self, prepare: F) -> DispatchResult<Completion>
    where
        F: FnOnce(&Self),
    {
        let completion = self.begin()?;
        prepare(self);
        let context = match self.context() {
            Ok(context) => context,
            Err(e) => {
                self.abandon(&completion);
                return Err(e);
            }
        };
        let (hooks, generation) = self.inner.hooks.lock().snapshot();

        let run = TriggerRun {
            event: self.clone(),
            context,
            hooks,
            generation,
            completion: completion.clone(),
            resolved: false,
        };

        if let Err(stop) = run_chain(Phase::Prepare, &run.hooks.prepare, |hook| hook(self)) {
            let resolution = resolve_chain(Phase::Prepare, Err(stop));
            debug!(
                event_id = %self.id(),
                event_type = %type_name::<T>(),
                success = ?resolution.success_flag(),
                "Prepare short-circuited the lifecycle"
            );
            run.finish(resolution);
            return Ok(completion);
        }

        if run.hooks.execute.is_empty() {
            run.finish(Resolution::Succeeded);
            return Ok(completion);
        }

        let token = CancellationToken::new();
        {
            let mut state = self.inner.state.lock();
            state.token = Some(token);
            state.phase = LifecyclePhase::Executing;
        }

        debug!(
            event_id = %self.id(),
            event_type = %type_name::<T>(),
            handlers = run.hooks.execute.len(),
            "Scheduling execute unit"
        );

        let context = run.context.clone();
        context.spawn(move || {
            let result = run_chain(Phase::Execute, &run.hooks.execute, |hook| hook(&run.event));
            run.finish(resolve_chain(Phase::Execute, result));
        });

        Ok(completion)
    }

    /// Request cooperative cancellation of the running Execute unit
    pub fn abort(&self) -> DispatchResult<()> {
        let state = self.inner.state.lock();
        match (&state.token, state.phase) {
            (Some(token), LifecyclePhase::Executing) => {
                token.cancel();
                debug!(event_id = %self.id(), "Abort requested");
                Ok(())
            }
            (_, phase) => Err(DispatchError::invalid_state(
                "abort",
                format!("event {} is {phase}, not executing", self.id()),
            )),
        }
    }

    /// Block until Complete handlers of the latest trigger have run
    ///
    /// Fails with `InvalidState` if the instance was never triggered. Returns
    /// immediately when the latest trigger already completed.
    pub fn wait(&self) -> DispatchResult<()> {
        self.latest_completion("wait")?.wait();
        Ok(())
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`; returns whether
    /// the trigger completed
    pub fn wait_timeout(&self, timeout: Duration) -> DispatchResult<bool> {
        Ok(self.latest_completion("wait")?.wait_timeout(timeout))
    }

    fn latest_completion(&self, operation: &'static str) -> DispatchResult<Completion> {
        let state = self.inner.state.lock();
        state
            .in_flight
            .clone()
            .or_else(|| state.last.clone())
            .ok_or_else(|| {
                DispatchError::invalid_state(
                    operation,
                    format!("event {} has never been triggered", self.id()),
                )
            })
    }

    fn begin(&self) -> DispatchResult<Completion> {
        let mut state = self.inner.state.lock();
        if state.in_flight.is_some() {
            return Err(DispatchError::invalid_state(
                "trigger",
                format!("event {} is already in flight ({})", self.id(), state.phase),
            ));
        }

        let completion = Completion::new();
        state.in_flight = Some(completion.clone());
        state.last = Some(completion.clone());
        state.phase = LifecyclePhase::Preparing;
        state.succeeded = None;
        state.triggers += 1;
        Ok(completion)
    }

    /// Undo `begin` for a trigger that could not start
    fn abandon(&self, completion: &Completion) {
        {
            let mut state = self.inner.state.lock();
            state.in_flight = None;
            state.phase = LifecyclePhase::Idle;
        }
        completion.release();
    }

    fn context(&self) -> DispatchResult<Arc<DispatchContext>> {
        if let Some(context) = self.inner.context.read().as_ref() {
            return Ok(context.clone());
        }
        DispatchContext::shared()
    }

    fn set_phase(&self, phase: LifecyclePhase) {
        self.inner.state.lock().phase = phase;
    }
}

impl<T: Send + Sync + 'static> Attachable for Event<T> {
    type Hook = EventHook<T>;

    fn phases() -> &'static [Phase] {
        &Phase::EVENT_PHASES
    }

    fn attach(&self, hooks: Vec<EventHook<T>>, context: Arc<DispatchContext>) {
        self.inner.hooks.lock().attach(hooks);
        *self.inner.context.write() = Some(context);
    }

    fn target_name() -> &'static str {
        type_name::<T>()
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Event")
            .field("id", &self.inner.id)
            .field("type", &type_name::<T>())
            .field("phase", &state.phase)
            .field("succeeded", &state.succeeded)
            .field("triggers", &state.triggers)
            .finish()
    }
}

/// State carried from `trigger` to the end of one lifecycle
///
/// Dropping it delivers Complete and returns the instance to idle, whether or
/// not an outcome was delivered first.
struct TriggerRun<T: Send + Sync + 'static> {
    event: Event<T>,
    context: Arc<DispatchContext>,
    hooks: Arc<EventHookSet<T>>,
    generation: u64,
    completion: Completion,
    resolved: bool,
}

impl<T: Send + Sync + 'static> TriggerRun<T> {
    /// Deliver the outcome phase, then Complete (via drop)
    fn finish(mut self, resolution: Resolution) {
        self.resolved = true;
        {
            let mut state = self.event.inner.state.lock();
            state.token = None;
            state.succeeded = resolution.success_flag();
            state.phase = match resolution {
                Resolution::Succeeded => LifecyclePhase::Succeeded,
                Resolution::Failed(_) => LifecyclePhase::Failed,
                Resolution::Silent => LifecyclePhase::Completed,
            };
        }

        let event = self.event.clone();
        let hooks = self.hooks.clone();
        match resolution {
            Resolution::Succeeded => self.context.deliver(Box::new(move || {
                notify_all(Phase::Success, type_name::<T>(), event.id(), &hooks.success, |hook| {
                    hook(&event)
                });
            })),
            Resolution::Failed(failure) => {
                debug!(
                    event_id = %event.id(),
                    event_type = %type_name::<T>(),
                    error = %failure,
                    "Event failed"
                );
                self.context.deliver(Box::new(move || {
                    notify_all(Phase::Error, type_name::<T>(), event.id(), &hooks.error, |hook| {
                        hook(&event, &failure)
                    });
                }))
            }
            Resolution::Silent => {
                debug!(event_id = %event.id(), "Silent cancellation, skipping outcome handlers");
            }
        }
    }
}

impl<T: Send + Sync + 'static> Drop for TriggerRun<T> {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(
                event_id = %self.event.id(),
                event_type = %type_name::<T>(),
                "Execute unit dropped before it ran; completing without outcome"
            );
            let mut state = self.event.inner.state.lock();
            state.token = None;
            state.succeeded = None;
        }

        self.event.set_phase(LifecyclePhase::Completed);
        let event = self.event.clone();
        // The snapshot must be gone before waiters wake, or it keeps dynamic
        // subscribers alive past the lifecycle.
        let hooks = std::mem::take(&mut self.hooks);
        let delivery = panic::catch_unwind(AssertUnwindSafe(|| {
            self.context.deliver(Box::new(move || {
                notify_all(Phase::Complete, type_name::<T>(), event.id(), &hooks.complete, |hook| {
                    hook(&event)
                });
            }));
        }));
        if delivery.is_err() {
            warn!(event_id = %self.event.id(), "Affinity executor panicked delivering Complete");
        }

        self.event.inner.hooks.lock().release_attached(self.generation);
        let succeeded = {
            let mut state = self.event.inner.state.lock();
            state.phase = LifecyclePhase::Idle;
            state.token = None;
            state.in_flight = None;
            state.succeeded
        };
        self.completion.release();

        let status = match succeeded {
            Some(true) => "succeeded",
            Some(false) => "failed",
            None => "silent",
        };
        log_lifecycle_operation(
            "trigger",
            type_name::<T>(),
            self.event.id(),
            &LifecyclePhase::Completed.to_string(),
            status,
            None,
        );
    }
}
