//! # Execution Infrastructure
//!
//! Where handler work runs and how callers observe that it finished.
//!
//! - [`WorkerPool`]: tokio-backed pool running Execute and async refresh units
//! - [`Completion`]: one-shot latch released after the final phase delivery
//! - [`DispatchContext`]: worker pool + affinity executor bound to instances
//! - [`guarded`]: panic-safe handler invocation used by every phase

pub mod completion;
pub mod context;
pub mod worker_pool;

pub use completion::Completion;
pub use context::DispatchContext;
pub use worker_pool::WorkerPool;

use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{HandlerError, HandlerFailure, HandlerResult, Resolution};
use crate::lifecycle::states::Phase;

/// Outcome of a single guarded handler call
pub(crate) enum Guarded {
    Returned(HandlerResult),
    Panicked(HandlerFailure),
}

/// Invoke a handler, converting a panic into a `HandlerFailure`
pub(crate) fn guarded<F>(phase: Phase, call: F) -> Guarded
where
    F: FnOnce() -> HandlerResult,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => Guarded::Returned(result),
        Err(panic) => Guarded::Panicked(HandlerFailure::from_panic(phase, panic)),
    }
}

/// Run handlers in order, stopping at the first error or cancellation
pub(crate) fn run_chain<H, F>(phase: Phase, handlers: &[H], mut call: F) -> Result<(), ChainBreak>
where
    F: FnMut(&H) -> HandlerResult,
{
    for handler in handlers {
        match guarded(phase, || call(handler)) {
            Guarded::Returned(Ok(())) => {}
            Guarded::Returned(Err(error)) => return Err(ChainBreak::Error(error)),
            Guarded::Panicked(failure) => return Err(ChainBreak::Panicked(failure)),
        }
    }
    Ok(())
}

/// Why a handler chain stopped early
#[derive(Debug)]
pub(crate) enum ChainBreak {
    Error(HandlerError),
    Panicked(HandlerFailure),
}

/// Classify a stopped (or finished) handler chain
pub(crate) fn resolve_chain(phase: Phase, result: Result<(), ChainBreak>) -> Resolution {
    match result {
        Ok(()) => Resolution::Succeeded,
        Err(ChainBreak::Error(error)) => Resolution::classify(phase, Err(error)),
        Err(ChainBreak::Panicked(failure)) => Resolution::Failed(failure),
    }
}

/// Run every delivered handler of a phase; failures are logged, never propagated
pub(crate) fn notify_all<H, F>(phase: Phase, target: &str, instance_id: Uuid, handlers: &[H], mut call: F)
where
    F: FnMut(&H) -> HandlerResult,
{
    for (handler_index, handler) in handlers.iter().enumerate() {
        match guarded(phase, || call(handler)) {
            Guarded::Returned(Ok(())) => {}
            Guarded::Returned(Err(HandlerError::Cancelled(outcome))) => {
                debug!(
                    instance_id = %instance_id,
                    target = %target,
                    phase = %phase,
                    handler_index = handler_index,
                    outcome = %outcome,
                    "Cancel outcome ignored in delivered phase"
                );
            }
            Guarded::Returned(Err(HandlerError::Failed(err))) => {
                error!(
                    instance_id = %instance_id,
                    target = %target,
                    phase = %phase,
                    handler_index = handler_index,
                    error = %err,
                    "Delivered handler failed"
                );
            }
            Guarded::Panicked(failure) => {
                error!(
                    instance_id = %instance_id,
                    target = %target,
                    phase = %phase,
                    handler_index = handler_index,
                    error = %failure,
                    "Delivered handler panicked"
                );
            }
        }
    }
}
