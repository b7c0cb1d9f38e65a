//! # Error Types
//!
//! Errors surfaced by the dispatcher fall into two families:
//!
//! - [`DispatchError`] is returned synchronously to callers of `trigger`,
//!   `abort`, `wait`, `request` and friends. It is never delivered to handlers.
//! - [`HandlerError`] is what phase handlers return. The lifecycle classifies it
//!   into a [`Resolution`]: plain failures become a [`HandlerFailure`] that is
//!   handed to Error / DataRefreshed handlers, and [`CancelOutcome`] values
//!   short-circuit the pipeline with an explicit terminal classification.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::lifecycle::states::Phase;

/// Errors returned directly to the caller of a dispatcher operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The instance is not in the phase the operation requires
    #[error("Invalid state for {operation}: {reason}")]
    InvalidState {
        operation: &'static str,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The worker pool could not be created
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// A handler discovery step failed during manager construction
    #[error("Discovery error in '{source_name}': {reason}")]
    Discovery { source_name: String, reason: String },
}

impl DispatchError {
    pub fn invalid_state(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            operation,
            reason: reason.into(),
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

impl From<ConfigurationError> for DispatchError {
    fn from(error: ConfigurationError) -> Self {
        DispatchError::Configuration(error.to_string())
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Intentional short-circuit signal raised by a phase handler
///
/// Returning a `CancelOutcome` stops the remaining handlers of the current
/// phase (and skips Execute when raised from Prepare) and picks the terminal
/// classification of the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Neither Success nor Error fires; only Complete runs
    Silent,
    /// Treated as a successful outcome
    ResolvedSuccess,
    /// Treated as a failure; Error handlers receive the reason
    ResolvedFailure { reason: String },
}

impl CancelOutcome {
    pub fn resolved_failure(reason: impl Into<String>) -> Self {
        Self::ResolvedFailure {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CancelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "silent"),
            Self::ResolvedSuccess => write!(f, "resolved_success"),
            Self::ResolvedFailure { reason } => write!(f, "resolved_failure: {reason}"),
        }
    }
}

/// Value returned by a phase handler that did not complete normally
///
/// Handlers can use `?` on `anyhow::Result` values, or return a
/// [`CancelOutcome`] via `Err(outcome.into())`.
#[derive(Debug)]
pub enum HandlerError {
    Cancelled(CancelOutcome),
    Failed(anyhow::Error),
}

impl HandlerError {
    /// Build a plain failure from a message
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Failed(anyhow::Error::msg(message))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled(outcome) => write!(f, "cancelled ({outcome})"),
            Self::Failed(error) => write!(f, "{error}"),
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> Self {
        Self::Failed(error)
    }
}

impl From<CancelOutcome> for HandlerError {
    fn from(outcome: CancelOutcome) -> Self {
        Self::Cancelled(outcome)
    }
}

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Failure value delivered to Error and DataRefreshed handlers
#[derive(Debug, Clone, Error)]
pub enum HandlerFailure {
    /// A handler returned an error
    #[error("{phase} handler failed: {error}")]
    Raised {
        phase: Phase,
        error: Arc<anyhow::Error>,
    },

    /// A handler panicked (caught at the lifecycle boundary)
    #[error("{phase} handler panicked: {message}")]
    Panicked { phase: Phase, message: String },

    /// A handler short-circuited with `CancelOutcome::ResolvedFailure`
    #[error("{phase} cancelled with failure: {reason}")]
    Cancelled { phase: Phase, reason: String },
}

impl HandlerFailure {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Raised { phase, .. } | Self::Panicked { phase, .. } | Self::Cancelled { phase, .. } => {
                *phase
            }
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub(crate) fn from_panic(phase: Phase, panic: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        Self::Panicked { phase, message }
    }
}

/// Terminal classification of a unit of handler work
#[derive(Debug, Clone)]
pub enum Resolution {
    Succeeded,
    Failed(HandlerFailure),
    /// Silent cancellation: no Success or Error delivery
    Silent,
}

impl Resolution {
    /// Classify the outcome of running the handlers of `phase`
    pub fn classify(phase: Phase, outcome: HandlerResult) -> Self {
        match outcome {
            Ok(()) => Self::Succeeded,
            Err(HandlerError::Cancelled(CancelOutcome::Silent)) => Self::Silent,
            Err(HandlerError::Cancelled(CancelOutcome::ResolvedSuccess)) => Self::Succeeded,
            Err(HandlerError::Cancelled(CancelOutcome::ResolvedFailure { reason })) => {
                Self::Failed(HandlerFailure::Cancelled { phase, reason })
            }
            Err(HandlerError::Failed(error)) => Self::Failed(HandlerFailure::Raised {
                phase,
                error: Arc::new(error),
            }),
        }
    }

    /// Tri-state success flag: `None` for silent outcomes
    pub fn success_flag(&self) -> Option<bool> {
        match self {
            Self::Succeeded => Some(true),
            Self::Failed(_) => Some(false),
            Self::Silent => None,
        }
    }

    pub fn failure(&self) -> Option<&HandlerFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_of_cancel_outcomes() {
        let silent = Resolution::classify(Phase::Execute, Err(CancelOutcome::Silent.into()));
        assert!(matches!(silent, Resolution::Silent));
        assert_eq!(silent.success_flag(), None);

        let success =
            Resolution::classify(Phase::Execute, Err(CancelOutcome::ResolvedSuccess.into()));
        assert!(matches!(success, Resolution::Succeeded));

        let failure = Resolution::classify(
            Phase::Prepare,
            Err(CancelOutcome::resolved_failure("quota exhausted").into()),
        );
        let failure = failure.failure().cloned().expect("failure classification");
        assert!(failure.is_cancellation());
        assert_eq!(failure.phase(), Phase::Prepare);
        assert_eq!(
            failure.to_string(),
            "prepare cancelled with failure: quota exhausted"
        );
    }

    #[test]
    fn test_plain_failure_keeps_source_message() {
        let resolution =
            Resolution::classify(Phase::Execute, Err(anyhow::anyhow!("disk full").into()));
        assert_eq!(resolution.success_flag(), Some(false));
        assert_eq!(
            resolution.failure().map(ToString::to_string).as_deref(),
            Some("execute handler failed: disk full")
        );
    }

    #[test]
    fn test_panic_payload_extraction() {
        let failure = HandlerFailure::from_panic(Phase::Success, Box::new("boom"));
        assert_eq!(failure.to_string(), "success handler panicked: boom");

        let failure = HandlerFailure::from_panic(Phase::Complete, Box::new(42_u8));
        assert_eq!(failure.to_string(), "complete handler panicked: Unknown panic");
    }

    #[test]
    fn test_dispatch_error_messages() {
        let err = DispatchError::invalid_state("abort", "event is not executing");
        assert!(err.is_invalid_state());
        assert_eq!(
            err.to_string(),
            "Invalid state for abort: event is not executing"
        );
    }
}
