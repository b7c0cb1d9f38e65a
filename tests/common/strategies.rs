use phase_dispatch::{CancelOutcome, HandlerError, HandlerResult};
use proptest::prelude::*;

/// What an Execute handler does when it runs
#[derive(Debug, Clone)]
pub enum ExecuteBehavior {
    Complete,
    Fail(String),
    Cancel(CancelOutcome),
}

impl ExecuteBehavior {
    pub fn run(&self) -> HandlerResult {
        match self {
            Self::Complete => Ok(()),
            Self::Fail(message) => Err(HandlerError::msg(message.clone())),
            Self::Cancel(outcome) => Err(outcome.clone().into()),
        }
    }

    /// Expected (success, error) deliveries for this behavior
    pub fn expected_outcome(&self) -> (usize, usize) {
        match self {
            Self::Complete | Self::Cancel(CancelOutcome::ResolvedSuccess) => (1, 0),
            Self::Cancel(CancelOutcome::Silent) => (0, 0),
            Self::Fail(_) | Self::Cancel(CancelOutcome::ResolvedFailure { .. }) => (0, 1),
        }
    }
}

/// Strategy for generating cancel outcomes
pub fn cancel_outcome_strategy() -> impl Strategy<Value = CancelOutcome> {
    prop_oneof![
        Just(CancelOutcome::Silent),
        Just(CancelOutcome::ResolvedSuccess),
        "[a-z ]{1,24}".prop_map(|reason| CancelOutcome::resolved_failure(reason)),
    ]
}

/// Strategy for generating Execute handler behaviors
pub fn execute_behavior_strategy() -> impl Strategy<Value = ExecuteBehavior> {
    prop_oneof![
        Just(ExecuteBehavior::Complete),
        "[a-z ]{1,24}".prop_map(ExecuteBehavior::Fail),
        cancel_outcome_strategy().prop_map(ExecuteBehavior::Cancel),
    ]
}
