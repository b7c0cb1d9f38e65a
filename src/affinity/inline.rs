use super::{AffinityCallback, AffinityExecutor};

/// Passthrough executor: callbacks run on whichever thread dispatches them
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl AffinityExecutor for InlineExecutor {
    fn run_on_affinity_context(&self, callback: AffinityCallback) {
        callback();
    }

    fn name(&self) -> &str {
        "inline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_inline_runs_on_calling_thread() {
        let caller = std::thread::current().id();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        InlineExecutor.run_on_affinity_context(Box::new(move || {
            assert_eq!(std::thread::current().id(), caller);
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
