use parking_lot::Mutex;
use phase_dispatch::{EventHook, HandlerRegistry, Phase};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// One recorded handler invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub phase: Phase,
    pub thread: ThreadId,
    pub error: Option<String>,
}

/// Records which phases fired, on which thread, for one event type
#[derive(Debug, Clone, Default)]
pub struct PhaseRecorder {
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl PhaseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, phase: Phase, error: Option<String>) {
        self.calls.lock().push(Invocation {
            phase,
            thread: thread::current().id(),
            error,
        });
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.calls.lock().iter().filter(|c| c.phase == phase).count()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.calls.lock().iter().map(|c| c.phase).collect()
    }

    pub fn invocations(&self, phase: Phase) -> Vec<Invocation> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.phase == phase)
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.calls.lock().iter().filter_map(|c| c.error.clone()).collect()
    }

    /// Hooks recording Prepare, Error, Success and Complete
    pub fn observer_hooks<T: Send + Sync + 'static>(&self) -> Vec<EventHook<T>> {
        let prepare = self.clone();
        let error = self.clone();
        let success = self.clone();
        let complete = self.clone();
        vec![
            EventHook::prepare(move |_| {
                prepare.record(Phase::Prepare, None);
                Ok(())
            }),
            EventHook::error(move |_, failure| {
                error.record(Phase::Error, Some(failure.to_string()));
                Ok(())
            }),
            EventHook::success(move |_| {
                success.record(Phase::Success, None);
                Ok(())
            }),
            EventHook::complete(move |_| {
                complete.record(Phase::Complete, None);
                Ok(())
            }),
        ]
    }

    /// Execute hook recording its invocation before running `body`
    pub fn execute_hook<T, F>(&self, body: F) -> EventHook<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&phase_dispatch::Event<T>) -> phase_dispatch::HandlerResult + Send + Sync + 'static,
    {
        let recorder = self.clone();
        EventHook::execute(move |event| {
            recorder.record(Phase::Execute, None);
            body(event)
        })
    }

    /// Register the observer hooks statically
    pub fn register_observers<T: Send + Sync + 'static>(&self, registry: &HandlerRegistry) {
        for hook in self.observer_hooks::<T>() {
            registry.register_static(hook);
        }
    }
}
