#![allow(dead_code)]

pub mod recorder;
pub mod strategies;

pub use recorder::*;
pub use strategies::*;

use phase_dispatch::{
    init_structured_logging, AffinityConfig, AffinityMode, DispatchManager, DispatcherConfig,
    LoggingConfig,
};

/// Install test logging once; honours RUST_LOG
pub fn init_test_logging() {
    init_structured_logging(&LoggingConfig {
        level: Some("debug".to_string()),
        json: false,
    });
}

/// Manager with inline delivery and a small worker pool
pub fn test_manager() -> DispatchManager {
    init_test_logging();
    DispatchManager::new(DispatcherConfig::default()).expect("default manager")
}

/// Manager delivering outcome and completion handlers on a dedicated thread
pub fn threaded_manager() -> DispatchManager {
    init_test_logging();
    let config = DispatcherConfig {
        affinity: AffinityConfig {
            mode: AffinityMode::DedicatedThread,
            thread_name: "test-affinity".to_string(),
        },
        ..DispatcherConfig::default()
    };
    DispatchManager::new(config).expect("threaded manager")
}
