//! Message refresh integration tests

mod common;

use common::*;
use parking_lot::Mutex;
use phase_dispatch::{CancelOutcome, HandlerFailure, Message, MessageHook, RefreshPhase};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

type Refreshed = Arc<Mutex<Vec<(Option<String>, Option<String>)>>>;

fn capture_refreshed(message: &Message<u32, String>) -> Refreshed {
    let seen: Refreshed = Arc::default();
    let sink = seen.clone();
    message.subscribe(MessageHook::<u32, String>::data_refreshed(
        move |_, result: Option<&String>, failure: Option<&HandlerFailure>| {
            sink.lock()
                .push((result.cloned(), failure.map(ToString::to_string)));
            Ok(())
        },
    ));
    seen
}

#[test]
fn test_request_waits_for_cancelled_async_path() {
    init_test_logging();
    let message: Message<u32, String> = Message::new(42);
    let async_finished = Arc::new(AtomicBool::new(false));

    message.subscribe(MessageHook::<u32, String>::sync_refresh(|msg| {
        msg.set_result(format!("sync-{}", *msg.payload()));
        Ok(())
    }));
    let finished = async_finished.clone();
    message.subscribe(MessageHook::<u32, String>::async_refresh(move |msg| {
        thread::sleep(Duration::from_millis(50));
        finished.store(true, Ordering::SeqCst);
        msg.ensure_not_aborted(CancelOutcome::Silent)?;
        msg.set_result("async".to_string());
        Ok(())
    }));
    let refreshed = capture_refreshed(&message);

    let result = message.request().unwrap();

    assert!(async_finished.load(Ordering::SeqCst), "request returned before async path");
    assert_eq!(result.as_deref(), Some("sync-42"));
    assert_eq!(*refreshed.lock(), vec![(Some("sync-42".to_string()), None)]);
    assert_eq!(message.phase(), RefreshPhase::Idle);
}

#[test]
fn test_last_writer_wins_when_async_ignores_cancellation() {
    let message: Message<u32, String> = Message::new(0);
    message.subscribe(MessageHook::<u32, String>::sync_refresh(|msg| {
        msg.set_result("sync".to_string());
        Ok(())
    }));
    message.subscribe(MessageHook::<u32, String>::async_refresh(|msg| {
        thread::sleep(Duration::from_millis(50));
        msg.set_result("async".to_string());
        Ok(())
    }));

    assert_eq!(message.request().unwrap().as_deref(), Some("async"));
}

#[test]
fn test_request_async_delivers_data_refreshed() {
    let message: Message<u32, String> = Message::new(7);
    let (release, gate) = crossbeam::channel::bounded::<()>(0);
    message.subscribe(MessageHook::<u32, String>::async_refresh(move |msg| {
        gate.recv_timeout(TIMEOUT).map_err(anyhow::Error::from)?;
        msg.set_result(format!("fresh-{}", *msg.payload()));
        Ok(())
    }));
    let refreshed = capture_refreshed(&message);

    let completion = message.request_async().unwrap();
    assert!(message.is_refreshing());
    assert!(message.request_async().unwrap_err().is_invalid_state());
    assert!(message.request().unwrap_err().is_invalid_state());
    assert!(refreshed.lock().is_empty());

    release.send(()).unwrap();
    assert!(completion.wait_timeout(TIMEOUT));
    assert_eq!(
        *refreshed.lock(),
        vec![(Some("fresh-7".to_string()), None)]
    );
    assert!(!message.is_refreshing());
    assert_eq!(message.refresh_count(), 1);
}

#[test]
fn test_abort_async_with_failure_classification() {
    let message: Message<u32, String> = Message::new(1);
    message.subscribe(MessageHook::<u32, String>::async_refresh(|msg| {
        for _ in 0..500 {
            msg.ensure_not_aborted(CancelOutcome::resolved_failure("cancelled by user"))?;
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }));
    let refreshed = capture_refreshed(&message);

    let completion = message.request_async().unwrap();
    message.abort().unwrap();
    assert!(completion.wait_timeout(TIMEOUT));

    assert_eq!(
        *refreshed.lock(),
        vec![(
            None,
            Some("async_refresh cancelled with failure: cancelled by user".to_string())
        )]
    );
    assert!(message.last_failure().is_some_and(|f| f.is_cancellation()));
    assert!(message.abort().unwrap_err().is_invalid_state());
}

#[test]
fn test_sync_failure_is_reported_to_data_refreshed() {
    let message: Message<u32, String> = Message::with_result(3, "stale".to_string());
    message.subscribe(MessageHook::<u32, String>::sync_refresh(|_| {
        Err(anyhow::anyhow!("cache offline").into())
    }));
    let refreshed = capture_refreshed(&message);

    assert_eq!(message.request().unwrap().as_deref(), Some("stale"));
    assert_eq!(
        *refreshed.lock(),
        vec![(
            Some("stale".to_string()),
            Some("sync_refresh handler failed: cache offline".to_string())
        )]
    );
}

#[test]
fn test_concurrent_requests_serialize() {
    let message: Message<u32, String> = Message::new(0);
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let (a, o) = (active.clone(), overlaps.clone());
    message.subscribe(MessageHook::<u32, String>::sync_refresh(move |msg| {
        if a.fetch_add(1, Ordering::SeqCst) > 0 {
            o.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(20));
        *msg.payload_mut() += 1;
        msg.set_result(msg.payload().to_string());
        a.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let message = message.clone();
            thread::spawn(move || message.request())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(message.refresh_count(), 4);
    assert_eq!(message.result().as_deref(), Some("4"));
}

#[test]
fn test_manager_attaches_registered_refresh_handlers() {
    let manager = test_manager();
    manager
        .registry()
        .register_static(MessageHook::<u32, String>::sync_refresh(|msg| {
            msg.set_result(format!("user-{}", *msg.payload()));
            Ok(())
        }));

    let message: Message<u32, String> = Message::new(9);
    assert_eq!(manager.request(&message).unwrap().as_deref(), Some("user-9"));

    let completion = manager.request_async(&message).unwrap();
    assert!(completion.is_complete());
    assert_eq!(message.take_result().as_deref(), Some("user-9"));
    assert_eq!(message.result(), None);
}

/// Runs `request` on its own thread so a hang fails the test instead of the run
fn request_with_watchdog(message: &Message<u32, String>) -> Option<String> {
    let (done, finished) = crossbeam::channel::bounded(1);
    let message = message.clone();
    thread::spawn(move || {
        let _ = done.send(message.request());
    });
    finished
        .recv_timeout(TIMEOUT)
        .expect("request never returned")
        .unwrap()
}

#[test]
fn test_request_from_data_refreshed_handler_is_rejected() {
    let message: Message<u32, String> = Message::new(5);
    message.subscribe(MessageHook::<u32, String>::sync_refresh(|msg| {
        msg.set_result("fresh".to_string());
        Ok(())
    }));
    let rejections = Arc::new(Mutex::new(Vec::new()));
    let sink = rejections.clone();
    message.subscribe(MessageHook::<u32, String>::data_refreshed(move |msg, _, _| {
        sink.lock().push((
            msg.request().is_err_and(|e| e.is_invalid_state()),
            msg.request_async().is_err_and(|e| e.is_invalid_state()),
        ));
        Ok(())
    }));

    assert_eq!(request_with_watchdog(&message).as_deref(), Some("fresh"));
    assert_eq!(*rejections.lock(), vec![(true, true)]);

    // Outside its own handlers the message is requestable again
    assert_eq!(request_with_watchdog(&message).as_deref(), Some("fresh"));
    assert_eq!(message.refresh_count(), 2);
}

#[test]
fn test_request_from_async_side_handlers_is_rejected() {
    let message: Message<u32, String> = Message::new(6);
    let rejections = Arc::new(AtomicUsize::new(0));

    let counter = rejections.clone();
    message.subscribe(MessageHook::<u32, String>::async_refresh(move |msg| {
        if msg.request().is_err_and(|e| e.is_invalid_state()) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        msg.set_result("async".to_string());
        Ok(())
    }));
    // Finalized by the worker after the caller is already waiting
    let counter = rejections.clone();
    message.subscribe(MessageHook::<u32, String>::data_refreshed(move |msg, _, _| {
        thread::sleep(Duration::from_millis(20));
        if msg.request().is_err_and(|e| e.is_invalid_state()) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }));

    assert_eq!(request_with_watchdog(&message).as_deref(), Some("async"));
    assert_eq!(rejections.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_manager_requests_serialize() {
    let manager = Arc::new(test_manager());
    manager
        .registry()
        .register_static(MessageHook::<u32, String>::sync_refresh(|msg| {
            thread::sleep(Duration::from_millis(100));
            *msg.payload_mut() += 1;
            msg.set_result(msg.payload().to_string());
            Ok(())
        }));

    let message: Message<u32, String> = Message::new(0);
    let first = {
        let (manager, message) = (manager.clone(), message.clone());
        thread::spawn(move || manager.request(&message))
    };
    thread::sleep(Duration::from_millis(30));
    let via_manager = {
        let (manager, message) = (manager.clone(), message.clone());
        thread::spawn(move || manager.request(&message))
    };

    assert!(first.join().unwrap().is_ok());
    assert!(via_manager.join().unwrap().is_ok());
    assert_eq!(message.refresh_count(), 2);
    assert_eq!(message.result().as_deref(), Some("2"));
    assert!(!message.is_refreshing());
}
