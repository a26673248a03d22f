//! Delivers a real SIGTERM to the test process.
//!
//! Kept in its own test binary so the signal cannot reach other tests.

#![cfg(unix)]

use app_lifecycle::signal::SIGTERM;
use app_lifecycle::{Engine, Hook, Lifecycle, ShutdownReason};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sigterm_triggers_graceful_shutdown() {
    let test_result = timeout(Duration::from_secs(5), async {
        let engine = Engine::builder().name("signalled").build().unwrap();
        let flushed = Arc::new(AtomicBool::new(false));
        let hook_flag = Arc::clone(&flushed);
        engine
            .lifecycle()
            .register(
                "flush",
                Hook::blocking(move || {
                    hook_flag.store(true, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        let status = Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        engine.wait().await;

        assert!(!engine.is_running());
        assert_eq!(engine.shutdown_reason(), Some(ShutdownReason::Signal(SIGTERM)));
        assert!(flushed.load(Ordering::SeqCst));
    })
    .await;

    assert!(test_result.is_ok(), "Test timed out after 5 seconds");
}
