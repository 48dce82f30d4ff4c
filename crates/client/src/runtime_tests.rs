// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn wait_until(pred: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn schedule_returns_the_task_result() -> anyhow::Result<()> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    let result = runtime.handle().schedule(async { Ok(21 * 2) }).wait();
    assert_eq!(result, Ok(42));
    runtime.stop();
    Ok(())
}

#[test]
fn schedule_after_stop_is_cancelled() -> anyhow::Result<()> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    runtime.stop();
    let result = runtime.handle().schedule(async { Ok(1) }).wait();
    assert_eq!(result, Err(ClientError::Cancelled));
    Ok(())
}

#[test]
fn stop_is_idempotent() -> anyhow::Result<()> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    runtime.stop();
    runtime.stop();
    assert!(!runtime.handle().is_running());
    Ok(())
}

#[test]
fn pending_tasks_are_cancelled_on_stop() -> anyhow::Result<()> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    let handle = runtime.handle().schedule(async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    });
    runtime.stop();
    assert_eq!(handle.wait(), Err(ClientError::Cancelled));
    Ok(())
}

#[test]
fn spawn_blocking_runs_off_loop() -> anyhow::Result<()> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    let off_loop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&off_loop);
    let handle = runtime.handle().clone();
    runtime.handle().spawn_blocking(move || {
        flag.store(!handle.on_loop_thread(), Ordering::SeqCst);
    });
    assert!(wait_until(|| off_loop.load(Ordering::SeqCst)));
    runtime.stop();
    Ok(())
}

#[test]
fn error_policy_callback_receives_task_errors() -> anyhow::Result<()> {
    let seen: Arc<Mutex<Vec<ClientError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let policy = ErrorPolicy {
        terminate_on_error: false,
        on_error: Some(Arc::new(move |err| sink.lock().push(err))),
    };
    let runtime = Runtime::start(policy)?;
    runtime.handle().spawn(async { Err(ClientError::NotOpen) });
    assert!(wait_until(|| !seen.lock().is_empty()));
    assert_eq!(seen.lock().first(), Some(&ClientError::NotOpen));
    runtime.stop();
    Ok(())
}

#[test]
fn wait_inside_async_context_is_rejected() -> anyhow::Result<()> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    let handle = runtime.handle().clone();
    let result = runtime
        .handle()
        .schedule(async move {
            // A blocking wait issued from the loop itself must be refused.
            handle.schedule(async { Ok(()) }).wait()
        })
        .wait();
    assert_eq!(result, Err(ClientError::BlockingOnLoop));
    runtime.stop();
    Ok(())
}
