// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex as PlMutex;
use warp_recon::Value;

#[test]
fn start_and_stop_are_idempotent() -> anyhow::Result<()> {
    let client = WarpClient::new();
    assert!(!client.is_running());
    client.start()?;
    client.start()?;
    assert!(client.is_running());
    client.stop();
    client.stop();
    assert!(!client.is_running());
    Ok(())
}

#[test]
fn restart_after_stop_works() -> anyhow::Result<()> {
    let client = WarpClient::new();
    client.start()?;
    client.stop();
    client.start()?;
    assert!(client.is_running());
    client.stop();
    Ok(())
}

#[test]
fn command_requires_a_running_client() {
    let client = WarpClient::new();
    let result = client.command("ws://h:9001", "n", "l", Value::Int(1));
    assert_eq!(result, Err(ClientError::NotRunning));
}

#[test]
fn command_rejects_bad_host_schemes() -> anyhow::Result<()> {
    let client = WarpClient::new();
    client.start()?;
    let result = client.command("ftp://h", "n", "l", Value::Int(1));
    assert!(matches!(result, Err(ClientError::InvalidUri(_))));
    client.stop();
    Ok(())
}

#[test]
fn clones_share_the_runtime() -> anyhow::Result<()> {
    let client = WarpClient::new();
    let clone = client.clone();
    client.start()?;
    assert!(clone.is_running());
    clone.stop();
    assert!(!client.is_running());
    Ok(())
}

#[test]
fn command_errors_reach_the_error_policy() -> anyhow::Result<()> {
    let seen: std::sync::Arc<PlMutex<Vec<ClientError>>> =
        std::sync::Arc::new(PlMutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    let client = WarpClient::builder()
        .on_error(move |err| sink.lock().push(err))
        .build();
    client.start()?;

    // Nothing listens on this port; the send task fails and the policy
    // callback observes the transport error.
    client.command("ws://127.0.0.1:1", "n", "l", Value::Int(1))?;
    for _ in 0..500 {
        if !seen.lock().is_empty() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert!(
        matches!(seen.lock().first(), Some(ClientError::Transport(_))),
        "expected a transport error, got {:?}",
        seen.lock().first()
    );
    client.stop();
    Ok(())
}

#[test]
fn views_are_unopened_on_creation() {
    let client = WarpClient::new();
    assert!(!client.downlink_value().is_open());
    assert!(!client.downlink_map().is_open());
    assert!(!client.downlink_event().is_open());
}
