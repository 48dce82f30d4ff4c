// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use warp_recon::DecodedValue;

use crate::downlink::manager::DownlinkManager;
use crate::runtime::{ErrorPolicy, Runtime};

fn address() -> DownlinkAddress {
    DownlinkAddress {
        host: "ws://127.0.0.1:9001".to_owned(),
        node: "a".to_owned(),
        lane: "b".to_owned(),
    }
}

fn fixture(
    kind: DownlinkKind,
) -> anyhow::Result<(Runtime, Arc<DownlinkManager>, mpsc::Receiver<String>)> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    let (outbound, outbound_rx) = mpsc::channel(8);
    let manager = DownlinkManager::new(kind, address(), outbound, runtime.handle().clone());
    Ok((runtime, manager, outbound_rx))
}

fn envelope(frame: &str) -> anyhow::Result<Envelope> {
    Envelope::parse(frame)?.ok_or_else(|| anyhow::anyhow!("not an envelope: {frame}"))
}

#[tokio::test]
async fn establish_sends_link_for_event_downlinks() -> anyhow::Result<()> {
    let (_runtime, manager, mut outbound) = fixture(DownlinkKind::Event)?;
    manager.model().establish().await?;
    assert_eq!(outbound.recv().await.as_deref(), Some("@link(node:a,lane:b)"));
    assert_eq!(manager.model().state(), DownlinkState::Linking);
    Ok(())
}

#[tokio::test]
async fn establish_sends_sync_for_value_downlinks() -> anyhow::Result<()> {
    let (_runtime, manager, mut outbound) = fixture(DownlinkKind::Value)?;
    manager.model().establish().await?;
    assert_eq!(outbound.recv().await.as_deref(), Some("@sync(node:a,lane:b)"));
    Ok(())
}

#[tokio::test]
async fn linked_enters_the_sync_branch_for_value_downlinks() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Value)?;
    let model = manager.model();
    model.establish().await?;

    let outcome = manager.receive_message(envelope("@linked(node:a,lane:b)")?).await;
    assert_eq!(outcome, ReceiveOutcome::Continue);
    assert!(model.is_linked());
    assert_eq!(model.state(), DownlinkState::Syncing);

    manager.receive_message(envelope("@synced(node:a,lane:b)")?).await;
    assert!(model.is_synced());
    assert_eq!(model.state(), DownlinkState::Synced);
    Ok(())
}

#[tokio::test]
async fn linked_is_steady_for_event_downlinks() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Event)?;
    manager.model().establish().await?;
    manager.receive_message(envelope("@linked(node:a,lane:b)")?).await;
    assert_eq!(manager.model().state(), DownlinkState::Linked);

    // A synced for an event downlink is a peer anomaly and changes nothing.
    manager.receive_message(envelope("@synced(node:a,lane:b)")?).await;
    assert_eq!(manager.model().state(), DownlinkState::Linked);
    assert!(!manager.model().is_synced());
    Ok(())
}

#[tokio::test]
async fn value_events_update_the_replica() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Value)?;
    let model = manager.model();
    manager.receive_message(envelope("@linked(node:a,lane:b)")?).await;

    manager.receive_message(envelope("@event(node:a,lane:b)42")?).await;
    assert_eq!(model.value_snapshot(), DecodedValue::Value(Value::Int(42)));

    manager.receive_message(envelope("@event(node:a,lane:b)\"on\"")?).await;
    assert_eq!(model.value_snapshot(), DecodedValue::Value(Value::text("on")));
    Ok(())
}

#[tokio::test]
async fn absent_event_body_resets_the_replica() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Value)?;
    manager.receive_message(envelope("@linked(node:a,lane:b)")?).await;
    manager.receive_message(envelope("@event(node:a,lane:b)7")?).await;
    manager.receive_message(envelope("@event(node:a,lane:b)")?).await;
    assert!(manager.model().value_snapshot().is_absent());
    Ok(())
}

#[tokio::test]
async fn map_updates_key_on_canonical_recon_identity() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Map)?;
    let model = manager.model();
    manager.receive_message(envelope("@linked(node:a,lane:b)")?).await;

    // The same key in two encodings lands on one entry.
    manager.receive_message(envelope("@event(node:a,lane:b)@update(key:\"k\")\"v1\"")?).await;
    manager.receive_message(envelope("@event(node:a,lane:b)@update(key:k)\"v2\"")?).await;

    let entries = model.map_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, DecodedValue::Value(Value::text("k")));
    assert_eq!(entries[0].1, DecodedValue::Value(Value::text("v2")));
    assert_eq!(model.map_get(&Value::text("k")), DecodedValue::Value(Value::text("v2")));
    Ok(())
}

#[tokio::test]
async fn map_remove_drops_the_entry() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Map)?;
    let model = manager.model();
    manager.receive_message(envelope("@linked(node:a,lane:b)")?).await;
    manager.receive_message(envelope("@event(node:a,lane:b)@update(key:42){name:\"a\"}")?).await;
    assert_eq!(model.map_entries().len(), 1);

    manager.receive_message(envelope("@event(node:a,lane:b)@remove(key:42)")?).await;
    assert!(model.map_entries().is_empty());
    assert!(model.map_get(&Value::Int(42)).is_absent());
    Ok(())
}

#[tokio::test]
async fn unlinked_with_lane_not_found_is_terminal() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Value)?;
    let model = manager.model();
    let outcome = manager.receive_message(envelope("@unlinked(node:a,lane:b)@laneNotFound")?).await;
    assert_eq!(outcome, ReceiveOutcome::Terminated);
    assert_eq!(model.state(), DownlinkState::Closed);
    assert_eq!(model.terminal_error(), Some(ClientError::LaneNotFound("b".to_owned())));
    Ok(())
}

#[tokio::test]
async fn plain_unlinked_closes_without_lane_error() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Value)?;
    let outcome = manager.receive_message(envelope("@unlinked(node:a,lane:b)")?).await;
    assert_eq!(outcome, ReceiveOutcome::Terminated);
    assert_eq!(manager.model().terminal_error(), Some(ClientError::Unlinked));
    Ok(())
}

#[tokio::test]
async fn waiters_wake_on_terminal_errors() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Value)?;
    let model = Arc::clone(manager.model());
    let waiter = tokio::spawn(async move { model.wait_synced().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    manager.receive_message(envelope("@unlinked(node:a,lane:b)@laneNotFound")?).await;
    let result = waiter.await?;
    assert_eq!(result, Err(ClientError::LaneNotFound("b".to_owned())));
    Ok(())
}

#[tokio::test]
async fn send_command_waits_for_the_link() -> anyhow::Result<()> {
    let (_runtime, manager, mut outbound) = fixture(DownlinkKind::Value)?;
    let model = Arc::clone(manager.model());
    let sender = tokio::spawn(async move { model.send_command(Value::Int(9)).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(outbound.try_recv().is_err(), "command must not be sent before linked");

    manager.receive_message(envelope("@linked(node:a,lane:b)")?).await;
    sender.await??;
    assert_eq!(outbound.recv().await.as_deref(), Some("@command(node:a,lane:b)9"));
    Ok(())
}

#[tokio::test]
async fn map_command_bodies_take_canonical_form() {
    let update = DownlinkModel::update_body(Value::Int(42), Value::text("a"));
    let envelope = Envelope::command("n", "l", update);
    assert_eq!(envelope.to_recon(), "@command(node:n,lane:l)@update(key:42)\"a\"");

    let remove = DownlinkModel::remove_body(Value::Int(42));
    let envelope = Envelope::command("n", "l", remove);
    assert_eq!(envelope.to_recon(), "@command(node:n,lane:l)@remove(key:42)");
}

#[tokio::test]
async fn strict_decode_failures_do_not_update_the_replica() -> anyhow::Result<()> {
    let (_runtime, manager, _outbound) = fixture(DownlinkKind::Value)?;
    manager.set_strict(true);
    manager.receive_message(envelope("@linked(node:a,lane:b)")?).await;
    manager.receive_message(envelope("@event(node:a,lane:b)@Unknown{x:1}")?).await;
    assert!(manager.model().value_snapshot().is_absent());
    Ok(())
}
