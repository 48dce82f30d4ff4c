// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

use crate::runtime::{ErrorPolicy, Runtime};
use crate::test_support::{start_server, ScriptedServer, ServerScript};

async fn fixture() -> anyhow::Result<(Runtime, Arc<ConnectionPool>, ScriptedServer)> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    let pool = ConnectionPool::new(runtime.handle().clone());
    let server = start_server(ServerScript::new()).await?;
    Ok((runtime, pool, server))
}

async fn wait_for(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn one_transport_is_shared_per_host() -> anyhow::Result<()> {
    let (_runtime, pool, server) = fixture().await?;
    let host = server.host_uri().to_owned();

    let first = pool.open_downlink(&host).await?;
    let second = pool.open_downlink(&host).await?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(pool.downlink_count(&host).await, 2);
    assert_eq!(server.connections_accepted(), 1);
    Ok(())
}

#[tokio::test]
async fn transport_closes_when_the_count_reaches_zero() -> anyhow::Result<()> {
    let (_runtime, pool, server) = fixture().await?;
    let host = server.host_uri().to_owned();

    let connection = pool.open_downlink(&host).await?;
    pool.open_downlink(&host).await?;

    pool.close_downlink(&host).await;
    assert!(pool.get_connection(&host).await.is_some());

    pool.close_downlink(&host).await;
    assert!(pool.get_connection(&host).await.is_none());
    assert!(!connection.is_open());
    assert!(wait_for(|| server.connections_closed() == 1).await);
    Ok(())
}

#[tokio::test]
async fn dial_failure_surfaces_a_transport_error() -> anyhow::Result<()> {
    let runtime = Runtime::start(ErrorPolicy::default())?;
    let pool = ConnectionPool::new(runtime.handle().clone());
    let result = pool.open_downlink("ws://127.0.0.1:1").await;
    assert!(matches!(result, Err(ClientError::Transport(_))));
    assert_eq!(pool.downlink_count("ws://127.0.0.1:1").await, 0);
    Ok(())
}

#[tokio::test]
async fn send_command_reuses_the_pooled_connection() -> anyhow::Result<()> {
    let (_runtime, pool, server) = fixture().await?;
    let host = server.host_uri().to_owned();
    pool.open_downlink(&host).await?;

    pool.send_command(&host, "@command(node:n,lane:l)1".to_owned()).await?;
    assert!(wait_for(|| server.received().contains(&"@command(node:n,lane:l)1".to_owned())).await);
    assert_eq!(server.connections_accepted(), 1);
    Ok(())
}

#[tokio::test]
async fn send_command_opens_an_ephemeral_socket_when_unpooled() -> anyhow::Result<()> {
    let (_runtime, pool, server) = fixture().await?;
    let host = server.host_uri().to_owned();

    pool.send_command(&host, "@command(node:n,lane:l)2".to_owned()).await?;
    assert!(wait_for(|| server.received().contains(&"@command(node:n,lane:l)2".to_owned())).await);
    assert_eq!(server.connections_accepted(), 1);
    // The one-shot socket closes without joining the pool.
    assert!(pool.get_connection(&host).await.is_none());
    assert!(wait_for(|| server.connections_closed() == 1).await);
    Ok(())
}

#[tokio::test]
async fn close_all_drains_the_pool() -> anyhow::Result<()> {
    let (_runtime, pool, server) = fixture().await?;
    let host = server.host_uri().to_owned();
    pool.open_downlink(&host).await?;

    pool.close_all().await;
    assert!(pool.get_connection(&host).await.is_none());
    assert!(wait_for(|| server.connections_closed() == 1).await);
    Ok(())
}
