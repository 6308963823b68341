//! Connection Lifecycle Integration Tests
//!
//! Drives the streaming client through connects, drops, reconnects and
//! shutdown over an in-memory transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use quote_stream::{
    ConnectionEvent, ConnectionState, ReconnectionConfig, StreamingClient, StreamingConfig,
    StreamingError,
};
use support::{ScriptedTransport, events_until, fast_config, next_event};

fn subscribe_msg(symbols: &[&str]) -> String {
    serde_json::json!({ "subscribe": symbols }).to_string()
}

#[tokio::test]
async fn replays_full_set_after_reconnect() {
    let transport = ScriptedTransport::new();
    let client = StreamingClient::with_transport(fast_config(5), transport.as_transport()).unwrap();
    let mut events = client.events();

    client.subscribe(["AAPL", "googl"]).await.unwrap();
    let first = transport.session(0).await;
    assert_eq!(first.sent(), vec![subscribe_msg(&["AAPL", "GOOGL"])]);

    first.reset();
    let seen = events_until(&mut events, |e| {
        matches!(e, ConnectionEvent::Reconnecting { .. })
    })
    .await;
    assert!(seen.contains(&ConnectionEvent::Disconnected {
        reason: "receive failed: connection reset".to_string()
    }));

    let second = transport.session(1).await;
    assert_eq!(
        second.wait_for_sent(1).await,
        vec![subscribe_msg(&["AAPL", "GOOGL"])]
    );
    assert_eq!(
        client.subscribed_symbols().into_iter().collect::<Vec<_>>(),
        vec!["AAPL", "GOOGL"]
    );
}

#[tokio::test]
async fn changes_during_outage_are_replayed() {
    let transport = ScriptedTransport::new();
    let config = StreamingConfig {
        reconnection: ReconnectionConfig {
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_millis(300),
            ..fast_config(5).reconnection
        },
        ..fast_config(5)
    };
    let client = StreamingClient::with_transport(config, transport.as_transport()).unwrap();
    let mut events = client.events();

    client.subscribe(["AAPL", "GOOGL"]).await.unwrap();
    let first = transport.session(0).await;

    first.reset();
    events_until(&mut events, |e| {
        matches!(e, ConnectionEvent::Reconnecting { attempt: 1 })
    })
    .await;
    assert_eq!(client.state(), ConnectionState::Reconnecting { attempt: 1 });

    client.subscribe(["MSFT"]).await.unwrap();
    client.unsubscribe(["AAPL"]).await;
    assert_eq!(first.sent().len(), 1, "nothing is written to a dead session");

    let second = transport.session(1).await;
    assert_eq!(
        second.wait_for_sent(1).await,
        vec![subscribe_msg(&["GOOGL", "MSFT"])]
    );
}

#[tokio::test]
async fn malformed_frame_does_not_drop_connection() {
    let transport = ScriptedTransport::new();
    let client = StreamingClient::with_transport(fast_config(5), transport.as_transport()).unwrap();
    let mut events = client.events();
    let mut prices = client.prices();

    client.subscribe(["AAPL"]).await.unwrap();
    let server = transport.session(0).await;

    server.push_record(&support::tick("AAPL", 190.0));
    server.push_text(r#"{"type":"pricing","message":"%%% definitely not base64 %%%"}"#);
    server.push_record(&support::tick("AAPL", 191.0));

    let first = tokio::time::timeout(support::WAIT, prices.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(support::WAIT, prices.recv()).await.unwrap().unwrap();
    assert!((first.price - 190.0).abs() < 1e-6);
    assert!((second.price - 191.0).abs() < 1e-6);

    let seen = events_until(&mut events, |e| matches!(e, ConnectionEvent::Error { .. })).await;
    let errors: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, ConnectionEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(!errors[0].is_fatal());

    assert!(client.is_connected());
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn exhaustion_emits_single_fatal_error() {
    let transport = ScriptedTransport::new();
    let client = StreamingClient::with_transport(fast_config(2), transport.as_transport()).unwrap();
    let mut events = client.events();

    client.connect().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    transport.set_refuse(true);
    transport.session(0).await.reset();

    let seen = events_until(&mut events, ConnectionEvent::is_fatal).await;

    assert!(matches!(seen[0], ConnectionEvent::Disconnected { .. }));
    let attempts: Vec<u32> = seen
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::Reconnecting { attempt } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);
    assert_eq!(seen.iter().filter(|e| e.is_fatal()).count(), 1);
    assert_eq!(client.state(), ConnectionState::Closed);

    // One initial connect plus two retries, then nothing more.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.attempts(), 3);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn connect_after_exhaustion_starts_fresh() {
    let transport = ScriptedTransport::new();
    let client = StreamingClient::with_transport(fast_config(1), transport.as_transport()).unwrap();
    let mut events = client.events();

    client.subscribe(["AAPL"]).await.unwrap();
    transport.set_refuse(true);
    transport.session(0).await.reset();
    events_until(&mut events, ConnectionEvent::is_fatal).await;
    assert_eq!(client.state(), ConnectionState::Closed);

    transport.set_refuse(false);
    client.connect().await.unwrap();
    assert!(client.is_connected());

    let replay = transport.session(1).await;
    assert_eq!(replay.wait_for_sent(1).await, vec![subscribe_msg(&["AAPL"])]);
}

#[tokio::test]
async fn failed_initial_connect_is_reported_and_not_retried() {
    let transport = ScriptedTransport::new();
    transport.set_refuse(true);
    let client = StreamingClient::with_transport(fast_config(3), transport.as_transport()).unwrap();

    let err = client.subscribe(["AAPL"]).await.unwrap_err();
    assert!(matches!(err, StreamingError::ConnectionFailed(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.subscribed_symbols().contains("AAPL"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn hung_handshake_times_out() {
    let transport = ScriptedTransport::new();
    transport.set_hang(true);
    let config = StreamingConfig {
        connect_timeout: Duration::from_millis(50),
        ..fast_config(3)
    };
    let client = StreamingClient::with_transport(config, transport.as_transport()).unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, StreamingError::ConnectTimeout(d) if d == Duration::from_millis(50)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disabled_reconnection_stays_disconnected() {
    let transport = ScriptedTransport::new();
    let mut config = fast_config(3);
    config.reconnection.enabled = false;
    let client = StreamingClient::with_transport(config, transport.as_transport()).unwrap();
    let mut events = client.events();

    client.connect().await.unwrap();
    transport.session(0).await.close("maintenance");

    let seen = events_until(&mut events, |e| {
        matches!(e, ConnectionEvent::Disconnected { .. })
    })
    .await;
    assert_eq!(
        seen.last(),
        Some(&ConnectionEvent::Disconnected {
            reason: "closed by server: maintenance".to_string()
        })
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn disconnect_during_backoff_cancels_reconnect() {
    let transport = ScriptedTransport::new();
    let config = StreamingConfig {
        reconnection: ReconnectionConfig {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(200),
            ..fast_config(5).reconnection
        },
        ..fast_config(5)
    };
    let client = StreamingClient::with_transport(config, transport.as_transport()).unwrap();
    let mut events = client.events();

    client.connect().await.unwrap();
    transport.session(0).await.reset();
    events_until(&mut events, |e| {
        matches!(e, ConnectionEvent::Reconnecting { .. })
    })
    .await;

    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn heartbeat_resends_subscriptions() {
    let transport = ScriptedTransport::new();
    let config = StreamingConfig {
        heartbeat_interval: Duration::from_millis(40),
        ..fast_config(3)
    };
    let client = StreamingClient::with_transport(config, transport.as_transport()).unwrap();

    client.subscribe(["AAPL"]).await.unwrap();
    let server = transport.session(0).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let sent = server.sent();
    assert!(sent.len() >= 3, "replay plus at least two heartbeats, got {sent:?}");
    assert!(sent.iter().all(|msg| *msg == subscribe_msg(&["AAPL"])));
}

#[tokio::test]
async fn close_stops_everything() {
    let transport = ScriptedTransport::new();
    let client = StreamingClient::with_transport(fast_config(3), transport.as_transport()).unwrap();

    client.subscribe(["AAPL"]).await.unwrap();
    let server = transport.session(0).await;

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(server.client_closed());

    server.reset();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.attempts(), 1);
    assert!(matches!(
        client.connect().await,
        Err(StreamingError::ClientClosed)
    ));
}

#[tokio::test]
async fn close_is_not_held_up_by_stalled_write() {
    let transport = ScriptedTransport::new();
    let config = StreamingConfig {
        connect_timeout: Duration::from_secs(30),
        ..fast_config(3)
    };
    let client =
        Arc::new(StreamingClient::with_transport(config, transport.as_transport()).unwrap());

    client.subscribe(["AAPL"]).await.unwrap();
    let server = transport.session(0).await;
    server.wait_for_sent(1).await;
    server.stall_writes();

    let stuck = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.subscribe(["MSFT"]).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!stuck.is_finished(), "the write should be hanging");

    tokio::time::timeout(Duration::from_millis(500), client.close())
        .await
        .expect("close waited on the stalled write");
    assert_eq!(client.state(), ConnectionState::Closed);

    let result = tokio::time::timeout(Duration::from_millis(500), stuck)
        .await
        .expect("stalled subscribe was not released by close")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn stalled_write_does_not_block_reconnect() {
    let transport = ScriptedTransport::new();
    let config = StreamingConfig {
        connect_timeout: Duration::from_secs(30),
        ..fast_config(3)
    };
    let client =
        Arc::new(StreamingClient::with_transport(config, transport.as_transport()).unwrap());
    let mut events = client.events();

    client.subscribe(["AAPL"]).await.unwrap();
    let first = transport.session(0).await;
    first.wait_for_sent(1).await;
    first.stall_writes();

    let _stuck = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.subscribe(["MSFT"]).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    first.reset();
    let seen = events_until(&mut events, |e| {
        matches!(e, ConnectionEvent::Reconnecting { attempt: 1 })
    })
    .await;
    assert!(seen.contains(&ConnectionEvent::Disconnected {
        reason: "receive failed: connection reset".to_string()
    }));

    let second = transport.session(1).await;
    assert_eq!(
        second.wait_for_sent(1).await,
        vec![subscribe_msg(&["AAPL", "MSFT"])]
    );
    assert!(client.is_connected());
}
