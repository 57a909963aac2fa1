mod support;

use std::time::Duration;

use tokio::sync::mpsc;

use roomwire_client::config::SocketSection;
use roomwire_client::transport::client::RECONNECT_EXHAUSTED;
use roomwire_client::transport::{ConnectionState, SocketClient};
use roomwire_client::EventFilter;
use roomwire_core::protocol::{ChatEvent, Envelope, EventKind, MessageData};

use support::{alice, next_sent, ScriptedConnector};

const URL: &str = "ws://chat.test/ws";

fn section(max_attempts: u32) -> SocketSection {
    let mut cfg = SocketSection::new(URL);
    cfg.reconnect_interval_ms = 10;
    cfg.max_reconnect_attempts = max_attempts;
    cfg
}

/// Forward every envelope matching `filter` into a channel.
fn collect(client: &SocketClient, filter: EventFilter) -> mpsc::UnboundedReceiver<Envelope> {
    let (tx, rx) = mpsc::unbounded_channel();
    // Kept for the lifetime of the client.
    let _sub = client.on(filter, move |env| {
        let _ = tx.send(env.clone());
    });
    rx
}

async fn wait_for_state(client: &SocketClient, want: ConnectionState) {
    let mut rx = client.watch_state();
    rx.wait_for(|s| *s == want).await.expect("client actor stopped");
}

#[tokio::test(start_paused = true)]
async fn connect_announces_identity() {
    let connector = ScriptedConnector::new();
    let mut remote = connector.accept();
    let client = SocketClient::new(section(5), connector.clone());

    client.connect(alice()).await.expect("connect");
    assert!(client.is_connected());
    assert_eq!(connector.urls(), vec![URL.to_string()]);

    let hello = next_sent(&mut remote).await;
    assert_eq!(hello["type"], "join");
    assert_eq!(hello["data"]["user"]["id"], alice().id);
    assert_eq!(hello["user"]["username"], alice().username);
    assert!(hello["timestamp"].is_i64());
}

#[tokio::test(start_paused = true)]
async fn sends_are_stamped_and_trimmed() {
    let connector = ScriptedConnector::new();
    let mut remote = connector.accept();
    let client = SocketClient::new(section(5), connector.clone());
    client.connect(alice()).await.unwrap();
    let _hello = next_sent(&mut remote).await;

    client.join("general-support").await;
    let join = next_sent(&mut remote).await;
    assert_eq!(join["type"], "join");
    assert_eq!(join["data"]["roomId"], "general-support");

    client.send_chat_message("general-support", "  hello there ").await;
    let msg = next_sent(&mut remote).await;
    assert_eq!(msg["type"], "message");
    assert_eq!(msg["data"]["message"], "hello there");
    assert_eq!(msg["user"]["id"], alice().id);
    assert!(msg["timestamp"].as_i64().is_some_and(|t| t > 0));

    client.leave("general-support").await;
    let leave = next_sent(&mut remote).await;
    assert_eq!(leave["type"], "leave");
    assert_eq!(leave["data"]["roomId"], "general-support");
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_discarded() {
    let connector = ScriptedConnector::new();
    let remote = connector.accept();
    let client = SocketClient::new(section(5), connector.clone());

    let mut messages = collect(&client, EventKind::Message.into());
    let mut everything = collect(&client, EventFilter::All);
    client.connect(alice()).await.unwrap();

    remote.deliver.send("{not json".into()).await.unwrap();
    remote
        .deliver
        .send(r#"{"type":"message","data":{"roomId":7}}"#.into())
        .await
        .unwrap();
    remote
        .deliver
        .send(r#"{"type":"user_list","data":{"users":[]}}"#.into())
        .await
        .unwrap();
    remote
        .deliver
        .send(r#"{"type":"message","data":{"roomId":"r1","message":"hi"},"timestamp":5}"#.into())
        .await
        .unwrap();

    let first = everything.recv().await.unwrap();
    assert_eq!(first.kind(), EventKind::UserList);
    let second = everything.recv().await.unwrap();
    assert_eq!(second.timestamp, Some(5));

    let msg = messages.recv().await.unwrap();
    assert_eq!(
        msg.event,
        ChatEvent::Message(MessageData {
            room_id: "r1".into(),
            message: "hi".into(),
        })
    );
    assert!(messages.try_recv().is_err());
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_reconnect_attempts() {
    let connector = ScriptedConnector::new();
    let remote = connector.accept();
    connector.refuse();
    connector.refuse();
    let client = SocketClient::new(section(2), connector.clone());
    let mut errors = collect(&client, EventKind::Error.into());

    client.connect(alice()).await.unwrap();
    drop(remote);

    wait_for_state(&client, ConnectionState::Disconnected).await;
    assert_eq!(connector.calls(), 3);

    let gave_up = errors.recv().await.unwrap();
    match gave_up.event {
        ChatEvent::Error(e) => assert_eq!(e.code.as_deref(), Some(RECONNECT_EXHAUSTED)),
        other => panic!("expected error event, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn reconnect_restores_the_session() {
    let connector = ScriptedConnector::new();
    let first = connector.accept();
    let mut second = connector.accept();
    let client = SocketClient::new(section(3), connector.clone());

    client.connect(alice()).await.unwrap();
    drop(first);

    wait_for_state(&client, ConnectionState::Reconnecting).await;
    wait_for_state(&client, ConnectionState::Connected).await;
    assert_eq!(connector.calls(), 2);

    // The identity is announced again on the new link.
    let hello = next_sent(&mut second).await;
    assert_eq!(hello["data"]["user"]["id"], alice().id);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let connector = ScriptedConnector::new();
    let remote = connector.accept();
    let client = SocketClient::new(section(5), connector.clone());

    client.connect(alice()).await.unwrap();
    drop(remote);
    wait_for_state(&client, ConnectionState::Reconnecting).await;

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.calls(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn failed_initial_connect_is_not_retried() {
    let connector = ScriptedConnector::new();
    connector.refuse();
    let client = SocketClient::new(section(5), connector.clone());

    let err = client.connect(alice()).await.expect_err("refused");
    assert_eq!(err.code().as_str(), "CONNECT_FAILED");
    assert_eq!(client.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_listener_stops_receiving() {
    let connector = ScriptedConnector::new();
    let remote = connector.accept();
    let client = SocketClient::new(section(5), connector.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = client.on(EventKind::Message.into(), move |env| {
        let _ = tx.send(env.clone());
    });
    let mut probe = collect(&client, EventFilter::All);
    client.connect(alice()).await.unwrap();

    let frame = r#"{"type":"message","data":{"roomId":"r1","message":"one"}}"#;
    remote.deliver.send(frame.into()).await.unwrap();
    probe.recv().await.unwrap();
    assert!(rx.recv().await.is_some());

    sub.unsubscribe();
    remote.deliver.send(frame.into()).await.unwrap();
    probe.recv().await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_is_dropped() {
    let connector = ScriptedConnector::new();
    let mut remote = connector.accept();
    let client = SocketClient::new(section(5), connector.clone());

    client.send_chat_message("r1", "lost").await;
    client.connect(alice()).await.unwrap();

    let hello = next_sent(&mut remote).await;
    assert_eq!(hello["type"], "join");
    assert!(remote.sent.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn close_drops_listeners_and_link() {
    let connector = ScriptedConnector::new();
    let mut remote = connector.accept();
    let client = SocketClient::new(section(5), connector.clone());
    let mut events = collect(&client, EventFilter::All);

    client.connect(alice()).await.unwrap();
    let _hello = next_sent(&mut remote).await;
    client.close().await;

    // The client's sender is gone, so the far end sees the link close.
    assert!(remote.sent.recv().await.is_none());
    assert!(events.recv().await.is_none());
}
