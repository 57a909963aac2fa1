//! Socket.IO provider (emit/on style) over engine.io v4 text packets.
//!
//! Packets used:
//! - `0{...}` engine.io open, `2` ping (answered with `3`)
//! - `40` namespace connect, `41` namespace disconnect, `44{...}` connect error
//! - `42["event", payload]` event

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use roomwire_core::error::{Result, RoomwireError};
use roomwire_core::model::Identity;
use roomwire_core::protocol::{Envelope, EventKind};

use crate::config::{ProviderConfig, ProviderService};
use crate::providers::{InboundSink, NativeFrame, Provider, ProviderLink};
use crate::transport::Connector;

pub struct SocketIoProvider {
    cfg: ProviderConfig,
    connector: Arc<dyn Connector>,
    link: Option<ProviderLink>,
}

impl SocketIoProvider {
    pub fn new(cfg: ProviderConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            cfg,
            connector,
            link: None,
        }
    }

    /// `<endpoint>/socket.io/?EIO=4&transport=websocket`; an explicit path
    /// on the endpoint is kept.
    pub fn socket_url(endpoint: &str) -> Result<String> {
        let mut url = url::Url::parse(endpoint)
            .map_err(|e| RoomwireError::Config(format!("provider.endpoint is not a valid url: {e}")))?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path("/socket.io/");
        }
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
        Ok(url.to_string())
    }

    fn link(&self) -> Result<&ProviderLink> {
        self.link.as_ref().ok_or(RoomwireError::NotConnected)
    }
}

/// Native event name for an envelope kind.
fn emit_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Message => "chat_message",
        EventKind::Join => "join_room",
        EventKind::Leave => "leave_room",
        EventKind::UserList => "user_list",
        EventKind::Error => "error",
    }
}

pub(crate) fn encode_event(name: &str, payload: serde_json::Value) -> String {
    format!("42{}", json!([name, payload]))
}

pub(crate) fn decode_packet(text: &str) -> NativeFrame {
    match text {
        "2" => return NativeFrame::Reply("3".into()),
        "3" | "6" | "40" | "41" => return NativeFrame::Ignore,
        _ => {}
    }

    if let Some(body) = text.strip_prefix("42") {
        let parsed: serde_json::Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return NativeFrame::Malformed(format!("event packet: {e}")),
        };
        let mut items = match parsed {
            serde_json::Value::Array(items) => items.into_iter(),
            _ => return NativeFrame::Malformed("event packet is not an array".into()),
        };
        let Some(serde_json::Value::String(name)) = items.next() else {
            return NativeFrame::Malformed("event packet has no name".into());
        };
        let payload = items.next().unwrap_or(serde_json::Value::Null);
        return NativeFrame::Event { name, payload };
    }

    if let Some(body) = text.strip_prefix("44") {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
            .unwrap_or_else(|| "namespace connect rejected".into());
        return NativeFrame::Event {
            name: "error".into(),
            payload: json!({ "code": "connect_error", "message": message }),
        };
    }

    // engine.io open (`0{...}`) and namespace ack with sid (`40{...}`).
    if text.starts_with('0') || text.starts_with("40") {
        return NativeFrame::Ignore;
    }

    NativeFrame::Malformed(format!("unsupported packet: {}", text.chars().take(16).collect::<String>()))
}

#[async_trait]
impl Provider for SocketIoProvider {
    fn service(&self) -> ProviderService {
        ProviderService::Socketio
    }

    async fn connect(&mut self, identity: &Identity, sink: InboundSink) -> Result<()> {
        let endpoint = self
            .cfg
            .endpoint
            .as_deref()
            .ok_or(RoomwireError::MissingConfig {
                provider: "socketio",
                fields: vec!["endpoint"],
            })?;
        let url = Self::socket_url(endpoint)?;
        tracing::info!(%url, user = %identity.id, "socket.io connecting");

        let wire = self.connector.connect(&url).await?;
        let link = ProviderLink::spawn(wire, "socketio", decode_packet, sink);
        link.send("40".into()).await?;
        self.link = Some(link);
        Ok(())
    }

    async fn publish(&mut self, envelope: &Envelope) -> Result<()> {
        let frame = encode_event(emit_name(envelope.kind()), envelope.to_value()?);
        self.link()?.send(frame).await
    }

    /// Rooms are joined server-side by the `join_room` event.
    async fn subscribe(&mut self, _room_id: &str) -> Result<()> {
        self.link().map(|_| ())
    }

    async fn unsubscribe(&mut self, _room_id: &str) -> Result<()> {
        self.link().map(|_| ())
    }

    async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.send("41".into()).await;
            tracing::info!("socket.io disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_engine_io_url() {
        assert_eq!(
            SocketIoProvider::socket_url("ws://localhost:3001").unwrap(),
            "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            SocketIoProvider::socket_url("wss://chat.example.org/rt/").unwrap(),
            "wss://chat.example.org/rt/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn decodes_packets() {
        assert!(matches!(decode_packet("2"), NativeFrame::Reply(r) if r == "3"));
        assert!(matches!(decode_packet(r#"0{"sid":"x"}"#), NativeFrame::Ignore));
        assert!(matches!(decode_packet(r#"40{"sid":"y"}"#), NativeFrame::Ignore));
        match decode_packet(r#"42["user_joined",{"roomId":"r1"}]"#) {
            NativeFrame::Event { name, payload } => {
                assert_eq!(name, "user_joined");
                assert_eq!(payload["roomId"], "r1");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(matches!(decode_packet("42{"), NativeFrame::Malformed(_)));
        assert!(matches!(decode_packet(r#"44{"message":"nope"}"#), NativeFrame::Event { .. }));
    }
}
