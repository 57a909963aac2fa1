//! Pusher provider (publish/bind style).
//!
//! Rooms map to channels named `room-<roomId>`. Outbound intents are client
//! events triggered on the room channel; inbound channel events arrive as
//! `{"event", "channel", "data"}` where `data` may be a JSON-encoded string.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use roomwire_core::error::{Result, RoomwireError};
use roomwire_core::model::Identity;
use roomwire_core::protocol::{Envelope, EventKind};

use crate::config::{ProviderConfig, ProviderService};
use crate::providers::{InboundSink, NativeFrame, Provider, ProviderLink};
use crate::transport::Connector;

const PROTOCOL_VERSION: &str = "7";

pub struct PusherProvider {
    cfg: ProviderConfig,
    connector: Arc<dyn Connector>,
    link: Option<ProviderLink>,
    channels: BTreeSet<String>,
}

impl PusherProvider {
    pub fn new(cfg: ProviderConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            cfg,
            connector,
            link: None,
            channels: BTreeSet::new(),
        }
    }

    pub fn channel_name(room_id: &str) -> String {
        format!("room-{room_id}")
    }

    /// Hosted cluster URL, or `<endpoint>/app/<key>` for self-hosted
    /// Pusher-compatible servers.
    pub fn socket_url(cfg: &ProviderConfig) -> Result<String> {
        let key = cfg.api_key.as_deref().unwrap_or_default();
        let base = match (&cfg.endpoint, &cfg.cluster) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, Some(cluster)) => format!("wss://ws-{cluster}.pusher.com"),
            (None, None) => {
                return Err(RoomwireError::MissingConfig {
                    provider: "pusher",
                    fields: vec!["cluster"],
                })
            }
        };
        let mut url = url::Url::parse(&format!("{base}/app/{key}"))
            .map_err(|e| RoomwireError::Config(format!("pusher url is invalid: {e}")))?;
        url.query_pairs_mut()
            .append_pair("protocol", PROTOCOL_VERSION)
            .append_pair("client", "roomwire")
            .append_pair("version", env!("CARGO_PKG_VERSION"));
        Ok(url.to_string())
    }

    fn link(&self) -> Result<&ProviderLink> {
        self.link.as_ref().ok_or(RoomwireError::NotConnected)
    }
}

fn trigger_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Message => "client-message",
        EventKind::Join => "client-user_joined",
        EventKind::Leave => "client-user_left",
        EventKind::UserList => "client-user_list",
        EventKind::Error => "client-error",
    }
}

pub(crate) fn decode_frame(text: &str) -> NativeFrame {
    let frame: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return NativeFrame::Malformed(format!("pusher frame: {e}")),
    };
    let Some(event) = frame.get("event").and_then(|e| e.as_str()) else {
        return NativeFrame::Malformed("pusher frame has no event".into());
    };

    // `data` is usually a JSON string; tolerate inline objects too.
    let data = match frame.get("data") {
        Some(serde_json::Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone()))
        }
        Some(v) => v.clone(),
        None => serde_json::Value::Null,
    };

    match event {
        "pusher:ping" => NativeFrame::Reply(json!({ "event": "pusher:pong", "data": {} }).to_string()),
        "pusher:error" => NativeFrame::Event {
            name: "error".into(),
            payload: json!({
                "code": data.get("code").map(|c| match c.as_str() {
                    Some(code) => code.to_owned(),
                    None => c.to_string(),
                }),
                "message": data.get("message").and_then(|m| m.as_str()).unwrap_or("pusher error"),
            }),
        },
        e if e.starts_with("pusher:") || e.starts_with("pusher_internal:") => NativeFrame::Ignore,
        e => NativeFrame::Event {
            name: e.to_string(),
            payload: data,
        },
    }
}

#[async_trait]
impl Provider for PusherProvider {
    fn service(&self) -> ProviderService {
        ProviderService::Pusher
    }

    async fn connect(&mut self, identity: &Identity, sink: InboundSink) -> Result<()> {
        let url = Self::socket_url(&self.cfg)?;
        tracing::info!(cluster = ?self.cfg.cluster, app_id = ?self.cfg.app_id, user = %identity.id, "pusher connecting");

        let wire = self.connector.connect(&url).await?;
        self.link = Some(ProviderLink::spawn(wire, "pusher", decode_frame, sink));
        self.channels.clear();
        Ok(())
    }

    async fn publish(&mut self, envelope: &Envelope) -> Result<()> {
        let Some(room_id) = envelope.event.room_id() else {
            tracing::debug!(kind = envelope.kind().as_str(), "pusher: no room channel; not triggered");
            return Ok(());
        };
        let frame = json!({
            "event": trigger_name(envelope.kind()),
            "channel": Self::channel_name(room_id),
            "data": envelope.to_value()?,
        });
        self.link()?.send(frame.to_string()).await
    }

    async fn subscribe(&mut self, room_id: &str) -> Result<()> {
        let channel = Self::channel_name(room_id);
        if self.channels.contains(&channel) {
            return Ok(());
        }
        let frame = json!({ "event": "pusher:subscribe", "data": { "channel": channel } });
        self.link()?.send(frame.to_string()).await?;
        self.channels.insert(channel);
        Ok(())
    }

    async fn unsubscribe(&mut self, room_id: &str) -> Result<()> {
        let channel = Self::channel_name(room_id);
        if !self.channels.remove(&channel) {
            return Ok(());
        }
        let frame = json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } });
        self.link()?.send(frame.to_string()).await
    }

    async fn disconnect(&mut self) {
        if self.link.take().is_some() {
            tracing::info!(channels = self.channels.len(), "pusher disconnected");
        }
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_cluster_url() {
        let mut cfg = ProviderConfig::with_defaults(ProviderService::Pusher);
        cfg.api_key = Some("abc123".into());
        let url = PusherProvider::socket_url(&cfg).unwrap();
        assert!(url.starts_with("wss://ws-us2.pusher.com/app/abc123?protocol=7"));
    }

    #[test]
    fn decodes_string_encoded_data() {
        let frame = r#"{"event":"message","channel":"room-r1","data":"{\"roomId\":\"r1\",\"message\":\"hi\"}"}"#;
        match decode_frame(frame) {
            NativeFrame::Event { name, payload } => {
                assert_eq!(name, "message");
                assert_eq!(payload["message"], "hi");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(matches!(
            decode_frame(r#"{"event":"pusher:ping","data":{}}"#),
            NativeFrame::Reply(_)
        ));
        assert!(matches!(
            decode_frame(r#"{"event":"pusher:connection_established","data":"{}"}"#),
            NativeFrame::Ignore
        ));
    }

    #[test]
    fn error_codes_are_plain_strings() {
        let code_of = |frame: &str| match decode_frame(frame) {
            NativeFrame::Event { payload, .. } => payload["code"].clone(),
            other => panic!("unexpected frame: {other:?}"),
        };
        assert_eq!(
            code_of(r#"{"event":"pusher:error","data":{"code":"over_quota","message":"x"}}"#),
            "over_quota"
        );
        assert_eq!(
            code_of(r#"{"event":"pusher:error","data":{"code":4001,"message":"x"}}"#),
            "4001"
        );
        assert!(code_of(r#"{"event":"pusher:error","data":{"message":"x"}}"#).is_null());
    }
}
