//! Third-party pub/sub providers behind one capability interface.
//!
//! Providers speak their native wire dialect (emit/on events, or
//! publish/bind on channels) and hand every inbound event to the adapter
//! already normalized into an `Envelope`, so listeners never see
//! provider-native names.

mod adapter;
mod custom;
mod pusher;
mod socketio;

pub use adapter::ProviderAdapter;
pub use custom::CustomProvider;
pub use pusher::PusherProvider;
pub use socketio::SocketIoProvider;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use roomwire_core::error::{Result, RoomwireError};
use roomwire_core::model::Identity;
use roomwire_core::protocol::{ChatEvent, Envelope, EventKind};

use crate::config::{ProviderConfig, ProviderService};
use crate::transport::{Connector, WireLink};

/// Receives normalized inbound envelopes.
pub type InboundSink = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Capability set every provider integration implements.
#[async_trait]
pub trait Provider: Send + Sync {
    fn service(&self) -> ProviderService;

    async fn connect(&mut self, identity: &Identity, sink: InboundSink) -> Result<()>;

    /// Deliver one envelope using the provider's native primitive.
    async fn publish(&mut self, envelope: &Envelope) -> Result<()>;

    /// Start receiving a room's events.
    async fn subscribe(&mut self, room_id: &str) -> Result<()>;

    async fn unsubscribe(&mut self, room_id: &str) -> Result<()>;

    async fn disconnect(&mut self);
}

/// Provider-specific initializer chosen by configuration.
/// Callers validate `cfg` first.
pub fn build_provider(cfg: &ProviderConfig, connector: Arc<dyn Connector>) -> Box<dyn Provider> {
    match cfg.service {
        ProviderService::Socketio => Box::new(SocketIoProvider::new(cfg.clone(), connector)),
        ProviderService::Pusher => Box::new(PusherProvider::new(cfg.clone(), connector)),
        ProviderService::Custom => Box::new(CustomProvider::new(cfg.clone(), connector)),
    }
}

/// One decoded native frame.
#[derive(Debug)]
pub(crate) enum NativeFrame {
    /// Provider event to normalize.
    Event {
        name: String,
        payload: serde_json::Value,
    },
    /// Frame already in envelope form.
    Envelope(Envelope),
    /// Protocol-level reply to send back (heartbeats).
    Reply(String),
    /// Protocol housekeeping with nothing to deliver.
    Ignore,
    Malformed(String),
}

pub(crate) type FrameDecoder = fn(&str) -> NativeFrame;

/// A provider's open link plus its reader task.
pub(crate) struct ProviderLink {
    outbound: mpsc::Sender<String>,
    reader: JoinHandle<()>,
}

impl ProviderLink {
    pub(crate) fn spawn(link: WireLink, provider: &'static str, decode: FrameDecoder, sink: InboundSink) -> Self {
        let WireLink {
            outbound,
            mut inbound,
        } = link;
        let replies = outbound.clone();

        let reader = tokio::spawn(async move {
            while let Some(text) = inbound.recv().await {
                match decode(&text) {
                    NativeFrame::Event { name, payload } => match normalize(&name, &payload) {
                        Ok(Some(env)) => sink(env),
                        Ok(None) => tracing::debug!(provider, event = %name, "ignored native event"),
                        Err(e) => tracing::error!(provider, event = %name, error = %e, "discarding malformed event"),
                    },
                    NativeFrame::Envelope(env) => sink(env),
                    NativeFrame::Reply(reply) => {
                        if replies.send(reply).await.is_err() {
                            break;
                        }
                    }
                    NativeFrame::Ignore => {}
                    NativeFrame::Malformed(reason) => {
                        tracing::error!(provider, %reason, "discarding malformed frame");
                    }
                }
            }
            tracing::warn!(provider, "provider link closed");
        });

        Self { outbound, reader }
    }

    pub(crate) async fn send(&self, frame: String) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| RoomwireError::NotConnected)
    }
}

impl Drop for ProviderLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Map a provider-native event name to an envelope kind.
/// Pusher client events carry a `client-` prefix.
pub(crate) fn native_kind(name: &str) -> Option<EventKind> {
    let name = name.strip_prefix("client-").unwrap_or(name);
    match name {
        "chat_message" | "message" => Some(EventKind::Message),
        "join_room" | "user_joined" | "join" => Some(EventKind::Join),
        "leave_room" | "user_left" | "leave" => Some(EventKind::Leave),
        "user_list" => Some(EventKind::UserList),
        "error" => Some(EventKind::Error),
        _ => None,
    }
}

/// Turn a native event into an envelope.
///
/// The payload is either a full envelope (what our own publishers send) or
/// the bare `data` for the kind implied by the event name.
pub(crate) fn normalize(name: &str, payload: &serde_json::Value) -> Result<Option<Envelope>> {
    let Some(kind) = native_kind(name) else {
        return Ok(None);
    };

    if payload.get("type").is_some() {
        let env = Envelope::from_value(payload)?;
        if env.kind() != kind {
            return Err(RoomwireError::BadRequest(format!(
                "event {name} carries a {} envelope",
                env.kind().as_str()
            )));
        }
        return Ok(Some(env));
    }

    let event = ChatEvent::decode(kind, Some(&payload.to_string()))?;
    Ok(Some(Envelope::new(event)))
}
