use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use roomwire_core::error::Result;
use roomwire_core::model::Identity;
use roomwire_core::protocol::{ChatEvent, Envelope, TypedPayload};

use crate::config::ProviderConfig;
use crate::contract::ChatTransport;
use crate::dispatch::{EventFilter, Listener, ListenerRegistry, Subscription};
use crate::providers::{build_provider, InboundSink, Provider};
use crate::transport::{Connector, WsConnector};

/// Presents the common transport contract over a configured provider.
///
/// Listeners are keyed by envelope kind, never by provider-native event
/// names, so they work unchanged across providers.
pub struct ProviderAdapter {
    config: ProviderConfig,
    connector: Arc<dyn Connector>,
    listeners: Arc<ListenerRegistry>,
    active: Mutex<Option<Box<dyn Provider>>>,
    identity: parking_lot::Mutex<Option<Identity>>,
}

impl ProviderAdapter {
    pub fn new(config: ProviderConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            listeners: ListenerRegistry::new(),
            active: Mutex::new(None),
            identity: parking_lot::Mutex::new(None),
        }
    }

    /// Adapter whose providers open real WebSocket connections.
    pub fn websocket(config: ProviderConfig) -> Self {
        Self::new(config, Arc::new(WsConnector::default()))
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Validate config, then open the chosen provider.
    ///
    /// Missing required fields fail here, before any connection is attempted.
    pub async fn connect(&self, identity: &Identity) -> Result<()> {
        self.config.validate()?;

        let mut provider = build_provider(&self.config, Arc::clone(&self.connector));
        let listeners = Arc::clone(&self.listeners);
        let sink: InboundSink = Arc::new(move |env: Envelope| {
            listeners.dispatch(&env);
        });
        provider.connect(identity, sink).await?;
        tracing::info!(service = self.config.service.as_str(), user = %identity.id, "provider connected");

        let previous = self.active.lock().await.replace(provider);
        if let Some(mut old) = previous {
            old.disconnect().await;
        }
        *self.identity.lock() = Some(identity.clone());
        Ok(())
    }

    pub async fn send_chat_message(&self, room_id: &str, text: &str) {
        self.publish(ChatEvent::message(room_id, text)).await;
    }

    /// Subscribe to the room, then announce the join.
    pub async fn join(&self, room_id: &str) {
        {
            let mut active = self.active.lock().await;
            if let Some(provider) = active.as_mut() {
                if let Err(e) = provider.subscribe(room_id).await {
                    tracing::warn!(error = %e, room = room_id, "provider subscribe failed");
                }
            }
        }
        self.publish(ChatEvent::join_room(room_id)).await;
    }

    /// Announce the leave, then stop receiving the room.
    pub async fn leave(&self, room_id: &str) {
        self.publish(ChatEvent::leave_room(room_id)).await;
        let mut active = self.active.lock().await;
        if let Some(provider) = active.as_mut() {
            if let Err(e) = provider.unsubscribe(room_id).await {
                tracing::warn!(error = %e, room = room_id, "provider unsubscribe failed");
            }
        }
    }

    pub fn on<F>(&self, filter: EventFilter, listener: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.listeners.subscribe(filter, listener)
    }

    pub fn on_typed<P, F>(&self, listener: F) -> Subscription
    where
        P: TypedPayload,
        F: Fn(&P, &Envelope) + Send + Sync + 'static,
    {
        self.listeners.subscribe_typed(listener)
    }

    /// Tear down the provider connection and drop every listener.
    pub async fn close(&self) {
        let provider = self.active.lock().await.take();
        if let Some(mut provider) = provider {
            provider.disconnect().await;
        }
        *self.identity.lock() = None;
        self.listeners.clear();
    }

    pub async fn is_connected(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Best effort: dropped with a warning when no provider is connected.
    async fn publish(&self, event: ChatEvent) {
        let user = self.identity.lock().clone();
        let envelope = Envelope::new(event).stamped(user);

        let mut active = self.active.lock().await;
        let Some(provider) = active.as_mut() else {
            tracing::warn!(kind = envelope.kind().as_str(), "provider not connected; message not sent");
            return;
        };
        if let Err(e) = provider.publish(&envelope).await {
            tracing::warn!(error = %e, kind = envelope.kind().as_str(), "provider publish failed; message dropped");
        }
    }
}

#[async_trait]
impl ChatTransport for ProviderAdapter {
    fn backend(&self) -> &'static str {
        self.config.service.as_str()
    }

    async fn connect(&self, identity: &Identity) -> Result<()> {
        ProviderAdapter::connect(self, identity).await
    }

    async fn join_room(&self, room_id: &str) -> Result<()> {
        self.join(room_id).await;
        Ok(())
    }

    async fn leave_room(&self, room_id: &str) -> Result<()> {
        self.leave(room_id).await;
        Ok(())
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<()> {
        self.send_chat_message(room_id, text).await;
        Ok(())
    }

    fn subscribe(&self, filter: EventFilter, listener: Listener) -> Subscription {
        self.listeners.subscribe_arc(filter, listener)
    }

    async fn disconnect(&self) {
        self.close().await;
    }
}
