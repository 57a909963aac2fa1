//! Custom provider: plain envelope JSON frames to a self-hosted endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use roomwire_core::error::{Result, RoomwireError};
use roomwire_core::model::Identity;
use roomwire_core::protocol::{ChatEvent, Envelope};

use crate::config::{ProviderConfig, ProviderService};
use crate::providers::{InboundSink, NativeFrame, Provider, ProviderLink};
use crate::transport::Connector;

pub struct CustomProvider {
    cfg: ProviderConfig,
    connector: Arc<dyn Connector>,
    link: Option<ProviderLink>,
}

impl CustomProvider {
    pub fn new(cfg: ProviderConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            cfg,
            connector,
            link: None,
        }
    }

    fn link(&self) -> Result<&ProviderLink> {
        self.link.as_ref().ok_or(RoomwireError::NotConnected)
    }
}

fn decode_envelope(text: &str) -> NativeFrame {
    match Envelope::parse(text) {
        Ok(env) => NativeFrame::Envelope(env),
        Err(e) => NativeFrame::Malformed(e.to_string()),
    }
}

#[async_trait]
impl Provider for CustomProvider {
    fn service(&self) -> ProviderService {
        ProviderService::Custom
    }

    async fn connect(&mut self, identity: &Identity, sink: InboundSink) -> Result<()> {
        let endpoint = self.cfg.endpoint.as_deref().ok_or(RoomwireError::MissingConfig {
            provider: "custom",
            fields: vec!["endpoint"],
        })?;
        let wire = self.connector.connect(endpoint).await?;
        let link = ProviderLink::spawn(wire, "custom", decode_envelope, sink);

        let hello = Envelope::new(ChatEvent::announce(identity.clone())).stamped(Some(identity.clone()));
        link.send(hello.to_json()?).await?;
        self.link = Some(link);
        Ok(())
    }

    async fn publish(&mut self, envelope: &Envelope) -> Result<()> {
        let frame = envelope.to_json()?;
        self.link()?.send(frame).await
    }

    async fn subscribe(&mut self, _room_id: &str) -> Result<()> {
        self.link().map(|_| ())
    }

    async fn unsubscribe(&mut self, _room_id: &str) -> Result<()> {
        self.link().map(|_| ())
    }

    async fn disconnect(&mut self) {
        if self.link.take().is_some() {
            tracing::info!("custom provider disconnected");
        }
    }
}
