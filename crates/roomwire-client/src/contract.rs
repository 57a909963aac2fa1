//! The capability set every chat backend exposes.
//!
//! Callers hold an `Arc<dyn ChatTransport>` and never name a concrete
//! backend, so the backend can be swapped in configuration.

use std::sync::Arc;

use async_trait::async_trait;

use roomwire_core::error::Result;
use roomwire_core::model::Identity;
use roomwire_core::protocol::Envelope;

use crate::dispatch::{EventFilter, Listener, Subscription};

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Establish the session for `identity`.
    async fn connect(&self, identity: &Identity) -> Result<()>;

    async fn join_room(&self, room_id: &str) -> Result<()>;

    async fn leave_room(&self, room_id: &str) -> Result<()>;

    /// Best effort: backends without a live session drop the message.
    async fn send_message(&self, room_id: &str, text: &str) -> Result<()>;

    fn subscribe(&self, filter: EventFilter, listener: Listener) -> Subscription;

    /// Tear the session down and drop every listener.
    async fn disconnect(&self);
}

/// Closure-friendly subscribe for any transport, including trait objects.
pub trait ChatTransportExt {
    fn on<F>(&self, filter: EventFilter, listener: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static;
}

impl<T: ChatTransport + ?Sized> ChatTransportExt for T {
    fn on<F>(&self, filter: EventFilter, listener: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(filter, Arc::new(listener))
    }
}
