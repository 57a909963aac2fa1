use std::sync::Arc;

use async_trait::async_trait;

use roomwire_core::error::Result;
use roomwire_core::model::Identity;
use roomwire_core::protocol::{ChatEvent, Envelope};

use crate::contract::ChatTransport;
use crate::dispatch::{EventFilter, Listener, ListenerRegistry, Subscription};
use crate::store::RoomStore;

/// `RoomStore` behind the common transport contract.
///
/// Each effective store mutation is echoed to contract listeners as an
/// envelope stamped with the store's durable identity. Unknown rooms stay
/// silent.
pub struct LocalTransport {
    store: Arc<RoomStore>,
    listeners: Arc<ListenerRegistry>,
}

impl LocalTransport {
    pub fn new(store: Arc<RoomStore>) -> Self {
        Self {
            store,
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn store(&self) -> &Arc<RoomStore> {
        &self.store
    }

    fn emit(&self, event: ChatEvent, timestamp: Option<i64>) -> Result<()> {
        let mut env = Envelope::new(event).stamped(Some(self.store.current_user()?));
        if timestamp.is_some() {
            env.timestamp = timestamp;
        }
        self.listeners.dispatch(&env);
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for LocalTransport {
    fn backend(&self) -> &'static str {
        "local"
    }

    /// The local backend always acts as its durable identity; the argument
    /// is only logged.
    async fn connect(&self, identity: &Identity) -> Result<()> {
        self.store.initialize()?;
        let user = self.store.current_user()?;
        if user.id != identity.id {
            tracing::debug!(requested = %identity.id, stored = %user.id, "local backend uses stored identity");
        }
        self.emit(ChatEvent::announce(user), None)
    }

    async fn join_room(&self, room_id: &str) -> Result<()> {
        if self.store.join_room(room_id)? {
            self.emit(ChatEvent::join_room(room_id), None)?;
        }
        Ok(())
    }

    async fn leave_room(&self, room_id: &str) -> Result<()> {
        if self.store.leave_room(room_id)? {
            self.emit(ChatEvent::leave_room(room_id), None)?;
        }
        Ok(())
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<()> {
        if let Some(msg) = self.store.send_message(room_id, text)? {
            self.emit(ChatEvent::message(room_id, &msg.message), Some(msg.timestamp))?;
        }
        Ok(())
    }

    fn subscribe(&self, filter: EventFilter, listener: Listener) -> Subscription {
        self.listeners.subscribe_arc(filter, listener)
    }

    async fn disconnect(&self) {
        self.listeners.clear();
    }
}
