use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use roomwire_core::error::{Result, RoomwireError};
use roomwire_core::model::{is_valid_room_slug, ChatMessage, ChatRoom, Identity};
use roomwire_core::protocol::envelope::now_millis;

use crate::dispatch::Subscription;
use crate::storage::Storage;

/// Rooms seeded on first run.
pub const DEFAULT_ROOMS: [(&str, &str); 3] = [
    ("depression-support", "Depression Support"),
    ("anxiety-panic", "Anxiety & Panic"),
    ("general-support", "General Mental Health"),
];

/// Retries for an optimistic write that lost a race with another writer.
const MAX_WRITE_ATTEMPTS: usize = 32;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Snapshot callback. Receives the full room collection after every change.
pub type RoomListener = Arc<dyn Fn(&[ChatRoom]) + Send + Sync>;

/// Durable rooms, messages and identity with observer fan-out.
///
/// Room writes are read-modify-write against the raw stored value with
/// compare-and-swap, so concurrent store instances sharing one backend never
/// overwrite each other's updates.
pub struct RoomStore {
    storage: Arc<dyn Storage>,
    rooms_key: String,
    user_key: String,
    listeners: Mutex<Vec<(u64, RoomListener)>>,
    next_id: AtomicU64,
    /// Raw room collection last fanned out.
    last_raw: Mutex<Option<String>>,
}

impl RoomStore {
    /// Open the store and seed it if no durable state exists.
    pub fn open(storage: Arc<dyn Storage>, key_prefix: &str) -> Result<Arc<Self>> {
        let store = Arc::new(Self {
            storage,
            rooms_key: format!("{key_prefix}_chat_data"),
            user_key: format!("{key_prefix}_user"),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            last_raw: Mutex::new(None),
        });
        store.initialize()?;
        Ok(store)
    }

    /// Seed the starter rooms unless a room collection already exists.
    pub fn initialize(&self) -> Result<()> {
        if self.storage.get(&self.rooms_key)?.is_some() {
            return Ok(());
        }
        let seed: Vec<ChatRoom> = DEFAULT_ROOMS
            .iter()
            .map(|(id, name)| ChatRoom::new(*id, *name))
            .collect();
        let raw = encode_rooms(&seed)?;
        // Losing this race means another instance seeded first.
        if self.storage.compare_and_swap(&self.rooms_key, None, &raw)? {
            tracing::info!(rooms = seed.len(), "seeded room store");
            self.notify(Some(raw), &seed);
        }
        Ok(())
    }

    /// Persisted identity, created on first access.
    pub fn current_user(&self) -> Result<Identity> {
        let existing = self.storage.get(&self.user_key)?;
        if let Some(raw) = &existing {
            match serde_json::from_str::<Identity>(raw) {
                Ok(user) => return Ok(user),
                Err(e) => tracing::warn!(error = %e, "stored identity is corrupt; regenerating"),
            }
        }

        let user = generate_identity();
        let raw = serde_json::to_string(&user)
            .map_err(|e| RoomwireError::Internal(format!("identity encode failed: {e}")))?;
        if self
            .storage
            .compare_and_swap(&self.user_key, existing.as_deref(), &raw)?
        {
            tracing::info!(user = %user.id, "created identity");
            return Ok(user);
        }

        // Another instance created one first; adopt it.
        let winner = self.storage.get(&self.user_key)?.ok_or_else(|| {
            RoomwireError::Storage("identity vanished during creation".into())
        })?;
        serde_json::from_str(&winner)
            .map_err(|e| RoomwireError::Storage(format!("stored identity is corrupt: {e}")))
    }

    /// Append a message to a room. Returns `None` if the room is unknown.
    ///
    /// Text is trimmed but not validated; blank text is stored as-is.
    pub fn send_message(&self, room_id: &str, text: &str) -> Result<Option<ChatMessage>> {
        let user = self.current_user()?;
        let msg = ChatMessage {
            id: format!("msg_{}", uuid::Uuid::now_v7().simple()),
            room_id: room_id.to_string(),
            message: text.trim().to_string(),
            timestamp: now_millis(),
            user_id: user.id,
            username: user.username,
        };

        self.update_rooms(|rooms| match find_room(rooms, room_id) {
            Some(room) => {
                room.push_message(msg.clone());
                (Some(msg.clone()), true)
            }
            None => (None, false),
        })
    }

    /// Add the current identity to a room's active users.
    /// Returns true only if the set changed.
    pub fn join_room(&self, room_id: &str) -> Result<bool> {
        let user = self.current_user()?;
        self.update_rooms(|rooms| {
            let changed = find_room(rooms, room_id).is_some_and(|r| r.add_active_user(&user.id));
            (changed, changed)
        })
    }

    /// Remove the current identity from a room's active users.
    /// Returns true only if the set changed.
    pub fn leave_room(&self, room_id: &str) -> Result<bool> {
        let user = self.current_user()?;
        self.update_rooms(|rooms| {
            let changed =
                find_room(rooms, room_id).is_some_and(|r| r.remove_active_user(&user.id));
            (changed, changed)
        })
    }

    /// Register a room that was not seeded. Returns false if the slug exists.
    pub fn add_room(&self, id: &str, name: &str) -> Result<bool> {
        if !is_valid_room_slug(id) {
            return Err(RoomwireError::BadRequest(format!("invalid room slug: {id:?}")));
        }
        self.update_rooms(|rooms| {
            if rooms.iter().any(|r| r.id == id) {
                return (false, false);
            }
            rooms.push(ChatRoom::new(id, name));
            (true, true)
        })
    }

    /// Messages of one room, oldest first. Empty if the room is unknown.
    pub fn room_messages(&self, room_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .rooms()?
            .into_iter()
            .find(|r| r.id == room_id)
            .map(|r| r.messages)
            .unwrap_or_default())
    }

    pub fn active_users(&self, room_id: &str) -> Result<Vec<String>> {
        Ok(self
            .rooms()?
            .into_iter()
            .find(|r| r.id == room_id)
            .map(|r| r.active_users)
            .unwrap_or_default())
    }

    /// Full room snapshot.
    pub fn rooms(&self) -> Result<Vec<ChatRoom>> {
        self.read_rooms().map(|(_, rooms)| rooms)
    }

    /// Register a snapshot listener. It is invoked once immediately with the
    /// current rooms, then after every change.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Result<Subscription>
    where
        F: Fn(&[ChatRoom]) + Send + Sync + 'static,
    {
        let rooms = self.rooms()?;
        let listener: RoomListener = Arc::new(listener);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::clone(&listener)));
        listener(&rooms);

        let weak: Weak<Self> = Arc::downgrade(self);
        Ok(Subscription::new(move || {
            if let Some(store) = weak.upgrade() {
                store.listeners.lock().retain(|(lid, _)| *lid != id);
            }
        }))
    }

    /// Erase identity and rooms, then seed from scratch.
    pub fn clear_all_data(&self) -> Result<()> {
        self.storage.remove(&self.rooms_key)?;
        self.storage.remove(&self.user_key)?;
        tracing::info!("cleared room store");
        self.initialize()
    }

    /// Re-read durable state and fan it out. Call after another writer
    /// changed the shared backend.
    pub fn reload(&self) -> Result<()> {
        let (raw, rooms) = self.read_rooms()?;
        self.notify(raw, &rooms);
        Ok(())
    }

    /// Spawn a task that reloads whenever the shared backend reports a change
    /// to the room collection that this instance has not fanned out yet.
    /// The task ends once the store or the backend is dropped.
    pub fn follow_storage(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.storage.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let key = match changes.recv().await {
                    Ok(key) => Some(key),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "storage change feed lagged; reloading");
                        None
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(store) = weak.upgrade() else { break };
                if key.is_some_and(|k| k != store.rooms_key) {
                    continue;
                }
                if let Err(e) = store.reload_if_changed() {
                    tracing::warn!(error = %e, "reload after storage change failed");
                }
            }
            tracing::debug!("storage follower finished");
        })
    }

    fn reload_if_changed(&self) -> Result<()> {
        let (raw, rooms) = self.read_rooms()?;
        if *self.last_raw.lock() == raw {
            return Ok(());
        }
        self.notify(raw, &rooms);
        Ok(())
    }

    /// Storage key holding the room collection.
    pub fn rooms_key(&self) -> &str {
        &self.rooms_key
    }

    fn read_rooms(&self) -> Result<(Option<String>, Vec<ChatRoom>)> {
        let raw = self.storage.get(&self.rooms_key)?;
        let rooms = match &raw {
            Some(s) => serde_json::from_str(s)
                .map_err(|e| RoomwireError::Storage(format!("stored rooms are corrupt: {e}")))?,
            None => Vec::new(),
        };
        Ok((raw, rooms))
    }

    /// Optimistic read-modify-write. `mutate` returns its output and whether
    /// it changed anything; unchanged collections are neither written nor
    /// announced. `mutate` may run more than once.
    fn update_rooms<T, F>(&self, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut Vec<ChatRoom>) -> (T, bool),
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (raw, mut rooms) = self.read_rooms()?;
            let (out, changed) = mutate(&mut rooms);
            if !changed {
                return Ok(out);
            }

            let next = encode_rooms(&rooms)?;
            if self
                .storage
                .compare_and_swap(&self.rooms_key, raw.as_deref(), &next)?
            {
                self.notify(Some(next), &rooms);
                return Ok(out);
            }
            tracing::debug!(attempt, "room write lost a race; retrying");
            std::thread::yield_now();
        }
        Err(RoomwireError::Storage(format!(
            "room write conflicted {MAX_WRITE_ATTEMPTS} times"
        )))
    }

    fn notify(&self, raw: Option<String>, rooms: &[ChatRoom]) {
        *self.last_raw.lock() = raw;
        let targets: Vec<RoomListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in targets {
            listener(rooms);
        }
    }
}

fn find_room<'a>(rooms: &'a mut [ChatRoom], room_id: &str) -> Option<&'a mut ChatRoom> {
    rooms.iter_mut().find(|r| r.id == room_id)
}

fn encode_rooms(rooms: &[ChatRoom]) -> Result<String> {
    serde_json::to_string(rooms)
        .map_err(|e| RoomwireError::Internal(format!("rooms encode failed: {e}")))
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}

fn generate_identity() -> Identity {
    Identity::new(
        format!("user_{}_{}", now_millis(), random_base36(9)),
        format!("Anonymous_{}", random_base36(4)),
    )
}
