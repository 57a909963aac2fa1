use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use roomwire_core::error::Result;

use super::{Storage, CHANGE_BUFFER};

/// Process-local storage. Clone an `Arc<MemoryStorage>` to share it.
pub struct MemoryStorage {
    entries: DashMap<String, String>,
    changes: broadcast::Sender<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            entries: DashMap::new(),
            changes,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn notify(&self, key: &str) {
        let _ = self.changes.send(key.to_string());
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.notify(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.notify(key);
        }
        Ok(())
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool> {
        // The entry guard holds the shard lock across compare and write.
        let swapped = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                if expected == Some(e.get().as_str()) {
                    e.insert(value.to_string());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(e) => {
                if expected.is_none() {
                    e.insert(value.to_string());
                    true
                } else {
                    false
                }
            }
        };
        if swapped {
            self.notify(key);
        }
        Ok(swapped)
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
