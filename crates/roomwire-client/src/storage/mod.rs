//! Durable key/value storage behind the room store.
//!
//! The store never touches a persistence backend directly; it goes through
//! `Storage` so tests can inject an in-memory backend and several store
//! instances can share one (like browser tabs sharing local storage).

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use tokio::sync::broadcast;

use roomwire_core::error::Result;

/// Capacity of the change-notification channel.
pub(crate) const CHANGE_BUFFER: usize = 64;

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Write `value` only if the current value equals `expected`
    /// (`None` = key absent). Returns false on conflict.
    fn compare_and_swap(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool>;

    /// Stream of keys changed through this backend.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}
