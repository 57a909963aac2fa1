use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use dashmap::DashMap;
use fd_lock::RwLock;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;

use roomwire_core::error::{Result, RoomwireError};

use super::{Storage, CHANGE_BUFFER};

const LOCK_FILE: &str = ".roomwire.lock";

/// Change feeds shared by every handle opened on the same directory in this
/// process.
static FEEDS: OnceLock<DashMap<PathBuf, broadcast::Sender<String>>> = OnceLock::new();

/// One file per key under a data directory.
///
/// Writes go to a uniquely named temp file that is renamed into place.
/// Mutations hold an advisory lock on a lock file in the directory, so
/// handles in other threads or processes never interleave a
/// compare-and-swap. The change feed covers handles in this process only.
pub struct FileStorage {
    dir: PathBuf,
    lock_path: PathBuf,
    changes: broadcast::Sender<String>,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            RoomwireError::Storage(format!("create data dir {} failed: {e}", dir.display()))
        })?;
        let canonical = fs::canonicalize(&dir).map_err(|e| {
            RoomwireError::Storage(format!("resolve data dir {} failed: {e}", dir.display()))
        })?;
        let changes = FEEDS
            .get_or_init(DashMap::new)
            .entry(canonical)
            .or_insert_with(|| broadcast::channel(CHANGE_BUFFER).0)
            .clone();

        Ok(Self {
            lock_path: dir.join(LOCK_FILE),
            dir,
            changes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(RoomwireError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn read(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RoomwireError::Storage(format!(
                "read {} failed: {e}",
                path.display()
            ))),
        }
    }

    fn write(&self, path: &Path, value: &str) -> Result<()> {
        let failed = |e: std::io::Error| {
            RoomwireError::Storage(format!("write {} failed: {e}", path.display()))
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(failed)?;
        tmp.write_all(value.as_bytes()).map_err(failed)?;
        tmp.persist(path).map_err(|e| failed(e.error))?;
        Ok(())
    }

    /// Run `op` while holding the directory's exclusive lock.
    fn locked<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let file: File = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| RoomwireError::Storage(format!("open lock file failed: {e}")))?;
        let mut lock = RwLock::new(file);
        let _guard = lock
            .write()
            .map_err(|e| RoomwireError::Storage(format!("lock data dir failed: {e}")))?;
        op()
    }

    fn notify(&self, key: &str) {
        let _ = self.changes.send(key.to_string());
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        self.read(&path)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        self.locked(|| self.write(&path, value))?;
        self.notify(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let removed = self.locked(|| match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RoomwireError::Storage(format!(
                "remove {} failed: {e}",
                path.display()
            ))),
        })?;
        if removed {
            self.notify(key);
        }
        Ok(())
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        let swapped = self.locked(|| {
            if self.read(&path)?.as_deref() != expected {
                return Ok(false);
            }
            self.write(&path, value)?;
            Ok(true)
        })?;
        if swapped {
            self.notify(key);
        }
        Ok(swapped)
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
