//! Backend wiring for roomwire clients.
//!
//! Builds the configured backend behind `Arc<dyn ChatTransport>` so callers
//! never depend on a concrete implementation. The durable store is always
//! opened because it owns the device identity every backend connects with.

use std::sync::Arc;

use roomwire_core::error::{Result, RoomwireError};
use roomwire_core::model::Identity;

use crate::config::{BackendKind, ClientConfig, LocalSection};
use crate::contract::ChatTransport;
use crate::providers::ProviderAdapter;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::store::{LocalTransport, RoomStore};
use crate::transport::SocketClient;

#[derive(Clone)]
pub struct AppState {
    store: Arc<RoomStore>,
    transport: Arc<dyn ChatTransport>,
}

impl AppState {
    /// Build application state.
    /// Spawns the storage follower and, for the `socket` backend, the socket
    /// actor, so call it inside a tokio runtime.
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        cfg.validate()?;

        let storage = open_storage(&cfg.local)?;
        let store = RoomStore::open(storage, &cfg.local.key_prefix)?;
        // Detached; ends with the store.
        drop(store.follow_storage());
        let transport = build_transport(cfg, Arc::clone(&store))?;
        tracing::info!(backend = transport.backend(), "chat backend ready");

        Ok(Self { store, transport })
    }

    pub fn store(&self) -> Arc<RoomStore> {
        Arc::clone(&self.store)
    }

    pub fn transport(&self) -> Arc<dyn ChatTransport> {
        Arc::clone(&self.transport)
    }

    /// The durable device identity.
    pub fn identity(&self) -> Result<Identity> {
        self.store.current_user()
    }
}

/// Storage backend for the local section: files when `data_dir` is set,
/// memory otherwise.
pub fn open_storage(local: &LocalSection) -> Result<Arc<dyn Storage>> {
    Ok(match &local.data_dir {
        Some(dir) => Arc::new(FileStorage::open(dir)?),
        None => Arc::new(MemoryStorage::new()),
    })
}

/// Pick the backend named by `cfg.backend`.
pub fn build_transport(cfg: &ClientConfig, store: Arc<RoomStore>) -> Result<Arc<dyn ChatTransport>> {
    let transport: Arc<dyn ChatTransport> = match cfg.backend {
        BackendKind::Local => Arc::new(LocalTransport::new(store)),
        BackendKind::Socket => {
            let socket = cfg.socket.clone().ok_or_else(|| {
                RoomwireError::Config("backend `socket` requires a socket section".into())
            })?;
            Arc::new(SocketClient::websocket(socket))
        }
        BackendKind::Provider => {
            let provider = cfg.provider.clone().ok_or_else(|| {
                RoomwireError::Config("backend `provider` requires a provider section".into())
            })?;
            Arc::new(ProviderAdapter::websocket(provider))
        }
    };
    Ok(transport)
}
