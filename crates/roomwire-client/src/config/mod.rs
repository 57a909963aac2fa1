//! Client config loader (strict parsing).

pub mod schema;

use std::fs;

use roomwire_core::error::{Result, RoomwireError};

pub use schema::{
    BackendKind, ClientConfig, LocalSection, ProviderConfig, ProviderService, SocketSection,
};

pub fn load_from_file(path: &str) -> Result<ClientConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RoomwireError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let mut cfg: ClientConfig = serde_yaml::from_str(s)
        .map_err(|e| RoomwireError::BadRequest(format!("invalid yaml: {e}")))?;
    if let Some(provider) = cfg.provider.as_mut() {
        provider.apply_defaults();
    }
    cfg.validate()?;
    Ok(cfg)
}
