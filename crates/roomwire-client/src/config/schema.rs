use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use roomwire_core::error::{Result, RoomwireError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    pub backend: BackendKind,

    #[serde(default)]
    pub local: LocalSection,

    #[serde(default)]
    pub socket: Option<SocketSection>,

    #[serde(default)]
    pub provider: Option<ProviderConfig>,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RoomwireError::UnsupportedVersion);
        }

        match self.backend {
            BackendKind::Local => {}
            BackendKind::Socket => {
                let socket = self.socket.as_ref().ok_or_else(|| {
                    RoomwireError::Config("backend `socket` requires a socket section".into())
                })?;
                socket.validate()?;
            }
            BackendKind::Provider => {
                if self.provider.is_none() {
                    return Err(RoomwireError::Config(
                        "backend `provider` requires a provider section".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Which backend the UI talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Socket,
    Provider,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSection {
    /// Directory for the file storage backend. In-memory when absent.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_key_prefix() -> String {
    "safespace".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocketSection {
    pub url: String,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl SocketSection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            outbound_buffer: default_outbound_buffer(),
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_ws_url("socket.url", &self.url)?;
        if self.outbound_buffer == 0 {
            return Err(RoomwireError::Config(
                "socket.outbound_buffer must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_reconnect_interval_ms() -> u64 {
    3000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_outbound_buffer() -> usize {
    256
}

/// Third-party pub/sub family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderService {
    Socketio,
    Pusher,
    Custom,
}

impl ProviderService {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderService::Socketio => "socketio",
            ProviderService::Pusher => "pusher",
            ProviderService::Custom => "custom",
        }
    }
}

/// Provider settings. Required fields depend on `service` and are checked
/// when the adapter connects.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub service: ProviderService,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

impl ProviderConfig {
    /// Bare config with no optional fields set.
    pub fn new(service: ProviderService) -> Self {
        Self {
            service,
            endpoint: None,
            api_key: None,
            cluster: None,
            app_id: None,
        }
    }

    /// Config with the service's usual defaults filled in.
    pub fn with_defaults(service: ProviderService) -> Self {
        let mut cfg = Self::new(service);
        cfg.apply_defaults();
        cfg
    }

    /// Fill absent or blank fields that the service has a default for.
    /// Fields that are set are left alone.
    pub fn apply_defaults(&mut self) {
        let (field, default) = match self.service {
            ProviderService::Socketio => (&mut self.endpoint, "ws://localhost:3001"),
            ProviderService::Pusher => (&mut self.cluster, "us2"),
            ProviderService::Custom => return,
        };
        if is_blank(field) {
            *field = Some(default.to_string());
        }
    }

    /// Fields the chosen service needs that are absent or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self.service {
            ProviderService::Socketio | ProviderService::Custom => {
                if is_blank(&self.endpoint) {
                    missing.push("endpoint");
                }
            }
            ProviderService::Pusher => {
                if is_blank(&self.api_key) {
                    missing.push("api_key");
                }
                if is_blank(&self.cluster) {
                    missing.push("cluster");
                }
            }
        }
        missing
    }

    /// Fail fast unless every required field is present.
    pub fn validate(&self) -> Result<()> {
        let fields = self.missing_fields();
        if !fields.is_empty() {
            return Err(RoomwireError::MissingConfig {
                provider: self.service.as_str(),
                fields,
            });
        }
        if let Some(endpoint) = &self.endpoint {
            if self.service != ProviderService::Pusher {
                validate_ws_url("provider.endpoint", endpoint)?;
            }
        }
        Ok(())
    }
}

fn is_blank(v: &Option<String>) -> bool {
    v.as_deref().map_or(true, |s| s.trim().is_empty())
}

pub(crate) fn validate_ws_url(field: &str, raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| RoomwireError::Config(format!("{field} is not a valid url: {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(RoomwireError::Config(format!(
            "{field} must use ws:// or wss://, got {other}://"
        ))),
    }
}
