//! Shared error type across roomwire crates.

use thiserror::Error;

/// Stable error codes carried in `error` envelopes and surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input / malformed frame.
    BadRequest,
    /// Backend configuration is missing or invalid.
    Config,
    /// Opening a connection failed.
    ConnectFailed,
    /// Operation requires a live connection.
    NotConnected,
    /// Durable storage failed.
    Storage,
    /// Unsupported config or protocol version.
    UnsupportedVersion,
    /// Internal invariant break.
    Internal,
}

impl ErrorCode {
    /// String representation used in JSON payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Config => "CONFIG",
            ErrorCode::ConnectFailed => "CONNECT_FAILED",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::Storage => "STORAGE",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RoomwireError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum RoomwireError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{provider} provider requires {}", fields.join(", "))]
    MissingConfig {
        provider: &'static str,
        fields: Vec<&'static str>,
    },
    #[error("config: {0}")]
    Config(String),
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("storage: {0}")]
    Storage(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl RoomwireError {
    /// Map an error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomwireError::BadRequest(_) => ErrorCode::BadRequest,
            RoomwireError::MissingConfig { .. } | RoomwireError::Config(_) => ErrorCode::Config,
            RoomwireError::ConnectFailed(_) => ErrorCode::ConnectFailed,
            RoomwireError::NotConnected => ErrorCode::NotConnected,
            RoomwireError::Storage(_) => ErrorCode::Storage,
            RoomwireError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            RoomwireError::Internal(_) => ErrorCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_names_every_field() {
        let err = RoomwireError::MissingConfig {
            provider: "pusher",
            fields: vec!["api_key", "cluster"],
        };
        assert_eq!(err.to_string(), "pusher provider requires api_key, cluster");
        assert_eq!(err.code().as_str(), "CONFIG");
    }
}
