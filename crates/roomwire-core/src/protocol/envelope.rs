//! Envelope codec (JSON).
//!
//! Inbound frames keep `data` as `RawValue` until the `type` is known, then
//! decode it into the payload for that type.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::{Result, RoomwireError};
use crate::model::Identity;
use crate::protocol::payload::{ChatEvent, EventKind};

/// Uniform event unit carried by every transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub event: ChatEvent,
    /// Epoch milliseconds. Stamped on send.
    pub timestamp: Option<i64>,
    /// Sender identity. Stamped on send.
    pub user: Option<Identity>,
}

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(default)]
    data: Option<Box<RawValue>>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    user: Option<Identity>,
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    kind: EventKind,
    data: &'a ChatEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a Identity>,
}

impl Envelope {
    /// Unstamped envelope.
    pub fn new(event: ChatEvent) -> Self {
        Self {
            event,
            timestamp: None,
            user: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Stamp with the current time and the sender identity.
    pub fn stamped(mut self, user: Option<Identity>) -> Self {
        self.timestamp = Some(now_millis());
        self.user = user;
        self
    }

    /// Parse and validate one text frame.
    pub fn parse(s: &str) -> Result<Self> {
        let raw: InboundEnvelope = serde_json::from_str(s)
            .map_err(|e| RoomwireError::BadRequest(format!("invalid envelope json: {e}")))?;
        let event = ChatEvent::decode(raw.kind, raw.data.as_deref().map(RawValue::get))?;
        Ok(Self {
            event,
            timestamp: raw.timestamp,
            user: raw.user,
        })
    }

    /// Parse from an already-decoded JSON value (provider payloads).
    pub fn from_value(v: &serde_json::Value) -> Result<Self> {
        Self::parse(&v.to_string())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RoomwireError::Internal(format!("json encode failed: {e}")))
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| RoomwireError::Internal(format!("json encode failed: {e}")))
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        OutboundEnvelope {
            kind: self.event.kind(),
            data: &self.event,
            timestamp: self.timestamp,
            user: self.user.as_ref(),
        }
        .serialize(serializer)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
