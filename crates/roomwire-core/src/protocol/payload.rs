//! Typed payloads, one per event type.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomwireError};
use crate::model::Identity;

/// Envelope `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Join,
    Leave,
    Message,
    UserList,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Join,
        EventKind::Leave,
        EventKind::Message,
        EventKind::UserList,
        EventKind::Error,
    ];

    /// Wire name (`type` field value).
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::Message => "message",
            EventKind::UserList => "user_list",
            EventKind::Error => "error",
        }
    }
}

/// `join`: either announces an identity (on connect) or a room membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveData {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub room_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub users: Vec<Identity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

/// Event payload discriminated by kind.
///
/// Serializes as the bare payload; the kind travels in the envelope's `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    Join(JoinData),
    Leave(LeaveData),
    Message(MessageData),
    UserList(UserListData),
    Error(ErrorData),
}

impl ChatEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::Join(_) => EventKind::Join,
            ChatEvent::Leave(_) => EventKind::Leave,
            ChatEvent::Message(_) => EventKind::Message,
            ChatEvent::UserList(_) => EventKind::UserList,
            ChatEvent::Error(_) => EventKind::Error,
        }
    }

    /// Room this event refers to, if any.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ChatEvent::Join(d) => d.room_id.as_deref(),
            ChatEvent::Leave(d) => Some(&d.room_id),
            ChatEvent::Message(d) => Some(&d.room_id),
            ChatEvent::UserList(d) => d.room_id.as_deref(),
            ChatEvent::Error(_) => None,
        }
    }

    /// Identity announcement sent right after a connection opens.
    pub fn announce(user: Identity) -> Self {
        ChatEvent::Join(JoinData {
            room_id: None,
            user: Some(user),
        })
    }

    pub fn join_room(room_id: impl Into<String>) -> Self {
        ChatEvent::Join(JoinData {
            room_id: Some(room_id.into()),
            user: None,
        })
    }

    pub fn leave_room(room_id: impl Into<String>) -> Self {
        ChatEvent::Leave(LeaveData {
            room_id: room_id.into(),
        })
    }

    /// Chat message; text is trimmed.
    pub fn message(room_id: impl Into<String>, text: &str) -> Self {
        ChatEvent::Message(MessageData {
            room_id: room_id.into(),
            message: text.trim().to_string(),
        })
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ChatEvent::Error(ErrorData {
            code: Some(code.into()),
            message: message.into(),
        })
    }

    /// Decode a raw JSON payload for the given kind.
    ///
    /// A missing payload is treated as `{}`, so kinds with required fields
    /// still fail.
    pub fn decode(kind: EventKind, raw: Option<&str>) -> Result<Self> {
        let raw = raw.unwrap_or("{}");
        let bad = |e: serde_json::Error| {
            RoomwireError::BadRequest(format!("invalid {} data: {e}", kind.as_str()))
        };
        Ok(match kind {
            EventKind::Join => ChatEvent::Join(serde_json::from_str(raw).map_err(bad)?),
            EventKind::Leave => ChatEvent::Leave(serde_json::from_str(raw).map_err(bad)?),
            EventKind::Message => ChatEvent::Message(serde_json::from_str(raw).map_err(bad)?),
            EventKind::UserList => ChatEvent::UserList(serde_json::from_str(raw).map_err(bad)?),
            EventKind::Error => ChatEvent::Error(serde_json::from_str(raw).map_err(bad)?),
        })
    }
}

/// Compile-time mapping from a payload type to its event kind.
pub trait TypedPayload: Sized + Send + Sync + 'static {
    const KIND: EventKind;

    fn from_event(event: &ChatEvent) -> Option<&Self>;
}

macro_rules! typed_payload {
    ($ty:ty, $variant:ident) => {
        impl TypedPayload for $ty {
            const KIND: EventKind = EventKind::$variant;

            fn from_event(event: &ChatEvent) -> Option<&Self> {
                match event {
                    ChatEvent::$variant(d) => Some(d),
                    _ => None,
                }
            }
        }
    };
}

typed_payload!(JoinData, Join);
typed_payload!(LeaveData, Leave);
typed_payload!(MessageData, Message);
typed_payload!(UserListData, UserList);
typed_payload!(ErrorData, Error);
