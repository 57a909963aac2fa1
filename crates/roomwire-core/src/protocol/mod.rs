//! Wire protocol for chat transports.
//!
//! Every backend speaks the same JSON envelope:
//! `{type, data, timestamp, user}` where `type` is one of
//! `join | leave | message | user_list | error` and `data` is the payload
//! shape for that type.
//!
//! Parsing is panic-free and validates `data` against the declared `type`
//! at the boundary, so listeners only ever see well-typed events.

pub mod envelope;
pub mod payload;
pub mod validate;

pub use envelope::Envelope;
pub use payload::{
    ChatEvent, ErrorData, EventKind, JoinData, LeaveData, MessageData, TypedPayload, UserListData,
};
pub use validate::{validate_message_text, MAX_MESSAGE_CHARS};
