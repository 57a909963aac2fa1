//! roomwire core: transport-agnostic chat primitives, error types, and the
//! envelope wire codec.
//!
//! This crate defines the data model and wire contract shared by every chat
//! backend (local store, live socket, third-party providers). It carries no
//! runtime or network dependencies so it can be reused in multiple contexts.
//!
//! # Panic-free parsing
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths must surface as `RoomwireError`/`Result` so a client
//! never crashes on a malformed frame from a remote peer.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod model;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorCode, Result, RoomwireError};
pub use model::{ChatMessage, ChatRoom, Identity, MAX_ROOM_MESSAGES};
pub use protocol::{ChatEvent, Envelope, EventKind};
