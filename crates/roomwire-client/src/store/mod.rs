//! Persistent room store and its transport-contract wrapper.
//!
//! No network: rooms, messages and identity live in a `Storage` backend and
//! every change is fanned out to snapshot listeners.

mod local;
mod room_store;

pub use local::LocalTransport;
pub use room_store::{RoomListener, RoomStore, DEFAULT_ROOMS};
