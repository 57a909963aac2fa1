//! Transport layer (live socket).
//!
//! Exposes the connector seam, the WebSocket connector and frame codec, and
//! the reconnecting client that owns one live connection.

pub mod client;
pub mod codec;
pub mod link;
pub mod ws;

pub use client::{ConnectionState, SocketClient};
pub use link::{Connector, RemoteEnd, WireLink};
pub use ws::WsConnector;
