//! roomwire client library entry.
//!
//! This crate provides the interchangeable chat backends (durable local
//! store, reconnecting socket client, third-party provider adapter), the
//! contract they share, and the config layer that picks one. It is intended
//! to be consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod providers;
pub mod storage;
pub mod store;
pub mod transport;

pub use app_state::AppState;
pub use contract::{ChatTransport, ChatTransportExt};
pub use dispatch::{EventFilter, Subscription};
