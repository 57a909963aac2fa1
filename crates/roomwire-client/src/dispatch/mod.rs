//! Listener fan-out shared by every backend.
//!
//! Re-exports the registry and subscription handle so backends and callers
//! can depend on this module directly.

pub mod listeners;

pub use listeners::{EventFilter, Listener, ListenerRegistry, Subscription};
