//! Top-level facade crate for roomwire.
//!
//! Re-exports core types and the client library so users can depend on a single crate.

pub mod core {
    pub use roomwire_core::*;
}

pub mod client {
    pub use roomwire_client::*;
}
