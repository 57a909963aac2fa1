//! Connection seam between clients and the network.
//!
//! A connector opens a `WireLink`: a pair of text channels. The client owns
//! both ends on its side; the link is closed when either side drops.

use async_trait::async_trait;
use tokio::sync::mpsc;

use roomwire_core::error::Result;

/// One open connection as seen by a client.
#[derive(Debug)]
pub struct WireLink {
    /// Frames to transmit. Dropping it closes the connection.
    pub outbound: mpsc::Sender<String>,
    /// Frames received. `None` means the peer or network closed the link.
    pub inbound: mpsc::Receiver<String>,
}

/// The far side of an in-memory link.
#[derive(Debug)]
pub struct RemoteEnd {
    /// Frames the client transmitted.
    pub sent: mpsc::Receiver<String>,
    /// Deliver a frame to the client. Dropping it simulates a connection drop.
    pub deliver: mpsc::Sender<String>,
}

impl WireLink {
    /// In-memory link with no network behind it.
    pub fn pair(buffer: usize) -> (WireLink, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::channel(buffer.max(1));
        let (in_tx, in_rx) = mpsc::channel(buffer.max(1));
        (
            WireLink {
                outbound: out_tx,
                inbound: in_rx,
            },
            RemoteEnd {
                sent: out_rx,
                deliver: in_tx,
            },
        )
    }
}

/// Opens links to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<WireLink>;
}
