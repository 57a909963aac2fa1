//! WebSocket connector over `tokio-tungstenite`.
//!
//! Each link gets a pump task that bridges the socket and the link channels:
//! - outbound channel -> socket (Close frame once the client drops its sender)
//! - socket -> inbound channel (dropping the inbound sender signals the drop)

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use roomwire_core::error::{Result, RoomwireError};

use crate::transport::codec::{decode, encode, Inbound};
use crate::transport::link::{Connector, WireLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens real WebSocket connections.
#[derive(Debug, Clone)]
pub struct WsConnector {
    buffer: usize,
}

impl WsConnector {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<WireLink> {
        let (ws, _resp) = connect_async(url)
            .await
            .map_err(|e| RoomwireError::ConnectFailed(format!("{url}: {e}")))?;

        let (out_tx, out_rx) = mpsc::channel::<String>(self.buffer);
        let (in_tx, in_rx) = mpsc::channel::<String>(self.buffer);
        let url = url.to_string();
        tokio::spawn(async move {
            pump(ws, out_rx, in_tx).await;
            tracing::debug!(%url, "socket pump finished");
        });

        Ok(WireLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

async fn pump(ws: WsStream, mut out_rx: mpsc::Receiver<String>, in_tx: mpsc::Sender<String>) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(text) => {
                        if ws_tx.send(encode(text)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let msg = match incoming {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(error = %e, "socket read failed");
                        break;
                    }
                };

                match decode(msg) {
                    Inbound::Text(s) => {
                        if in_tx.send(s).await.is_err() {
                            break;
                        }
                    }
                    Inbound::Close => break,
                    Inbound::Ignored { kind, bytes_len } => {
                        tracing::trace!(kind, bytes_len, "ignored frame");
                    }
                }
            }
        }
    }
}
