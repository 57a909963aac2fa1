//! Frame codec for the WebSocket pump.
//!
//! - Text frames => UTF-8 strings handed to the client as-is
//! - Close frames end the link
//! - Ping/Pong are answered by tungstenite itself; binary frames are not part
//!   of the chat protocol

use tokio_tungstenite::tungstenite::Message;

#[derive(Debug)]
pub enum Inbound {
    Text(String),
    Close,
    Ignored { kind: &'static str, bytes_len: usize },
}

pub fn decode(msg: Message) -> Inbound {
    match msg {
        Message::Text(s) => Inbound::Text(s.as_str().to_owned()),
        Message::Binary(b) => Inbound::Ignored {
            kind: "binary",
            bytes_len: b.len(),
        },
        Message::Ping(v) => Inbound::Ignored {
            kind: "ping",
            bytes_len: v.len(),
        },
        Message::Pong(v) => Inbound::Ignored {
            kind: "pong",
            bytes_len: v.len(),
        },
        Message::Frame(f) => Inbound::Ignored {
            kind: "frame",
            bytes_len: f.len(),
        },
        Message::Close(_) => Inbound::Close,
    }
}

pub fn encode(text: String) -> Message {
    Message::text(text)
}
