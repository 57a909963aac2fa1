//! Test doubles shared by the client integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use roomwire_client::transport::{Connector, RemoteEnd, WireLink};
use roomwire_core::error::{Result, RoomwireError};
use roomwire_core::Identity;

/// Connector that plays back scripted outcomes and counts every attempt.
/// Once the script runs out, every attempt fails.
#[derive(Default)]
pub struct ScriptedConnector {
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Result<WireLink>>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one successful open; returns the far end of the link.
    pub fn accept(&self) -> RemoteEnd {
        let (link, remote) = WireLink::pair(32);
        self.script.lock().push_back(Ok(link));
        remote
    }

    pub fn refuse(&self) {
        self.script
            .lock()
            .push_back(Err(RoomwireError::ConnectFailed("refused".into())));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<WireLink> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Err(RoomwireError::ConnectFailed("no scripted link".into())))
    }
}

pub fn alice() -> Identity {
    Identity::new("user_1700000000000_abcdefghi", "Anonymous_al1c")
}

/// Next frame the client transmitted, parsed as JSON.
pub async fn next_sent(remote: &mut RemoteEnd) -> serde_json::Value {
    let text = remote.sent.recv().await.expect("link closed before a frame was sent");
    serde_json::from_str(&text).expect("client sent non-JSON frame")
}
