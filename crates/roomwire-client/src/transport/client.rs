//! Reconnecting socket client.
//!
//! One actor task owns the live link, the pending handshake and the single
//! reconnect timer. Callers talk to it through a command channel, so
//! `disconnect()` and a scheduled reconnect can never race: the timer only
//! exists inside the actor and is dropped there.
//!
//! States: `Disconnected -> Connecting -> Connected -> Reconnecting ->
//! (Connected | Disconnected)`.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Sleep};

use roomwire_core::error::{Result, RoomwireError};
use roomwire_core::model::Identity;
use roomwire_core::protocol::{ChatEvent, Envelope, TypedPayload};

use crate::config::SocketSection;
use crate::contract::ChatTransport;
use crate::dispatch::{EventFilter, Listener, ListenerRegistry, Subscription};
use crate::transport::link::{Connector, WireLink};
use crate::transport::ws::WsConnector;

/// Error code of the envelope dispatched when reconnection gives up.
pub const RECONNECT_EXHAUSTED: &str = "reconnect_exhausted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

enum Command {
    Connect {
        identity: Identity,
        reply: oneshot::Sender<Result<()>>,
    },
    Send {
        envelope: Envelope,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the client actor. Dropping it shuts the actor down.
pub struct SocketClient {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    listeners: Arc<ListenerRegistry>,
}

impl SocketClient {
    /// Spawn the client actor. Must be called inside a tokio runtime.
    pub fn new(cfg: SocketSection, connector: Arc<dyn Connector>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(cfg.outbound_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let listeners = ListenerRegistry::new();

        let actor = Actor {
            cfg,
            connector,
            listeners: Arc::clone(&listeners),
            state_tx,
            identity: None,
            attempts: 0,
            link: None,
            handshake: None,
            origin: Origin::Caller,
            retry: None,
            waiters: Vec::new(),
        };
        tokio::spawn(actor.run(cmd_rx));

        Self {
            cmd_tx,
            state_rx,
            listeners,
        }
    }

    /// Client backed by real WebSocket connections.
    pub fn websocket(cfg: SocketSection) -> Self {
        let connector = Arc::new(WsConnector::new(cfg.outbound_buffer));
        Self::new(cfg, connector)
    }

    /// Open the connection and announce `identity`.
    ///
    /// Resolves once the link is open; fails if opening fails. A failed
    /// initial connect does not schedule reconnects.
    pub async fn connect(&self, identity: Identity) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Connect { identity, reply })
            .await
            .map_err(|_| RoomwireError::Internal("socket client task stopped".into()))?;
        rx.await
            .map_err(|_| RoomwireError::Internal("socket client task stopped".into()))?
    }

    /// Transmit an envelope stamped with the current time and identity.
    /// Dropped with a warning when not connected.
    pub async fn send(&self, envelope: Envelope) {
        if self.cmd_tx.send(Command::Send { envelope }).await.is_err() {
            tracing::warn!("socket client task stopped; message not sent");
        }
    }

    pub async fn send_chat_message(&self, room_id: &str, text: &str) {
        self.send(Envelope::new(ChatEvent::message(room_id, text))).await;
    }

    pub async fn join(&self, room_id: &str) {
        self.send(Envelope::new(ChatEvent::join_room(room_id))).await;
    }

    pub async fn leave(&self, room_id: &str) {
        self.send(Envelope::new(ChatEvent::leave_room(room_id))).await;
    }

    pub fn on<F>(&self, filter: EventFilter, listener: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.listeners.subscribe(filter, listener)
    }

    pub fn on_typed<P, F>(&self, listener: F) -> Subscription
    where
        P: TypedPayload,
        F: Fn(&P, &Envelope) + Send + Sync + 'static,
    {
        self.listeners.subscribe_typed(listener)
    }

    /// Cancel any pending reconnect, close the link and drop all listeners.
    /// No connect attempt happens after this returns.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Disconnect { reply }).await.is_ok() {
            let _ = rx.await;
        }
        self.listeners.clear();
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

#[async_trait]
impl ChatTransport for SocketClient {
    fn backend(&self) -> &'static str {
        "socket"
    }

    async fn connect(&self, identity: &Identity) -> Result<()> {
        SocketClient::connect(self, identity.clone()).await
    }

    async fn join_room(&self, room_id: &str) -> Result<()> {
        self.join(room_id).await;
        Ok(())
    }

    async fn leave_room(&self, room_id: &str) -> Result<()> {
        self.leave(room_id).await;
        Ok(())
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<()> {
        self.send_chat_message(room_id, text).await;
        Ok(())
    }

    fn subscribe(&self, filter: EventFilter, listener: Listener) -> Subscription {
        self.listeners.subscribe_arc(filter, listener)
    }

    async fn disconnect(&self) {
        self.close().await;
    }
}

/// Who asked for the handshake in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// `connect()`: failure is reported, never retried.
    Caller,
    /// Reconnect timer: failure counts as another drop.
    Retry,
}

struct Actor {
    cfg: SocketSection,
    connector: Arc<dyn Connector>,
    listeners: Arc<ListenerRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    identity: Option<Identity>,
    attempts: u32,
    link: Option<WireLink>,
    handshake: Option<BoxFuture<'static, Result<WireLink>>>,
    origin: Origin,
    retry: Option<Pin<Box<Sleep>>>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl Actor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                // Commands first: a queued disconnect wins over a due timer.
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.on_command(cmd),
                        None => {
                            self.shutdown();
                            break;
                        }
                    }
                }

                res = poll_handshake(&mut self.handshake) => {
                    self.handshake = None;
                    self.on_handshake(res);
                }

                frame = recv_frame(&mut self.link) => {
                    match frame {
                        Some(text) => self.on_frame(&text),
                        None => self.on_drop(),
                    }
                }

                _ = wait_retry(&mut self.retry) => {
                    self.retry = None;
                    tracing::info!(attempt = self.attempts, url = %self.cfg.url, "reconnect attempt");
                    self.start_handshake(Origin::Retry);
                }
            }
        }
        tracing::debug!("socket client task finished");
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|s| {
            if *s == next {
                return false;
            }
            tracing::debug!(from = ?*s, to = ?next, "socket state");
            *s = next;
            true
        });
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { identity, reply } => match self.state() {
                ConnectionState::Connected => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Connecting => {
                    self.identity = Some(identity);
                    self.waiters.push(reply);
                }
                ConnectionState::Reconnecting => {
                    self.identity = Some(identity);
                    self.waiters.push(reply);
                    if self.handshake.is_none() {
                        self.retry = None;
                        self.start_handshake(Origin::Retry);
                    }
                }
                ConnectionState::Disconnected => {
                    self.identity = Some(identity);
                    self.attempts = 0;
                    self.waiters.push(reply);
                    self.set_state(ConnectionState::Connecting);
                    self.start_handshake(Origin::Caller);
                }
            },
            Command::Send { envelope } => self.transmit(envelope),
            Command::Disconnect { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn start_handshake(&mut self, origin: Origin) {
        let connector = Arc::clone(&self.connector);
        let url = self.cfg.url.clone();
        self.origin = origin;
        self.handshake = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    fn on_handshake(&mut self, res: Result<WireLink>) {
        match res {
            Ok(link) => {
                self.link = Some(link);
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
                tracing::info!(url = %self.cfg.url, "socket connected");

                if let Some(user) = self.identity.clone() {
                    self.transmit(Envelope::new(ChatEvent::announce(user)));
                }
                for w in self.waiters.drain(..) {
                    let _ = w.send(Ok(()));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %self.cfg.url, "socket connect failed");
                let reason = e.to_string();
                for w in self.waiters.drain(..) {
                    let _ = w.send(Err(RoomwireError::ConnectFailed(reason.clone())));
                }
                match self.origin {
                    Origin::Caller => self.set_state(ConnectionState::Disconnected),
                    Origin::Retry => self.schedule_reconnect(),
                }
            }
        }
    }

    fn on_frame(&self, text: &str) {
        match Envelope::parse(text) {
            Ok(env) => {
                self.listeners.dispatch(&env);
            }
            Err(e) => tracing::error!(error = %e, "discarding malformed frame"),
        }
    }

    fn on_drop(&mut self) {
        self.link = None;
        tracing::warn!(url = %self.cfg.url, "socket closed unexpectedly");
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.identity.is_none() {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        let max = self.cfg.max_reconnect_attempts;
        if self.attempts >= max {
            tracing::error!(attempts = self.attempts, max, "max reconnection attempts reached");
            self.set_state(ConnectionState::Disconnected);
            let gave_up = Envelope::new(ChatEvent::error(
                RECONNECT_EXHAUSTED,
                format!("gave up after {} reconnect attempts", self.attempts),
            ))
            .stamped(self.identity.clone());
            self.listeners.dispatch(&gave_up);
            return;
        }

        self.attempts += 1;
        tracing::info!(attempt = self.attempts, max, "scheduling reconnect");
        self.set_state(ConnectionState::Reconnecting);
        self.retry = Some(Box::pin(sleep(self.cfg.reconnect_interval())));
    }

    fn transmit(&self, envelope: Envelope) {
        let link = match (&self.link, self.state()) {
            (Some(link), ConnectionState::Connected) => link,
            _ => {
                tracing::warn!(kind = envelope.kind().as_str(), "socket not connected; message not sent");
                return;
            }
        };

        let envelope = envelope.stamped(self.identity.clone());
        let text = match envelope.to_json() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "envelope encode failed");
                return;
            }
        };
        if let Err(e) = link.outbound.try_send(text) {
            tracing::warn!(error = %e, kind = envelope.kind().as_str(), "outbound queue rejected message; dropped");
        }
    }

    fn shutdown(&mut self) {
        self.retry = None;
        self.handshake = None;
        self.link = None;
        self.identity = None;
        self.attempts = 0;
        for w in self.waiters.drain(..) {
            let _ = w.send(Err(RoomwireError::ConnectFailed("disconnected".into())));
        }
        self.listeners.clear();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(url = %self.cfg.url, "socket disconnected");
    }
}

async fn poll_handshake(handshake: &mut Option<BoxFuture<'static, Result<WireLink>>>) -> Result<WireLink> {
    match handshake {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn recv_frame(link: &mut Option<WireLink>) -> Option<String> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => pending().await,
    }
}

async fn wait_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(timer) => timer.await,
        None => pending().await,
    }
}
