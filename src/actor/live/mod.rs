//! Live Status Actor - fans build and server events out to clients.
//!
//! # Architecture
//!
//! ```text
//! Coordinator --[Publish/Attach]--> LiveActor --[JSON frames]--> Clients
//!                                       ^                          |
//!                                       +------[close/ping]--------+
//! ```
//!
//! The actor is the only writer to the client list; a reader thread polls
//! clients for close frames and liveness. A client whose send fails is
//! removed without affecting the others.

mod client;
mod event;
mod server;

pub use client::{ChannelSink, ClientConnection, ClientId, ClientSink, SinkError, SinkPoll, WsSink};
pub use event::{BuildStarted, FileChanged, LiveEvent};
pub use server::LiveServer;

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::messages::LiveMsg;
use crate::utils::time::now_millis;

/// Reader thread poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A registered client with its connection bookkeeping
struct RegisteredClient {
    info: ClientConnection,
    sink: Box<dyn ClientSink>,
}

type Clients = Arc<Mutex<Vec<RegisteredClient>>>;

/// Handle to the live actor.
#[derive(Clone)]
pub struct StatusBroadcaster {
    tx: mpsc::UnboundedSender<LiveMsg>,
}

impl StatusBroadcaster {
    /// Spawn the actor and its reader thread on the current runtime.
    pub fn spawn() -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = LiveActor::new(rx);
        let handle = tokio::spawn(actor.run());
        (Self { tx }, handle)
    }

    /// Deliver `event` to every connected client.
    pub fn publish(&self, event: LiveEvent) {
        crate::debug!("live"; "publish {}", event.name());
        let _ = self.tx.send(LiveMsg::Publish(event));
    }

    /// Register a client, sending `replay` to it first.
    pub fn attach(&self, sink: Box<dyn ClientSink>, replay: Vec<LiveEvent>) {
        let _ = self.tx.send(LiveMsg::Attach { sink, replay });
    }

    pub async fn clients(&self) -> Vec<ClientConnection> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LiveMsg::Clients(reply)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Close every client and stop the actor.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LiveMsg::Shutdown(reply)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Live Actor - owns client connections
struct LiveActor {
    rx: mpsc::UnboundedReceiver<LiveMsg>,
    /// Connected clients (shared with the reader thread)
    clients: Clients,
    next_id: u64,
}

impl LiveActor {
    fn new(rx: mpsc::UnboundedReceiver<LiveMsg>) -> Self {
        Self {
            rx,
            clients: Arc::new(Mutex::new(Vec::new())),
            next_id: 1,
        }
    }

    async fn run(mut self) {
        let weak = Arc::downgrade(&self.clients);
        std::thread::spawn(move || client_reader_loop(weak));

        while let Some(msg) = self.rx.recv().await {
            match msg {
                LiveMsg::Publish(event) => self.broadcast(&event),
                LiveMsg::Attach { sink, replay } => self.add_client(sink, &replay),
                LiveMsg::Clients(reply) => {
                    let infos = self.clients.lock().iter().map(|c| c.info.clone()).collect();
                    let _ = reply.send(infos);
                }
                LiveMsg::Shutdown(reply) => {
                    let mut clients = self.clients.lock();
                    crate::debug!("live"; "closing {} client(s)", clients.len());
                    for mut client in clients.drain(..) {
                        client.sink.close();
                    }
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    fn add_client(&mut self, mut sink: Box<dyn ClientSink>, replay: &[LiveEvent]) {
        let id = ClientId(self.next_id);
        self.next_id += 1;

        for event in replay {
            if let Err(e) = sink.send(&event.to_json()) {
                crate::debug!("live"; "{} dropped during replay: {}", id, e);
                return;
            }
        }

        let now = now_millis();
        let mut clients = self.clients.lock();
        clients.push(RegisteredClient {
            info: ClientConnection {
                id,
                connected_at: now,
                last_seen_at: now,
            },
            sink,
        });
        crate::debug!("live"; "{} connected (total: {})", id, clients.len());
    }

    /// Broadcast a message to all connected clients
    fn broadcast(&self, event: &LiveEvent) {
        let text = event.to_json();
        let mut clients = self.clients.lock();
        if clients.is_empty() {
            return;
        }

        let now = now_millis();
        clients.retain_mut(|client| match client.sink.send(&text) {
            Ok(()) => {
                client.info.last_seen_at = now;
                true
            }
            Err(e) => {
                crate::debug!("live"; "{} disconnected: {}", client.info.id, e);
                false
            }
        });
    }
}

/// Background thread polling clients for close frames (non-blocking).
///
/// Exits once the actor has dropped the client list.
fn client_reader_loop(clients: Weak<Mutex<Vec<RegisteredClient>>>) {
    loop {
        std::thread::sleep(POLL_INTERVAL);
        let Some(clients) = clients.upgrade() else {
            break;
        };

        let now = now_millis();
        clients.lock().retain_mut(|client| match client.sink.poll() {
            SinkPoll::Idle => true,
            SinkPoll::Active => {
                client.info.last_seen_at = now;
                true
            }
            SinkPoll::Closed => {
                crate::debug!("live"; "{} closed", client.info.id);
                false
            }
        });
    }
}
