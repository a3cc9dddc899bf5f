//! WebSocket acceptor for the live status channel.
//!
//! Connections are accepted and handshaken on a dedicated thread, then handed
//! to the coordinator, which replays current state before the client joins
//! the broadcast set.

use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;

use super::client::WsSink;
use crate::actor::messages::CoordinatorMsg;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Accept poll interval
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Handshake read timeout, so a silent peer cannot stall the acceptor
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Running acceptor. Dropping it stops accepting.
pub struct LiveServer {
    port: u16,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LiveServer {
    /// Bind (retrying the next ports) and start accepting clients.
    pub fn start(
        interface: IpAddr,
        base_port: u16,
        coordinator_tx: mpsc::UnboundedSender<CoordinatorMsg>,
    ) -> Result<Self> {
        let (listener, port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
        listener.set_nonblocking(true)?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("sitekeeper-live".into())
            .spawn(move || accept_loop(listener, coordinator_tx, flag))?;

        Ok(Self {
            port,
            stop,
            thread: Some(thread),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LiveServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    coordinator_tx: mpsc::UnboundedSender<CoordinatorMsg>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                crate::debug!("live"; "connection from {}", addr);

                // Blocking during the handshake, WsSink switches to non-blocking
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));

                let ws = match tungstenite::accept(stream) {
                    Ok(ws) => ws,
                    Err(e) => {
                        crate::log!("live"; "handshake failed: {}", e);
                        continue;
                    }
                };
                let _ = ws.get_ref().set_read_timeout(None);

                let sink = Box::new(WsSink::new(ws));
                if coordinator_tx.send(CoordinatorMsg::AttachClient(sink)).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                crate::log!("live"; "accept error: {}", e);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind live channel after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_bind_retries_next_port() {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let taken = TcpListener::bind(SocketAddr::new(localhost, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let (_listener, bound) = try_bind_port(localhost, port, 5).unwrap_or_else(|e| {
            panic!("no free port near {port}: {e}");
        });
        assert_ne!(bound, port);
        assert!(bound > port && bound < port + 5);
    }

    #[test]
    fn test_client_is_handed_to_coordinator() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = LiveServer::start(IpAddr::V4(Ipv4Addr::LOCALHOST), 0, tx).unwrap();
        let url = format!("ws://127.0.0.1:{}/", server.port());

        let (_client, _) = tungstenite::connect(url).unwrap();
        let msg = rx.blocking_recv().unwrap();
        assert!(matches!(msg, CoordinatorMsg::AttachClient(_)));
    }
}
