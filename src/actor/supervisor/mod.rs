//! Generator process supervision.
//!
//! The supervisor is plain state owned by the coordinator. Everything that
//! waits (process exit, graceful stop, health checks, restart delay) runs in
//! a spawned task that reports back through the coordinator inbox, tagged
//! with the generation of the process it belongs to so late messages from a
//! previous process are ignored.

mod process;
mod restart;

pub use process::{BuildOutput, excerpt, next_free_port, port_is_free, run_build, strip_ansi};
pub use restart::RestartPolicy;

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use self::process::{DevProcess, StderrTail, check_health, spawn_dev_server, terminate};
use super::live::LiveEvent;
use super::messages::{CoordinatorMsg, Reply};
use crate::config::SiteConfig;
use crate::core::{Failure, FailureKind, ServerState};

/// Delay before the first health check, giving the server time to bind.
const FIRST_CHECK_DELAY: Duration = Duration::from_secs(1);

/// Connect timeout of a single health check.
const CHECK_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("generator `{program}` not found")]
    NotFound { program: String },

    #[error("failed to run `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PortInUse { .. } => FailureKind::PortInUse,
            Self::NotFound { .. } | Self::Spawn { .. } => FailureKind::ProcessCrash,
        }
    }

    pub fn to_failure(&self) -> Failure {
        let message = match self {
            Self::Spawn { source, .. } => format!("{self}: {source}"),
            _ => self.to_string(),
        };
        Failure::new(self.kind(), message)
    }
}

/// A live dev server process.
struct Running {
    generation: u64,
    /// Taken once a stop has been requested
    stop_tx: Option<oneshot::Sender<()>>,
    stderr: StderrTail,
    health: JoinHandle<()>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.health.abort();
    }
}

/// Dev server state machine.
pub struct ProcessSupervisor {
    config: Arc<SiteConfig>,
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
    state: ServerState,
    running: Option<Running>,
    generation: u64,
    policy: RestartPolicy,
    /// Token of the scheduled automatic restart, if any
    restart_pending: Option<u64>,
    restart_token: u64,
    stop_waiters: Vec<Reply<ServerState>>,
}

impl ProcessSupervisor {
    pub fn new(config: Arc<SiteConfig>, tx: mpsc::UnboundedSender<CoordinatorMsg>) -> Self {
        let policy = RestartPolicy::new(
            config.generator.restart_window(),
            config.generator.max_restarts,
        );
        Self {
            config,
            tx,
            state: ServerState::stopped(),
            running: None,
            generation: 0,
            policy,
            restart_pending: None,
            restart_token: 0,
            stop_waiters: Vec::new(),
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// No process alive (a stop may still be settling otherwise).
    pub fn is_idle(&self) -> bool {
        self.running.is_none()
    }

    /// Start the dev server. Starting a running server returns its state.
    pub fn start(&mut self, port: Option<u16>) -> Result<ServerState, SupervisorError> {
        if self.running.is_some() {
            return Ok(self.state.clone());
        }
        self.restart_pending = None;
        self.policy.reset();
        self.spawn(port, 0).inspect_err(|e| {
            self.state.failure = Some(e.to_failure());
        })
    }

    fn spawn(&mut self, port: Option<u16>, restarts: u32) -> Result<ServerState, SupervisorError> {
        let port = self.choose_port(port.unwrap_or(self.config.generator.port))?;
        let DevProcess {
            child,
            pid,
            port,
            stderr,
        } = spawn_dev_server(&self.config, port)?;

        self.generation += 1;
        let generation = self.generation;
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(wait_for_exit(
            child,
            generation,
            stop_rx,
            self.config.generator.stop_timeout(),
            self.tx.clone(),
        ));
        let health = tokio::spawn(health_loop(
            port,
            generation,
            self.config.generator.health_interval(),
            self.tx.clone(),
        ));

        self.running = Some(Running {
            generation,
            stop_tx: Some(stop_tx),
            stderr,
            health,
        });
        self.state = ServerState::running(pid, port, restarts);
        crate::log!("server"; "started on port {} (pid {})", port, pid.unwrap_or_default());
        Ok(self.state.clone())
    }

    /// Requested port, or the next free one when auto-port allows it.
    fn choose_port(&self, port: u16) -> Result<u16, SupervisorError> {
        if port_is_free(port) {
            return Ok(port);
        }
        if !self.config.generator.auto_port {
            return Err(SupervisorError::PortInUse { port });
        }
        let next = next_free_port(port).ok_or(SupervisorError::PortInUse { port })?;
        crate::log!("server"; "port {} is in use, using {}", port, next);
        Ok(next)
    }

    /// Cancel any scheduled restart and ask a running process to terminate.
    pub fn request_stop(&mut self) {
        self.restart_pending = None;
        if let Some(stop_tx) = self.running.as_mut().and_then(|r| r.stop_tx.take()) {
            crate::debug!("server"; "stopping");
            let _ = stop_tx.send(());
        }
    }

    /// Stop the dev server; `reply` receives the final state.
    ///
    /// Stopping a stopped server replies immediately.
    pub fn stop(&mut self, reply: Reply<ServerState>) {
        self.request_stop();
        if self.running.is_some() {
            self.stop_waiters.push(reply);
        } else {
            let _ = reply.send(self.state.clone());
        }
    }

    fn is_stopping(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.stop_tx.is_none())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running.as_ref().is_some_and(|r| r.generation == generation)
    }

    /// Mark the server down, keeping the restart count.
    fn mark_down(&mut self, failure: Option<Failure>) {
        self.running = None;
        self.state = ServerState {
            restarts: self.state.restarts,
            failure,
            ..ServerState::stopped()
        };
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(self.state.clone());
        }
    }

    /// Process exited on its own.
    pub fn on_exited(&mut self, generation: u64, code: Option<i32>) -> Option<LiveEvent> {
        if !self.is_current(generation) {
            return None;
        }
        if self.is_stopping() {
            // Raced with a stop request
            self.mark_down(None);
            return Some(LiveEvent::ServerDown(self.state.clone()));
        }

        let tail = self
            .running
            .as_ref()
            .map(|r| r.stderr.snapshot())
            .unwrap_or_default();

        let status = match code {
            Some(code) => format!("exited with code {code}"),
            None => "killed by signal".to_string(),
        };
        let message = match tail.lines().last() {
            Some(last) => format!("dev server {status}: {last}"),
            None => format!("dev server {status}"),
        };
        crate::log!("server"; "{}", message);
        self.mark_down(Some(Failure::new(FailureKind::ProcessCrash, message)));

        if self.policy.try_acquire(Instant::now()) {
            self.schedule_restart();
        } else {
            crate::log!("server"; "restart limit reached, leaving the server down");
        }
        Some(LiveEvent::ServerDown(self.state.clone()))
    }

    fn schedule_restart(&mut self) {
        self.restart_token += 1;
        let token = self.restart_token;
        self.restart_pending = Some(token);

        let delay = self.config.generator.restart_delay();
        let tx = self.tx.clone();
        crate::debug!("server"; "restart in {}ms", delay.as_millis());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoordinatorMsg::RestartDue { token });
        });
    }

    /// Scheduled restart is due. Cancelled restarts are ignored.
    pub fn on_restart_due(&mut self, token: u64) -> Option<LiveEvent> {
        if self.restart_pending != Some(token) || self.running.is_some() {
            return None;
        }
        self.restart_pending = None;

        let restarts = self.state.restarts + 1;
        let port = self.state.port;
        match self.spawn(port, restarts) {
            Ok(state) => Some(LiveEvent::ServerUp(state)),
            Err(e) => {
                crate::log!("server"; "restart failed: {}", e);
                self.state.restarts = restarts;
                self.state.failure = Some(e.to_failure());
                Some(LiveEvent::ServerDown(self.state.clone()))
            }
        }
    }

    /// Process terminated after a stop request.
    pub fn on_stopped(&mut self, generation: u64) -> Option<LiveEvent> {
        if !self.is_current(generation) {
            return None;
        }
        self.mark_down(None);
        crate::log!("server"; "stopped");
        Some(LiveEvent::ServerDown(self.state.clone()))
    }

    /// Health check result; an event is produced only on change.
    pub fn on_health(&mut self, generation: u64, healthy: bool) -> Option<LiveEvent> {
        if !self.is_current(generation) || self.state.healthy == healthy {
            return None;
        }
        self.state.healthy = healthy;
        if !healthy {
            crate::log!("server"; "health check failed on port {}", self.state.port.unwrap_or_default());
        }
        Some(LiveEvent::ServerUp(self.state.clone()))
    }
}

/// Own the child until it exits or a stop is requested.
async fn wait_for_exit(
    mut child: tokio::process::Child,
    generation: u64,
    mut stop_rx: oneshot::Receiver<()>,
    grace: Duration,
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status.ok().and_then(|s| s.code())),
        _ = &mut stop_rx => None,
    };

    let msg = match exited {
        Some(code) => CoordinatorMsg::ServerExited { generation, code },
        None => {
            terminate(&mut child, grace).await;
            CoordinatorMsg::ServerStopped { generation }
        }
    };
    let _ = tx.send(msg);
}

async fn health_loop(
    port: u16,
    generation: u64,
    interval: Duration,
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
) {
    let start = tokio::time::Instant::now() + FIRST_CHECK_DELAY;
    let mut ticker = tokio::time::interval_at(start, interval);
    loop {
        ticker.tick().await;
        let healthy = check_health(port, CHECK_TIMEOUT).await;
        if tx
            .send(CoordinatorMsg::HealthChecked { generation, healthy })
            .is_err()
        {
            break;
        }
    }
}

#[cfg(all(test, unix))]
mod tests;
