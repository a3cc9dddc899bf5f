//! Orchestrator facade.
//!
//! Owns every component of a running site: the coordinator actor, the live
//! status actor and its WebSocket acceptor, and the file watcher
//! subscription. All calls are message round-trips to the coordinator, so the
//! facade itself holds no queue or server state.
//!
//! Must be started from within a tokio runtime.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::actor::Coordinator;
use crate::actor::live::{ClientConnection, ClientSink, LiveServer, StatusBroadcaster};
use crate::actor::messages::CoordinatorMsg;
use crate::actor::queue::{Metrics, QueueStatus};
use crate::actor::supervisor::SupervisorError;
use crate::config::SiteConfig;
use crate::core::{
    BuildMode, BuildRecord, Failure, FailureKind, RequestId, ServerState, Trigger,
};
use crate::frontmatter::{ValidationMode, ValidationResult, Validator};
use crate::watch::{FileWatcher, WatchError, WatchHandle};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("live channel unavailable: {0}")]
    Live(String),

    #[error("no retained build for {0}")]
    UnknownRequest(RequestId),

    #[error("orchestrator is shut down")]
    Closed,
}

impl OrchestratorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Watch(e) => e.kind(),
            Self::Supervisor(e) => e.kind(),
            Self::Live(_) => FailureKind::PortInUse,
            Self::UnknownRequest(_) => FailureKind::BuildFailure,
            Self::Closed => FailureKind::Cancelled,
        }
    }
}

/// Everything `status()` reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(flatten)]
    pub queue: QueueStatus,
    pub server_state: ServerState,
    pub clients: Vec<ClientConnection>,
    /// Watch roots that could not be attached
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub watch_failures: Vec<Failure>,
}

/// Facade over a running orchestration.
pub struct Orchestrator {
    config: Arc<SiteConfig>,
    validator: Arc<Validator>,
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
    coordinator: JoinHandle<()>,
    live: StatusBroadcaster,
    live_server: Option<LiveServer>,
    watch: Option<WatchHandle>,
    watch_failures: Vec<Failure>,
}

impl Orchestrator {
    /// Start the actors and, when enabled, the live WebSocket channel.
    ///
    /// Fails only when the live channel cannot bind any port.
    pub fn start(config: Arc<SiteConfig>) -> Result<Self, OrchestratorError> {
        let validator = Arc::new(Validator::new(&config));
        let (live, _) = StatusBroadcaster::spawn();
        let (tx, coordinator) =
            Coordinator::spawn(Arc::clone(&config), Arc::clone(&validator), live.clone());

        let live_server = if config.live.enable {
            let server = LiveServer::start(config.live.interface, config.live.port, tx.clone())
                .map_err(|e| OrchestratorError::Live(e.to_string()))?;
            crate::debug!("live"; "listening on {}:{}", config.live.interface, server.port());
            Some(server)
        } else {
            None
        };

        Ok(Self {
            config,
            validator,
            tx,
            coordinator,
            live,
            live_server,
            watch: None,
            watch_failures: Vec::new(),
        })
    }

    /// Port of the live channel, if it is enabled.
    pub fn live_port(&self) -> Option<u16> {
        self.live_server.as_ref().map(LiveServer::port)
    }

    /// Watch the configured roots; settled change sets trigger dev builds
    /// gated by `validation`.
    pub fn watch(&mut self, validation: ValidationMode) -> Result<(), OrchestratorError> {
        if self.watch.is_some() {
            return Ok(());
        }

        let tx = self.tx.clone();
        let watcher = FileWatcher::new(Arc::clone(&self.config));
        let handle = watcher.subscribe(&self.config.watch.roots, move |changes| {
            let _ = tx.send(CoordinatorMsg::Changes {
                changes,
                validation,
            });
        })?;

        self.watch_failures = handle
            .unavailable()
            .iter()
            .map(|e| Failure::new(e.kind(), e.to_string()))
            .collect();
        self.watch = Some(handle);
        Ok(())
    }

    /// Request a manual build. Returns as soon as the request is accepted.
    pub async fn trigger_build(
        &self,
        mode: BuildMode,
        validation: ValidationMode,
    ) -> Result<RequestId, OrchestratorError> {
        self.request(|reply| CoordinatorMsg::TriggerBuild {
            trigger: Trigger::Manual,
            mode,
            validation,
            paths: BTreeSet::new(),
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<StatusSnapshot, OrchestratorError> {
        let (queue, server_state) = self.request(CoordinatorMsg::Status).await?;
        Ok(StatusSnapshot {
            queue,
            server_state,
            clients: self.live.clients().await,
            watch_failures: self.watch_failures.clone(),
        })
    }

    pub async fn start_server(&self, port: Option<u16>) -> Result<ServerState, OrchestratorError> {
        let state = self
            .request(|reply| CoordinatorMsg::StartServer { port, reply })
            .await??;
        Ok(state)
    }

    /// Stop the dev server. Stopping a stopped server is not an error.
    pub async fn stop_server(&self) -> Result<ServerState, OrchestratorError> {
        self.request(CoordinatorMsg::StopServer).await
    }

    /// Validate metadata without touching the build queue.
    pub fn validate(&self, path: &Path, metadata: &Value, mode: ValidationMode) -> ValidationResult {
        self.validator.validate(path, metadata, mode)
    }

    /// Success rate and mean duration over the retained history.
    pub async fn metrics(&self) -> Result<Metrics, OrchestratorError> {
        let (queue, _) = self.request(CoordinatorMsg::Status).await?;
        Ok(Metrics::from_records(&queue.recent_history))
    }

    /// Subscribe an in-process client to the live channel.
    pub fn attach_client(&self, sink: Box<dyn ClientSink>) -> Result<(), OrchestratorError> {
        self.tx
            .send(CoordinatorMsg::AttachClient(sink))
            .map_err(|_| OrchestratorError::Closed)
    }

    /// Wait until the build serving request `id` is recorded.
    ///
    /// Fails with `UnknownRequest` when `id` is neither outstanding nor
    /// still retained in the history.
    pub async fn wait_for_build(&self, id: RequestId) -> Result<BuildRecord, OrchestratorError> {
        self.request(|reply| CoordinatorMsg::AwaitBuild { id, reply })
            .await?
            .ok_or(OrchestratorError::UnknownRequest(id))
    }

    /// Ordered shutdown: watcher, pending request, in-flight build, dev
    /// server, live clients.
    pub async fn shutdown(mut self) -> Result<(), OrchestratorError> {
        if let Some(handle) = self.watch.take() {
            // Joins the watcher thread
            let _ = tokio::task::spawn_blocking(move || handle.unsubscribe()).await;
        }

        self.request(CoordinatorMsg::Shutdown).await?;
        let _ = (&mut self.coordinator).await;

        if let Some(mut server) = self.live_server.take() {
            let _ = tokio::task::spawn_blocking(move || server.stop()).await;
        }
        crate::debug!("actor"; "shutdown complete");
        Ok(())
    }

    async fn request<T>(
        &self,
        msg: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMsg,
    ) -> Result<T, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(msg(reply))
            .map_err(|_| OrchestratorError::Closed)?;
        rx.await.map_err(|_| OrchestratorError::Closed)
    }
}
