//! Build Coordinator - the single owner of queue and server state.
//!
//! ```text
//! Facade / watcher / live acceptor
//!            |
//!            v
//!      Coordinator --BuildStarted/Finished, ServerUp/Down--> LiveActor
//!        |      ^
//!  spawn |      | BuildDone, ServerExited, ServerStopped,
//!        v      | HealthChecked, RestartDue
//!   build / waiter / health / restart tasks
//! ```
//!
//! Every mutation happens inside [`Coordinator::run`], one message at a time.
//! Nothing in the loop awaits a build or a process, so a slow generator never
//! delays status queries or server control.
//!
//! # Shutdown
//!
//! The pending request is recorded as cancelled, the in-flight build runs to
//! completion (or its timeout), then the dev server is stopped and finally the
//! live clients are closed.

mod build;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::live::{FileChanged, LiveEvent, StatusBroadcaster};
use super::messages::{CoordinatorMsg, Reply};
use super::queue::{BuildQueue, CurrentBuild};
use super::supervisor::ProcessSupervisor;
use crate::config::SiteConfig;
use crate::core::{BuildMode, BuildRecord, BuildRequest, BuildStatus, RequestId, Trigger};
use crate::frontmatter::{ValidationMode, Validator};

/// Coordinator actor state.
pub struct Coordinator {
    config: Arc<SiteConfig>,
    validator: Arc<Validator>,
    rx: mpsc::UnboundedReceiver<CoordinatorMsg>,
    /// Handed to spawned tasks for their completion messages
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
    queue: BuildQueue,
    supervisor: ProcessSupervisor,
    live: StatusBroadcaster,
    /// Callers waiting for the record of an outstanding request
    build_waiters: Vec<(RequestId, Reply<Option<BuildRecord>>)>,
    /// Set once shutdown has begun
    draining: Option<Reply<()>>,
}

impl Coordinator {
    /// Spawn the coordinator on the current runtime.
    pub fn spawn(
        config: Arc<SiteConfig>,
        validator: Arc<Validator>,
        live: StatusBroadcaster,
    ) -> (mpsc::UnboundedSender<CoordinatorMsg>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            queue: BuildQueue::new(config.queue.history_capacity),
            supervisor: ProcessSupervisor::new(Arc::clone(&config), tx.clone()),
            config,
            validator,
            rx,
            tx: tx.clone(),
            live,
            build_waiters: Vec::new(),
            draining: None,
        };
        (tx, tokio::spawn(coordinator.run()))
    }

    async fn run(mut self) {
        crate::debug!("actor"; "coordinator start");

        while let Some(msg) = self.rx.recv().await {
            self.handle(msg);
            if self.draining.is_some() && self.drain_step() {
                break;
            }
        }

        self.live.close().await;
        if let Some(reply) = self.draining.take() {
            let _ = reply.send(());
        }
        crate::debug!("actor"; "coordinator stopped");
    }

    fn handle(&mut self, msg: CoordinatorMsg) {
        let draining = self.draining.is_some();

        match msg {
            // New work is refused once shutdown has begun; dropping the reply
            // tells the caller the orchestrator is closed.
            CoordinatorMsg::TriggerBuild { .. }
            | CoordinatorMsg::Changes { .. }
            | CoordinatorMsg::StartServer { .. }
                if draining => {}

            CoordinatorMsg::TriggerBuild {
                trigger,
                mode,
                validation,
                paths,
                reply,
            } => {
                let id = self.enqueue(trigger, mode, validation, paths);
                let _ = reply.send(id);
            }
            CoordinatorMsg::Changes {
                changes,
                validation,
            } => {
                self.live
                    .publish(LiveEvent::FileChanged(FileChanged::from(&changes)));
                let paths = changes.paths().map(Path::to_path_buf).collect();
                self.enqueue(Trigger::FileChange, BuildMode::Dev, validation, paths);
            }
            CoordinatorMsg::Status(reply) => {
                let _ = reply.send((self.queue.status(), self.supervisor.state().clone()));
            }
            CoordinatorMsg::AwaitBuild { id, reply } => {
                if let Some(record) = self.queue.find(id) {
                    let _ = reply.send(Some(record.clone()));
                } else if self.queue.is_outstanding(id) {
                    self.build_waiters.push((id, reply));
                } else {
                    let _ = reply.send(None);
                }
            }
            CoordinatorMsg::StartServer { port, reply } => {
                let result = self.supervisor.start(port);
                match &result {
                    Ok(state) => self.live.publish(LiveEvent::ServerUp(state.clone())),
                    Err(e) => {
                        crate::log!("server"; "failed to start: {}", e);
                        self.live
                            .publish(LiveEvent::ServerDown(self.supervisor.state().clone()));
                    }
                }
                let _ = reply.send(result);
            }
            CoordinatorMsg::StopServer(reply) => self.supervisor.stop(reply),
            CoordinatorMsg::AttachClient(sink) => {
                let mut replay = vec![LiveEvent::for_server(self.supervisor.state())];
                if let Some(record) = self.queue.latest() {
                    replay.push(LiveEvent::build_finished(record.clone()));
                }
                self.live.attach(sink, replay);
            }
            CoordinatorMsg::Shutdown(reply) => {
                if draining {
                    return;
                }
                crate::debug!("actor"; "shutdown requested");
                if let Some(record) = self.queue.cancel_pending() {
                    crate::debug!("queue"; "{} cancelled", record.triggering_request_id);
                    self.resolve_waiters(&record);
                    self.live.publish(LiveEvent::build_finished(record));
                }
                self.draining = Some(reply);
            }
            CoordinatorMsg::BuildDone(record) => {
                report(&record);
                self.resolve_waiters(&record);
                self.live.publish(LiveEvent::build_finished(record.clone()));
                if let Some(next) = self.queue.complete(record) {
                    self.dispatch(next);
                }
            }
            CoordinatorMsg::ServerExited { generation, code } => {
                let event = self.supervisor.on_exited(generation, code);
                self.publish(event);
            }
            CoordinatorMsg::ServerStopped { generation } => {
                let event = self.supervisor.on_stopped(generation);
                self.publish(event);
            }
            CoordinatorMsg::HealthChecked {
                generation,
                healthy,
            } => {
                let event = self.supervisor.on_health(generation, healthy);
                self.publish(event);
            }
            CoordinatorMsg::RestartDue { .. } if draining => {}
            CoordinatorMsg::RestartDue { token } => {
                let event = self.supervisor.on_restart_due(token);
                self.publish(event);
            }
        }
    }

    fn resolve_waiters(&mut self, record: &BuildRecord) {
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.build_waiters)
            .into_iter()
            .partition(|(id, _)| record.serves(*id));
        self.build_waiters = waiting;
        for (_, reply) in done {
            let _ = reply.send(Some(record.clone()));
        }
    }

    fn publish(&self, event: Option<LiveEvent>) {
        if let Some(event) = event {
            self.live.publish(event);
        }
    }

    fn enqueue(
        &mut self,
        trigger: Trigger,
        mode: BuildMode,
        validation: ValidationMode,
        paths: BTreeSet<PathBuf>,
    ) -> RequestId {
        let id = self.queue.next_request_id();
        crate::debug!(
            "queue";
            "{} accepted ({}, {}, {})",
            id,
            trigger.as_str(),
            mode.as_str(),
            crate::utils::plural_count(paths.len(), "path")
        );

        let request = BuildRequest::new(id, trigger, mode, validation, paths);
        if let Some(build) = self.queue.enqueue(request) {
            self.dispatch(build);
        }
        id
    }

    fn dispatch(&self, build: CurrentBuild) {
        crate::debug!("queue"; "{} started for {}", build.build_id, build.request.id);
        self.live
            .publish(LiveEvent::BuildStarted(build.started_event()));

        let config = Arc::clone(&self.config);
        let validator = Arc::clone(&self.validator);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let record = build::execute(config, validator, build).await;
            let _ = tx.send(CoordinatorMsg::BuildDone(record));
        });
    }

    /// Advance shutdown; `true` once nothing is left running.
    fn drain_step(&mut self) -> bool {
        if self.queue.is_building() {
            return false;
        }
        self.supervisor.request_stop();
        self.supervisor.is_idle()
    }
}

fn report(record: &BuildRecord) {
    match (record.status, &record.failure) {
        (BuildStatus::Failure, Some(failure)) => {
            crate::debug!("build"; "{} failed after {}ms: {}", record.id, record.duration_ms, failure);
        }
        _ => {
            crate::debug!("build"; "{} {:?} in {}ms", record.id, record.status, record.duration_ms);
        }
    }
    for result in record.validation.iter().filter(|r| !r.blocking) {
        crate::debug!("validate"; "warning {}: {}", result.path.display(), result.summary());
    }
}
