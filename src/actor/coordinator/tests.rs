//! Coordinator scenarios against `sh` stand-ins for the generator.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

use super::*;
use crate::actor::live::ChannelSink;
use crate::actor::queue::{QueueState, QueueStatus};
use crate::actor::supervisor::SupervisorError;
use crate::config::test_parse_config;
use crate::core::{ChangeKind, FailureKind, FileCategory, ServerState};
use crate::watch::{ChangeEvent, ChangeSet};

/// Fails with exit 9 if two builds ever overlap.
const SINGLE_FLIGHT_BUILD: &str = r#"mkdir "$SITE_ROOT/.lock" || exit 9
sleep 0.3
echo "$SITE_MODE" >> "$SITE_ROOT/builds.log"
rmdir "$SITE_ROOT/.lock""#;

struct Harness {
    dir: TempDir,
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
    task: JoinHandle<()>,
}

impl Harness {
    fn new(build: &str, serve: &str) -> Self {
        Self::with(build, serve, |_| {})
    }

    fn with(build: &str, serve: &str, tweak: impl FnOnce(&mut SiteConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = test_parse_config("");
        config.finalize(dir.path());
        // `sh -c <script> sh`, mode picks the build or serve script
        config.generator.command = vec![
            "sh".into(),
            "-c".into(),
            format!("if [ \"$1\" = serve ]; then {serve}\nelse {build}\nfi"),
            "sh".into(),
        ];
        config.generator.serve_args = vec!["serve".into()];
        config.generator.build_args = vec!["build".into()];
        config.generator.dev_build_args = vec![];
        config.generator.port = free_port();
        config.generator.auto_port = false;
        config.generator.restart_delay_ms = 50;
        config.generator.stop_timeout_ms = 1000;
        tweak(&mut config);

        let config = Arc::new(config);
        let validator = Arc::new(Validator::new(&config));
        let (live, _) = StatusBroadcaster::spawn();
        let (tx, task) = Coordinator::spawn(config, validator, live);
        Self { dir, tx, task }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    async fn trigger(&self, trigger: Trigger, validation: ValidationMode, paths: &[&str]) -> RequestId {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMsg::TriggerBuild {
                trigger,
                mode: BuildMode::Production,
                validation,
                paths: paths.iter().map(PathBuf::from).collect::<BTreeSet<_>>(),
                reply,
            })
            .unwrap_or_else(|_| panic!("coordinator gone"));
        rx.await.unwrap()
    }

    async fn status(&self) -> (QueueStatus, ServerState) {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMsg::Status(reply))
            .unwrap_or_else(|_| panic!("coordinator gone"));
        rx.await.unwrap()
    }

    /// Poll until `n` records are retained and the queue is idle.
    async fn settled(&self, n: usize) -> QueueStatus {
        for _ in 0..200 {
            let (queue, _) = self.status().await;
            if queue.state == QueueState::Idle && queue.recent_history.len() >= n {
                return queue;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("queue did not settle with {n} records");
    }

    fn attach(&self) -> Receiver<String> {
        let (sink, rx) = ChannelSink::new();
        self.tx
            .send(CoordinatorMsg::AttachClient(Box::new(sink)))
            .unwrap_or_else(|_| panic!("coordinator gone"));
        rx
    }

    async fn await_build(&self, id: RequestId) -> Option<BuildRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMsg::AwaitBuild { id, reply })
            .unwrap_or_else(|_| panic!("coordinator gone"));
        tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .expect("await build timed out")
            .unwrap()
    }

    async fn start_server(&self) -> Result<ServerState, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMsg::StartServer { port: None, reply })
            .unwrap_or_else(|_| panic!("coordinator gone"));
        rx.await.unwrap()
    }

    async fn stop_server(&self) -> ServerState {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMsg::StopServer(reply))
            .unwrap_or_else(|_| panic!("coordinator gone"));
        rx.await.unwrap()
    }

    async fn shutdown(self) -> TempDir {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMsg::Shutdown(reply))
            .unwrap_or_else(|_| panic!("coordinator gone"));
        tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .expect("shutdown timed out")
            .unwrap();
        self.task.await.unwrap();
        self.dir
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Next live frame, polled without blocking the runtime.
async fn next_event(rx: &Receiver<String>) -> Value {
    for _ in 0..200 {
        if let Ok(text) = rx.try_recv() {
            return serde_json::from_str(&text).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("no live event within 5s");
}

/// Skip frames until one of type `ty` arrives.
async fn wait_for(rx: &Receiver<String>, ty: &str) -> Value {
    loop {
        let event = next_event(rx).await;
        if event["type"] == ty {
            return event;
        }
    }
}

fn build_count(root: &Path) -> usize {
    fs::read_to_string(root.join("builds.log"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_two_manual_triggers_mid_build_yield_one_follow_up() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exit 0");

    let first = h.trigger(Trigger::Manual, ValidationMode::Strict, &[]).await;
    let (queue, _) = h.status().await;
    assert_eq!(queue.state, QueueState::Building);

    let second = h.trigger(Trigger::Manual, ValidationMode::Strict, &[]).await;
    let third = h.trigger(Trigger::Manual, ValidationMode::Strict, &[]).await;
    let (queue, _) = h.status().await;
    assert_eq!(queue.state, QueueState::Pending);

    let queue = h.settled(2).await;
    assert_eq!(queue.recent_history.len(), 2);
    let [a, b] = &queue.recent_history[..] else {
        panic!("expected two records");
    };
    assert_eq!(a.triggering_request_id, first);
    assert_eq!(b.triggering_request_id, second);
    assert_eq!(b.merged_request_ids, vec![third]);
    assert!(a.is_success() && b.is_success(), "builds overlapped");
    assert!(a.finished_at <= b.started_at);
    assert_eq!(build_count(h.root()), 2);

    h.shutdown().await;
}

#[tokio::test]
async fn test_await_build_survives_history_eviction() {
    let h = Harness::with(SINGLE_FLIGHT_BUILD, "exit 0", |config| {
        config.queue.history_capacity = 1;
    });
    let first = h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;
    let second = h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;
    let third = h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;

    // Registered while outstanding, answered at completion
    let record = h.await_build(first).await.unwrap();
    assert_eq!(record.triggering_request_id, first);
    let record = h.await_build(third).await.unwrap();
    assert_eq!(record.triggering_request_id, second);
    assert!(record.serves(third));

    // The first record has been evicted by now
    let queue = h.settled(1).await;
    assert_eq!(queue.recent_history.len(), 1);
    assert_eq!(h.await_build(first).await, None);
    assert_eq!(h.await_build(RequestId(99)).await, None);
    h.shutdown().await;
}

#[tokio::test]
async fn test_burst_of_triggers_runs_at_most_two_builds() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exit 0");
    for _ in 0..6 {
        h.trigger(Trigger::Scheduled, ValidationMode::Lenient, &[]).await;
    }
    let queue = h.settled(2).await;
    assert_eq!(queue.recent_history.len(), 2);
    assert!(queue.recent_history.iter().all(|r| r.is_success()));
    assert_eq!(build_count(h.root()), 2);
    h.shutdown().await;
}

#[tokio::test]
async fn test_strict_validation_blocks_build() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exit 0");
    h.write("content/posts/untitled.md", "---\ndate: 2025-08-24\n---\nbody");
    let live = h.attach();

    h.trigger(
        Trigger::FileChange,
        ValidationMode::Strict,
        &["content/posts/untitled.md", "layouts/base.html"],
    )
    .await;
    let queue = h.settled(1).await;

    let record = &queue.recent_history[0];
    assert_eq!(record.status, BuildStatus::Failure);
    assert_eq!(
        record.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::ValidationFailure)
    );
    assert_eq!(record.failed_fields().collect::<Vec<_>>(), vec!["title"]);
    assert_eq!(build_count(h.root()), 0, "generator must not run");

    let finished = wait_for(&live, "build-finished").await;
    assert_eq!(finished["payload"]["status"], "failure");
    assert_eq!(
        finished["payload"]["validation"][0]["errors"][0]["field"],
        "title"
    );
    h.shutdown().await;
}

#[tokio::test]
async fn test_lenient_validation_builds_with_warnings() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exit 0");
    h.write("content/untitled.md", "---\ndate: 2025-08-24\n---\n");

    h.trigger(Trigger::FileChange, ValidationMode::Lenient, &["content/untitled.md"])
        .await;
    let queue = h.settled(1).await;

    let record = &queue.recent_history[0];
    assert!(record.is_success());
    assert_eq!(record.validation.len(), 1);
    assert!(!record.validation[0].blocking);
    assert_eq!(build_count(h.root()), 1);
    h.shutdown().await;
}

#[tokio::test]
async fn test_manual_build_validates_all_content() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exit 0");
    h.write("content/ok.md", "---\ntitle: Ok\ndate: 2025-08-24\n---\n");
    h.write("content/es/bad.md", "---\ntitle: Malo\n---\n");

    h.trigger(Trigger::Manual, ValidationMode::Strict, &[]).await;
    let queue = h.settled(1).await;

    let record = &queue.recent_history[0];
    assert_eq!(record.status, BuildStatus::Failure);
    assert_eq!(record.validation.len(), 1);
    assert_eq!(record.validation[0].path, PathBuf::from("content/es/bad.md"));
    h.shutdown().await;
}

#[tokio::test]
async fn test_merged_manual_build_still_validates_all_content() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exit 0");
    h.write("content/good.md", "---\ntitle: Good\ndate: 2025-08-24\n---\n");
    h.write("content/bad.md", "---\ndate: 2025-08-24\n---\n");

    h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;
    let (queue, _) = h.status().await;
    assert_eq!(queue.state, QueueState::Building);

    // Pending slot: a file change first, then a pathless manual build folds in
    h.trigger(Trigger::FileChange, ValidationMode::Strict, &["content/good.md"])
        .await;
    let manual = h.trigger(Trigger::Manual, ValidationMode::Strict, &[]).await;

    let queue = h.settled(2).await;
    let follow_up = &queue.recent_history[1];
    assert_eq!(follow_up.merged_request_ids, vec![manual]);
    assert_eq!(follow_up.status, BuildStatus::Failure);
    assert_eq!(
        follow_up.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::ValidationFailure)
    );
    assert_eq!(follow_up.validation.len(), 1);
    assert_eq!(follow_up.validation[0].path, PathBuf::from("content/bad.md"));
    assert_eq!(build_count(h.root()), 1, "only the first build ran the generator");
    h.shutdown().await;
}

#[tokio::test]
async fn test_generator_failure_is_recorded() {
    let h = Harness::new("echo 'template error' >&2; exit 2", "exit 0");
    h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;
    let queue = h.settled(1).await;

    let record = &queue.recent_history[0];
    assert_eq!(record.status, BuildStatus::Failure);
    assert_eq!(record.exit_code, Some(2));
    assert_eq!(record.stderr_excerpt, "template error");
    assert_eq!(
        record.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::BuildFailure)
    );
    h.shutdown().await;
}

#[tokio::test]
async fn test_build_timeout_kills_generator() {
    let h = Harness::with("exec sleep 5", "exit 0", |config| {
        config.generator.build_timeout_ms = 200;
    });
    h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;
    let queue = h.settled(1).await;

    let record = &queue.recent_history[0];
    assert_eq!(
        record.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::Timeout)
    );
    assert!(record.duration_ms < 5000);
    h.shutdown().await;
}

#[tokio::test]
async fn test_change_set_publishes_and_builds() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exit 0");
    let live = h.attach();
    // Replay of a fresh coordinator: server down, no build yet
    assert_eq!(next_event(&live).await["type"], "server-down");

    let path = PathBuf::from("static/app.css");
    let changes = ChangeSet {
        changes: BTreeMap::from([(
            path.clone(),
            ChangeEvent {
                path,
                kind: ChangeKind::Modified,
                category: FileCategory::Static,
                timestamp: 0,
            },
        )]),
        forced: false,
    };
    h.tx.send(CoordinatorMsg::Changes {
        changes,
        validation: ValidationMode::Strict,
    })
    .unwrap_or_else(|_| panic!("coordinator gone"));

    let changed = next_event(&live).await;
    assert_eq!(changed["type"], "file-changed");
    assert_eq!(changed["payload"]["changes"][0]["category"], "static");

    let started = next_event(&live).await;
    assert_eq!(started["type"], "build-started");
    assert_eq!(started["payload"]["trigger"], "file-change");
    assert_eq!(started["payload"]["mode"], "dev");
    assert_eq!(started["payload"]["changedPaths"][0], "static/app.css");

    let finished = next_event(&live).await;
    assert_eq!(finished["type"], "build-finished");
    assert_eq!(finished["payload"]["status"], "success");
    h.shutdown().await;
}

#[tokio::test]
async fn test_attach_replays_latest_state() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exit 0");
    h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;
    h.settled(1).await;

    let live = h.attach();
    let server = next_event(&live).await;
    assert_eq!(server["type"], "server-down");
    assert_eq!(server["payload"]["running"], false);
    let build = next_event(&live).await;
    assert_eq!(build["type"], "build-finished");
    assert_eq!(build["payload"]["id"], 1);
    h.shutdown().await;
}

#[tokio::test]
async fn test_crash_restart_reaches_every_client() {
    let h = Harness::new("exit 0", "sleep 0.2; exit 1");
    let clients = [h.attach(), h.attach()];

    let state = h.start_server().await.unwrap();
    assert!(state.running);

    for live in &clients {
        let up = wait_for(live, "server-up").await;
        assert_eq!(up["payload"]["restarts"], 0);
        let down = wait_for(live, "server-down").await;
        assert_eq!(down["payload"]["running"], false);
        assert_eq!(down["payload"]["failure"]["kind"], "process-crash");

        let restarted = wait_for(live, "server-up").await;
        assert_eq!(restarted["payload"]["restarts"], 1);
        let down = wait_for(live, "server-down").await;
        assert_eq!(down["payload"]["failure"]["kind"], "process-crash");
    }

    // Restart budget spent: the server stays down
    tokio::time::sleep(Duration::from_millis(400)).await;
    let (_, server) = h.status().await;
    assert!(!server.running);
    assert_eq!(server.restarts, 1);
    h.shutdown().await;
}

#[tokio::test]
async fn test_crash_failure_stays_in_status_and_replay() {
    let h = Harness::with("exit 0", "sleep 0.1; exit 1", |config| {
        config.generator.max_restarts = 0;
    });
    assert!(h.start_server().await.unwrap().running);

    let mut server = h.status().await.1;
    for _ in 0..100 {
        if !server.running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        server = h.status().await.1;
    }
    assert!(!server.running);
    let failure = server.failure.expect("crash failure kept in status");
    assert_eq!(failure.kind, FailureKind::ProcessCrash);
    assert!(failure.message.contains("exited with code 1"));

    // A client connecting after the crash still learns why
    let late = h.attach();
    let replay = next_event(&late).await;
    assert_eq!(replay["type"], "server-down");
    assert_eq!(replay["payload"]["failure"]["kind"], "process-crash");
    h.shutdown().await;
}

#[tokio::test]
async fn test_restart_clears_previous_failure() {
    let h = Harness::new("exit 0", "sleep 0.2; exit 1");
    let live = h.attach();
    h.start_server().await.unwrap();

    wait_for(&live, "server-down").await;
    let restarted = wait_for(&live, "server-up").await;
    assert_eq!(restarted["payload"]["restarts"], 1);
    assert!(restarted["payload"]["failure"].is_null());
    h.shutdown().await;
}

#[tokio::test]
async fn test_stop_server_is_idempotent() {
    let h = Harness::new("exit 0", "exec sleep 30");
    let stopped = h.stop_server().await;
    assert!(!stopped.running);

    let started = h.start_server().await.unwrap();
    assert!(started.running);
    let stopped = h.stop_server().await;
    assert!(!stopped.running);
    assert!(!h.stop_server().await.running);
    h.shutdown().await;
}

#[tokio::test]
async fn test_port_in_use_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let h = Harness::with("exit 0", "exec sleep 30", |config| {
        config.generator.port = port;
    });
    let live = h.attach();

    let err = h.start_server().await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::PortInUse);
    let down = wait_for(&live, "server-down").await;
    // The replayed frame has no failure; the start attempt does
    let down = if down["payload"]["failure"].is_null() {
        wait_for(&live, "server-down").await
    } else {
        down
    };
    assert_eq!(down["payload"]["failure"]["kind"], "port-in-use");

    let (_, server) = h.status().await;
    assert!(!server.running);
    assert_eq!(server.failure.map(|f| f.kind), Some(FailureKind::PortInUse));
    h.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_order() {
    let h = Harness::new(SINGLE_FLIGHT_BUILD, "exec sleep 30");
    let live = h.attach();
    h.start_server().await.unwrap();

    let running = h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;
    let pending = h.trigger(Trigger::Manual, ValidationMode::Lenient, &[]).await;
    let dir = h.shutdown().await;

    let mut finished = Vec::new();
    let mut after_builds = Vec::new();
    while let Ok(text) = live.try_recv() {
        let event: Value = serde_json::from_str(&text).unwrap();
        if event["type"] == "build-finished" {
            finished.push(event);
        } else if finished.len() == 2 {
            after_builds.push(event["type"].clone());
        }
    }

    // Pending request cancelled first, in-flight build completed after
    assert_eq!(finished.len(), 2);
    assert_eq!(finished[0]["payload"]["status"], "cancelled");
    assert_eq!(finished[0]["payload"]["triggeringRequestId"], pending.0);
    assert_eq!(finished[1]["payload"]["status"], "success");
    assert_eq!(finished[1]["payload"]["triggeringRequestId"], running.0);
    // Then the server went down
    assert_eq!(after_builds, vec![Value::from("server-down")]);
    assert_eq!(build_count(dir.path()), 1);
}
