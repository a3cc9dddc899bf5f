use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot;

use super::*;
use crate::config::test_parse_config;

/// Site whose generator is `sh -c <script>`.
fn site(dir: &Path, script: &str, port: u16, auto_port: bool) -> Arc<SiteConfig> {
    let mut config = test_parse_config("");
    config.finalize(dir);
    config.generator.command = vec!["sh".into(), "-c".into(), script.into(), "sh".into()];
    config.generator.serve_args = vec!["$SITE_PORT".into()];
    config.generator.port = port;
    config.generator.auto_port = auto_port;
    config.generator.restart_delay_ms = 50;
    config.generator.stop_timeout_ms = 1000;
    Arc::new(config)
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Next message that is not a health check result.
async fn next_msg(rx: &mut UnboundedReceiver<CoordinatorMsg>) -> CoordinatorMsg {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no message within 5s")
            .expect("channel closed");
        if !matches!(msg, CoordinatorMsg::HealthChecked { .. }) {
            return msg;
        }
    }
}

fn supervisor(config: Arc<SiteConfig>) -> (ProcessSupervisor, UnboundedReceiver<CoordinatorMsg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProcessSupervisor::new(config, tx), rx)
}

#[tokio::test]
async fn test_start_then_stop() {
    let dir = TempDir::new().unwrap();
    let port = free_port();
    let (mut sup, mut rx) = supervisor(site(dir.path(), "exec sleep 30", port, false));

    let state = sup.start(None).unwrap();
    assert!(state.running);
    assert_eq!(state.port, Some(port));
    assert!(state.pid.is_some());

    // Starting again is a no-op
    assert_eq!(sup.start(None).unwrap().pid, state.pid);

    let (reply, reply_rx) = oneshot::channel();
    sup.stop(reply);
    let CoordinatorMsg::ServerStopped { generation } = next_msg(&mut rx).await else {
        panic!("expected ServerStopped");
    };
    let event = sup.on_stopped(generation).unwrap();
    assert_eq!(event.name(), "server-down");

    let stopped = reply_rx.await.unwrap();
    assert!(!stopped.running);
    assert!(sup.is_idle());
    assert!(port_is_free(port));
}

#[tokio::test]
async fn test_stop_when_stopped_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let (mut sup, _rx) = supervisor(site(dir.path(), "exec sleep 30", free_port(), false));

    let (reply, reply_rx) = oneshot::channel();
    sup.stop(reply);
    let state = reply_rx.await.unwrap();
    assert_eq!(state, ServerState::stopped());
}

#[tokio::test]
async fn test_stop_escalates_to_kill() {
    let dir = TempDir::new().unwrap();
    let port = free_port();
    let mut config = site(dir.path(), "trap '' TERM; while :; do :; done", port, false);
    Arc::get_mut(&mut config).unwrap().generator.stop_timeout_ms = 300;
    let (mut sup, mut rx) = supervisor(config);
    assert!(sup.start(None).unwrap().running);
    // Give the shell time to install the trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    let (reply, reply_rx) = oneshot::channel();
    sup.stop(reply);
    let CoordinatorMsg::ServerStopped { generation } = next_msg(&mut rx).await else {
        panic!("expected ServerStopped");
    };
    sup.on_stopped(generation).unwrap();

    let stopped = reply_rx.await.unwrap();
    assert!(!stopped.running);
    assert!(sup.is_idle());
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_crash_restarts_once_per_window() {
    let dir = TempDir::new().unwrap();
    let script = "echo boom >&2; sleep 0.1; exit 3";
    let (mut sup, mut rx) = supervisor(site(dir.path(), script, free_port(), false));
    sup.start(None).unwrap();

    let CoordinatorMsg::ServerExited { generation, code } = next_msg(&mut rx).await else {
        panic!("expected ServerExited");
    };
    assert_eq!(code, Some(3));
    let Some(LiveEvent::ServerDown(down)) = sup.on_exited(generation, code) else {
        panic!("expected server-down");
    };
    assert!(!down.running);
    assert_eq!(sup.state(), &down);
    let failure = down.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::ProcessCrash);
    assert!(failure.message.contains("exited with code 3"));

    // One automatic restart
    let CoordinatorMsg::RestartDue { token } = next_msg(&mut rx).await else {
        panic!("expected RestartDue");
    };
    let Some(LiveEvent::ServerUp(up)) = sup.on_restart_due(token) else {
        panic!("expected server-up");
    };
    assert_eq!(up.restarts, 1);

    // The second crash inside the window stays down
    let CoordinatorMsg::ServerExited { generation, code } = next_msg(&mut rx).await else {
        panic!("expected ServerExited");
    };
    assert!(matches!(
        sup.on_exited(generation, code),
        Some(LiveEvent::ServerDown(_))
    ));
    assert!(!sup.state().running);
    assert_eq!(sup.state().restarts, 1);
    assert!(
        tokio::time::timeout(Duration::from_millis(300), next_msg(&mut rx))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_stop_cancels_pending_restart() {
    let dir = TempDir::new().unwrap();
    let (mut sup, mut rx) = supervisor(site(dir.path(), "exit 1", free_port(), false));
    sup.start(None).unwrap();

    let CoordinatorMsg::ServerExited { generation, code } = next_msg(&mut rx).await else {
        panic!("expected ServerExited");
    };
    sup.on_exited(generation, code);

    let (reply, reply_rx) = oneshot::channel();
    sup.stop(reply);
    assert!(!reply_rx.await.unwrap().running);

    let CoordinatorMsg::RestartDue { token } = next_msg(&mut rx).await else {
        panic!("expected RestartDue");
    };
    assert!(sup.on_restart_due(token).is_none());
    assert!(sup.is_idle());
}

#[tokio::test]
async fn test_port_in_use() {
    let dir = TempDir::new().unwrap();
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let (mut sup, _rx) = supervisor(site(dir.path(), "exec sleep 30", port, false));
    let err = sup.start(None).unwrap_err();
    assert!(matches!(err, SupervisorError::PortInUse { port: p } if p == port));
    assert_eq!(err.kind(), FailureKind::PortInUse);
    assert!(!sup.state().running);
}

#[tokio::test]
async fn test_auto_port_moves_on() {
    let dir = TempDir::new().unwrap();
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let (mut sup, mut rx) = supervisor(site(dir.path(), "exec sleep 30", port, true));
    let state = sup.start(None).unwrap();
    assert_ne!(state.port, Some(port));

    let (reply, _reply_rx) = oneshot::channel();
    sup.stop(reply);
    let CoordinatorMsg::ServerStopped { generation } = next_msg(&mut rx).await else {
        panic!("expected ServerStopped");
    };
    sup.on_stopped(generation);
}

#[tokio::test]
async fn test_missing_generator() {
    let dir = TempDir::new().unwrap();
    let mut config = test_parse_config("");
    config.finalize(dir.path());
    config.generator.command = vec!["sitekeeper-no-such-generator".into()];
    config.generator.port = free_port();
    let (mut sup, _rx) = supervisor(Arc::new(config));

    let err = sup.start(None).unwrap_err();
    assert!(matches!(err, SupervisorError::NotFound { .. }));
}

#[tokio::test]
async fn test_stale_generation_is_ignored() {
    let dir = TempDir::new().unwrap();
    let (mut sup, _rx) = supervisor(site(dir.path(), "exec sleep 30", free_port(), false));
    assert!(sup.on_exited(7, Some(1)).is_none());
    assert!(sup.on_stopped(7).is_none());
    assert!(sup.on_health(7, true).is_none());
}
