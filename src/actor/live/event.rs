//! Live channel event protocol.
//!
//! Every frame is a JSON object `{"type": ..., "payload": ...}`:
//!
//! | type             | payload                                   |
//! |------------------|-------------------------------------------|
//! | `build-started`  | build id, request id, mode, changed paths |
//! | `build-finished` | the finished `BuildRecord`                |
//! | `file-changed`   | debounced change set                      |
//! | `server-up`      | `ServerState`                             |
//! | `server-down`    | `ServerState`, with its failure if any    |

use std::path::PathBuf;

use serde::Serialize;

use crate::core::{BuildId, BuildMode, BuildRecord, RequestId, ServerState, Trigger};
use crate::watch::{ChangeEvent, ChangeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum LiveEvent {
    BuildStarted(BuildStarted),
    BuildFinished(Box<BuildRecord>),
    FileChanged(FileChanged),
    ServerUp(ServerState),
    ServerDown(ServerState),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStarted {
    pub build_id: BuildId,
    pub request_id: RequestId,
    pub merged_request_ids: Vec<RequestId>,
    pub trigger: Trigger,
    pub mode: BuildMode,
    pub changed_paths: Vec<PathBuf>,
    pub started_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChanged {
    pub changes: Vec<ChangeEvent>,
    pub forced: bool,
}

impl From<&ChangeSet> for FileChanged {
    fn from(set: &ChangeSet) -> Self {
        Self {
            changes: set.events().cloned().collect(),
            forced: set.forced,
        }
    }
}

impl LiveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildStarted(_) => "build-started",
            Self::BuildFinished(_) => "build-finished",
            Self::FileChanged(_) => "file-changed",
            Self::ServerUp(_) => "server-up",
            Self::ServerDown(_) => "server-down",
        }
    }

    pub fn build_finished(record: BuildRecord) -> Self {
        Self::BuildFinished(Box::new(record))
    }

    /// Current server state as the matching up/down event.
    pub fn for_server(state: &ServerState) -> Self {
        if state.running {
            Self::ServerUp(state.clone())
        } else {
            Self::ServerDown(state.clone())
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain data with string keys cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Failure, FailureKind};
    use serde_json::{Value, json};

    fn parse(event: &LiveEvent) -> Value {
        serde_json::from_str(&event.to_json()).unwrap()
    }

    #[test]
    fn test_server_events() {
        let up = LiveEvent::ServerUp(ServerState {
            running: true,
            pid: Some(42),
            port: Some(1313),
            started_at: Some(1),
            healthy: true,
            restarts: 0,
            failure: None,
        });
        assert_eq!(
            parse(&up),
            json!({
                "type": "server-up",
                "payload": {
                    "running": true,
                    "pid": 42,
                    "port": 1313,
                    "startedAt": 1,
                    "healthy": true,
                    "restarts": 0,
                },
            })
        );

        let down = LiveEvent::ServerDown(ServerState {
            failure: Some(Failure::new(FailureKind::ProcessCrash, "exited with code 1")),
            ..ServerState::stopped()
        });
        assert_eq!(
            parse(&down),
            json!({
                "type": "server-down",
                "payload": {
                    "running": false,
                    "healthy": false,
                    "restarts": 0,
                    "failure": {"kind": "process-crash", "message": "exited with code 1"},
                },
            })
        );
    }

    #[test]
    fn test_for_server_matches_state() {
        assert_eq!(LiveEvent::for_server(&ServerState::stopped()).name(), "server-down");
        let crashed = ServerState {
            failure: Some(Failure::new(FailureKind::PortInUse, "port 1313 is already in use")),
            ..ServerState::stopped()
        };
        assert_eq!(
            parse(&LiveEvent::for_server(&crashed))["payload"]["failure"]["kind"],
            json!("port-in-use")
        );
        let running = ServerState::running(Some(1), 1313, 0);
        assert_eq!(LiveEvent::for_server(&running).name(), "server-up");
    }

    #[test]
    fn test_event_names_match_tags() {
        let started = LiveEvent::BuildStarted(BuildStarted {
            build_id: BuildId(1),
            request_id: RequestId(1),
            merged_request_ids: vec![],
            trigger: Trigger::Manual,
            mode: BuildMode::Dev,
            changed_paths: vec![],
            started_at: 0,
        });
        let changed = LiveEvent::FileChanged(FileChanged {
            changes: vec![],
            forced: true,
        });
        for event in [started, changed] {
            assert_eq!(parse(&event)["type"], json!(event.name()));
        }
    }
}
