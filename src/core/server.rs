//! Dev server state snapshot.

use serde::Serialize;

use super::Failure;

/// State of the supervised generator dev server.
///
/// `running` is true only while the process is confirmed alive; `healthy`
/// reflects the last health check against the port. `failure` is why the
/// server last went down on its own, cleared by the next successful spawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerState {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    pub healthy: bool,
    /// Automatic restarts performed since the server was started by a caller
    pub restarts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl ServerState {
    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn running(pid: Option<u32>, port: u16, restarts: u32) -> Self {
        Self {
            running: true,
            pid,
            port: Some(port),
            started_at: Some(crate::utils::time::now_millis()),
            healthy: false,
            restarts,
            failure: None,
        }
    }
}
