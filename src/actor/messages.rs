//! Actor Message Definitions
//!
//! ```text
//! Facade --TriggerBuild/Status/...--> Coordinator --Publish/Attach--> LiveActor
//!                                       ^
//! build / waiter / health / restart ----+  (completion messages)
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use tokio::sync::oneshot;

use super::live::{ClientConnection, ClientSink, LiveEvent};
use super::queue::QueueStatus;
use super::supervisor::SupervisorError;
use crate::core::{BuildMode, BuildRecord, RequestId, ServerState, Trigger};
use crate::frontmatter::ValidationMode;
use crate::watch::ChangeSet;

/// One-shot reply channel for request/response messages.
pub type Reply<T> = oneshot::Sender<T>;

// =============================================================================
// Coordinator Messages
// =============================================================================

/// Messages to the Coordinator
pub enum CoordinatorMsg {
    /// Accept a build request
    TriggerBuild {
        trigger: Trigger,
        mode: BuildMode,
        validation: ValidationMode,
        paths: BTreeSet<PathBuf>,
        reply: Reply<RequestId>,
    },
    /// Debounced change set from the watcher
    Changes {
        changes: ChangeSet,
        validation: ValidationMode,
    },
    /// Queue and server snapshot
    Status(Reply<(QueueStatus, ServerState)>),
    /// Record of the build serving a request, replied once it exists;
    /// `None` when the request is neither outstanding nor retained
    AwaitBuild {
        id: RequestId,
        reply: Reply<Option<BuildRecord>>,
    },
    StartServer {
        port: Option<u16>,
        reply: Reply<Result<ServerState, SupervisorError>>,
    },
    StopServer(Reply<ServerState>),
    /// Handshaken live client, replayed and then registered
    AttachClient(Box<dyn ClientSink>),
    /// Ordered shutdown, replied once everything is down
    Shutdown(Reply<()>),

    // Completions from spawned tasks
    /// A build task finished
    BuildDone(BuildRecord),
    /// Dev server exited without being asked to
    ServerExited { generation: u64, code: Option<i32> },
    /// Dev server terminated after a stop request
    ServerStopped { generation: u64 },
    /// Health check result
    HealthChecked { generation: u64, healthy: bool },
    /// Automatic restart delay elapsed
    RestartDue { token: u64 },
}

// =============================================================================
// LiveActor Messages
// =============================================================================

/// Messages to the Live Actor
pub enum LiveMsg {
    /// Broadcast to every client
    Publish(LiveEvent),
    /// Register a client after sending it `replay`
    Attach {
        sink: Box<dyn ClientSink>,
        replay: Vec<LiveEvent>,
    },
    /// Connected clients
    Clients(Reply<Vec<ClientConnection>>),
    /// Close all clients and stop
    Shutdown(Reply<()>),
}
