//! Actor System for Build Orchestration
//!
//! Message-passing concurrency for serve mode:
//!
//! ```text
//! FileWatcher --Changes--> Coordinator --Publish--> LiveActor --> clients
//!                             |    ^
//!                     spawn   v    |  completions
//!                  build / dev server tasks
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `queue` - Single-flight build queue and bounded history
//! - `supervisor` - Generator process control (dev server, one-shot builds)
//! - `live` - Live status channel (WebSocket broadcast with replay)
//! - `coordinator` - Owns queue and server state, runs the actor loop

pub mod coordinator;
pub mod live;
pub mod messages;
pub mod queue;
pub mod supervisor;

pub use coordinator::Coordinator;
