//! Core types - pure data shared across the codebase.

mod build;
mod category;
mod failure;
mod server;

pub use build::{BuildId, BuildMode, BuildRecord, BuildRequest, BuildStatus, RequestId, Trigger};
pub use category::{ChangeKind, ContentKind, FileCategory};
pub use failure::{Failure, FailureKind};
pub use server::ServerState;
