//! Command-line interface module.

mod args;
pub mod build;
pub mod serve;
pub mod validate;

pub use args::{Cli, Commands};

use anyhow::{Context, Result};

/// Runtime hosting the orchestrator actors for one command.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")
}
