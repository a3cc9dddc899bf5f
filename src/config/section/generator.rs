//! `[generator]` section configuration.
//!
//! Describes how to invoke the external static site generator.
//!
//! # Example
//!
//! ```toml
//! [generator]
//! command = ["hugo"]
//! serve_args = ["server", "--port", "$SITE_PORT", "--bind", "127.0.0.1"]
//! build_args = ["--destination", "$SITE_OUTPUT"]
//! dev_build_args = ["--buildDrafts"]
//! output = "public"
//! port = 1313
//! auto_port = true            # Retry once on the next free port
//! build_timeout_ms = 120000
//! ```
//!
//! Arguments may reference `$SITE_ROOT`, `$SITE_OUTPUT`, `$SITE_PORT` and
//! `$SITE_MODE`; the same variables are exported to the generator process.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// External generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Program and leading arguments, e.g. `["hugo"]` or `["npx", "eleventy"]`.
    pub command: Vec<String>,

    /// Arguments for serve/watch mode.
    pub serve_args: Vec<String>,

    /// Arguments for one-shot builds.
    pub build_args: Vec<String>,

    /// Extra arguments appended to one-shot builds in dev mode.
    pub dev_build_args: Vec<String>,

    /// Output directory (relative to the site root).
    pub output: PathBuf,

    /// Dev server port.
    pub port: u16,

    /// Retry once on the next free port when `port` is taken.
    pub auto_port: bool,

    /// Interval between dev server health checks.
    pub health_interval_ms: u64,

    /// Grace period between SIGTERM and a forced kill.
    pub stop_timeout_ms: u64,

    /// Hard limit for one-shot builds.
    pub build_timeout_ms: u64,

    /// Rolling window for automatic restarts after a crash.
    pub restart_window_ms: u64,

    /// Automatic restarts allowed per window.
    pub max_restarts: u32,

    /// Delay before an automatic restart is attempted.
    pub restart_delay_ms: u64,

    /// Tail of stderr kept on build records.
    pub stderr_excerpt_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        fn args(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| (*s).to_string()).collect()
        }
        Self {
            command: args(&["hugo"]),
            serve_args: args(&[
                "server",
                "--port",
                "$SITE_PORT",
                "--bind",
                "127.0.0.1",
                "--disableLiveReload",
            ]),
            build_args: args(&["--destination", "$SITE_OUTPUT"]),
            dev_build_args: args(&["--buildDrafts"]),
            output: PathBuf::from("public"),
            port: 1313,
            auto_port: true,
            health_interval_ms: 10_000,
            stop_timeout_ms: 5_000,
            build_timeout_ms: 120_000,
            restart_window_ms: 60_000,
            max_restarts: 1,
            restart_delay_ms: 500,
            stderr_excerpt_bytes: 4096,
        }
    }
}

impl GeneratorConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_millis(self.restart_window_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Display name of the generator program.
    pub fn program_name(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("")
    }
}
