//! Terminal logging with colored module prefixes.
//!
//! - `log!` prints a `[module] message` line
//! - `debug!` does the same, only when `--verbose` is set
//! - `WatchStatus` keeps a single overwriting status block for serve mode
//!
//! ```ignore
//! log!("queue"; "build {} started", id);
//! debug!("watch"; "raw notify: {:?}", event.kind);
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::LazyLock,
    sync::atomic::{AtomicBool, Ordering},
};

/// Global verbose flag (set by --verbose CLI argument)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Print `[module] message`, clearing any leftover status text on the line.
pub fn log(module: &str, message: &str) {
    let prefix = prefix_for(module);
    let mut out = stdout().lock();
    execute!(out, Clear(ClearType::UntilNewLine)).ok();
    writeln!(out, "{prefix} {message}").ok();
    out.flush().ok();
}

fn prefix_for(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "serve" | "server" | "supervisor" => prefix.bright_blue().bold().to_string(),
        "watch" => prefix.bright_green().bold().to_string(),
        "live" => prefix.bright_cyan().bold().to_string(),
        "queue" | "build" => prefix.bright_magenta().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Watch Status (single-line status with overwrite)
// ============================================================================

/// Current UTC wall clock as HH:MM:SS
fn now() -> String {
    let secs = crate::utils::time::now_millis() / 1000;
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Outcome level of a status block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Success,
    Warning,
    Error,
}

impl Level {
    fn symbol(self) -> String {
        match self {
            Self::Success => "✓".green().to_string(),
            Self::Warning => "⚠".yellow().to_string(),
            Self::Error => "✗".red().to_string(),
        }
    }
}

/// Overwriting status block for serve mode.
///
/// A new build outcome replaces the previous block, so a run of successful
/// rebuilds stays on one line while failures keep their detail visible.
pub struct WatchStatus {
    /// Height of the block currently on screen
    last_lines: usize,
}

static WATCH_STATUS: LazyLock<Mutex<WatchStatus>> =
    LazyLock::new(|| Mutex::new(WatchStatus::new()));

impl WatchStatus {
    pub const fn new() -> Self {
        Self { last_lines: 0 }
    }

    pub fn success(&mut self, message: &str) {
        self.replace(Level::Success, message);
    }

    pub fn warning(&mut self, detail: &str) {
        self.replace(Level::Warning, detail);
    }

    /// Summary line, followed by `detail` when non-empty.
    pub fn error(&mut self, summary: &str, detail: &str) {
        if detail.is_empty() {
            self.replace(Level::Error, summary);
        } else {
            self.replace(Level::Error, &format!("{summary}\n{detail}"));
        }
    }

    fn replace(&mut self, level: Level, message: &str) {
        let mut out = stdout().lock();
        if let Ok(height) = u16::try_from(self.last_lines)
            && height > 0
        {
            execute!(out, cursor::MoveUp(height), Clear(ClearType::FromCursorDown)).ok();
        }

        let stamp = format!("[{}]", now()).dimmed().to_string();
        writeln!(out, "{stamp} {} {message}", level.symbol()).ok();
        out.flush().ok();

        self.last_lines = line_count(message);
    }
}

impl Default for WatchStatus {
    fn default() -> Self {
        Self::new()
    }
}

fn line_count(message: &str) -> usize {
    message.lines().count().max(1)
}

pub fn status_success(message: &str) {
    WATCH_STATUS.lock().success(message);
}

pub fn status_error(summary: &str, detail: &str) {
    WATCH_STATUS.lock().error(summary, detail);
}

pub fn status_warning(detail: &str) {
    WATCH_STATUS.lock().warning(detail);
}
