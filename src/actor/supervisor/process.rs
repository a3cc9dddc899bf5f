//! Generator process plumbing: command lines, environment, spawning and
//! termination.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use super::SupervisorError;
use crate::config::SiteConfig;
use crate::core::BuildMode;

/// Lines of dev server stderr kept for crash reports.
const STDERR_TAIL_LINES: usize = 20;

/// Ports scanned past the configured one when auto-port is on.
const PORT_SCAN_RANGE: u16 = 100;

// ============================================================================
// Variables
// ============================================================================

/// `$SITE_*` variables, exported to the generator and substituted in args.
pub fn site_vars(config: &SiteConfig, mode: BuildMode, port: u16) -> Vec<(&'static str, String)> {
    vec![
        ("SITE_ROOT", config.get_root().display().to_string()),
        ("SITE_OUTPUT", config.output_dir().display().to_string()),
        ("SITE_MODE", mode.as_str().to_string()),
        ("SITE_PORT", port.to_string()),
    ]
}

/// Replace `$SITE_*` occurrences in `args`.
pub fn resolve_args(args: &[String], vars: &[(&str, String)]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            let mut result = arg.clone();
            for (key, value) in vars {
                result = result.replace(&format!("${key}"), value);
            }
            result
        })
        .collect()
}

/// Locate the generator program, relative names resolved from the site root.
pub fn resolve_program(config: &SiteConfig) -> Result<PathBuf, SupervisorError> {
    let program = config.generator.program_name();
    which::which_in(program, std::env::var_os("PATH"), config.get_root()).map_err(|_| {
        SupervisorError::NotFound {
            program: program.to_string(),
        }
    })
}

fn command(
    config: &SiteConfig,
    extra_args: &[String],
    vars: &[(&'static str, String)],
) -> Result<Command, SupervisorError> {
    let program = resolve_program(config)?;
    let mut args = resolve_args(&config.generator.command[1..], vars);
    args.extend(resolve_args(extra_args, vars));

    crate::debug!("exec"; "{} {}", program.display(), args.join(" "));

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(vars.iter().map(|(k, v)| (*k, v.as_str())))
        .current_dir(config.get_root())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(cmd)
}

// ============================================================================
// Ports
// ============================================================================

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

pub fn port_is_free(port: u16) -> bool {
    TcpListener::bind(loopback(port)).is_ok()
}

/// First free port after `port`.
pub fn next_free_port(port: u16) -> Option<u16> {
    (1..=PORT_SCAN_RANGE)
        .filter_map(|offset| port.checked_add(offset))
        .find(|&p| port_is_free(p))
}

/// TCP health check against the dev server port.
pub async fn check_health(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(loopback(port))).await,
        Ok(Ok(_))
    )
}

// ============================================================================
// Dev server
// ============================================================================

/// Last stderr lines of the dev server.
#[derive(Debug, Clone, Default)]
pub struct StderrTail(Arc<Mutex<VecDeque<String>>>);

impl StderrTail {
    fn push(&self, line: String) {
        let mut lines = self.0.lock();
        if lines.len() == STDERR_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn snapshot(&self) -> String {
        self.0.lock().iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// A spawned dev server.
pub struct DevProcess {
    pub child: Child,
    pub pid: Option<u32>,
    pub port: u16,
    pub stderr: StderrTail,
}

/// Spawn the generator in serve mode. Output is logged line by line.
pub fn spawn_dev_server(config: &SiteConfig, port: u16) -> Result<DevProcess, SupervisorError> {
    let vars = site_vars(config, BuildMode::Dev, port);
    let mut cmd = command(config, &config.generator.serve_args, &vars)?;

    let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
        program: config.generator.program_name().to_string(),
        source,
    })?;

    let stderr = StderrTail::default();
    if let Some(out) = child.stdout.take() {
        tokio::spawn(forward_lines(out, None));
    }
    if let Some(err) = child.stderr.take() {
        tokio::spawn(forward_lines(err, Some(stderr.clone())));
    }

    Ok(DevProcess {
        pid: child.id(),
        child,
        port,
        stderr,
    })
}

async fn forward_lines(stream: impl AsyncRead + Unpin, tail: Option<StderrTail>) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = strip_ansi(&line).into_owned();
        if line.trim().is_empty() {
            continue;
        }
        match &tail {
            Some(tail) => {
                crate::log!("server"; "{}", line);
                tail.push(line);
            }
            None => crate::debug!("server"; "{}", line),
        }
    }
}

/// Terminate gracefully, escalating to a kill after `grace`.
pub async fn terminate(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
            if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
                return Some(status);
            }
            crate::debug!("server"; "no exit after {}ms, killing", grace.as_millis());
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    let _ = child.kill().await;
    child.wait().await.ok()
}

// ============================================================================
// One-shot builds
// ============================================================================

/// Result of a one-shot build process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// `None` when killed by a signal or the timeout
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub stderr: String,
    pub timed_out: bool,
}

impl BuildOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run the generator once and wait for it, killing it at the build timeout.
pub async fn run_build(config: &SiteConfig, mode: BuildMode) -> Result<BuildOutput, SupervisorError> {
    let vars = site_vars(config, mode, config.generator.port);
    let mut args = config.generator.build_args.clone();
    if mode == BuildMode::Dev {
        args.extend(config.generator.dev_build_args.iter().cloned());
    }
    let mut cmd = command(config, &args, &vars)?;

    let start = Instant::now();
    let limit = config.generator.build_timeout();
    let excerpt_bytes = config.generator.stderr_excerpt_bytes;

    // kill_on_drop reaps the child when the timeout drops the future
    match tokio::time::timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
                crate::debug!("build"; "{}", strip_ansi(line));
            }
            Ok(BuildOutput {
                exit_code: output.status.code(),
                duration: start.elapsed(),
                stderr: excerpt(&output.stderr, excerpt_bytes),
                timed_out: false,
            })
        }
        Ok(Err(source)) => Err(SupervisorError::Spawn {
            program: config.generator.program_name().to_string(),
            source,
        }),
        Err(_) => Ok(BuildOutput {
            exit_code: None,
            duration: start.elapsed(),
            stderr: format!("killed after {}ms", limit.as_millis()),
            timed_out: true,
        }),
    }
}

// ============================================================================
// Output helpers
// ============================================================================

pub fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());
    re.replace_all(s, "")
}

/// Tail of `bytes` (at most `max` bytes, cut at a char boundary), ANSI stripped.
pub fn excerpt(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = strip_ansi(text.trim_end());
    if text.len() <= max {
        return text.into_owned();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
