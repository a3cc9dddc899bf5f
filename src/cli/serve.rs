//! `serve` command: watch, rebuild and supervise until Ctrl+C.
//!
//! Build outcomes are rendered by an in-process live client, so the terminal
//! shows exactly what WebSocket subscribers receive.

use std::sync::Arc;

use anyhow::Result;
use crossbeam::channel::Receiver;
use serde_json::Value;

use crate::actor::live::ChannelSink;
use crate::config::SiteConfig;
use crate::frontmatter::ValidationMode;
use crate::log;
use crate::logger::{status_error, status_success, status_warning};
use crate::orchestrator::Orchestrator;

pub fn serve_site(config: Arc<SiteConfig>, no_server: bool, validation: ValidationMode) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    super::runtime()?.block_on(async {
        let mut orchestrator = Orchestrator::start(Arc::clone(&config))?;
        if let Some(port) = orchestrator.live_port() {
            log!("live"; "status channel on ws://{}:{}", config.live.interface, port);
        }

        orchestrator.watch(validation)?;

        let (sink, events) = ChannelSink::new();
        orchestrator.attach_client(Box::new(sink))?;
        let reporter = std::thread::spawn(move || report_events(&events));

        if !no_server {
            match orchestrator.start_server(None).await {
                Ok(state) => {
                    log!("serve"; "dev server at http://127.0.0.1:{}", state.port.unwrap_or_default());
                }
                Err(e) => log!("error"; "{}", e),
            }
        }

        log!("watch"; "watching for changes ({} validation), press Ctrl+C to stop", validation.as_str());
        let _ = tokio::task::spawn_blocking(move || shutdown_rx.recv()).await;

        log!("serve"; "shutting down");
        orchestrator.shutdown().await?;
        let _ = reporter.join();
        anyhow::Ok(())
    })
}

/// Render live events until the channel closes.
fn report_events(events: &Receiver<String>) {
    for text in events {
        let Ok(event) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let payload = &event["payload"];
        match event["type"].as_str() {
            Some("build-finished") => report_build(payload),
            Some("server-down") => {
                if let Some(message) = payload["failure"]["message"].as_str() {
                    status_error("dev server down", message);
                }
            }
            _ => {}
        }
    }
}

fn report_build(record: &Value) {
    let id = record["id"].as_u64().unwrap_or_default();
    let ms = record["durationMs"].as_u64().unwrap_or_default();
    let problems = validation_lines(record);

    match record["status"].as_str() {
        Some("success") if problems.is_empty() => {
            status_success(&format!("build {id} done in {ms}ms"));
        }
        Some("success") => status_warning(&format!("build {id} done in {ms}ms\n{problems}")),
        Some("failure") => {
            let message = record["failure"]["message"].as_str().unwrap_or("unknown error");
            let detail = if problems.is_empty() {
                record["stderrExcerpt"].as_str().unwrap_or_default().to_string()
            } else {
                problems
            };
            status_error(&format!("build {id} failed: {message}"), &detail);
        }
        _ => {}
    }
}

/// `path: field (message), ...` for every failing validation result.
fn validation_lines(record: &Value) -> String {
    let Some(results) = record["validation"].as_array() else {
        return String::new();
    };
    results
        .iter()
        .map(|result| {
            let errors = result["errors"]
                .as_array()
                .map(|errors| {
                    errors
                        .iter()
                        .map(|e| {
                            format!(
                                "{} ({})",
                                e["field"].as_str().unwrap_or_default(),
                                e["message"].as_str().unwrap_or_default()
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            format!("  {}: {}", result["path"].as_str().unwrap_or_default(), errors)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
