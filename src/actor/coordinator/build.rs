//! Build task: front matter gate, then one generator run.

use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tokio::task::JoinError;

use crate::actor::live::BuildStarted;
use crate::actor::queue::CurrentBuild;
use crate::actor::supervisor::{BuildOutput, SupervisorError, run_build};
use crate::config::SiteConfig;
use crate::core::{BuildRecord, BuildStatus, Failure, FailureKind};
use crate::frontmatter::{ValidationResult, Validator};
use crate::utils::plural_count;
use crate::utils::time::{duration_millis, now_millis};

impl CurrentBuild {
    pub fn started_event(&self) -> BuildStarted {
        BuildStarted {
            build_id: self.build_id,
            request_id: self.request.id,
            merged_request_ids: self.request.merged_ids.clone(),
            trigger: self.request.trigger,
            mode: self.request.mode,
            changed_paths: self.request.changed_paths.iter().cloned().collect(),
            started_at: self.started_at,
        }
    }
}

/// Content files a request must validate.
///
/// Change-triggered builds check the changed content still on disk; a
/// request that is (or absorbed) a pathless manual or scheduled build checks
/// every content file.
fn gated_paths(validator: &Validator, build: &CurrentBuild) -> Vec<PathBuf> {
    let request = &build.request;
    if request.validate_all {
        return validator.content_files();
    }
    request
        .changed_paths
        .iter()
        .filter(|p| validator.is_content(p))
        .cloned()
        .collect()
}

/// Failing results, in path order.
fn validate(validator: &Validator, build: &CurrentBuild) -> Vec<ValidationResult> {
    let mode = build.request.validation;
    gated_paths(validator, build)
        .par_iter()
        .map(|path| validator.validate_file(path, mode))
        .filter(|result| !result.valid)
        .collect()
}

/// Run `build` to completion and freeze its outcome.
pub(super) async fn execute(
    config: Arc<SiteConfig>,
    validator: Arc<Validator>,
    build: CurrentBuild,
) -> BuildRecord {
    let started = std::time::Instant::now();

    let gate = build.clone();
    let joined = tokio::task::spawn_blocking(move || validate(&validator, &gate)).await;

    let mut record = BuildRecord {
        id: build.build_id,
        started_at: build.started_at,
        finished_at: build.started_at,
        status: BuildStatus::Success,
        duration_ms: 0,
        stderr_excerpt: String::new(),
        triggering_request_id: build.request.id,
        merged_request_ids: build.request.merged_ids.clone(),
        mode: build.request.mode,
        exit_code: None,
        failure: None,
        validation: Vec::new(),
    };

    let gate_failure = match settle_gate(joined) {
        Ok(validation) => {
            record.validation = validation;
            blocking_failure(&record.validation)
        }
        Err(failure) => Some(failure),
    };
    match gate_failure {
        Some(failure) => {
            record.status = BuildStatus::Failure;
            record.failure = Some(failure);
        }
        None => apply_output(&mut record, run_build(&config, build.request.mode).await),
    }

    record.finished_at = now_millis();
    record.duration_ms = duration_millis(started.elapsed());
    record
}

/// A validation task that panicked or was cancelled blocks the build.
fn settle_gate(
    joined: Result<Vec<ValidationResult>, JoinError>,
) -> Result<Vec<ValidationResult>, Failure> {
    joined.map_err(|e| {
        crate::log!("validate"; "validation aborted: {}", e);
        Failure::new(
            FailureKind::ValidationFailure,
            format!("front matter validation did not complete: {e}"),
        )
    })
}

fn blocking_failure(results: &[ValidationResult]) -> Option<Failure> {
    let blocking: Vec<_> = results.iter().filter(|r| r.blocking).collect();
    if blocking.is_empty() {
        return None;
    }
    let detail = blocking
        .iter()
        .map(|r| format!("{}: {}", r.path.display(), r.summary()))
        .collect::<Vec<_>>()
        .join("; ");
    Some(Failure::new(
        FailureKind::ValidationFailure,
        format!(
            "front matter invalid in {}: {}",
            plural_count(blocking.len(), "file"),
            detail
        ),
    ))
}

fn apply_output(record: &mut BuildRecord, output: Result<BuildOutput, SupervisorError>) {
    let output = match output {
        Ok(output) => output,
        Err(e) => {
            record.status = BuildStatus::Failure;
            let mut failure = e.to_failure();
            failure.kind = FailureKind::BuildFailure;
            record.failure = Some(failure);
            return;
        }
    };

    record.exit_code = output.exit_code;
    record.stderr_excerpt = output.stderr.clone();
    if output.success() {
        return;
    }

    record.status = BuildStatus::Failure;
    record.failure = Some(if output.timed_out {
        Failure::new(FailureKind::Timeout, format!("build timed out, {}", output.stderr))
    } else {
        let message = match output.exit_code {
            Some(code) => format!("generator exited with code {code}"),
            None => "generator killed by signal".to_string(),
        };
        Failure::new(FailureKind::BuildFailure, message)
    });
}
