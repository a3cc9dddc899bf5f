//! `build` command: one production build through the orchestrator.

use std::sync::Arc;

use anyhow::{Result, bail};

use crate::config::SiteConfig;
use crate::core::{BuildMode, BuildRecord};
use crate::frontmatter::ValidationMode;
use crate::log;
use crate::orchestrator::Orchestrator;

pub fn build_site(config: Arc<SiteConfig>, validation: ValidationMode) -> Result<()> {
    log!(
        "build";
        "running `{}` ({} validation)",
        config.generator.program_name(),
        validation.as_str()
    );

    let record = super::runtime()?.block_on(async {
        let orchestrator = Orchestrator::start(config)?;
        let id = orchestrator
            .trigger_build(BuildMode::Production, validation)
            .await?;
        let record = orchestrator.wait_for_build(id).await?;
        orchestrator.shutdown().await?;
        anyhow::Ok(record)
    })?;

    report(&record)
}

fn report(record: &BuildRecord) -> Result<()> {
    for result in &record.validation {
        let label = if result.blocking { "error" } else { "warning" };
        log!(label; "{}: {}", result.path.display(), result.summary());
    }

    match &record.failure {
        None => {
            log!("build"; "done in {}ms", record.duration_ms);
            Ok(())
        }
        Some(failure) => {
            if !record.stderr_excerpt.is_empty() {
                eprintln!("{}", record.stderr_excerpt);
            }
            bail!("build failed ({}): {}", failure.kind, failure.message)
        }
    }
}
