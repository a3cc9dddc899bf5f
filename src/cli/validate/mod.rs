//! Front matter validation command.

mod report;

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use jwalk::WalkDir;
use rayon::prelude::*;

use crate::config::SiteConfig;
use crate::core::ContentKind;
use crate::frontmatter::{ValidationMode, ValidationResult, Validator};
use crate::log;
use crate::utils::path::{normalize_path, relative_to};
use crate::utils::plural_count;

use report::ValidationReport;

/// Validate front matter of `paths`, or of every content file when empty.
pub fn validate_site(config: &SiteConfig, paths: &[PathBuf], lenient: bool) -> Result<()> {
    let validator = Validator::new(config);
    let files = collect_files(config, &validator, paths)?;

    if files.is_empty() {
        log!("validate"; "no content files found");
        return Ok(());
    }

    let mode = if lenient {
        ValidationMode::Lenient
    } else {
        ValidationMode::Strict
    };
    log!("validate"; "validating {}", plural_count(files.len(), "file"));

    let results: Vec<ValidationResult> = files
        .par_iter()
        .map(|file| validator.validate_file(file, mode))
        .collect();

    let report = ValidationReport::from_results(&results);
    report.print(mode);
    log!("validate"; "{report}");

    if report.blocking() {
        bail!(
            "validation failed: {} in {}",
            plural_count(report.error_count(), "error"),
            plural_count(report.file_count(), "file")
        );
    }
    Ok(())
}

/// Resolve CLI paths to root-relative content files.
///
/// Paths are tried as given, then relative to the site root.
fn collect_files(config: &SiteConfig, validator: &Validator, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if paths.is_empty() {
        return Ok(validator.content_files());
    }

    let root = config.get_root();
    let mut files = Vec::new();
    for path in paths {
        let resolved = resolve_path(path, root);
        if resolved.is_file() {
            if ContentKind::from_path(&resolved).is_none() {
                bail!("not a supported content file: {}", path.display());
            }
            files.push(resolved);
        } else if resolved.is_dir() {
            files.extend(
                WalkDir::new(&resolved)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.path())
                    .filter(|p| ContentKind::is_content_file(p)),
            );
        } else {
            bail!(
                "path not found: {}\n  Tried:\n    - {}\n    - {}",
                path.display(),
                path.display(),
                root.join(path).display()
            );
        }
    }

    let mut files: Vec<PathBuf> = files
        .into_iter()
        .map(|file| relative_to(&normalize_path(&file), root))
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

fn resolve_path(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
