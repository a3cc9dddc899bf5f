//! Validation report formatting.

use std::collections::BTreeMap;
use std::fmt;

use owo_colors::OwoColorize;

use crate::frontmatter::{FieldError, ValidationMode, ValidationResult};
use crate::utils::plural_s;

/// Failing results grouped by file.
#[derive(Debug, Default)]
pub struct ValidationReport {
    files: BTreeMap<String, Vec<FieldError>>,
    checked: usize,
    blocking: bool,
}

impl ValidationReport {
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let mut report = Self {
            checked: results.len(),
            ..Self::default()
        };
        for result in results.iter().filter(|r| !r.valid) {
            report.blocking |= result.blocking;
            report
                .files
                .entry(result.path.display().to_string())
                .or_default()
                .extend(result.errors.iter().cloned());
        }
        report
    }

    /// Any result blocks a build.
    pub fn blocking(&self) -> bool {
        self.blocking
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn error_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Print failing files to stderr.
    pub fn print(&self, mode: ValidationMode) {
        if self.files.is_empty() {
            return;
        }
        eprintln!();

        let name = match mode {
            ValidationMode::Strict => "errors".red().bold().to_string(),
            ValidationMode::Lenient => "warnings".yellow().bold().to_string(),
        };
        let file_count = self.file_count();
        let error_count = self.error_count();
        eprintln!(
            "{} {}",
            name,
            format!(
                "({file_count} file{}, {error_count} problem{})",
                plural_s(file_count),
                plural_s(error_count)
            )
            .dimmed()
        );

        for (path, errors) in &self.files {
            eprintln!("{}{}{}", "[".dimmed(), path.cyan(), "]".dimmed());
            for e in errors {
                eprintln!("{} {} {}", "→".red(), e.field, e.message);
            }
        }
        eprintln!();
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.files.is_empty() {
            return write!(f, "{}", format!("all {} valid", self.checked).green());
        }
        let errors = self.error_count();
        let files = self.file_count();
        write!(
            f,
            "{}",
            format!(
                "{errors} problem{} in {files} of {} file{}",
                plural_s(errors),
                self.checked,
                plural_s(self.checked)
            )
            .yellow()
        )
    }
}
