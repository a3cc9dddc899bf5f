//! Front matter validation.
//!
//! Content changes pass through [`Validator`] before they may trigger a real
//! build. Checks run independently and every violation is reported, in a
//! fixed order:
//!
//! | Phase     | Rule                                                      |
//! |-----------|-----------------------------------------------------------|
//! | required  | `title` present, `date` present                           |
//! | types     | declared schema types (`date` must also parse)            |
//! | locale    | `lang`/`language` matches the locale subtree, if declared |
//! | seo       | `description`, `tags`, `categories` non-empty if present  |
//! | taxonomy  | entries are non-empty strings, no case-insensitive dupes  |
//!
//! Only [`Validator::validate_file`] touches the filesystem.

mod date;
mod extract;
mod schema;


pub use date::FrontMatterDate;
pub use extract::{ExtractError, Format, extract};
pub use schema::{FieldType, Schema};

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use jwalk::WalkDir;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::SiteConfig;
use crate::core::ContentKind;

/// Fields that must be present.
const REQUIRED_FIELDS: &[&str] = &["title", "date"];
/// Fields that name the page language.
const LOCALE_FIELDS: &[&str] = &["lang", "language"];
/// SEO-relevant fields that must not be empty when present.
const SEO_FIELDS: &[&str] = &["description", "tags", "categories"];
/// Taxonomy lists checked entry by entry.
const TAXONOMY_FIELDS: &[&str] = &["tags", "categories"];
/// Pseudo field for problems with the block as a whole.
pub const FRONT_MATTER_FIELD: &str = "front_matter";

/// Whether validation errors block the build.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Errors block the build
    #[default]
    Strict,
    /// Errors are reported as warnings
    Lenient,
}

impl ValidationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        }
    }

    /// The tighter of two modes; strict wins.
    pub fn max(self, other: Self) -> Self {
        if self == Self::Strict || other == Self::Strict {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(field, "required")
    }
}

/// Outcome of validating one file's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub path: PathBuf,
    pub valid: bool,
    pub blocking: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    fn new(path: &Path, errors: Vec<FieldError>, mode: ValidationMode) -> Self {
        let valid = errors.is_empty();
        Self {
            path: path.to_path_buf(),
            valid,
            blocking: !valid && mode == ValidationMode::Strict,
            errors,
        }
    }

    /// `title (required), date (invalid date ...)`
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{} ({})", e.field, e.message))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Front matter validator bound to a site layout.
#[derive(Debug, Clone)]
pub struct Validator {
    root: PathBuf,
    content_dirs: Vec<PathBuf>,
    locales: Vec<String>,
    schema: Schema,
}

impl Validator {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            root: config.get_root().to_path_buf(),
            content_dirs: config.watch.categories.content.clone(),
            locales: config.validate.locales.clone(),
            schema: Schema::with_overrides(&config.validate.fields),
        }
    }

    /// Validate already-parsed metadata for `path`.
    pub fn validate(&self, path: &Path, metadata: &Value, mode: ValidationMode) -> ValidationResult {
        let Some(fields) = metadata.as_object() else {
            let error = FieldError::new(
                FRONT_MATTER_FIELD,
                format!("expected a map, found {}", schema::json_type_name(metadata)),
            );
            return ValidationResult::new(path, vec![error], mode);
        };

        let mut errors = Vec::new();
        check_required(fields, &mut errors);
        self.check_types(fields, &mut errors);
        if let Some(locale) = self.locale_of(path) {
            check_locale(fields, locale, &mut errors);
        }
        check_seo(fields, &mut errors);
        check_taxonomies(fields, &mut errors);

        ValidationResult::new(path, errors, mode)
    }

    /// Read `path`, extract its front matter and validate it.
    ///
    /// Files without front matter are validated as empty metadata.
    pub fn validate_file(&self, path: &Path, mode: ValidationMode) -> ValidationResult {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let source = match fs::read_to_string(&full) {
            Ok(source) => source,
            Err(e) => {
                let error = FieldError::new(FRONT_MATTER_FIELD, format!("unreadable: {e}"));
                return ValidationResult::new(path, vec![error], mode);
            }
        };

        match extract(&source) {
            Ok(Some((_, metadata))) => self.validate(path, &metadata, mode),
            Ok(None) => self.validate(path, &Value::Object(Map::new()), mode),
            Err(e) => {
                let error = FieldError::new(FRONT_MATTER_FIELD, e.to_string());
                ValidationResult::new(path, vec![error], mode)
            }
        }
    }

    /// Whether `path` is an existing content source subject to validation.
    pub fn is_content(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        ContentKind::is_content_file(relative)
            && self.content_dirs.iter().any(|dir| relative.starts_with(dir))
            && self.root.join(relative).is_file()
    }

    /// Every content source below the content directories, root-relative
    /// and sorted.
    pub fn content_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .content_dirs
            .iter()
            .map(|dir| self.root.join(dir))
            .filter(|dir| dir.is_dir())
            .flat_map(|dir| {
                WalkDir::new(dir)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.path())
                    .collect::<Vec<_>>()
            })
            .filter(|path| ContentKind::is_content_file(path))
            .filter_map(|path| path.strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Locale subtree containing `path`, if it is a configured locale.
    ///
    /// The locale is the first component below a content directory:
    /// `content/es/posts/a.md` → `es`.
    pub fn locale_of(&self, path: &Path) -> Option<&str> {
        if self.locales.is_empty() {
            return None;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let below = self
            .content_dirs
            .iter()
            .find_map(|dir| relative.strip_prefix(dir).ok())?;

        // A bare file directly in the content dir has no locale
        let mut components = below.components();
        let Some(Component::Normal(first)) = components.next() else {
            return None;
        };
        components.next()?;

        let first = first.to_str()?;
        self.locales
            .iter()
            .find(|l| l.as_str() == first)
            .map(String::as_str)
    }

    fn check_types(&self, fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
        for (name, ty) in self.schema.iter() {
            let Some(value) = present(fields, name) else {
                continue;
            };
            if let Some(message) = ty.check(value) {
                errors.push(FieldError::new(name, message));
            }
        }
    }
}

/// A field counts as absent when missing or null.
fn present<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

fn check_required(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    for name in REQUIRED_FIELDS {
        if present(fields, name).is_none() {
            errors.push(FieldError::required(name));
        }
    }
}

fn check_locale(fields: &Map<String, Value>, locale: &str, errors: &mut Vec<FieldError>) {
    for name in LOCALE_FIELDS {
        let Some(declared) = fields.get(*name).and_then(Value::as_str) else {
            continue;
        };
        if !declared.eq_ignore_ascii_case(locale) {
            errors.push(FieldError::new(
                *name,
                format!("expected `{locale}` for content under `{locale}/`, found `{declared}`"),
            ));
        }
    }
}

fn check_seo(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    for name in SEO_FIELDS {
        let empty = match fields.get(*name) {
            None => false,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        };
        if empty {
            errors.push(FieldError::new(*name, "must not be empty"));
        }
    }
}

fn check_taxonomies(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    for name in TAXONOMY_FIELDS {
        let Some(Value::Array(items)) = fields.get(*name) else {
            continue;
        };

        let mut seen = HashSet::new();
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::String(s) if s.trim().is_empty() => {
                    errors.push(FieldError::new(*name, format!("entry {} is empty", i + 1)));
                }
                Value::String(s) => {
                    if !seen.insert(s.trim().to_lowercase()) {
                        errors.push(FieldError::new(*name, format!("duplicate entry `{s}`")));
                    }
                }
                other => errors.push(FieldError::new(
                    *name,
                    format!(
                        "entry {} is a {}, expected string",
                        i + 1,
                        schema::json_type_name(other)
                    ),
                )),
            }
        }
    }
}
