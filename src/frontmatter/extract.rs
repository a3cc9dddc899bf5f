//! Front matter extraction.
//!
//! Recognized blocks at the very start of a content file:
//!
//! ```text
//! ---            +++            {
//! title: Hi      title = "Hi"     "title": "Hi"
//! ---            +++            }
//! ```
//!
//! Every format is normalized to a `serde_json::Value` so the validator sees
//! one representation. TOML datetimes become their RFC 3339 string form.

use serde_json::{Map, Value};
use thiserror::Error;

/// Front matter syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unterminated {} front matter", .0.name())]
    Unterminated(Format),

    #[error("invalid {format} front matter: {message}", format = .format.name())]
    Parse { format: Format, message: String },
}

/// Extract and parse the front matter block of `source`.
///
/// Returns `Ok(None)` when the file has no front matter at all.
pub fn extract(source: &str) -> Result<Option<(Format, Value)>, ExtractError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    if source.trim_start().starts_with('{') {
        return parse_json(source.trim_start()).map(|v| Some((Format::Json, v)));
    }

    let Some((first, rest)) = split_first_line(source) else {
        return Ok(None);
    };
    let (format, parse): (Format, fn(&str) -> Result<Value, ExtractError>) =
        match first.trim_end() {
            "---" => (Format::Yaml, parse_yaml),
            "+++" => (Format::Toml, parse_toml),
            _ => return Ok(None),
        };

    let block = fenced_block(rest, format).ok_or(ExtractError::Unterminated(format))?;
    Ok(Some((format, parse(block)?)))
}

fn split_first_line(source: &str) -> Option<(&str, &str)> {
    match source.find('\n') {
        Some(i) => Some((&source[..i], &source[i + 1..])),
        None if !source.is_empty() => Some((source, "")),
        None => None,
    }
}

/// Body up to the closing fence line.
fn fenced_block(rest: &str, format: Format) -> Option<&str> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        let closes = match format {
            Format::Yaml => trimmed == "---" || trimmed == "...",
            Format::Toml => trimmed == "+++",
            Format::Json => false,
        };
        if closes {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }
    None
}

fn parse_yaml(block: &str) -> Result<Value, ExtractError> {
    if block.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(block).map_err(|e| ExtractError::Parse {
        format: Format::Yaml,
        message: e.to_string(),
    })?;
    serde_json::to_value(yaml).map_err(|e| ExtractError::Parse {
        format: Format::Yaml,
        message: e.to_string(),
    })
}

fn parse_toml(block: &str) -> Result<Value, ExtractError> {
    let table: toml::Table = toml::from_str(block).map_err(|e| ExtractError::Parse {
        format: Format::Toml,
        message: e.message().to_string(),
    })?;
    Ok(toml_to_json(toml::Value::Table(table)))
}

fn parse_json(source: &str) -> Result<Value, ExtractError> {
    let mut stream = serde_json::Deserializer::from_str(source).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) if e.is_eof() => Err(ExtractError::Unterminated(Format::Json)),
        Some(Err(e)) => Err(ExtractError::Parse {
            format: Format::Json,
            message: e.to_string(),
        }),
        None => Err(ExtractError::Unterminated(Format::Json)),
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
