//! Declared front matter field types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::date::FrontMatterDate;

/// Expected type of a front matter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Boolean,
    Sequence,
    Date,
    Integer,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Sequence => "sequence",
            Self::Date => "date",
            Self::Integer => "integer",
        }
    }

    /// Check `value` against this type, returning the error message on mismatch.
    pub fn check(self, value: &Value) -> Option<String> {
        let matches = match self {
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Sequence => value.is_array(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Date => {
                return match value.as_str() {
                    Some(s) => FrontMatterDate::parse(s)
                        .err()
                        .map(|e| format!("invalid date `{s}`: {e}")),
                    None => Some(format!("expected date, found {}", json_type_name(value))),
                };
            }
        };
        (!matches).then(|| format!("expected {}, found {}", self.name(), json_type_name(value)))
    }
}

/// Field name → expected type, iterated in name order.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: BTreeMap<String, FieldType>,
}

impl Default for Schema {
    fn default() -> Self {
        let fields = [
            ("title", FieldType::String),
            ("description", FieldType::String),
            ("slug", FieldType::String),
            ("lang", FieldType::String),
            ("language", FieldType::String),
            ("draft", FieldType::Boolean),
            ("tags", FieldType::Sequence),
            ("categories", FieldType::Sequence),
            ("aliases", FieldType::Sequence),
            ("date", FieldType::Date),
            ("lastmod", FieldType::Date),
        ]
        .into_iter()
        .map(|(name, ty)| (name.to_string(), ty))
        .collect();
        Self { fields }
    }
}

impl Schema {
    /// Built-in schema with `overrides` merged on top.
    pub fn with_overrides(overrides: &BTreeMap<String, FieldType>) -> Self {
        let mut schema = Self::default();
        schema
            .fields
            .extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        schema
    }

    pub fn get(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

pub(super) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_check() {
        assert_eq!(FieldType::String.check(&json!("x")), None);
        assert_eq!(
            FieldType::Boolean.check(&json!("yes")).as_deref(),
            Some("expected boolean, found string")
        );
        assert_eq!(FieldType::Integer.check(&json!(3)), None);
        assert_eq!(
            FieldType::Integer.check(&json!(3.5)).as_deref(),
            Some("expected integer, found float")
        );
        assert_eq!(FieldType::Sequence.check(&json!([])), None);
        assert_eq!(FieldType::Date.check(&json!("2025-08-24")), None);
        assert!(
            FieldType::Date
                .check(&json!("soon"))
                .unwrap()
                .starts_with("invalid date `soon`")
        );
        assert_eq!(
            FieldType::Date.check(&json!(20250824)).as_deref(),
            Some("expected date, found integer")
        );
    }

    #[test]
    fn test_overrides_merge() {
        let overrides = BTreeMap::from([
            ("weight".to_string(), FieldType::Integer),
            ("tags".to_string(), FieldType::String),
        ]);
        let schema = Schema::with_overrides(&overrides);
        assert_eq!(schema.get("weight"), Some(FieldType::Integer));
        assert_eq!(schema.get("tags"), Some(FieldType::String));
        assert_eq!(schema.get("draft"), Some(FieldType::Boolean));
        assert_eq!(schema.get("unknown"), None);
    }
}
