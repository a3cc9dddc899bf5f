//! `[validate]` section configuration.
//!
//! Front matter rules applied before content changes may trigger a build.
//!
//! # Example
//!
//! ```toml
//! [validate]
//! locales = ["en", "es"]      # content/<locale>/... must declare a matching lang
//!
//! [validate.fields]           # Merged over the built-in schema
//! weight = "integer"
//! featured = "boolean"
//! series = "sequence"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frontmatter::FieldType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    /// Locale subtree names directly below the content directory.
    pub locales: Vec<String>,

    /// Declared field types, overriding or extending the built-in schema.
    pub fields: BTreeMap<String, FieldType>,
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;
    use crate::frontmatter::FieldType;

    #[test]
    fn test_validate_defaults() {
        let config = test_parse_config("");
        assert!(config.validate.locales.is_empty());
        assert!(config.validate.fields.is_empty());
    }

    #[test]
    fn test_validate_fields() {
        let config = test_parse_config(
            "[validate]\nlocales = [\"en\", \"es\"]\n\n[validate.fields]\nfeatured = \"boolean\"\nseries = \"sequence\"\nweight = \"integer\"",
        );
        assert_eq!(config.validate.locales, vec!["en", "es"]);
        assert_eq!(
            config.validate.fields.get("featured"),
            Some(&FieldType::Boolean)
        );
        assert_eq!(
            config.validate.fields.get("series"),
            Some(&FieldType::Sequence)
        );
        assert_eq!(
            config.validate.fields.get("weight"),
            Some(&FieldType::Integer)
        );
    }
}
