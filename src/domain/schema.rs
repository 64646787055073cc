//! Sensitive-field schemas: published mappings from category labels to codes.
//!
//! Every ciphertext is tagged with the schema version it was encoded under,
//! so codes must stay stable once a version is published. A SHA-256 digest of
//! the canonical code table pins each version against silent renumbering.

use serde::{Deserialize, Serialize};

/// Error type for encoding operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    // The rejected label is deliberately not echoed: category labels are
    // sensitive values and must not reach error messages or logs.
    #[error("Unknown category for field '{field}'")]
    UnknownCategory { field: String },

    #[error("Unknown sensitive field '{0}'")]
    UnknownField(String),
}

/// One selectable category of a sensitive field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub code: u8,
}

/// A versioned mapping from category labels to fixed numeric codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name as it appears on the application form.
    pub field: String,

    /// Published schema version this code table belongs to.
    pub version: u32,

    categories: Vec<Category>,
}

impl FieldSchema {
    /// Create a schema from an ordered list of `(label, code)` pairs.
    #[must_use]
    pub fn new(field: impl Into<String>, version: u32, categories: &[(&str, u8)]) -> Self {
        Self {
            field: field.into(),
            version,
            categories: categories
                .iter()
                .map(|(label, code)| Category {
                    label: (*label).to_string(),
                    code: *code,
                })
                .collect(),
        }
    }

    /// Map a category label to its fixed numeric code.
    ///
    /// Matching is case-insensitive on ASCII and ignores surrounding
    /// whitespace, so form values like `"Female "` encode cleanly.
    ///
    /// # Errors
    /// Returns `SchemaError::UnknownCategory` if the label is not in the
    /// published table. The error names the field, never the label.
    pub fn encode(&self, label: &str) -> Result<u8, SchemaError> {
        let wanted = label.trim();
        self.categories
            .iter()
            .find(|c| c.label.eq_ignore_ascii_case(wanted))
            .map(|c| c.code)
            .ok_or_else(|| SchemaError::UnknownCategory {
                field: self.field.clone(),
            })
    }

    /// The published categories, in form order.
    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// SHA-256 digest of the canonical code table.
    ///
    /// Two schemas with the same digest encode identically; a changed digest
    /// under an unchanged version number means someone renumbered a published
    /// table, which is a release error.
    #[must_use]
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.field.as_bytes());
        hasher.update(self.version.to_le_bytes());
        for c in &self.categories {
            hasher.update(c.label.as_bytes());
            hasher.update([c.code]);
        }
        let result = hasher.finalize();

        result
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>()
    }
}

/// Current published schema version.
pub const SCHEMA_VERSION_V1: u32 = 1;

/// The set of sensitive fields collected by the application form.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: u32,
    fields: Vec<FieldSchema>,
}

impl SchemaRegistry {
    /// The published v1 registry: gender and ethnicity, with the code tables
    /// the application form was released with.
    #[must_use]
    pub fn published() -> Self {
        Self {
            version: SCHEMA_VERSION_V1,
            fields: vec![
                FieldSchema::new(
                    "gender",
                    SCHEMA_VERSION_V1,
                    &[("male", 0), ("female", 1), ("nonbinary", 2), ("other", 3)],
                ),
                FieldSchema::new(
                    "ethnicity",
                    SCHEMA_VERSION_V1,
                    &[
                        ("white", 0),
                        ("black", 1),
                        ("brown", 2),
                        ("asian", 3),
                        ("indigenous", 4),
                        ("other", 5),
                    ],
                ),
            ],
        }
    }

    /// Registry version shared by all contained field schemas.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// All field schemas, in form order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Look up a field schema by name.
    ///
    /// # Errors
    /// Returns `SchemaError::UnknownField` for names not on the form.
    pub fn field(&self, name: &str) -> Result<&FieldSchema, SchemaError> {
        self.fields
            .iter()
            .find(|f| f.field == name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_codes_are_stable() {
        // Stability pin: these codes shipped with v1 and must never change.
        let registry = SchemaRegistry::published();

        let gender = registry.field("gender").expect("gender schema");
        assert_eq!(gender.encode("male").expect("code"), 0);
        assert_eq!(gender.encode("female").expect("code"), 1);
        assert_eq!(gender.encode("nonbinary").expect("code"), 2);
        assert_eq!(gender.encode("other").expect("code"), 3);

        let ethnicity = registry.field("ethnicity").expect("ethnicity schema");
        assert_eq!(ethnicity.encode("white").expect("code"), 0);
        assert_eq!(ethnicity.encode("black").expect("code"), 1);
        assert_eq!(ethnicity.encode("brown").expect("code"), 2);
        assert_eq!(ethnicity.encode("asian").expect("code"), 3);
        assert_eq!(ethnicity.encode("indigenous").expect("code"), 4);
        assert_eq!(ethnicity.encode("other").expect("code"), 5);
    }

    #[test]
    fn test_encode_is_lenient_about_form_noise() {
        let registry = SchemaRegistry::published();
        let gender = registry.field("gender").expect("gender schema");
        assert_eq!(gender.encode(" Female ").expect("code"), 1);
    }

    #[test]
    fn test_unknown_category_does_not_echo_label() {
        let registry = SchemaRegistry::published();
        let gender = registry.field("gender").expect("gender schema");

        let err = gender.encode("attack-helicopter").expect_err("must fail");
        let msg = err.to_string();
        assert!(msg.contains("gender"));
        assert!(!msg.contains("attack-helicopter"));
    }

    #[test]
    fn test_unknown_field() {
        let registry = SchemaRegistry::published();
        assert!(matches!(
            registry.field("shoe_size"),
            Err(SchemaError::UnknownField(_))
        ));
    }

    #[test]
    fn test_digest_is_deterministic_and_version_sensitive() {
        let a = FieldSchema::new("gender", 1, &[("male", 0), ("female", 1)]);
        let b = FieldSchema::new("gender", 1, &[("male", 0), ("female", 1)]);
        let renumbered = FieldSchema::new("gender", 1, &[("male", 1), ("female", 0)]);
        let v2 = FieldSchema::new("gender", 2, &[("male", 0), ("female", 1)]);

        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), renumbered.digest());
        assert_ne!(a.digest(), v2.digest());
    }
}
