//! Product schemas
//!
//! A [`Schema`] is the set of field names a product's records carry. Formula
//! validation checks field references against it, and a small alias table
//! lets either name of a well-known pair be used interchangeably.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::FieldValue;
use ahash::{AHashMap, AHashSet};

/// Built-in field aliases (both directions are accepted)
pub const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("amount", "outstanding_balance"),
    ("probability_of_default", "pd"),
    ("loss_given_default", "lgd"),
    ("exposure_at_default", "ead"),
];

/// Known field names of a product, plus aliases
#[derive(Debug, Clone)]
pub struct Schema {
    fields: AHashSet<String>,
    aliases: AHashMap<String, Vec<String>>,
}

impl Default for Schema {
    fn default() -> Self {
        let mut schema = Self {
            fields: AHashSet::new(),
            aliases: AHashMap::new(),
        };
        for (a, b) in BUILTIN_ALIASES {
            schema.add_alias(a, b);
        }
        schema
    }
}

impl Schema {
    /// Create an empty schema with the built-in aliases
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema from a list of field names
    ///
    /// ```rust
    /// use metrica_core::Schema;
    ///
    /// let schema = Schema::from_fields(["amount", "status"]).unwrap();
    /// assert!(schema.contains("amount"));
    /// assert!(schema.contains("outstanding_balance"));
    /// ```
    pub fn from_fields<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut schema = Self::new();
        for field in fields {
            schema.add_field(field.as_ref())?;
        }
        Ok(schema)
    }

    /// Add a field name
    pub fn add_field(&mut self, name: &str) -> Result<()> {
        if !is_valid_field_name(name) {
            return Err(Error::InvalidFieldName(name.to_string()));
        }
        if !self.fields.insert(name.to_string()) {
            return Err(Error::DuplicateField(name.to_string()));
        }
        Ok(())
    }

    /// Register an alias pair (both directions)
    pub fn add_alias(&mut self, a: &str, b: &str) {
        self.aliases
            .entry(a.to_string())
            .or_default()
            .push(b.to_string());
        self.aliases
            .entry(b.to_string())
            .or_default()
            .push(a.to_string());
    }

    /// Names that stand in for `name`
    pub fn aliases_of(&self, name: &str) -> &[String] {
        self.aliases.get(name).map_or(&[], Vec::as_slice)
    }

    /// Check whether `name` (or one of its aliases) is a known field
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains(name)
            || self
                .aliases_of(name)
                .iter()
                .any(|alias| self.fields.contains(alias))
    }

    /// Look a field up in a record, falling back to its aliases
    pub fn lookup<'r>(&self, record: &'r Record, name: &str) -> Option<&'r FieldValue> {
        record.get(name).or_else(|| {
            self.aliases_of(name)
                .iter()
                .find_map(|alias| record.get(alias))
        })
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if no fields are declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared field names, sorted
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Field names are identifiers: a letter or `_`, then letters, digits or `_`
pub fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_schema_contains() {
        let schema = Schema::from_fields(["amount", "status", "pd"]).unwrap();
        assert!(schema.contains("amount"));
        assert!(schema.contains("status"));
        assert!(!schema.contains("balance"));
    }

    #[test]
    fn test_builtin_aliases() {
        let schema = Schema::from_fields(["outstanding_balance", "pd"]).unwrap();
        assert!(schema.contains("amount"));
        assert!(schema.contains("probability_of_default"));
        assert!(!schema.contains("lgd"));
    }

    #[test]
    fn test_custom_alias() {
        let mut schema = Schema::from_fields(["interest_rate"]).unwrap();
        schema.add_alias("rate", "interest_rate");
        assert!(schema.contains("rate"));
    }

    #[test]
    fn test_invalid_field_names() {
        assert!(matches!(
            Schema::from_fields(["1st"]),
            Err(Error::InvalidFieldName(_))
        ));
        assert!(matches!(
            Schema::from_fields(["a-b"]),
            Err(Error::InvalidFieldName(_))
        ));
        assert!(matches!(
            Schema::from_fields([""]),
            Err(Error::InvalidFieldName(_))
        ));
        assert!(matches!(
            Schema::from_fields(["a", "a"]),
            Err(Error::DuplicateField(_))
        ));
    }

    #[test]
    fn test_lookup_through_alias() {
        let schema = Schema::new();
        let record = Record::new().with("outstanding_balance", 250.0);
        assert_eq!(
            schema.lookup(&record, "amount"),
            Some(&FieldValue::Number(250.0))
        );
        assert_eq!(schema.lookup(&record, "status"), None);
    }

    #[test]
    fn test_field_names_sorted() {
        let schema = Schema::from_fields(["b", "a", "c"]).unwrap();
        assert_eq!(schema.field_names(), vec!["a", "b", "c"]);
    }
}
