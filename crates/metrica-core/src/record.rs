//! Records and record sets
//!
//! A [`Record`] is one row of tabular data: field name → [`FieldValue`].
//! [`RecordInput`] is what an evaluation runs against, either a single record
//! (scalar field references resolve against it) or an ordered list of records
//! (aggregate functions run over all of them).

use crate::value::FieldValue;
use ahash::AHashMap;
use std::slice;

/// One row of data keyed by field name
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Record {
    fields: AHashMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    ///
    /// ```rust
    /// use metrica_core::Record;
    ///
    /// let record = Record::new().with("amount", 120.0).with("status", "active");
    /// assert_eq!(record.len(), 2);
    /// ```
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a field, returning the previous value if there was one
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.fields.insert(field.into(), value.into())
    }

    /// Get a field value (None when the field is absent)
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Check whether the field is present (it may still hold null)
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over (field, value) pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Data an evaluation runs against
///
/// Decided once by the caller: a formula over a single record resolves bare
/// field references against it, a formula over a list only makes sense
/// through aggregate functions.
#[derive(Debug, Clone, Copy)]
pub enum RecordInput<'a> {
    /// One record
    Single(&'a Record),
    /// An ordered list of records
    Many(&'a [Record]),
}

impl<'a> RecordInput<'a> {
    /// Records an aggregate runs over (a single record is a one-element list)
    pub fn records(&self) -> &'a [Record] {
        match *self {
            RecordInput::Single(record) => slice::from_ref(record),
            RecordInput::Many(records) => records,
        }
    }

    /// The ambient record for bare field references, if there is one
    pub fn record(&self) -> Option<&'a Record> {
        match *self {
            RecordInput::Single(record) => Some(record),
            RecordInput::Many(_) => None,
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Check if there are no records
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl<'a> From<&'a Record> for RecordInput<'a> {
    fn from(record: &'a Record) -> Self {
        RecordInput::Single(record)
    }
}

impl<'a> From<&'a [Record]> for RecordInput<'a> {
    fn from(records: &'a [Record]) -> Self {
        RecordInput::Many(records)
    }
}

impl<'a> From<&'a Vec<Record>> for RecordInput<'a> {
    fn from(records: &'a Vec<Record>) -> Self {
        RecordInput::Many(records.as_slice())
    }
}

impl<'a, const N: usize> From<&'a [Record; N]> for RecordInput<'a> {
    fn from(records: &'a [Record; N]) -> Self {
        RecordInput::Many(records.as_slice())
    }
}
