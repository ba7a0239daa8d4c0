//! Field names, values and the accumulated payload.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Type-safe field name wrapper.
///
/// ```
/// use ayumi_core::FieldName;
///
/// let name = FieldName::new("email");
/// assert_eq!(name.as_str(), "email");
///
/// let name: FieldName = "password".into();
/// assert_eq!(name, FieldName::new("password"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FieldName(String);

impl FieldName {
    /// Creates a new FieldName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the field name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FieldName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FieldName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for FieldName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A single collected value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Free text typed by the user.
    Text(String),
    /// A checkbox or toggle.
    Flag(bool),
}

impl FieldValue {
    /// Returns the text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Flag(_) => None,
        }
    }

    /// Returns the flag, if this is a boolean value.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            FieldValue::Text(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Flag(b)
    }
}

/// The partially filled data collected across a flow's steps.
///
/// Iteration order is sorted by field name so snapshots compare and
/// serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Payload {
    fields: BTreeMap<FieldName, FieldValue>,
}

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, name: impl Into<FieldName>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Returns the value for the given field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns the text value for the given field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// Returns the boolean value for the given field.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_flag)
    }

    /// Returns `true` if the field has a value.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Returns an iterator over all fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &FieldValue)> {
        self.fields.iter()
    }

    /// Returns the number of collected fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.fields.clear();
    }
}
