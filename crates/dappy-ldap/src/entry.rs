//! Directory entries returned by user lookups.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A directory entry: its distinguished name and the attributes the search returned.
///
/// Entries are handed to the caller and never retained by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserve server order).
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
    /// Attributes with at least one value that is not valid UTF-8, such as `objectGUID`,
    /// `objectSid` or `jpegPhoto`.
    #[serde(default)]
    pub binary_attributes: HashMap<String, Vec<Vec<u8>>>,
}

impl DirectoryEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Self::default()
        }
    }

    /// Adds values for an attribute, appending to any already present.
    #[must_use]
    pub fn with_attribute<I, S>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .entry(attribute.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Adds raw values for a binary attribute, appending to any already present.
    #[must_use]
    pub fn with_binary_attribute<I>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        self.binary_attributes
            .entry(attribute.into())
            .or_default()
            .extend(values);
        self
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute.
    ///
    /// Attribute names are matched case-insensitively, as directories treat them.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }

    /// Returns the raw values of a binary attribute, matched case-insensitively.
    #[must_use]
    pub fn binary_values(&self, attribute: &str) -> Option<&[Vec<u8>]> {
        self.binary_attributes
            .get(attribute)
            .or_else(|| {
                self.binary_attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }

    /// Names of text and binary attributes in sorted order.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .attributes
            .keys()
            .chain(self.binary_attributes.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Multi-line listing: the DN followed by each attribute with its values, indented.
///
/// Binary values are shown by size.
impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DN: {}", self.dn)?;
        for name in self.attribute_names() {
            let mut values: Vec<String> = self.attributes.get(name).cloned().unwrap_or_default();
            if let Some(binary) = self.binary_attributes.get(name) {
                values.extend(binary.iter().map(|value| format!("<{} bytes>", value.len())));
            }
            write!(f, "\n  {name}: [{}]", values.join(", "))?;
        }
        Ok(())
    }
}
