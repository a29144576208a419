//! The attribute namespace: which attribute carries path fragments.

use std::fmt;

use crate::error::ReadoutError;

/// Attribute used when no override is configured.
pub const DEFAULT_ATTRIBUTE: &str = "data-readout-src";

/// A validated attribute name.
///
/// Names are stored lower-cased because the HTML parser lower-cases attribute
/// names, so `data-Readout-Src` in configuration must still match markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    /// Validate and normalise an attribute name.
    ///
    /// Accepts `[A-Za-z_:][A-Za-z0-9_:.-]*`.
    pub fn new(name: &str) -> Result<Self, ReadoutError> {
        let mut chars = name.chars();
        let valid_first = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
            .unwrap_or(false);
        let valid_rest =
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-'));
        if !valid_first || !valid_rest {
            return Err(ReadoutError::InvalidNamespace(name.to_owned()));
        }
        Ok(Self(name.to_ascii_lowercase()))
    }

    /// Use `name` when given, otherwise [`DEFAULT_ATTRIBUTE`].
    pub fn from_override(name: Option<&str>) -> Result<Self, ReadoutError> {
        match name {
            Some(n) => Self::new(n),
            None => Ok(Self::default()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Attribute-presence selector text, e.g. `[data-readout-src]`.
    pub fn selector(&self) -> String {
        format!("[{}]", self.0)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_ATTRIBUTE.to_owned())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
