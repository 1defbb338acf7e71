//! Newtype identifiers: content digests and category ids.
//!
//! Using newtypes prevents accidentally mixing up a digest with an arbitrary
//! string (e.g. a file name) or a category id with a track index.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PrepError;

/// A content digest rendered as lowercase hexadecimal.
///
/// Ordering is lexicographic over the hex string, which is what the corpus
/// partitioner compares against its threshold.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Parses a hex string, normalising it to lowercase.
    ///
    /// # Errors
    /// Returns [`PrepError::InvalidConfig`] if the string is empty or contains
    /// non-hex characters.
    pub fn from_hex(hex: &str) -> Result<Self, PrepError> {
        let hex = hex.trim();
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PrepError::InvalidConfig(format!(
                "'{hex}' is not a hexadecimal digest"
            )));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    #[inline]
    pub(crate) fn from_hex_unchecked(hex: String) -> Self {
        Self(hex)
    }

    /// Returns the hex string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first `n` characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A numeric category id assigned by the [`Palette`](super::Palette).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u32);

impl CategoryId {
    /// Creates a new CategoryId.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying u32 value.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CategoryId({})", self.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CategoryId {
    fn from(id: u32) -> Self {
        CategoryId::new(id)
    }
}
