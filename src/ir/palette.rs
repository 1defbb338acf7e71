//! Label → category id mapping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{CategoryId, Digest};
use crate::error::PrepError;
use crate::hash::digest_parts;

/// One configured class: a human-readable name and the raw label that
/// annotation shapes carry for it (typically a stroke colour).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub name: String,
    pub label: String,
}

/// A validated, injective mapping from raw annotation labels to category ids.
///
/// Built once from configuration. Ids follow configuration order starting at
/// zero, so `names()[id]` is the class name for `id`.
#[derive(Clone, Debug)]
pub struct Palette {
    by_label: BTreeMap<String, CategoryId>,
    names: Vec<String>,
}

impl Palette {
    /// Builds a palette, rejecting empty, duplicated or blank entries.
    pub fn new(entries: &[ClassEntry]) -> Result<Self, PrepError> {
        if entries.is_empty() {
            return Err(PrepError::InvalidConfig(
                "at least one class must be configured".to_string(),
            ));
        }

        let mut by_label = BTreeMap::new();
        let mut names = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let label = normalize_label(&entry.label);
            let name = entry.name.trim();
            if label.is_empty() || name.is_empty() {
                return Err(PrepError::InvalidConfig(format!(
                    "class #{idx} has an empty name or label"
                )));
            }
            if names.iter().any(|n| n == name) {
                return Err(PrepError::InvalidConfig(format!(
                    "duplicate class name '{name}'"
                )));
            }
            let id = CategoryId::new(idx as u32);
            if by_label.insert(label.clone(), id).is_some() {
                return Err(PrepError::InvalidConfig(format!(
                    "label '{label}' is mapped to more than one class"
                )));
            }
            names.push(name.to_string());
        }

        Ok(Self { by_label, names })
    }

    /// Resolves a raw label.
    ///
    /// # Errors
    /// Returns [`PrepError::LabelMapping`] when the label is not configured.
    pub fn category_id(&self, label: &str) -> Result<CategoryId, PrepError> {
        self.by_label
            .get(&normalize_label(label))
            .copied()
            .ok_or_else(|| PrepError::LabelMapping {
                label: label.to_string(),
            })
    }

    /// Class names indexed by category id.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Digest of the label table, folded into cache keys so that editing the
    /// class table invalidates previously extracted object lists.
    pub fn fingerprint(&self) -> Digest {
        let ids: Vec<[u8; 4]> = self
            .by_label
            .values()
            .map(|id| id.as_u32().to_le_bytes())
            .collect();
        digest_parts(
            self.by_label
                .keys()
                .zip(&ids)
                .flat_map(|(label, id)| [label.as_bytes(), id.as_slice()]),
        )
    }
}

/// Labels compare case-insensitively with surrounding whitespace ignored, so
/// `#0000FF` in a drawing matches `#0000ff` in the config.
pub(crate) fn normalize_label(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}
