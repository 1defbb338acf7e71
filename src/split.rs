//! Deterministic train/validation partitioning.
//!
//! An item's partition is a pure function of its content digest and a
//! configured threshold: digests that sort strictly after the threshold go to
//! validation, everything else (ties included) to training. No manifest is
//! kept; adding files to a corpus never moves existing files between
//! partitions.

use std::fmt;

use serde::Serialize;

use crate::error::PrepError;
use crate::ir::{DetectionRecord, Digest, SourceRecord};

/// Which side of the split an item falls on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Validation,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Train => f.pad("train"),
            Partition::Validation => f.pad("validation"),
        }
    }
}

/// A lowercase hexadecimal threshold compared lexicographically to digests.
///
/// The threshold may be shorter than a digest; `"cccc"` sends every digest
/// starting with `cccc` or anything after it to validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitThreshold(String);

impl SplitThreshold {
    /// Validates a hex threshold.
    ///
    /// # Errors
    /// Returns [`PrepError::InvalidConfig`] when empty or not hexadecimal.
    pub fn new(hex: &str) -> Result<Self, PrepError> {
        let hex = hex.trim();
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PrepError::InvalidConfig(format!(
                "validation threshold '{hex}' is not a hexadecimal string"
            )));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// The threshold that sends (approximately) `fraction` of uniformly
    /// distributed digests to validation.
    ///
    /// `0.0` yields a threshold no digest exceeds; `1.0` one every digest
    /// exceeds. The result decreases monotonically as `fraction` grows.
    pub fn from_validation_fraction(fraction: f64) -> Result<Self, PrepError> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(PrepError::InvalidConfig(format!(
                "validation fraction {fraction} is not within [0, 1]"
            )));
        }
        if fraction == 0.0 {
            return Ok(Self("f".repeat(64)));
        }
        // 16 hex digits = the top 64 bits of the digest space.
        let scaled = (1.0 - fraction) * 2f64.powi(64);
        let position = if scaled >= u64::MAX as f64 {
            u64::MAX
        } else {
            scaled as u64
        };
        Ok(Self(format!("{position:016x}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SplitThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything carrying a content digest can be partitioned.
pub trait HasDigest {
    fn digest(&self) -> &Digest;
}

impl HasDigest for Digest {
    fn digest(&self) -> &Digest {
        self
    }
}

impl HasDigest for SourceRecord {
    fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl HasDigest for DetectionRecord {
    fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl<T: HasDigest + ?Sized> HasDigest for &T {
    fn digest(&self) -> &Digest {
        (**self).digest()
    }
}

/// Assigns one digest to a partition.
pub fn assign(digest: &Digest, threshold: &SplitThreshold) -> Partition {
    if digest.as_str() > threshold.as_str() {
        Partition::Validation
    } else {
        Partition::Train
    }
}

/// Items split by partition, each side in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct Partitioned<T> {
    pub train: Vec<T>,
    pub validation: Vec<T>,
}

impl<T> Default for Partitioned<T> {
    fn default() -> Self {
        Self {
            train: Vec::new(),
            validation: Vec::new(),
        }
    }
}

/// Splits a sequence of items by digest.
pub fn partition<T: HasDigest>(
    items: impl IntoIterator<Item = T>,
    threshold: &SplitThreshold,
) -> Partitioned<T> {
    let mut out = Partitioned::default();
    for item in items {
        match assign(item.digest(), threshold) {
            Partition::Train => out.train.push(item),
            Partition::Validation => out.validation.push(item),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(prefix: &str) -> Digest {
        Digest::from_hex(&format!("{prefix:0<64}")).unwrap()
    }

    #[test]
    fn strictly_greater_goes_to_validation() {
        let t = SplitThreshold::new("cccc").unwrap();
        assert_eq!(assign(&d("aaaa"), &t), Partition::Train);
        assert_eq!(assign(&d("dddd"), &t), Partition::Validation);
        // Same prefix and longer: sorts after the threshold.
        assert_eq!(assign(&d("cccc"), &t), Partition::Validation);
    }

    #[test]
    fn exact_tie_is_train() {
        let digest = d("cccc");
        let t = SplitThreshold::new(digest.as_str()).unwrap();
        assert_eq!(assign(&digest, &t), Partition::Train);
    }

    #[test]
    fn threshold_is_case_insensitive() {
        let t = SplitThreshold::new("CCCC").unwrap();
        assert_eq!(t.as_str(), "cccc");
        assert!(SplitThreshold::new("xyz").is_err());
        assert!(SplitThreshold::new("").is_err());
    }

    #[test]
    fn partition_preserves_order() {
        let t = SplitThreshold::new("8").unwrap();
        let items = vec![d("f1"), d("01"), d("f0"), d("02")];
        let split = partition(items.iter(), &t);
        assert_eq!(split.train, vec![&items[1], &items[3]]);
        assert_eq!(split.validation, vec![&items[0], &items[2]]);
    }

    #[test]
    fn fraction_extremes() {
        let none = SplitThreshold::from_validation_fraction(0.0).unwrap();
        let all = SplitThreshold::from_validation_fraction(1.0).unwrap();
        assert_eq!(assign(&d("ffff"), &none), Partition::Train);
        assert_eq!(assign(&d("0"), &all), Partition::Validation);
        assert!(SplitThreshold::from_validation_fraction(1.5).is_err());
        assert!(SplitThreshold::from_validation_fraction(f64::NAN).is_err());
    }

    #[test]
    fn fraction_threshold_is_monotone() {
        let mut last = SplitThreshold::from_validation_fraction(0.0).unwrap();
        for step in 1..=20 {
            let next = SplitThreshold::from_validation_fraction(step as f64 / 20.0).unwrap();
            assert!(next.as_str() <= last.as_str(), "{next} > {last}");
            last = next;
        }
    }

    #[test]
    fn fraction_quarter_splits_at_c() {
        let t = SplitThreshold::from_validation_fraction(0.25).unwrap();
        assert_eq!(t.as_str(), "c000000000000000");
    }
}
