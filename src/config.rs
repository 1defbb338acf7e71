//! Run configuration, loaded from YAML.
//!
//! ```yaml
//! tile_size: 512
//! object_size: { min: 10.0, max: 500.0 }
//! max_iou: 0.9
//! validation_threshold: "cccc"
//! cache_dir: .trapset-cache
//! pair_view_dim: 105
//! classes:
//!   - { name: insect, label: "#0000ff" }
//! ```
//!
//! Everything except `classes` has a default. A config is checked once with
//! [`PrepConfig::validate`]; a bad config aborts the run before any source is
//! read.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detection::SizeBand;
use crate::error::PrepError;
use crate::ir::{ClassEntry, Palette};
use crate::split::SplitThreshold;

pub const DEFAULT_TILE_SIZE: u32 = 512;
pub const DEFAULT_MAX_IOU: f64 = 0.9;
pub const DEFAULT_PAIR_VIEW_DIM: u32 = 105;
pub const DEFAULT_VALIDATION_FRACTION: f64 = 0.2;
pub const DEFAULT_CACHE_DIR: &str = ".trapset-cache";

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

fn default_max_iou() -> f64 {
    DEFAULT_MAX_IOU
}

fn default_pair_view_dim() -> u32 {
    DEFAULT_PAIR_VIEW_DIM
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepConfig {
    /// Fixed model input size `S` used by the tiler.
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    /// Accepted rotated-rectangle widths, `[min, max)`.
    #[serde(default)]
    pub object_size: SizeBand,
    /// IOU ceiling above which non-identity pairs are discarded.
    #[serde(default = "default_max_iou")]
    pub max_iou: f64,
    /// Explicit hex threshold; mutually exclusive with `validation_fraction`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_threshold: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_fraction: Option<f64>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Side of the square object views attached to pair candidates.
    #[serde(default = "default_pair_view_dim")]
    pub pair_view_dim: u32,
    pub classes: Vec<ClassEntry>,
}

impl PrepConfig {
    /// Reads and validates a YAML config file.
    ///
    /// A relative `cache_dir` is resolved against the config file's
    /// directory.
    ///
    /// # Errors
    /// [`PrepError::ConfigParse`] for malformed YAML,
    /// [`PrepError::InvalidConfig`] for values that fail validation.
    pub fn load(path: &Path) -> Result<Self, PrepError> {
        let text = fs::read_to_string(path).map_err(PrepError::Io)?;
        let mut config: PrepConfig =
            serde_yaml::from_str(&text).map_err(|source| PrepError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        if config.cache_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.cache_dir = parent.join(&config.cache_dir);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PrepError> {
        let config: PrepConfig =
            serde_yaml::from_str(yaml).map_err(|source| PrepError::ConfigParse {
                path: PathBuf::from("<string>"),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// A config with default settings and the given classes.
    pub fn with_classes(classes: Vec<ClassEntry>) -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            object_size: SizeBand::default(),
            max_iou: DEFAULT_MAX_IOU,
            validation_threshold: None,
            validation_fraction: None,
            cache_dir: default_cache_dir(),
            pair_view_dim: DEFAULT_PAIR_VIEW_DIM,
            classes,
        }
    }

    /// Checks every value, including the class table.
    pub fn validate(&self) -> Result<(), PrepError> {
        let invalid = |msg: String| Err(PrepError::InvalidConfig(msg));

        if self.tile_size == 0 {
            return invalid("tile_size must be positive".into());
        }
        if self.pair_view_dim == 0 {
            return invalid("pair_view_dim must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.max_iou) {
            return invalid(format!("max_iou {} is not within [0, 1]", self.max_iou));
        }
        self.object_size.validate()?;
        if self.validation_threshold.is_some() && self.validation_fraction.is_some() {
            return invalid(
                "set either validation_threshold or validation_fraction, not both".into(),
            );
        }
        self.split_threshold()?;
        self.palette()?;
        Ok(())
    }

    pub fn palette(&self) -> Result<Palette, PrepError> {
        Palette::new(&self.classes)
    }

    /// The partition threshold, defaulting to a
    /// [`DEFAULT_VALIDATION_FRACTION`] split.
    pub fn split_threshold(&self) -> Result<SplitThreshold, PrepError> {
        match (&self.validation_threshold, self.validation_fraction) {
            (Some(hex), _) => SplitThreshold::new(hex),
            (None, Some(fraction)) => SplitThreshold::from_validation_fraction(fraction),
            (None, None) => SplitThreshold::from_validation_fraction(DEFAULT_VALIDATION_FRACTION),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r##"
tile_size: 256
object_size: { min: 10.0, max: 500.0 }
validation_threshold: "CCCC"
classes:
  - { name: insect, label: "#0000ff" }
  - { name: dirt, label: "#ff0000" }
"##;

    #[test]
    fn parses_with_defaults() {
        let config = PrepConfig::from_yaml_str(YAML).expect("valid config");
        assert_eq!(config.tile_size, 256);
        assert_eq!(config.max_iou, DEFAULT_MAX_IOU);
        assert_eq!(config.pair_view_dim, DEFAULT_PAIR_VIEW_DIM);
        assert_eq!(config.split_threshold().unwrap().as_str(), "cccc");
        assert_eq!(config.palette().unwrap().len(), 2);
        assert!(config.object_size.contains(10.0));
        assert!(!config.object_size.contains(500.0));
    }

    #[test]
    fn both_threshold_forms_are_rejected() {
        let yaml = format!("{YAML}validation_fraction: 0.1\n");
        assert!(matches!(
            PrepConfig::from_yaml_str(&yaml),
            Err(PrepError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_fields_are_parse_errors() {
        let yaml = format!("{YAML}tile_sise: 3\n");
        assert!(matches!(
            PrepConfig::from_yaml_str(&yaml),
            Err(PrepError::ConfigParse { .. })
        ));
    }

    #[test]
    fn bad_values_are_rejected() {
        for bad in [
            "tile_size: 0",
            "max_iou: 1.5",
            "object_size: { min: 5.0, max: 5.0 }",
            "validation_threshold: \"zz\"",
        ] {
            let yaml = format!("{bad}\nclasses: [{{ name: a, label: b }}]\n");
            assert!(PrepConfig::from_yaml_str(&yaml).is_err(), "{bad}");
        }
    }

    #[test]
    fn classes_are_required() {
        assert!(PrepConfig::from_yaml_str("tile_size: 4\n").is_err());
        assert!(PrepConfig::from_yaml_str("classes: []\n").is_err());
    }

    #[test]
    fn default_split_is_a_fifth_validation() {
        let config = PrepConfig::with_classes(vec![ClassEntry {
            name: "insect".into(),
            label: "#0000ff".into(),
        }]);
        config.validate().unwrap();
        assert_eq!(config.split_threshold().unwrap().as_str(), "ccccccccccccd000");
    }

    #[test]
    fn load_resolves_cache_dir_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trapset.yaml");
        fs::write(&path, YAML).unwrap();
        let config = PrepConfig::load(&path).unwrap();
        assert_eq!(config.cache_dir, dir.path().join(DEFAULT_CACHE_DIR));
    }
}
