use std::path::PathBuf;
use thiserror::Error;

/// The main error type for trapset operations.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read source {path}: {message}")]
    SourceRead { path: PathBuf, message: String },

    #[error("Failed to parse SVG {path}: {message}")]
    SvgParse { path: PathBuf, message: String },

    #[error("Label '{label}' is not in the palette")]
    LabelMapping { label: String },

    #[error("Corrupt cache entry {path}: {message} (delete the cache directory to recover)")]
    CacheCorruption { path: PathBuf, message: String },

    #[error("Cache directory {path} is not usable: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image for {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Cannot pad {width}x{height} image into a {target}x{target} square")]
    PadTooLarge { width: u32, height: u32, target: u32 },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse records {path}: {source}")]
    RecordsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write output {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PrepError {
    /// Returns true for errors that only concern a single source record.
    ///
    /// The pipeline logs these and moves on; everything else aborts the run.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            PrepError::SourceRead { .. } | PrepError::SvgParse { .. } | PrepError::ImageDecode { .. }
        )
    }
}
