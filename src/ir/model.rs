//! Core data model for the preparation pipeline.
//!
//! [`SourceRecord`]s are what the SVG reader yields: one annotated image,
//! immutable once parsed. [`DetectionRecord`]s are what the pipeline hands to
//! the training collaborator: plain, serializable structures with no ties to
//! this crate's internals.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::ids::{CategoryId, Digest};
use super::shape::{BBox, Polygon};
use crate::error::PrepError;

/// Where the raster behind an annotated source lives.
#[derive(Clone, Debug, PartialEq)]
pub enum RasterSource {
    /// Image bytes embedded in the source as a data URI.
    Embedded { mime: String, bytes: Vec<u8> },
    /// Image file referenced by the source, resolved against its directory.
    Linked(PathBuf),
}

impl RasterSource {
    /// Returns the encoded image bytes.
    pub fn load_bytes(&self) -> Result<Vec<u8>, PrepError> {
        match self {
            RasterSource::Embedded { bytes, .. } => Ok(bytes.clone()),
            RasterSource::Linked(path) => {
                std::fs::read(path).map_err(|e| PrepError::SourceRead {
                    path: path.clone(),
                    message: format!("linked raster: {e}"),
                })
            }
        }
    }
}

/// One labelled object inside a [`SourceRecord`].
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Axis-aligned bounds of `polygon`.
    pub bbox: BBox,
    /// Object contour in source pixel coordinates.
    pub polygon: Polygon,
    /// Raw label as drawn (colour or explicit label attribute).
    pub label: String,
    /// Longer side of the minimum-area rotated rectangle around `polygon`.
    pub rot_rect_width: f64,
    /// Track key linking this object across the frames of a session.
    pub track: Option<String>,
}

impl Annotation {
    /// Builds an annotation from a contour, deriving bbox and rotated width.
    pub fn from_polygon(polygon: Polygon, label: impl Into<String>) -> Self {
        let bbox = polygon.bbox();
        let rot_rect_width = crate::geometry::rot_rect_width(&polygon);
        Self {
            bbox,
            polygon,
            label: label.into(),
            rot_rect_width,
            track: None,
        }
    }

    /// Sets the track key.
    pub fn with_track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }

    /// Polygon area (zero for degenerate contours).
    pub fn area(&self) -> f64 {
        crate::geometry::polygon_area(&self.polygon)
    }
}

/// One annotated image.
#[derive(Clone, Debug)]
pub struct SourceRecord {
    /// Path of the source file.
    pub path: PathBuf,
    /// Digest of the source file's bytes.
    pub digest: Digest,
    /// Declared width in pixels.
    pub width: u32,
    /// Declared height in pixels.
    pub height: u32,
    /// Objects in document order.
    pub annotations: Vec<Annotation>,
    /// Raster payload.
    pub raster: RasterSource,
}

impl SourceRecord {
    /// File stem of the source, used as a human-readable image id.
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Bounding-box convention of a [`DetectionObject`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoxMode {
    /// `[x, y, w, h]` in absolute pixels.
    #[default]
    XywhAbs,
}

/// One object in a [`DetectionRecord`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionObject {
    pub bbox: [f64; 4],
    pub bbox_mode: BoxMode,
    /// Polygon masks, each flattened to `[x0, y0, x1, y1, ...]`.
    pub segmentation: Vec<Vec<f64>>,
    pub category_id: CategoryId,
    pub iscrowd: u8,
}

impl DetectionObject {
    /// Builds an object from an annotation whose category is resolved.
    pub fn new(bbox: BBox, polygon: &Polygon, category_id: CategoryId) -> Self {
        Self {
            bbox: bbox.to_array(),
            bbox_mode: BoxMode::XywhAbs,
            segmentation: vec![polygon.flatten()],
            category_id,
            iscrowd: 0,
        }
    }
}

/// Per-side padding, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Padding {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

/// A fixed-size window into a padded oversized image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDescriptor {
    /// Origin of the crop in the padded image.
    pub origin_x: u32,
    pub origin_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub padding: Padding,
}

/// A training/inference-ready record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Path of the rasterized image artifact.
    pub file_name: PathBuf,
    pub height: u32,
    pub width: u32,
    /// Human-readable identifier (source file stem).
    pub image_id: String,
    /// Digest of the rasterized image artifact.
    pub digest: Digest,
    /// Path of the annotated source the record was derived from.
    pub original_source: PathBuf,
    pub annotations: Vec<DetectionObject>,
    /// Set on records produced by the tiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile: Option<TileDescriptor>,
}
