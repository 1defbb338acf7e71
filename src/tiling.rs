//! Splitting oversized validation images into model-sized tiles.
//!
//! An image of `W x H` is padded to a multiple of the tile size `S` on each
//! axis and cut into a row-major grid of `S x S` windows:
//!
//! - `rows = 1 + floor(H / S)`, `cols = 1 + floor(W / S)`;
//! - vertical padding `S - H mod S` split as `top = ceil(p / 2)`,
//!   `bottom = floor(p / 2)`; horizontal likewise.
//!
//! The same padding applies to every tile of an image. When a dimension is
//! an exact multiple of `S`, the grid has one trailing window of pure
//! padding on that axis; consumers filter it out.
//!
//! Objects are shifted into padded coordinates but not cropped to a window.

use crate::geometry::Translate;
use crate::ir::{DetectionRecord, Padding, TileDescriptor};

/// Grid layout for one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    pub rows: u32,
    pub cols: u32,
    pub tile_size: u32,
    pub padding: Padding,
}

impl TileGrid {
    /// Lays out the grid for a `width x height` image.
    ///
    /// # Panics
    /// Panics if `tile_size` is zero; configs are validated before use.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        assert!(tile_size > 0, "tile size must be positive");
        let split = |dim: u32| {
            let pad = tile_size - dim % tile_size;
            (pad.div_ceil(2), pad / 2)
        };
        let (top, bottom) = split(height);
        let (left, right) = split(width);
        Self {
            rows: 1 + height / tile_size,
            cols: 1 + width / tile_size,
            tile_size,
            padding: Padding {
                top,
                bottom,
                left,
                right,
            },
        }
    }

    pub fn len(&self) -> usize {
        (self.rows * self.cols) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tile descriptors in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = TileDescriptor> + '_ {
        (0..self.rows).flat_map(move |row| {
            (0..self.cols).map(move |col| TileDescriptor {
                origin_x: col * self.tile_size,
                origin_y: row * self.tile_size,
                crop_width: self.tile_size,
                crop_height: self.tile_size,
                padding: self.padding,
            })
        })
    }
}

/// Whether a record is larger than the model input on either axis.
pub fn needs_tiling(record: &DetectionRecord, tile_size: u32) -> bool {
    record.height > tile_size || record.width > tile_size
}

/// Emits one record per tile, each with a copy of the parent's objects
/// shifted by the padding offsets.
pub fn tile_record(record: &DetectionRecord, tile_size: u32) -> Vec<DetectionRecord> {
    let grid = TileGrid::new(record.width, record.height, tile_size);
    let dx = f64::from(grid.padding.left);
    let dy = f64::from(grid.padding.top);
    let shifted: Vec<_> = record
        .annotations
        .iter()
        .map(|o| o.translated(dx, dy))
        .collect();

    grid.tiles()
        .map(|tile| DetectionRecord {
            annotations: shifted.clone(),
            tile: Some(tile),
            ..record.clone()
        })
        .collect()
}

/// Tiles the oversized records of a validation set; smaller ones pass
/// through unchanged. Input order is preserved.
pub fn tile_validation(records: Vec<DetectionRecord>, tile_size: u32) -> Vec<DetectionRecord> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if needs_tiling(&record, tile_size) {
            let tiles = tile_record(&record, tile_size);
            log::debug!("{}: {} tiles", record.image_id, tiles.len());
            out.extend(tiles);
        } else {
            out.push(record);
        }
    }
    out
}
