//! Data model shared by every stage of the preparation pipeline.
//!
//! Sources enter as [`SourceRecord`]s (parsed by [`io_svg`]) and leave as
//! [`DetectionRecord`]s (written by [`io_json`]). Coordinates are absolute
//! pixels in the source raster throughout; boxes use the `XYWH_ABS`
//! convention.
//!
//! # Example
//!
//! ```
//! use trapset::ir::{Annotation, Point, Polygon};
//!
//! let square = Polygon::new(vec![
//!     Point::new(0.0, 0.0),
//!     Point::new(10.0, 0.0),
//!     Point::new(10.0, 10.0),
//!     Point::new(0.0, 10.0),
//! ]);
//! let ann = Annotation::from_polygon(square, "#0000ff");
//! assert_eq!(ann.bbox.to_array(), [0.0, 0.0, 10.0, 10.0]);
//! ```

mod ids;
pub mod io_json;
pub mod io_svg;
mod model;
mod palette;
mod shape;

pub use ids::{CategoryId, Digest};
pub use model::{
    Annotation, BoxMode, DetectionObject, DetectionRecord, Padding, RasterSource, SourceRecord,
    TileDescriptor,
};
pub use palette::{ClassEntry, Palette};
pub use shape::{BBox, Point, Polygon};
