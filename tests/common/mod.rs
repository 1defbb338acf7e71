#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use trapset::hash::digest_bytes;
use trapset::ir::io_svg::{to_session_svg_string, to_source_svg_string, FrameSpec};
use trapset::ir::{Annotation, Digest, Point, Polygon};

pub const INSECT: &str = "#0000ff";
pub const DIRT: &str = "#ff0000";

pub fn png_bytes(width: u32, height: u32, fill: [u8; 3]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_pixel(width, height, Rgb(fill))
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn rect(x: f64, y: f64, w: f64, h: f64, label: &str) -> Annotation {
    Annotation::from_polygon(
        Polygon::new(vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ]),
        label,
    )
}

/// Writes a source SVG embedding `raster`; returns its path.
pub fn write_source_svg(
    dir: &Path,
    name: &str,
    (width, height): (u32, u32),
    raster: &[u8],
    annotations: &[Annotation],
) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    let svg = to_source_svg_string(width, height, "image/png", raster, annotations);
    fs::write(&path, svg).expect("write svg");
    path
}

/// Writes a session SVG whose two frames share one raster.
pub fn write_session_svg(
    dir: &Path,
    name: &str,
    raster: &[u8],
    (width, height): (u32, u32),
    frame0: &[Annotation],
    frame1: &[Annotation],
) -> PathBuf {
    let f0 = FrameSpec {
        width,
        height,
        mime: "image/png",
        raster,
        annotations: frame0,
    };
    let f1 = FrameSpec {
        width,
        height,
        mime: "image/png",
        raster,
        annotations: frame1,
    };
    let path = dir.join(name);
    fs::write(&path, to_session_svg_string([&f0, &f1])).expect("write session svg");
    path
}

/// Writes a config with both classes; `extra` is appended verbatim.
pub fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("trapset.yaml");
    let yaml = format!(
        "cache_dir: cache\nclasses:\n  - {{ name: insect, label: \"{INSECT}\" }}\n  - {{ name: dirt, label: \"{DIRT}\" }}\n{extra}"
    );
    fs::write(&path, yaml).expect("write config");
    path
}

/// A small raster whose digest sorts before `other`'s.
pub fn raster_sorting_before(other: &Digest, width: u32, height: u32) -> Vec<u8> {
    (0u8..=255)
        .map(|shade| png_bytes(width, height, [shade, 128, 64]))
        .find(|bytes| digest_bytes(bytes) < *other)
        .expect("some shade sorts first")
}
