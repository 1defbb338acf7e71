//! Visual checks of prepared data.
//!
//! Nothing in the preparation path depends on this module; it renders
//! records and pair views so a person can eyeball them.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::ir::{DetectionRecord, Polygon};
use crate::pairs::PairViews;

const COLOURS: [Rgb<u8>; 6] = [
    Rgb([255, 64, 64]),
    Rgb([64, 200, 64]),
    Rgb([64, 128, 255]),
    Rgb([255, 200, 0]),
    Rgb([200, 64, 255]),
    Rgb([0, 220, 220]),
];

fn colour_for(category: u32) -> Rgb<u8> {
    COLOURS[category as usize % COLOURS.len()]
}

/// Draws every object of `record` onto a copy of `image`: the box as a
/// rectangle and the segmentation as a closed outline, coloured by category.
///
/// Coordinates are used as stored, so a tiled record draws in padded-image
/// coordinates.
pub fn render_overlay(image: &RgbImage, record: &DetectionRecord) -> RgbImage {
    let mut canvas = image.clone();
    for object in &record.annotations {
        let colour = colour_for(object.category_id.as_u32());

        let [x, y, w, h] = object.bbox;
        if w >= 1.0 && h >= 1.0 {
            let rect = Rect::at(x.round() as i32, y.round() as i32)
                .of_size(w.round() as u32, h.round() as u32);
            draw_hollow_rect_mut(&mut canvas, rect, colour);
        }

        for flat in &object.segmentation {
            draw_outline(&mut canvas, &Polygon::from_flat(flat), colour);
        }
    }
    canvas
}

fn draw_outline(canvas: &mut RgbImage, polygon: &Polygon, colour: Rgb<u8>) {
    let points = polygon.points();
    for (idx, start) in points.iter().enumerate() {
        let end = points[(idx + 1) % points.len()];
        draw_line_segment_mut(
            canvas,
            (start.x as f32, start.y as f32),
            (end.x as f32, end.y as f32),
            colour,
        );
    }
}

/// Lays the three views of a pair side by side: a0, a1, then a0's region in
/// frame 1.
pub fn render_pair_strip(views: &PairViews) -> GrayImage {
    let (w, h) = views.x0.dimensions();
    let mut strip = GrayImage::new(w * 3, h);
    for (slot, view) in [&views.x0, &views.x1, &views.x1_a0].into_iter().enumerate() {
        image::imageops::replace(&mut strip, view, i64::from(w) * slot as i64, 0);
    }
    strip
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest_bytes;
    use crate::ir::{BBox, CategoryId, DetectionObject, Point};
    use image::Luma;
    use std::path::PathBuf;

    fn record_with_square() -> DetectionRecord {
        let poly = Polygon::new(vec![
            Point::new(2.0, 2.0),
            Point::new(10.0, 2.0),
            Point::new(10.0, 10.0),
            Point::new(2.0, 10.0),
        ]);
        DetectionRecord {
            file_name: PathBuf::from("x.raster"),
            height: 16,
            width: 16,
            image_id: "x".into(),
            digest: digest_bytes(b"x"),
            original_source: PathBuf::from("x.svg"),
            annotations: vec![DetectionObject::new(
                BBox::new(2.0, 2.0, 8.0, 8.0),
                &poly,
                CategoryId(1),
            )],
            tile: None,
        }
    }

    #[test]
    fn overlay_draws_outline_only() {
        let image = RgbImage::new(16, 16);
        let out = render_overlay(&image, &record_with_square());
        assert_eq!(*out.get_pixel(2, 2), colour_for(1));
        assert_eq!(*out.get_pixel(6, 2), colour_for(1));
        assert_eq!(*out.get_pixel(6, 6), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(14, 14), Rgb([0, 0, 0]));
        // The input is untouched.
        assert_eq!(*image.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn pair_strip_is_three_views_wide() {
        let views = PairViews {
            x0: GrayImage::from_pixel(4, 4, Luma([10])),
            x1: GrayImage::from_pixel(4, 4, Luma([20])),
            x1_a0: GrayImage::from_pixel(4, 4, Luma([30])),
        };
        let strip = render_pair_strip(&views);
        assert_eq!(strip.dimensions(), (12, 4));
        assert_eq!(strip.get_pixel(1, 1)[0], 10);
        assert_eq!(strip.get_pixel(5, 1)[0], 20);
        assert_eq!(strip.get_pixel(11, 3)[0], 30);
    }
}
