#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use trapset::ir::{Annotation, Digest, Point, Polygon};

pub const EPS_AREA: f64 = 1e-9;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Axis-aligned rectangles on the integer grid, as 4-point polygons.
pub fn arb_rect(max_coord: i32, max_side: i32) -> impl Strategy<Value = Polygon> {
    (0..max_coord, 0..max_coord, 1..=max_side, 1..=max_side).prop_map(|(x, y, w, h)| {
        let (x, y, w, h) = (x as f64, y as f64, w as f64, h as f64);
        Polygon::new(vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ])
    })
}

/// Triangles with integer vertices and non-zero area.
pub fn arb_triangle(max_coord: i32) -> impl Strategy<Value = Polygon> {
    prop::array::uniform6(0..max_coord)
        .prop_filter("degenerate triangle", |c| {
            let cross = (c[2] - c[0]) as i64 * (c[5] - c[1]) as i64
                - (c[3] - c[1]) as i64 * (c[4] - c[0]) as i64;
            cross != 0
        })
        .prop_map(|c| {
            Polygon::new(vec![
                Point::new(c[0] as f64, c[1] as f64),
                Point::new(c[2] as f64, c[3] as f64),
                Point::new(c[4] as f64, c[5] as f64),
            ])
        })
}

/// Rectangles or triangles.
pub fn arb_polygon(max_coord: i32) -> BoxedStrategy<Polygon> {
    prop_oneof![arb_rect(max_coord, max_coord / 2), arb_triangle(max_coord)].boxed()
}

/// Arbitrary integer vertex lists, not necessarily simple.
pub fn arb_outline(max_points: usize) -> impl Strategy<Value = Polygon> {
    prop::collection::vec((-1000i32..1000, -1000i32..1000), 3..=max_points).prop_map(|pts| {
        Polygon::new(
            pts.into_iter()
                .map(|(x, y)| Point::new(x as f64, y as f64))
                .collect(),
        )
    })
}

pub fn arb_digest() -> impl Strategy<Value = Digest> {
    "[0-9a-f]{64}".prop_map(|hex| Digest::from_hex(&hex).expect("valid hex digest"))
}

pub fn arb_label() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("#0000ff".to_string()),
        Just("#ff0000".to_string()),
        "[a-z][a-z_]{0,8}".prop_filter("reserved", |s| s != "none"),
    ]
}

pub fn arb_annotations(max: usize) -> impl Strategy<Value = Vec<Annotation>> {
    prop::collection::vec(
        (arb_polygon(200), arb_label(), prop::option::of("[a-z0-9]{1,6}")),
        0..=max,
    )
    .prop_map(|items| {
        items
            .into_iter()
            .map(|(polygon, label, track)| {
                let ann = Annotation::from_polygon(polygon, label);
                match track {
                    Some(track) => ann.with_track(track),
                    None => ann,
                }
            })
            .collect()
    })
}
