//! Criterion microbenches for the hot spots of a preparation run.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure:
//! - polygon IOU (every pair of a session goes through it)
//! - source SVG parsing with an embedded raster
//! - content digests of raster-sized buffers

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use trapset::geometry::iou;
use trapset::hash::digest_bytes;
use trapset::ir::io_svg::{from_svg_slice, to_source_svg_string};
use trapset::ir::{Annotation, Point, Polygon};

fn blob(cx: f64, cy: f64, r: f64, n: usize) -> Polygon {
    Polygon::new(
        (0..n)
            .map(|k| {
                let t = k as f64 / n as f64 * std::f64::consts::TAU;
                // Wobbly radius keeps the outline non-convex.
                let rr = r * (1.0 + 0.2 * (3.0 * t).sin());
                Point::new(cx + rr * t.cos(), cy + rr * t.sin())
            })
            .collect(),
    )
}

fn bench_iou(c: &mut Criterion) {
    let mut group = c.benchmark_group("iou");
    let rect_a = Polygon::new(vec![
        Point::new(0.0, 0.0),
        Point::new(40.0, 0.0),
        Point::new(40.0, 30.0),
        Point::new(0.0, 30.0),
    ]);
    let rect_b = Polygon::new(vec![
        Point::new(10.0, 5.0),
        Point::new(50.0, 5.0),
        Point::new(50.0, 35.0),
        Point::new(10.0, 35.0),
    ]);
    group.bench_function("rectangles", |b| {
        b.iter(|| black_box(iou(black_box(&rect_a), black_box(&rect_b))))
    });

    let blob_a = blob(50.0, 50.0, 20.0, 32);
    let blob_b = blob(58.0, 52.0, 18.0, 32);
    group.bench_function("contours_32", |b| {
        b.iter(|| black_box(iou(black_box(&blob_a), black_box(&blob_b))))
    });
    group.finish();
}

fn bench_svg_parse(c: &mut Criterion) {
    let annotations: Vec<Annotation> = (0..50)
        .map(|k| {
            let (x, y) = ((k % 10) as f64 * 60.0, (k / 10) as f64 * 60.0);
            Annotation::from_polygon(blob(x + 30.0, y + 30.0, 12.0, 24), "#0000ff")
        })
        .collect();
    let raster = vec![0u8; 64 * 1024];
    let svg = to_source_svg_string(640, 480, "image/png", &raster, &annotations);

    let mut group = c.benchmark_group("svg_parse");
    group.throughput(Throughput::Bytes(svg.len() as u64));
    group.bench_function("source_50_objects", |b| {
        b.iter(|| {
            let record = from_svg_slice(black_box(svg.as_bytes())).unwrap();
            black_box(record)
        })
    });
    group.finish();
}

fn bench_digest(c: &mut Criterion) {
    let data = vec![0xA5u8; 4 * 1024 * 1024];
    let mut group = c.benchmark_group("digest");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("4mib", |b| b.iter(|| black_box(digest_bytes(black_box(&data)))));
    group.finish();
}

criterion_group!(benches, bench_iou, bench_svg_parse, bench_digest);
criterion_main!(benches);
