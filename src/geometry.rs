//! Pure geometry: areas, intersection-over-union, translation, padding.
//!
//! Nothing here fails on bad geometry. Polygons with fewer than three
//! distinct vertices, non-finite coordinates, zero area or self-intersecting
//! edges are *degenerate*: their area is 0 and any IOU involving them is 0.
//! The only fallible operation is [`pad_to_square`], which rejects images
//! that do not fit the target canvas.

use image::{imageops, Rgb, RgbImage};

use crate::error::PrepError;
use crate::ir::{BBox, DetectionObject, Point, Polygon};

/// Uniform offset of every coordinate of a shape.
///
/// Used with positive offsets for padding and negative offsets for cropping.
/// Point count and order are preserved; nothing is clipped.
pub trait Translate {
    fn translated(&self, dx: f64, dy: f64) -> Self;
}

impl Translate for Point {
    fn translated(&self, dx: f64, dy: f64) -> Self {
        Point::new(self.x + dx, self.y + dy)
    }
}

impl Translate for BBox {
    fn translated(&self, dx: f64, dy: f64) -> Self {
        BBox::new(self.x + dx, self.y + dy, self.w, self.h)
    }
}

impl Translate for Polygon {
    fn translated(&self, dx: f64, dy: f64) -> Self {
        Polygon::new(self.points().iter().map(|p| p.translated(dx, dy)).collect())
    }
}

impl Translate for DetectionObject {
    fn translated(&self, dx: f64, dy: f64) -> Self {
        let [x, y, w, h] = self.bbox;
        let segmentation = self
            .segmentation
            .iter()
            .map(|flat| {
                flat.iter()
                    .enumerate()
                    .map(|(i, v)| if i % 2 == 0 { v + dx } else { v + dy })
                    .collect()
            })
            .collect();
        DetectionObject {
            bbox: [x + dx, y + dy, w, h],
            segmentation,
            ..self.clone()
        }
    }
}

#[inline]
fn orient(a: &Point, b: &Point, c: &Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        acc += p.x * q.y - q.x * p.y;
    }
    acc / 2.0
}

/// Drops consecutive duplicate vertices, including a closing vertex that
/// repeats the first one.
fn dedup_vertices(polygon: &Polygon) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(polygon.len());
    for p in polygon.points() {
        if out.last() != Some(p) {
            out.push(*p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn on_segment(a: &Point, b: &Point, p: &Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segments_intersect(p1: &Point, p2: &Point, q1: &Point, q2: &Point) -> bool {
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

fn is_simple(points: &[Point]) -> bool {
    let n = points.len();
    for i in 0..n {
        let (a1, a2) = (&points[i], &points[(i + 1) % n]);
        for j in (i + 2)..n {
            // Edges (n-1 -> 0) and (0 -> 1) share vertex 0.
            if i == 0 && j == n - 1 {
                continue;
            }
            let (b1, b2) = (&points[j], &points[(j + 1) % n]);
            if segments_intersect(a1, a2, b1, b2) {
                return false;
            }
        }
    }
    true
}

/// Vertices of a non-degenerate polygon, oriented counter-clockwise
/// (positive signed area). `None` for degenerate input.
fn normalized_vertices(polygon: &Polygon) -> Option<Vec<Point>> {
    if !polygon.points().iter().all(Point::is_finite) {
        return None;
    }
    let mut points = dedup_vertices(polygon);
    if points.len() < 3 || !is_simple(&points) {
        return None;
    }
    let area = signed_area(&points);
    if area == 0.0 {
        return None;
    }
    if area < 0.0 {
        points.reverse();
    }
    Some(points)
}

/// Area enclosed by a polygon; 0 for degenerate polygons.
pub fn polygon_area(polygon: &Polygon) -> f64 {
    normalized_vertices(polygon)
        .map(|points| signed_area(&points))
        .unwrap_or(0.0)
}

fn point_in_triangle(p: &Point, a: &Point, b: &Point, c: &Point) -> bool {
    orient(a, b, p) >= 0.0 && orient(b, c, p) >= 0.0 && orient(c, a, p) >= 0.0
}

/// Ear-clipping triangulation of a simple counter-clockwise polygon.
fn triangulate(points: &[Point]) -> Vec<[Point; 3]> {
    let mut idx: Vec<usize> = (0..points.len()).collect();
    let mut triangles = Vec::with_capacity(points.len().saturating_sub(2));

    while idx.len() > 3 {
        let n = idx.len();
        let mut clipped = false;

        for k in 0..n {
            let (ip, ic, inx) = (idx[(k + n - 1) % n], idx[k], idx[(k + 1) % n]);
            let (a, b, c) = (&points[ip], &points[ic], &points[inx]);
            let turn = orient(a, b, c);

            if turn == 0.0 {
                // Collinear vertex: removing it leaves the outline unchanged.
                idx.remove(k);
                clipped = true;
                break;
            }
            if turn < 0.0 {
                continue;
            }

            let blocked = idx.iter().any(|&other| {
                let p = &points[other];
                other != ip
                    && other != ic
                    && other != inx
                    && p != a
                    && p != b
                    && p != c
                    && point_in_triangle(p, a, b, c)
            });
            if blocked {
                continue;
            }

            triangles.push([*a, *b, *c]);
            idx.remove(k);
            clipped = true;
            break;
        }

        if !clipped {
            // Only reachable through floating-point noise on nearly
            // degenerate input; the remaining sliver is dropped.
            break;
        }
    }

    if idx.len() == 3 {
        let tri = [points[idx[0]], points[idx[1]], points[idx[2]]];
        if orient(&tri[0], &tri[1], &tri[2]) > 0.0 {
            triangles.push(tri);
        }
    }
    triangles
}

fn line_intersection(s: &Point, e: &Point, a: &Point, b: &Point) -> Point {
    let d1 = orient(a, b, s);
    let d2 = orient(a, b, e);
    let t = d1 / (d1 - d2);
    Point::new(s.x + t * (e.x - s.x), s.y + t * (e.y - s.y))
}

/// Sutherland–Hodgman clip of `subject` by a counter-clockwise triangle.
fn clip_by_triangle(subject: &[Point; 3], clip: &[Point; 3]) -> Vec<Point> {
    let mut output: Vec<Point> = subject.to_vec();
    for i in 0..3 {
        if output.is_empty() {
            break;
        }
        let (a, b) = (&clip[i], &clip[(i + 1) % 3]);
        let input = std::mem::take(&mut output);
        for (k, e) in input.iter().enumerate() {
            let s = &input[(k + input.len() - 1) % input.len()];
            let e_in = orient(a, b, e) >= 0.0;
            let s_in = orient(a, b, s) >= 0.0;
            if e_in {
                if !s_in {
                    output.push(line_intersection(s, e, a, b));
                }
                output.push(*e);
            } else if s_in {
                output.push(line_intersection(s, e, a, b));
            }
        }
    }
    output
}

fn bounds_disjoint(a: &BBox, b: &BBox) -> bool {
    a.xmax() <= b.x || b.xmax() <= a.x || a.ymax() <= b.y || b.ymax() <= a.y
}

/// Intersection-over-union of two closed polygons, in `[0, 1]`.
///
/// Exact for simple polygons, convex or not. Degenerate polygons yield 0.
pub fn iou(a: &Polygon, b: &Polygon) -> f64 {
    let (Some(pa), Some(pb)) = (normalized_vertices(a), normalized_vertices(b)) else {
        return 0.0;
    };
    if pa == pb {
        return 1.0;
    }
    if bounds_disjoint(&a.bbox(), &b.bbox()) {
        return 0.0;
    }

    let area_a = signed_area(&pa);
    let area_b = signed_area(&pb);
    let tris_a = triangulate(&pa);
    let tris_b = triangulate(&pb);

    let mut inter = 0.0;
    for ta in &tris_a {
        for tb in &tris_b {
            inter += signed_area(&clip_by_triangle(ta, tb)).max(0.0);
        }
    }
    let inter = inter.min(area_a).min(area_b);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        return 0.0;
    }
    (inter / union).clamp(0.0, 1.0)
}

/// Convex hull (Andrew's monotone chain), counter-clockwise, no repeated
/// closing vertex.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.iter().copied().filter(Point::is_finite).collect();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(pts.len() * 2);
    for p in &pts {
        while hull.len() >= 2 && orient(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(*p);
    }
    let lower_len = hull.len() + 1;
    for p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && orient(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(*p);
    }
    hull.pop();
    hull
}

/// Longer side of the minimum-area rotated rectangle enclosing a polygon.
///
/// This is the object "size" the detection pipeline filters on. For
/// collinear or two-point contours it is the longest extent; for a single
/// point it is 0.
pub fn rot_rect_width(polygon: &Polygon) -> f64 {
    let hull = convex_hull(polygon.points());
    match hull.len() {
        0 | 1 => return 0.0,
        2 => return hull[0].distance(&hull[1]),
        _ => {}
    }

    let mut best_area = f64::INFINITY;
    let mut best_width = 0.0;
    for i in 0..hull.len() {
        let (p, q) = (&hull[i], &hull[(i + 1) % hull.len()]);
        let len = p.distance(q);
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = ((q.x - p.x) / len, (q.y - p.y) / len);
        let (mut min_u, mut max_u, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY, 0.0f64);
        for r in &hull {
            let (dx, dy) = (r.x - p.x, r.y - p.y);
            let u = dx * ux + dy * uy;
            let v = (dx * uy - dy * ux).abs();
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            max_v = max_v.max(v);
        }
        let (side_u, side_v) = (max_u - min_u, max_v);
        let area = side_u * side_v;
        if area < best_area {
            best_area = area;
            best_width = side_u.max(side_v);
        }
    }
    best_width
}

/// Even-odd point-in-polygon test.
pub fn contains_point(polygon: &Polygon, p: &Point) -> bool {
    let pts = polygon.points();
    let mut inside = false;
    let mut j = pts.len().wrapping_sub(1);
    for i in 0..pts.len() {
        let (a, b) = (&pts[i], &pts[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Centers `image` on a `target_dim × target_dim` canvas filled with
/// `background`.
///
/// # Errors
/// Returns [`PrepError::PadTooLarge`] when either side exceeds `target_dim`.
pub fn pad_to_square(
    image: &RgbImage,
    target_dim: u32,
    background: Rgb<u8>,
) -> Result<RgbImage, PrepError> {
    let (w, h) = image.dimensions();
    if w > target_dim || h > target_dim {
        return Err(PrepError::PadTooLarge {
            width: w,
            height: h,
            target: target_dim,
        });
    }
    if w == target_dim && h == target_dim {
        return Ok(image.clone());
    }

    let mut canvas = RgbImage::from_pixel(target_dim, target_dim, background);
    let pad_x = (target_dim - w) / 2;
    let pad_y = (target_dim - h) / 2;
    imageops::replace(&mut canvas, image, pad_x.into(), pad_y.into());
    Ok(canvas)
}

/// Crops `image` to the polygon's bounds, painting pixels whose centers lie
/// outside the polygon with `background`.
///
/// The crop is clamped to the image; a polygon entirely outside yields a
/// 1×1 background image.
pub fn masked_subimage(image: &RgbImage, polygon: &Polygon, background: Rgb<u8>) -> RgbImage {
    let (iw, ih) = image.dimensions();
    let b = polygon.bbox();
    let x0 = b.x.floor().clamp(0.0, iw as f64) as u32;
    let y0 = b.y.floor().clamp(0.0, ih as f64) as u32;
    let x1 = b.xmax().ceil().clamp(0.0, iw as f64) as u32;
    let y1 = b.ymax().ceil().clamp(0.0, ih as f64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return RgbImage::from_pixel(1, 1, background);
    }

    RgbImage::from_fn(x1 - x0, y1 - y0, |x, y| {
        let (sx, sy) = (x0 + x, y0 + y);
        let center = Point::new(sx as f64 + 0.5, sy as f64 + 0.5);
        if contains_point(polygon, &center) {
            *image.get_pixel(sx, sy)
        } else {
            background
        }
    })
}
