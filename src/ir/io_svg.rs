//! Annotated SVG reader and writer.
//!
//! Two layouts are supported:
//!
//! - **source SVG** (detection task): a root `<svg width height>` holding one
//!   `<image>` and any number of annotation shapes;
//! - **session SVG** (matching task): two `<g data-frame="0|1">` layers, each
//!   holding its own `<image>` and shapes.
//!
//! Images are either embedded as `data:<mime>;base64,` URIs or linked by a
//! path relative to the SVG file. Shapes are `<path>`, `<polygon>`,
//! `<polyline>` and `<rect>`; transforms are not applied. A shape's label is
//! its `data-label` attribute, else its stroke colour, else its fill colour.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use roxmltree::{Document, Node};

use super::model::{Annotation, RasterSource, SourceRecord};
use super::shape::{Point, Polygon};
use crate::error::PrepError;
use crate::hash::digest_bytes;
use crate::ir::Digest;

/// Segments used to flatten each Bézier curve of a `<path>`.
const CURVE_STEPS: usize = 8;

const SHAPE_TAGS: [&str; 4] = ["path", "polygon", "polyline", "rect"];

/// One time point of a recording session.
#[derive(Clone, Debug)]
pub struct FrameLayer {
    pub width: u32,
    pub height: u32,
    pub raster: RasterSource,
    pub annotations: Vec<Annotation>,
}

/// A recording session: two consecutive frames of the same trap.
#[derive(Clone, Debug)]
pub struct SessionSource {
    pub path: PathBuf,
    pub digest: Digest,
    pub frames: [FrameLayer; 2],
}

/// Read a source SVG from disk.
pub fn read_source_svg(path: &Path) -> Result<SourceRecord, PrepError> {
    let bytes = fs::read(path).map_err(|e| PrepError::SourceRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_source_svg(&bytes, path)
}

/// Parse a source SVG from bytes (must be valid UTF-8).
///
/// Linked rasters resolve against the current directory.
pub fn from_svg_slice(bytes: &[u8]) -> Result<SourceRecord, PrepError> {
    parse_source_svg(bytes, Path::new("<bytes>"))
}

/// Read a session SVG from disk.
pub fn read_session_svg(path: &Path) -> Result<SessionSource, PrepError> {
    let bytes = fs::read(path).map_err(|e| PrepError::SourceRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_session_svg(&bytes, path)
}

/// Parse a session SVG from bytes (must be valid UTF-8).
pub fn from_session_svg_slice(bytes: &[u8]) -> Result<SessionSource, PrepError> {
    parse_session_svg(bytes, Path::new("<bytes>"))
}

fn parse_err(path: &Path, message: impl Into<String>) -> PrepError {
    PrepError::SvgParse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn parse_document<'a>(bytes: &'a [u8], path: &Path) -> Result<Document<'a>, PrepError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| parse_err(path, format!("input is not valid UTF-8: {e}")))?;
    let document = Document::parse(text).map_err(|e| parse_err(path, e.to_string()))?;
    if document.root_element().tag_name().name() != "svg" {
        return Err(parse_err(path, "missing <svg> root element"));
    }
    Ok(document)
}

fn parse_source_svg(bytes: &[u8], path: &Path) -> Result<SourceRecord, PrepError> {
    let document = parse_document(bytes, path)?;
    let root = document.root_element();

    let image_node = descendant_images(root)
        .next()
        .ok_or_else(|| parse_err(path, "no <image> element"))?;
    let raster = parse_raster(image_node, path)?;
    let (width, height) = match root_size(root, path)? {
        Some(size) => size,
        None => image_size(image_node, path)?
            .ok_or_else(|| parse_err(path, "cannot determine image size"))?,
    };

    Ok(SourceRecord {
        path: path.to_path_buf(),
        digest: digest_bytes(bytes),
        width,
        height,
        annotations: collect_shapes(root, path)?,
        raster,
    })
}

fn parse_session_svg(bytes: &[u8], path: &Path) -> Result<SessionSource, PrepError> {
    let document = parse_document(bytes, path)?;
    let root = document.root_element();
    let root_dims = root_size(root, path)?;

    let mut frames: [Option<FrameLayer>; 2] = [None, None];
    for layer in root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "g")
    {
        let index = match layer.attribute("data-frame").map(str::trim) {
            Some("0") => 0,
            Some("1") => 1,
            Some(other) => {
                return Err(parse_err(
                    path,
                    format!("invalid data-frame='{other}'; expected '0' or '1'"),
                ))
            }
            None => continue,
        };
        if frames[index].is_some() {
            return Err(parse_err(path, format!("duplicate layer for frame {index}")));
        }

        let image_node = descendant_images(layer)
            .next()
            .ok_or_else(|| parse_err(path, format!("frame {index} has no <image>")))?;
        let (width, height) = match image_size(image_node, path)?.or(root_dims) {
            Some(size) => size,
            None => return Err(parse_err(path, format!("frame {index} has no size"))),
        };

        frames[index] = Some(FrameLayer {
            width,
            height,
            raster: parse_raster(image_node, path)?,
            annotations: collect_shapes(layer, path)?,
        });
    }

    let [Some(f0), Some(f1)] = frames else {
        return Err(parse_err(path, "session needs layers data-frame='0' and '1'"));
    };

    Ok(SessionSource {
        path: path.to_path_buf(),
        digest: digest_bytes(bytes),
        frames: [f0, f1],
    })
}

fn descendant_images<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "image")
}

fn in_defs(node: Node<'_, '_>) -> bool {
    node.ancestors().any(|a| {
        a.is_element() && matches!(a.tag_name().name(), "defs" | "clipPath" | "mask")
    })
}

fn collect_shapes(scope: Node<'_, '_>, path: &Path) -> Result<Vec<Annotation>, PrepError> {
    let mut out = Vec::new();
    for node in scope.descendants().filter(|n| {
        n.is_element() && SHAPE_TAGS.contains(&n.tag_name().name()) && !in_defs(*n)
    }) {
        let polygon = match node.tag_name().name() {
            "path" => {
                let d = node.attribute("d").unwrap_or("");
                parse_path_data(d).map_err(|m| parse_err(path, format!("<path d>: {m}")))?
            }
            "polygon" | "polyline" => {
                let raw = node.attribute("points").unwrap_or("");
                parse_points(raw).map_err(|m| parse_err(path, format!("<polygon points>: {m}")))?
            }
            _ => parse_rect(node, path)?,
        };
        if polygon.is_empty() {
            continue;
        }

        let mut ann = Annotation::from_polygon(polygon, shape_label(node).unwrap_or_default());
        if let Some(track) = node
            .attribute("data-track")
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            ann = ann.with_track(track);
        }
        out.push(ann);
    }
    Ok(out)
}

fn shape_label(node: Node<'_, '_>) -> Option<String> {
    if let Some(label) = node
        .attribute("data-label")
        .map(str::trim)
        .filter(|l| !l.is_empty())
    {
        return Some(label.to_string());
    }
    for key in ["stroke", "fill"] {
        let value = node
            .attribute(key)
            .map(str::to_string)
            .or_else(|| style_property(node.attribute("style")?, key));
        if let Some(colour) = value.map(|v| normalize_colour(&v)).filter(|v| v != "none") {
            return Some(colour);
        }
    }
    None
}

fn style_property(style: &str, key: &str) -> Option<String> {
    style.split(';').find_map(|decl| {
        let (k, v) = decl.split_once(':')?;
        (k.trim() == key).then(|| v.trim().to_string())
    })
}

/// Lowercases and expands `#abc` to `#aabbcc`.
fn normalize_colour(raw: &str) -> String {
    let c = raw.trim().to_ascii_lowercase();
    match c.strip_prefix('#') {
        Some(short) if short.len() == 3 && short.chars().all(|ch| ch.is_ascii_hexdigit()) => {
            short.chars().fold(String::from("#"), |mut acc, ch| {
                acc.push(ch);
                acc.push(ch);
                acc
            })
        }
        _ => c,
    }
}

/// Parses a length such as `1024`, `1024px` or `1024.0`.
fn parse_length(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches("px").trim();
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn size_from_attrs(node: Node<'_, '_>, path: &Path) -> Result<Option<(u32, u32)>, PrepError> {
    match (node.attribute("width"), node.attribute("height")) {
        (Some(w), Some(h)) => {
            let (Some(w), Some(h)) = (parse_length(w), parse_length(h)) else {
                return Err(parse_err(
                    path,
                    format!("invalid size on <{}>", node.tag_name().name()),
                ));
            };
            Ok(Some((w.round() as u32, h.round() as u32)))
        }
        _ => Ok(None),
    }
}

fn root_size(root: Node<'_, '_>, path: &Path) -> Result<Option<(u32, u32)>, PrepError> {
    if let Some(size) = size_from_attrs(root, path)? {
        return Ok(Some(size));
    }
    let Some(view_box) = root.attribute("viewBox") else {
        return Ok(None);
    };
    let values = parse_numbers(view_box).map_err(|m| parse_err(path, format!("viewBox: {m}")))?;
    match values.as_slice() {
        [_, _, w, h] if *w >= 0.0 && *h >= 0.0 => Ok(Some((w.round() as u32, h.round() as u32))),
        _ => Err(parse_err(path, "viewBox must have four non-negative values")),
    }
}

fn image_size(node: Node<'_, '_>, path: &Path) -> Result<Option<(u32, u32)>, PrepError> {
    size_from_attrs(node, path)
}

fn parse_raster(node: Node<'_, '_>, path: &Path) -> Result<RasterSource, PrepError> {
    let href = node
        .attributes()
        .find(|a| a.name() == "href")
        .map(|a| a.value().trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| parse_err(path, "<image> has no href"))?;

    if let Some(uri) = href.strip_prefix("data:") {
        let (meta, payload) = uri
            .split_once(',')
            .ok_or_else(|| parse_err(path, "malformed data URI"))?;
        let Some(mime) = meta.strip_suffix(";base64") else {
            return Err(parse_err(path, "only base64 data URIs are supported"));
        };
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| parse_err(path, format!("embedded image: {e}")))?;
        return Ok(RasterSource::Embedded {
            mime: mime.to_string(),
            bytes,
        });
    }

    let rel = href.strip_prefix("file://").unwrap_or(href);
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(RasterSource::Linked(base.join(rel)))
}

fn parse_rect(node: Node<'_, '_>, path: &Path) -> Result<Polygon, PrepError> {
    let attr = |key: &str| -> Result<f64, PrepError> {
        match node.attribute(key) {
            None => Ok(0.0),
            Some(raw) => parse_length(raw)
                .or_else(|| raw.trim().parse::<f64>().ok())
                .ok_or_else(|| parse_err(path, format!("<rect> has invalid {key}='{raw}'"))),
        }
    };
    let (x, y, w, h) = (attr("x")?, attr("y")?, attr("width")?, attr("height")?);
    Ok(Polygon::new(vec![
        Point::new(x, y),
        Point::new(x + w, y),
        Point::new(x + w, y + h),
        Point::new(x, y + h),
    ]))
}

fn parse_points(raw: &str) -> Result<Polygon, String> {
    let values = parse_numbers(raw)?;
    if values.len() % 2 != 0 {
        return Err("odd number of coordinates".to_string());
    }
    Ok(Polygon::from_flat(&values))
}

#[derive(Debug, PartialEq)]
enum Token {
    Command(char),
    Number(f64),
}

fn tokenize(raw: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == ',' {
            i += 1;
        } else if c.is_ascii_alphabetic() && c != 'e' && c != 'E' {
            tokens.push(Token::Command(c));
            i += 1;
        } else if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') {
            let start = i;
            let mut seen_dot = false;
            let mut seen_exp = false;
            if matches!(c, '-' | '+') {
                i += 1;
            }
            while i < chars.len() {
                let d = chars[i];
                if d.is_ascii_digit() {
                    i += 1;
                } else if d == '.' && !seen_dot && !seen_exp {
                    seen_dot = true;
                    i += 1;
                } else if matches!(d, 'e' | 'E') && !seen_exp && i > start {
                    seen_exp = true;
                    i += 1;
                    if i < chars.len() && matches!(chars[i], '-' | '+') {
                        i += 1;
                    }
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number '{text}'"))?;
            tokens.push(Token::Number(value));
        } else {
            return Err(format!("unexpected character '{c}'"));
        }
    }
    Ok(tokens)
}

fn parse_numbers(raw: &str) -> Result<Vec<f64>, String> {
    tokenize(raw)?
        .into_iter()
        .map(|t| match t {
            Token::Number(v) => Ok(v),
            Token::Command(c) => Err(format!("unexpected '{c}' in number list")),
        })
        .collect()
}

fn cubic(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let u = 1.0 - t;
    let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
    Point::new(
        a * p0.x + b * p1.x + c * p2.x + d * p3.x,
        a * p0.y + b * p1.y + c * p2.y + d * p3.y,
    )
}

fn quadratic(p0: Point, p1: Point, p2: Point, t: f64) -> Point {
    let u = 1.0 - t;
    Point::new(
        u * u * p0.x + 2.0 * u * t * p1.x + t * t * p2.x,
        u * u * p0.y + 2.0 * u * t * p1.y + t * t * p2.y,
    )
}

/// Flattens the first subpath of an SVG path into a polygon.
///
/// Curves are sampled with [`CURVE_STEPS`] segments; arcs are replaced by
/// their end point.
fn parse_path_data(d: &str) -> Result<Polygon, String> {
    let tokens = tokenize(d)?;
    let mut points: Vec<Point> = Vec::new();
    let mut cursor = Point::default();
    let mut last_ctrl: Option<Point> = None;
    let mut command: Option<char> = None;
    let mut i = 0;

    let take = |i: &mut usize, n: usize| -> Result<Vec<f64>, String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match tokens.get(*i) {
                Some(Token::Number(v)) => out.push(*v),
                _ => return Err("missing coordinates".to_string()),
            }
            *i += 1;
        }
        Ok(out)
    };

    while i < tokens.len() {
        let cmd = match tokens[i] {
            Token::Command(c) => {
                i += 1;
                c
            }
            Token::Number(_) => match command {
                // Implicit repetition; a repeated moveto is a lineto.
                Some('M') => 'L',
                Some('m') => 'l',
                Some(c) => c,
                None => return Err("path must start with a command".to_string()),
            },
        };
        let rel = cmd.is_ascii_lowercase();
        let offset = |p: Point, cursor: Point| {
            if rel {
                Point::new(p.x + cursor.x, p.y + cursor.y)
            } else {
                p
            }
        };

        match cmd.to_ascii_uppercase() {
            'M' => {
                if !points.is_empty() {
                    // Only the first subpath describes the contour.
                    break;
                }
                let v = take(&mut i, 2)?;
                cursor = offset(Point::new(v[0], v[1]), cursor);
                points.push(cursor);
                last_ctrl = None;
            }
            'L' => {
                let v = take(&mut i, 2)?;
                cursor = offset(Point::new(v[0], v[1]), cursor);
                points.push(cursor);
                last_ctrl = None;
            }
            'H' => {
                let v = take(&mut i, 1)?;
                cursor.x = if rel { cursor.x + v[0] } else { v[0] };
                points.push(cursor);
                last_ctrl = None;
            }
            'V' => {
                let v = take(&mut i, 1)?;
                cursor.y = if rel { cursor.y + v[0] } else { v[0] };
                points.push(cursor);
                last_ctrl = None;
            }
            'C' | 'S' => {
                let (c1, c2, end) = if cmd.eq_ignore_ascii_case(&'C') {
                    let v = take(&mut i, 6)?;
                    (
                        offset(Point::new(v[0], v[1]), cursor),
                        offset(Point::new(v[2], v[3]), cursor),
                        offset(Point::new(v[4], v[5]), cursor),
                    )
                } else {
                    let v = take(&mut i, 4)?;
                    let reflected = last_ctrl
                        .map(|c| Point::new(2.0 * cursor.x - c.x, 2.0 * cursor.y - c.y))
                        .unwrap_or(cursor);
                    (
                        reflected,
                        offset(Point::new(v[0], v[1]), cursor),
                        offset(Point::new(v[2], v[3]), cursor),
                    )
                };
                for step in 1..=CURVE_STEPS {
                    points.push(cubic(cursor, c1, c2, end, step as f64 / CURVE_STEPS as f64));
                }
                cursor = end;
                last_ctrl = Some(c2);
            }
            'Q' | 'T' => {
                let (ctrl, end) = if cmd.eq_ignore_ascii_case(&'Q') {
                    let v = take(&mut i, 4)?;
                    (
                        offset(Point::new(v[0], v[1]), cursor),
                        offset(Point::new(v[2], v[3]), cursor),
                    )
                } else {
                    let v = take(&mut i, 2)?;
                    let reflected = last_ctrl
                        .map(|c| Point::new(2.0 * cursor.x - c.x, 2.0 * cursor.y - c.y))
                        .unwrap_or(cursor);
                    (reflected, offset(Point::new(v[0], v[1]), cursor))
                };
                for step in 1..=CURVE_STEPS {
                    points.push(quadratic(cursor, ctrl, end, step as f64 / CURVE_STEPS as f64));
                }
                cursor = end;
                last_ctrl = Some(ctrl);
            }
            'A' => {
                let v = take(&mut i, 7)?;
                cursor = offset(Point::new(v[5], v[6]), cursor);
                points.push(cursor);
                last_ctrl = None;
            }
            'Z' => {
                if let Some(first) = points.first() {
                    cursor = *first;
                }
                last_ctrl = None;
            }
            other => return Err(format!("unsupported path command '{other}'")),
        }
        command = Some(cmd);
    }

    Ok(Polygon::new(points))
}

/// Runs the path-data parser on arbitrary input.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_path_data(input: &str) -> Result<(), PrepError> {
    parse_path_data(input)
        .map(|_| ())
        .map_err(|message| parse_err(Path::new("<fuzz>"), message))
}

fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

fn write_shapes(out: &mut String, annotations: &[Annotation]) {
    for ann in annotations {
        let points: Vec<String> = ann
            .polygon
            .points()
            .iter()
            .map(|p| format!("{},{}", p.x, p.y))
            .collect();
        let _ = write!(
            out,
            "  <polygon points=\"{}\" data-label=\"{}\"",
            points.join(" "),
            xml_escape(&ann.label)
        );
        if let Some(track) = &ann.track {
            let _ = write!(out, " data-track=\"{}\"", xml_escape(track));
        }
        out.push_str(" fill=\"none\"/>\n");
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Serialize an annotated image as a source SVG with an embedded raster.
pub fn to_source_svg_string(
    width: u32,
    height: u32,
    mime: &str,
    raster: &[u8],
    annotations: &[Annotation],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{width}\" height=\"{height}\">"
    );
    let _ = writeln!(
        out,
        "  <image width=\"{width}\" height=\"{height}\" xlink:href=\"{}\"/>",
        data_uri(mime, raster)
    );
    write_shapes(&mut out, annotations);
    out.push_str("</svg>\n");
    out
}

/// One frame to write into a session SVG.
pub struct FrameSpec<'a> {
    pub width: u32,
    pub height: u32,
    pub mime: &'a str,
    pub raster: &'a [u8],
    pub annotations: &'a [Annotation],
}

/// Serialize two frames as a session SVG with embedded rasters.
pub fn to_session_svg_string(frames: [&FrameSpec<'_>; 2]) -> String {
    let width = frames[0].width.max(frames[1].width);
    let height = frames[0].height.max(frames[1].height);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{width}\" height=\"{height}\">"
    );
    for (idx, frame) in frames.iter().enumerate() {
        let _ = writeln!(out, " <g data-frame=\"{idx}\">");
        let _ = writeln!(
            out,
            "  <image width=\"{}\" height=\"{}\" xlink:href=\"{}\"/>",
            frame.width,
            frame.height,
            data_uri(frame.mime, frame.raster)
        );
        write_shapes(&mut out, frame.annotations);
        out.push_str(" </g>\n");
    }
    out.push_str("</svg>\n");
    out
}
