//! Candidate pairs for the matching task.
//!
//! A session holds two consecutive frames of the same trap. Each object of
//! frame 0 is matched to its counterpart in frame 1 by track, producing
//! index-aligned lists `a0[i] <-> a1[i]`. Every `(i, a0) x (j, a1)` with
//! `i >= j` is then considered:
//!
//! - `i == j` is the same individual seen twice: a **positive** pair, always
//!   kept;
//! - `i != j` is a **negative** pair, dropped when the two contours overlap
//!   by more than the IOU ceiling (such pairs are too ambiguous to train on).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use serde::Serialize;

use crate::error::PrepError;
use crate::geometry::{iou, masked_subimage, pad_to_square};
use crate::ir::io_svg::{FrameLayer, SessionSource};
use crate::ir::{Annotation, BBox, Digest, RasterSource};
use crate::split::HasDigest;

const VIEW_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// Whether a pair shows the same individual.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PairLabel {
    Negative,
    Positive,
}

impl PairLabel {
    /// Training target: 1 for positive, 0 for negative.
    pub fn as_u8(&self) -> u8 {
        match self {
            PairLabel::Negative => 0,
            PairLabel::Positive => 1,
        }
    }
}

/// Scalar features fed to the matcher alongside the image views.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PairFeatures {
    /// `log10(|c0 - c1| + 1)` over bounding-box centers.
    pub log_distance: f64,
    /// `|log10(area1) - log10(area0)|`.
    pub area_ratio: f64,
    /// `log10(area0)`.
    pub log_area0: f64,
}

impl PairFeatures {
    /// Areas below one pixel are clamped to one so the logarithms stay finite.
    pub fn compute(a0: &Annotation, a1: &Annotation) -> Self {
        let area0 = a0.area().max(1.0);
        let area1 = a1.area().max(1.0);
        let distance = a0.bbox.center().distance(&a1.bbox.center());
        Self {
            log_distance: (distance + 1.0).log10(),
            area_ratio: (area1.log10() - area0.log10()).abs(),
            log_area0: area0.log10(),
        }
    }
}

/// A decoded session with its objects matched across frames.
#[derive(Clone, Debug)]
pub struct Session {
    pub path: PathBuf,
    pub digest: Digest,
    /// `(a0, a1)` pairs in frame-0 document order.
    pub tracks: Vec<(Annotation, Annotation)>,
    pub frame0: Arc<RgbImage>,
    pub frame1: Arc<RgbImage>,
}

impl Session {
    /// Decodes both frames and matches their objects.
    ///
    /// # Errors
    /// [`PrepError::SourceRead`] when a linked raster is missing,
    /// [`PrepError::ImageDecode`] when a raster cannot be decoded.
    pub fn from_source(source: SessionSource) -> Result<Self, PrepError> {
        let tracks = match_tracks(&source);
        let [f0, f1] = &source.frames;
        let frame0 = Arc::new(decode_frame(&f0.raster, &source)?);
        let frame1 = Arc::new(decode_frame(&f1.raster, &source)?);
        Ok(Self {
            path: source.path,
            digest: source.digest,
            tracks,
            frame0,
            frame1,
        })
    }
}

fn decode_frame(raster: &RasterSource, source: &SessionSource) -> Result<RgbImage, PrepError> {
    let bytes = raster.load_bytes()?;
    image::load_from_memory(&bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| PrepError::ImageDecode {
            path: source.path.clone(),
            source: e,
        })
}

/// Pairs frame-0 objects with frame-1 objects.
///
/// Objects carrying a track key pair with the frame-1 object of the same key;
/// objects without one pair with the untracked frame-1 objects in document
/// order. Anything left unmatched is logged and skipped.
pub fn match_tracks(source: &SessionSource) -> Vec<(Annotation, Annotation)> {
    let [f0, f1]: &[FrameLayer; 2] = &source.frames;

    let mut by_track: HashMap<&str, &Annotation> = HashMap::new();
    let mut untracked = Vec::new();
    for ann in &f1.annotations {
        match ann.track.as_deref() {
            Some(key) => {
                if by_track.insert(key, ann).is_some() {
                    log::warn!(
                        "{}: track '{key}' appears twice in frame 1; keeping the last",
                        source.path.display()
                    );
                }
            }
            None => untracked.push(ann),
        }
    }

    let mut untracked = untracked.into_iter();
    let mut pairs = Vec::with_capacity(f0.annotations.len());
    for a0 in &f0.annotations {
        let a1 = match a0.track.as_deref() {
            Some(key) => by_track.remove(key),
            None => untracked.next(),
        };
        match a1 {
            Some(a1) => pairs.push((a0.clone(), a1.clone())),
            None => log::warn!(
                "{}: frame-0 object {} has no frame-1 counterpart; skipped",
                source.path.display(),
                a0.track.as_deref().unwrap_or("(untracked)")
            ),
        }
    }

    let leftover = by_track.len() + untracked.len();
    if leftover > 0 {
        log::warn!(
            "{}: {leftover} frame-1 objects have no frame-0 counterpart; skipped",
            source.path.display()
        );
    }
    pairs
}

/// One surviving pair.
#[derive(Clone, Debug)]
pub struct PairCandidate {
    pub a0: Annotation,
    pub a1: Annotation,
    pub frame0: Arc<RgbImage>,
    pub frame1: Arc<RgbImage>,
    /// Number of surviving pairs in the session.
    pub n_pairs: usize,
    pub features: PairFeatures,
    pub label: PairLabel,
    /// Digest of the session source.
    pub digest: Digest,
    /// `(i, j)` indices into the matched track list.
    pub indices: (usize, usize),
}

/// Grayscale views of a pair, each `dim x dim`.
#[derive(Clone, Debug)]
pub struct PairViews {
    /// a0 in frame 0.
    pub x0: GrayImage,
    /// a1 in frame 1.
    pub x1: GrayImage,
    /// a0's region in frame 1: shows whether the object moved away.
    pub x1_a0: GrayImage,
}

impl PairCandidate {
    /// The region of a0 cut from frame 1, masked and padded to `dim x dim`.
    pub fn a0_view_in_frame1(&self, dim: u32) -> Result<RgbImage, PrepError> {
        object_view(&self.frame1, &self.a0, dim)
    }

    /// All three views used by the matcher, in grayscale.
    pub fn views(&self, dim: u32) -> Result<PairViews, PrepError> {
        Ok(PairViews {
            x0: imageops::grayscale(&object_view(&self.frame0, &self.a0, dim)?),
            x1: imageops::grayscale(&object_view(&self.frame1, &self.a1, dim)?),
            x1_a0: imageops::grayscale(&self.a0_view_in_frame1(dim)?),
        })
    }
}

impl HasDigest for PairCandidate {
    fn digest(&self) -> &Digest {
        &self.digest
    }
}

/// Masks an object out of `frame` and pads it to `dim`, shrinking it first
/// when it does not fit.
fn object_view(frame: &RgbImage, ann: &Annotation, dim: u32) -> Result<RgbImage, PrepError> {
    let crop = masked_subimage(frame, &ann.polygon, VIEW_BACKGROUND);
    let (w, h) = crop.dimensions();
    let crop = if w > dim || h > dim {
        let scale = f64::from(dim) / f64::from(w.max(h));
        let nw = ((f64::from(w) * scale).round() as u32).clamp(1, dim);
        let nh = ((f64::from(h) * scale).round() as u32).clamp(1, dim);
        imageops::resize(&crop, nw, nh, FilterType::Triangle)
    } else {
        crop
    };
    pad_to_square(&crop, dim, VIEW_BACKGROUND)
}

/// Pairs of one session plus the number discarded by the IOU ceiling.
#[derive(Clone, Debug, Default)]
pub struct SessionPairs {
    pub candidates: Vec<PairCandidate>,
    pub discarded: usize,
}

impl SessionPairs {
    pub fn positives(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.label == PairLabel::Positive)
            .count()
    }

    pub fn negatives(&self) -> usize {
        self.candidates.len() - self.positives()
    }
}

/// Enumerates and labels the candidate pairs of a session.
pub fn build_session_pairs(session: &Session, max_iou: f64) -> SessionPairs {
    let mut kept = Vec::new();
    let mut discarded = 0;
    for (i, (a0, _)) in session.tracks.iter().enumerate() {
        for (j, (_, a1)) in session.tracks.iter().enumerate().take(i + 1) {
            if i != j && iou(&a0.polygon, &a1.polygon) > max_iou {
                discarded += 1;
                continue;
            }
            let label = if i == j {
                PairLabel::Positive
            } else {
                PairLabel::Negative
            };
            kept.push((i, j, label));
        }
    }

    let n_pairs = kept.len();
    let candidates = kept
        .into_iter()
        .map(|(i, j, label)| {
            let a0 = session.tracks[i].0.clone();
            let a1 = session.tracks[j].1.clone();
            PairCandidate {
                features: PairFeatures::compute(&a0, &a1),
                a0,
                a1,
                frame0: Arc::clone(&session.frame0),
                frame1: Arc::clone(&session.frame1),
                n_pairs,
                label,
                digest: session.digest.clone(),
                indices: (i, j),
            }
        })
        .collect();

    SessionPairs {
        candidates,
        discarded,
    }
}

/// One object of a [`PairRecord`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairObject {
    pub bbox: [f64; 4],
    /// Contour flattened to `[x0, y0, x1, y1, ...]`.
    pub polygon: Vec<f64>,
}

impl From<&Annotation> for PairObject {
    fn from(ann: &Annotation) -> Self {
        let bbox: BBox = ann.bbox;
        Self {
            bbox: bbox.to_array(),
            polygon: ann.polygon.flatten(),
        }
    }
}

/// Serializable form of a [`PairCandidate`], without the rasters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairRecord {
    pub source: PathBuf,
    pub digest: Digest,
    pub index: [usize; 2],
    pub label: u8,
    pub n_pairs: usize,
    pub features: PairFeatures,
    pub a0: PairObject,
    pub a1: PairObject,
}

impl PairRecord {
    pub fn new(source: &std::path::Path, candidate: &PairCandidate) -> Self {
        Self {
            source: source.to_path_buf(),
            digest: candidate.digest.clone(),
            index: [candidate.indices.0, candidate.indices.1],
            label: candidate.label.as_u8(),
            n_pairs: candidate.n_pairs,
            features: candidate.features,
            a0: PairObject::from(&candidate.a0),
            a1: PairObject::from(&candidate.a1),
        }
    }
}
