//! Turning annotated sources into detection records.
//!
//! For every [`SourceRecord`] the builder resolves two cache artifacts:
//!
//! 1. the **raster**: encoded image bytes, keyed by the source digest (plus
//!    the linked file's digest when the image lives next to the source);
//! 2. the **object list**: annotations filtered by size, with labels mapped to
//!    category ids, keyed by the source digest, the raster digest and the
//!    settings that shaped the list (size band and palette).
//!
//! The record's own digest is the digest of the raster bytes, so a change in
//! how sources are rasterized invalidates everything downstream. Editing the
//! shapes of a source changes its digest and with it the object-list key.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::{ArtifactCache, ArtifactKind, ObjectList, RasterBytes};
use crate::error::PrepError;
use crate::hash::{digest_bytes, digest_file, digest_parts};
use crate::ir::{DetectionObject, DetectionRecord, Digest, Palette, RasterSource, SourceRecord};
use crate::pipeline::RecordFailure;

fn default_max() -> f64 {
    f64::INFINITY
}

/// Accepted object sizes, `[min, max)`, measured as the longer side of the
/// minimum-area rotated rectangle around the object.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeBand {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
}

impl Default for SizeBand {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: f64::INFINITY,
        }
    }
}

impl SizeBand {
    pub fn new(min: f64, max: f64) -> Result<Self, PrepError> {
        let band = Self { min, max };
        band.validate()?;
        Ok(band)
    }

    pub fn validate(&self) -> Result<(), PrepError> {
        if !self.min.is_finite() || self.min < 0.0 || self.max.is_nan() || self.max <= self.min {
            return Err(PrepError::InvalidConfig(format!(
                "object_size [{}, {}) is not a valid size band",
                self.min, self.max
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, width: f64) -> bool {
        self.min <= width && width < self.max
    }
}

/// Builds [`DetectionRecord`]s against a shared cache.
pub struct DetectionBuilder<'a> {
    cache: &'a ArtifactCache,
    palette: &'a Palette,
    band: SizeBand,
    settings: Digest,
}

impl<'a> DetectionBuilder<'a> {
    pub fn new(cache: &'a ArtifactCache, palette: &'a Palette, band: SizeBand) -> Self {
        let settings = digest_parts([
            band.min.to_le_bytes().as_slice(),
            band.max.to_le_bytes().as_slice(),
            palette.fingerprint().as_str().as_bytes(),
        ]);
        Self {
            cache,
            palette,
            band,
            settings,
        }
    }

    /// Cache key of the raster artifact of a source.
    ///
    /// Embedded images are covered by the source digest. A linked image is
    /// digested on every call, so replacing the file yields a new key.
    ///
    /// # Errors
    /// Returns [`PrepError::SourceRead`] when a linked image cannot be read.
    pub fn raster_key(source: &SourceRecord) -> Result<Digest, PrepError> {
        match &source.raster {
            RasterSource::Embedded { .. } => Ok(source.digest.clone()),
            RasterSource::Linked(path) => {
                let linked = digest_file(path)?;
                Ok(digest_parts([
                    source.digest.as_str().as_bytes(),
                    linked.as_str().as_bytes(),
                ]))
            }
        }
    }

    /// Cache key of the object list extracted from a source.
    pub fn object_list_key(&self, source_digest: &Digest, raster_digest: &Digest) -> Digest {
        digest_parts([
            source_digest.as_str().as_bytes(),
            raster_digest.as_str().as_bytes(),
            self.settings.as_str().as_bytes(),
        ])
    }

    /// Builds the record for one source, populating the cache on first sight.
    ///
    /// # Errors
    /// - [`PrepError::SourceRead`] / [`PrepError::ImageDecode`] when the
    ///   raster payload cannot be loaded or is not an image;
    /// - cache errors ([`PrepError::CacheCorruption`], [`PrepError::CacheDir`]).
    pub fn build(&self, source: &SourceRecord) -> Result<DetectionRecord, PrepError> {
        let raster_key = Self::raster_key(source)?;
        let raster: RasterBytes = self.cache.get_or_compute(&raster_key, || {
            let bytes = source.raster.load_bytes()?;
            image::guess_format(&bytes).map_err(|e| PrepError::ImageDecode {
                path: source.path.clone(),
                source: e,
            })?;
            Ok(RasterBytes(bytes))
        })?;
        let digest = digest_bytes(&raster.0);

        let (width, height) = match imagesize::blob_size(&raster.0) {
            Ok(size) => (size.width as u32, size.height as u32),
            Err(e) => {
                log::warn!(
                    "{}: cannot read raster size ({e}); using declared {}x{}",
                    source.path.display(),
                    source.width,
                    source.height
                );
                (source.width, source.height)
            }
        };

        let objects: ObjectList = self
            .cache
            .get_or_compute(&self.object_list_key(&source.digest, &digest), || {
                Ok(self.extract_objects(source))
            })?;

        Ok(DetectionRecord {
            file_name: self.cache.path_for(ArtifactKind::Raster, &raster_key),
            height,
            width,
            image_id: source.stem(),
            digest,
            original_source: source.path.clone(),
            annotations: objects.0,
            tile: None,
        })
    }

    /// Builds all records in parallel.
    ///
    /// Per-record failures are collected; the first run-level failure (cache
    /// corruption, unusable cache directory) aborts.
    pub fn build_all(
        &self,
        sources: &[SourceRecord],
    ) -> Result<(Vec<DetectionRecord>, Vec<RecordFailure>), PrepError> {
        let results: Vec<Result<DetectionRecord, PrepError>> =
            sources.par_iter().map(|s| self.build(s)).collect();

        let mut records = Vec::with_capacity(sources.len());
        let mut failures = Vec::new();
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(record) => {
                    log::info!(
                        "{} -> {} objects ({})",
                        source.path.display(),
                        record.annotations.len(),
                        record.digest.short()
                    );
                    records.push(record);
                }
                Err(e) if e.is_per_record() => {
                    log::error!("{e}");
                    failures.push(RecordFailure::new(&source.path, &e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok((records, failures))
    }

    fn extract_objects(&self, source: &SourceRecord) -> ObjectList {
        let mut out = Vec::with_capacity(source.annotations.len());
        for ann in &source.annotations {
            if !self.band.contains(ann.rot_rect_width) {
                log::debug!(
                    "{}: dropping object of width {:.1} outside size band",
                    source.path.display(),
                    ann.rot_rect_width
                );
                continue;
            }
            match self.palette.category_id(&ann.label) {
                Ok(id) => out.push(DetectionObject::new(ann.bbox, &ann.polygon, id)),
                Err(e) => log::warn!("{}: skipping annotation: {e}", source.path.display()),
            }
        }
        ObjectList(out)
    }
}
