//! Content-addressed artifact cache.
//!
//! Every artifact lives in a flat directory under the name
//! `{digest}.{kind suffix}`. Entries are published atomically: the payload is
//! written to a temporary file inside the cache directory and renamed into
//! place, so a reader sees either nothing or a complete file. Two workers
//! racing on the same key both write identical bytes and the last rename
//! wins.
//!
//! A hit whose bytes fail to decode is reported as
//! [`PrepError::CacheCorruption`] and never silently recomputed.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::PrepError;
use crate::ir::{DetectionObject, Digest};

/// The kinds of artifact the pipeline caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Encoded raster image extracted from an annotated source.
    Raster,
    /// Filtered, category-resolved object list of one image.
    ObjectList,
}

impl ArtifactKind {
    /// File-name suffix for this kind.
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Raster => "raster",
            ArtifactKind::ObjectList => "objects.json.gz",
        }
    }
}

/// A value that can be stored in the [`ArtifactCache`].
pub trait Artifact: Sized {
    const KIND: ArtifactKind;

    fn encode(&self) -> io::Result<Vec<u8>>;

    /// Decodes stored bytes; the error message ends up in
    /// [`PrepError::CacheCorruption`].
    fn decode(bytes: &[u8]) -> Result<Self, String>;
}

/// Encoded image bytes, stored as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterBytes(pub Vec<u8>);

impl Artifact for RasterBytes {
    const KIND: ArtifactKind = ArtifactKind::Raster;

    fn encode(&self) -> io::Result<Vec<u8>> {
        Ok(self.0.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, String> {
        image::guess_format(bytes).map_err(|e| format!("not an image: {e}"))?;
        Ok(Self(bytes.to_vec()))
    }
}

/// Detection objects of one image, stored as gzip-compressed JSON.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectList(pub Vec<DetectionObject>);

impl Artifact for ObjectList {
    const KIND: ArtifactKind = ArtifactKind::ObjectList;

    fn encode(&self) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer(&mut encoder, &self.0)?;
        encoder.finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, String> {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|e| format!("gzip: {e}"))?;
        serde_json::from_slice(&json)
            .map(Self)
            .map_err(|e| format!("json: {e}"))
    }
}

/// Hit/miss counts of one cache instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// A flat, content-addressed cache directory.
#[derive(Debug)]
pub struct ArtifactCache {
    dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ArtifactCache {
    /// Opens (creating if needed) a cache directory.
    ///
    /// # Errors
    /// Returns [`PrepError::CacheDir`] if the directory cannot be created or
    /// the path exists but is not a directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PrepError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| PrepError::CacheDir {
            path: dir.clone(),
            source,
        })?;
        let meta = fs::metadata(&dir).map_err(|source| PrepError::CacheDir {
            path: dir.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(PrepError::CacheDir {
                path: dir,
                source: io::Error::new(io::ErrorKind::Other, "not a directory"),
            });
        }
        Ok(Self {
            dir,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artifact of `kind` for `key` is (or would be) stored.
    pub fn path_for(&self, kind: ArtifactKind, key: &Digest) -> PathBuf {
        self.dir.join(format!("{}.{}", key.as_str(), kind.suffix()))
    }

    /// Returns the cached artifact for `key`, computing and publishing it on
    /// a miss.
    ///
    /// The computed value is returned directly; the freshly written file is
    /// not read back.
    ///
    /// # Errors
    /// - [`PrepError::CacheCorruption`] when an existing entry fails to decode;
    /// - [`PrepError::CacheDir`] when the entry cannot be read or published;
    /// - any error returned by `compute`.
    pub fn get_or_compute<A, F>(&self, key: &Digest, compute: F) -> Result<A, PrepError>
    where
        A: Artifact,
        F: FnOnce() -> Result<A, PrepError>,
    {
        let path = self.path_for(A::KIND, key);
        match fs::read(&path) {
            Ok(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("cache hit {}", path.display());
                A::decode(&bytes).map_err(|message| PrepError::CacheCorruption { path, message })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                log::debug!("cache miss {}", path.display());
                let value = compute()?;
                self.publish(&path, &value.encode()?)?;
                Ok(value)
            }
            Err(source) => Err(PrepError::CacheDir { path, source }),
        }
    }

    /// Whether an entry exists, without touching the counters.
    pub fn contains(&self, kind: ArtifactKind, key: &Digest) -> bool {
        self.path_for(kind, key).is_file()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn publish(&self, path: &Path, bytes: &[u8]) -> Result<(), PrepError> {
        let cache_err = |source: io::Error| PrepError::CacheDir {
            path: path.to_path_buf(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(cache_err)?;
        tmp.write_all(bytes).map_err(cache_err)?;
        tmp.as_file().sync_all().map_err(cache_err)?;
        tmp.persist(path).map_err(|e| cache_err(e.error))?;
        Ok(())
    }
}
