//! End-to-end runs: scan a directory, build records, split, tile.
//!
//! Both tasks follow the same shape. Sources are discovered with
//! [`scan_sources`] and read in parallel; a source that cannot be read is
//! recorded as a [`RecordFailure`] and the run continues. Configuration and
//! cache failures abort the run.

use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::cache::{ArtifactCache, CacheStats};
use crate::config::PrepConfig;
use crate::detection::DetectionBuilder;
use crate::error::PrepError;
use crate::ir::io_svg::{read_session_svg, read_source_svg};
use crate::ir::{DetectionRecord, SourceRecord};
use crate::pairs::{build_session_pairs, PairCandidate, PairRecord, Session, SessionPairs};
use crate::split::{partition, Partition};
use crate::tiling::tile_validation;

/// A source skipped because of a per-record error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub path: PathBuf,
    pub message: String,
}

impl RecordFailure {
    pub fn new(path: &Path, err: &PrepError) -> Self {
        Self {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Which preparation a report describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    #[default]
    Detection,
    Pairs,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Detection => write!(f, "detection"),
            Task::Pairs => write!(f, "pairs"),
        }
    }
}

/// Summary of one run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PrepReport {
    pub task: Task,
    /// Source files found.
    pub sources: usize,
    /// Records (or pairs) in each partition, after tiling.
    pub train: usize,
    pub validation: usize,
    /// Validation records produced by the tiler.
    pub tiles: usize,
    /// Objects across all emitted detection records.
    pub objects: usize,
    pub positives: usize,
    pub negatives: usize,
    /// Pairs dropped by the IOU ceiling.
    pub discarded: usize,
    pub cache: CacheStats,
    pub failures: Vec<RecordFailure>,
}

impl PrepReport {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            ..Default::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl fmt::Display for PrepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {} sources -> {} train, {} validation",
            self.sources, self.train, self.validation
        )?;
        match self.task {
            Task::Detection => {
                writeln!(f, "  {} objects, {} tiles", self.objects, self.tiles)?;
                writeln!(
                    f,
                    "  cache: {} hits, {} misses",
                    self.cache.hits, self.cache.misses
                )?;
            }
            Task::Pairs => {
                writeln!(
                    f,
                    "  {} positive, {} negative, {} discarded (iou above ceiling)",
                    self.positives, self.negatives, self.discarded
                )?;
            }
        }

        if self.has_failures() {
            writeln!(f)?;
            writeln!(f, "Failures ({}):", self.failures.len())?;
            for failure in &self.failures {
                writeln!(f, "  - {}", failure.message)?;
            }
        }
        Ok(())
    }
}

/// Detection records by partition, plus the run report.
#[derive(Clone, Debug, Serialize)]
pub struct DetectionOutput {
    pub train: Vec<DetectionRecord>,
    pub validation: Vec<DetectionRecord>,
    pub report: PrepReport,
}

/// Pair records by partition, plus the run report.
#[derive(Clone, Debug, Serialize)]
pub struct PairsOutput {
    pub train: Vec<PairRecord>,
    pub validation: Vec<PairRecord>,
    pub report: PrepReport,
}

/// Finds every `.svg` file under `root`, sorted by path.
///
/// # Errors
/// Returns [`PrepError::SourceRead`] if the directory cannot be traversed.
pub fn scan_sources(root: &Path) -> Result<Vec<PathBuf>, PrepError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| PrepError::SourceRead {
            path: root.to_path_buf(),
            message: format!("failed while traversing directory: {source}"),
        })?;

        if entry.file_type().is_file() && has_svg_extension(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn has_svg_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"))
}

/// Reads source SVGs in parallel, in input order.
pub fn read_sources(paths: &[PathBuf]) -> (Vec<SourceRecord>, Vec<RecordFailure>) {
    let results: Vec<_> = paths.par_iter().map(|p| read_source_svg(p)).collect();

    let mut sources = Vec::with_capacity(paths.len());
    let mut failures = Vec::new();
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(source) => sources.push(source),
            Err(e) => {
                log::error!("{e}");
                failures.push(RecordFailure::new(path, &e));
            }
        }
    }
    (sources, failures)
}

/// Runs the detection preparation over every source under `root`.
///
/// Records are split by digest; oversized validation records are tiled.
pub fn prepare_detection(root: &Path, config: &PrepConfig) -> Result<DetectionOutput, PrepError> {
    let palette = config.palette()?;
    let threshold = config.split_threshold()?;
    let cache = ArtifactCache::open(&config.cache_dir)?;

    let paths = scan_sources(root)?;
    log::info!("found {} sources under {}", paths.len(), root.display());
    let (sources, mut failures) = read_sources(&paths);

    let builder = DetectionBuilder::new(&cache, &palette, config.object_size);
    let (records, build_failures) = builder.build_all(&sources)?;
    failures.extend(build_failures);

    let split = partition(records, &threshold);
    let validation = tile_validation(split.validation, config.tile_size);

    let report = PrepReport {
        sources: paths.len(),
        train: split.train.len(),
        validation: validation.len(),
        tiles: validation.iter().filter(|r| r.tile.is_some()).count(),
        objects: split
            .train
            .iter()
            .chain(&validation)
            .map(|r| r.annotations.len())
            .sum(),
        cache: cache.stats(),
        failures,
        ..PrepReport::new(Task::Detection)
    };
    log::info!(
        "detection: {} train, {} validation records",
        report.train,
        report.validation
    );

    Ok(DetectionOutput {
        train: split.train,
        validation,
        report,
    })
}

fn load_session_pairs(path: &Path, max_iou: f64) -> Result<SessionPairs, PrepError> {
    let session = Session::from_source(read_session_svg(path)?)?;
    let pairs = build_session_pairs(&session, max_iou);
    log::info!(
        "{}: {} positive, {} negative, {} discarded",
        path.display(),
        pairs.positives(),
        pairs.negatives(),
        pairs.discarded
    );
    Ok(pairs)
}

/// Runs the pair preparation over every session SVG under `root`.
///
/// `on_candidate` sees every surviving candidate with its partition before it
/// is reduced to a [`PairRecord`]; use it to render views.
pub fn prepare_pairs<F>(
    root: &Path,
    config: &PrepConfig,
    on_candidate: F,
) -> Result<PairsOutput, PrepError>
where
    F: Fn(&PairCandidate, Partition) -> Result<(), PrepError> + Sync,
{
    let threshold = config.split_threshold()?;
    let paths = scan_sources(root)?;
    log::info!("found {} sessions under {}", paths.len(), root.display());

    let results: Vec<_> = paths
        .par_iter()
        .map(|p| load_session_pairs(p, config.max_iou))
        .collect();

    let mut report = PrepReport {
        sources: paths.len(),
        ..PrepReport::new(Task::Pairs)
    };
    let mut train = Vec::new();
    let mut validation = Vec::new();
    for (path, result) in paths.iter().zip(results) {
        let pairs = match result {
            Ok(pairs) => pairs,
            Err(e) if e.is_per_record() => {
                log::error!("{e}");
                report.failures.push(RecordFailure::new(path, &e));
                continue;
            }
            Err(e) => return Err(e),
        };
        report.positives += pairs.positives();
        report.negatives += pairs.negatives();
        report.discarded += pairs.discarded;

        let split = partition(pairs.candidates, &threshold);
        for (side, out, partition) in [
            (split.train, &mut train, Partition::Train),
            (split.validation, &mut validation, Partition::Validation),
        ] {
            for candidate in side {
                on_candidate(&candidate, partition)?;
                out.push(PairRecord::new(path, &candidate));
            }
        }
    }

    report.train = train.len();
    report.validation = validation.len();
    log::info!(
        "pairs: {} positive, {} negative, discarded {} above max_iou",
        report.positives,
        report.negatives,
        report.discarded
    );

    Ok(PairsOutput {
        train,
        validation,
        report,
    })
}
