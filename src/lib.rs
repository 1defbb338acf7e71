//! Trapset: dataset preparation for sticky-trap insect detection and matching.
//!
//! Trapset turns annotated trap photographs (SVG drawings over a raster) into
//! training-ready records. It hashes every input, caches the expensive
//! extraction steps under content digests, splits the corpus into training and
//! validation sets without a manifest, tiles oversized validation images, and
//! builds candidate pairs for the frame-to-frame matching task.
//!
//! # Modules
//!
//! - [`ir`]: Data model plus SVG and JSON I/O
//! - [`hash`]: Content digests
//! - [`geometry`]: Areas, IOU, translation, image padding
//! - [`cache`]: Content-addressed artifact cache
//! - [`split`]: Deterministic train/validation partitioning
//! - [`detection`]: Source records to detection records
//! - [`tiling`]: Tiling of oversized validation images
//! - [`pairs`]: Candidate pairs for the matching task
//! - [`pipeline`]: Directory-level runs and their reports
//! - [`config`]: YAML configuration
//! - [`preview`]: Overlays for manual inspection
//! - [`error`]: Error types

pub mod cache;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod hash;
pub mod ir;
pub mod pairs;
pub mod pipeline;
pub mod preview;
pub mod split;
pub mod tiling;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

pub use error::PrepError;

/// The trapset CLI application.
#[derive(Parser)]
#[command(name = "trapset")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Build detection records from a directory of annotated SVGs.
    PrepareDetection(PrepareArgs),
    /// Build matching pairs from a directory of session SVGs.
    PreparePairs(PreparePairsArgs),
    /// Print the partition of every SVG under a directory.
    Split(SplitArgs),
    /// Print the content digest of files.
    Digest(DigestArgs),
    /// Render the objects of one annotated SVG over its image.
    Preview(PreviewArgs),
}

/// Run summary format.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args)]
struct PrepareArgs {
    /// Directory of annotated SVGs (searched recursively).
    input: PathBuf,

    /// YAML configuration file.
    #[arg(short, long, env = "TRAPSET_CONFIG")]
    config: PathBuf,

    /// Output JSON file.
    #[arg(short, long)]
    output: PathBuf,

    /// Format of the summary printed to stdout.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(clap::Args)]
struct PreparePairsArgs {
    #[command(flatten)]
    common: PrepareArgs,

    /// Also write a PNG strip of the three views of every pair here.
    #[arg(long)]
    views: Option<PathBuf>,
}

#[derive(clap::Args)]
struct SplitArgs {
    /// Directory of SVGs (searched recursively).
    input: PathBuf,

    /// Hex threshold; digests sorting after it go to validation.
    #[arg(long, conflicts_with = "fraction")]
    threshold: Option<String>,

    /// Fraction of the digest space assigned to validation.
    #[arg(long)]
    fraction: Option<f64>,
}

#[derive(clap::Args)]
struct DigestArgs {
    /// Files to digest.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(clap::Args)]
struct PreviewArgs {
    /// Annotated SVG to render.
    input: PathBuf,

    /// YAML configuration file.
    #[arg(short, long, env = "TRAPSET_CONFIG")]
    config: PathBuf,

    /// Output PNG file.
    #[arg(short, long)]
    output: PathBuf,
}

/// Run the trapset CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), PrepError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::PrepareDetection(args)) => run_prepare_detection(args),
        Some(Commands::PreparePairs(args)) => run_prepare_pairs(args),
        Some(Commands::Split(args)) => run_split(args),
        Some(Commands::Digest(args)) => run_digest(args),
        Some(Commands::Preview(args)) => run_preview(args),
        None => {
            println!("trapset {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Dataset preparation for sticky-trap insect detection and matching.");
            println!();
            println!("Run 'trapset --help' for usage information.");
            Ok(())
        }
    }
}

fn print_report(report: &pipeline::PrepReport, format: ReportFormat) -> Result<(), PrepError> {
    match format {
        ReportFormat::Text => {
            println!("Prepared {}:", report.task);
            print!("{report}");
        }
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(report).map_err(|source| {
                PrepError::OutputWrite {
                    path: PathBuf::from("<stdout>"),
                    source,
                }
            })?;
            println!("{json}");
        }
    }
    Ok(())
}

fn run_prepare_detection(args: PrepareArgs) -> Result<(), PrepError> {
    let config = config::PrepConfig::load(&args.config)?;
    let output = pipeline::prepare_detection(&args.input, &config)?;
    ir::io_json::write_json(&args.output, &output)?;
    print_report(&output.report, args.report)
}

fn run_prepare_pairs(args: PreparePairsArgs) -> Result<(), PrepError> {
    let config = config::PrepConfig::load(&args.common.config)?;
    if let Some(dir) = &args.views {
        fs::create_dir_all(dir)?;
    }

    let views_dir = args.views.as_deref();
    let output = pipeline::prepare_pairs(&args.common.input, &config, |candidate, part| {
        let Some(dir) = views_dir else {
            return Ok(());
        };
        write_pair_strip(dir, candidate, part, config.pair_view_dim)
    })?;

    ir::io_json::write_json(&args.common.output, &output)?;
    print_report(&output.report, args.common.report)
}

fn write_pair_strip(
    dir: &Path,
    candidate: &pairs::PairCandidate,
    part: split::Partition,
    dim: u32,
) -> Result<(), PrepError> {
    let strip = preview::render_pair_strip(&candidate.views(dim)?);
    let (i, j) = candidate.indices;
    let path = dir.join(format!(
        "{part}_{}_{i}_{j}_{}.png",
        candidate.digest.short(),
        candidate.label.as_u8()
    ));
    strip
        .save(&path)
        .map_err(|source| PrepError::ImageWrite { path, source })
}

fn run_split(args: SplitArgs) -> Result<(), PrepError> {
    let threshold = match (args.threshold, args.fraction) {
        (Some(hex), _) => split::SplitThreshold::new(&hex)?,
        (None, Some(fraction)) => split::SplitThreshold::from_validation_fraction(fraction)?,
        (None, None) => {
            split::SplitThreshold::from_validation_fraction(config::DEFAULT_VALIDATION_FRACTION)?
        }
    };

    let mut counts = [0usize; 2];
    for path in pipeline::scan_sources(&args.input)? {
        let digest = hash::digest_file(&path)?;
        let part = split::assign(&digest, &threshold);
        counts[(part == split::Partition::Validation) as usize] += 1;
        println!("{digest}  {part:<10}  {}", path.display());
    }
    println!();
    println!(
        "threshold {threshold}: {} train, {} validation",
        counts[0], counts[1]
    );
    Ok(())
}

fn run_digest(args: DigestArgs) -> Result<(), PrepError> {
    for path in &args.files {
        println!("{}  {}", hash::digest_file(path)?, path.display());
    }
    Ok(())
}

fn run_preview(args: PreviewArgs) -> Result<(), PrepError> {
    let config = config::PrepConfig::load(&args.config)?;
    let palette = config.palette()?;
    let cache = cache::ArtifactCache::open(&config.cache_dir)?;

    let source = ir::io_svg::read_source_svg(&args.input)?;
    let builder = detection::DetectionBuilder::new(&cache, &palette, config.object_size);
    let record = builder.build(&source)?;

    let bytes = fs::read(&record.file_name)?;
    let raster = image::load_from_memory(&bytes)
        .map_err(|source| PrepError::ImageDecode {
            path: record.file_name.clone(),
            source,
        })?
        .to_rgb8();
    let overlay = preview::render_overlay(&raster, &record);
    overlay
        .save(&args.output)
        .map_err(|source| PrepError::ImageWrite {
            path: args.output.clone(),
            source,
        })?;

    println!(
        "Wrote {} ({} objects) to {}",
        record.image_id,
        record.annotations.len(),
        args.output.display()
    );
    Ok(())
}
