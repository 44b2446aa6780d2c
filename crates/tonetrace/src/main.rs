//! tonetrace: turn an image file into layered flat-color vector paths.
//!
//! Decodes the image, composites it over white, runs the vectorization
//! pipeline on a worker thread, and writes the resulting document as
//! JSON. Useful for:
//!
//! - Comparing palette strategies (`dominant` vs `spread`)
//! - Tuning simplification and curve tolerances
//! - Switching between filled outlines and stroked centerlines
//! - Inspecting per-stage and per-layer diagnostics
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin tonetrace -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tonetrace_pipeline::{FillStrategy, VectorizeConfig, raster};
use tonetrace_worker::{VectorizeOutput, VectorizeWorker, WorkerError, WorkerEvent, WorkerRequest};

/// Convert a raster image into K flat-color vector layers.
///
/// Writes the document (layers lightest first, each with its color and
/// path data) as pretty-printed JSON.
#[derive(Parser)]
#[command(name = "tonetrace", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Number of color layers (2-8).
    #[arg(long, short = 'k', default_value_t = VectorizeConfig::DEFAULT_COLOR_STEPS, value_parser = clap::value_parser!(u8).range(2..=8))]
    color_steps: u8,

    /// How palette colors are picked from the quantized color boxes.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_STRATEGY)]
    fill_strategy: Strategy,

    /// Emit stroked centerlines instead of filled outlines.
    #[arg(long)]
    stroke: bool,

    /// Stroke width in pixels (with `--stroke`).
    #[arg(long, default_value_t = VectorizeConfig::DEFAULT_STROKE_WIDTH)]
    stroke_width: f64,

    /// Maximum paths kept per layer, largest first.
    #[arg(long, default_value_t = VectorizeConfig::DEFAULT_MAX_PATHS_PER_LAYER, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_paths: usize,

    /// Multiplier on the adaptive simplification tolerance.
    #[arg(long, default_value_t = VectorizeConfig::DEFAULT_SIMPLIFY_SCALE)]
    simplify_scale: f64,

    /// Maximum curve deviation from the simplified outline, in pixels.
    #[arg(long, default_value_t = VectorizeConfig::DEFAULT_CURVE_TOLERANCE)]
    curve_tolerance: f64,

    /// Full vectorize config as a JSON string.
    ///
    /// When provided, all other config flags are ignored. Missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the document to this file instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Print the human-readable diagnostics report to stderr.
    #[arg(long)]
    diagnostics: bool,

    /// Stream every worker event to stdout as a JSON line instead of
    /// writing the document.
    #[arg(long, conflicts_with = "output")]
    events: bool,
}

/// Palette strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// Centroids of the K largest-variance color boxes.
    Dominant,
    /// Evenly spaced through an oversampled luminance-sorted box set.
    Spread,
    /// One box per equal-width luminance band.
    Mean,
    /// Same boxes as dominant.
    Median,
}

/// Maps a [`FillStrategy`] to the local CLI [`Strategy`] enum.
const fn strategy_from_pipeline(s: FillStrategy) -> Strategy {
    match s {
        FillStrategy::Dominant => Strategy::Dominant,
        FillStrategy::Spread => Strategy::Spread,
        FillStrategy::Mean => Strategy::Mean,
        FillStrategy::Median => Strategy::Median,
    }
}

/// The CLI default strategy, derived from
/// [`VectorizeConfig::DEFAULT_FILL_STRATEGY`] so the two cannot diverge.
const CLI_DEFAULT_STRATEGY: Strategy = strategy_from_pipeline(VectorizeConfig::DEFAULT_FILL_STRATEGY);

/// Build a [`VectorizeConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual config flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<VectorizeConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        VectorizeConfig {
            color_steps: cli.color_steps,
            fill_strategy: match cli.fill_strategy {
                Strategy::Dominant => FillStrategy::Dominant,
                Strategy::Spread => FillStrategy::Spread,
                Strategy::Mean => FillStrategy::Mean,
                Strategy::Median => FillStrategy::Median,
            },
            stroke_mode: cli.stroke,
            stroke_width: cli.stroke_width,
            max_paths_per_layer: cli.max_paths,
            simplify_scale: cli.simplify_scale,
            curve_tolerance: cli.curve_tolerance,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let decoded = match image::open(&cli.image_path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let image = raster::composite_over_white(&decoded);
    log::info!(
        "{}: {}x{}, {} layers, {}",
        cli.image_path.display(),
        image.width(),
        image.height(),
        config.color_steps,
        if config.stroke_mode { "stroke" } else { "fill" },
    );

    let worker = match VectorizeWorker::spawn(WorkerRequest::from_image(0, image, config)) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.events {
        return stream_events(&worker);
    }

    let output = match worker.wait(|p| log::info!("{:>3}% {}", p.percentage, p.detail)) {
        Ok(output) => output,
        Err(WorkerError::Pipeline(e)) => {
            eprintln!("Pipeline error: {e}");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.diagnostics {
        eprintln!("{}", output.diagnostics.report());
    }
    write_document(&cli, &output)
}

/// Print every worker event as one JSON line.
fn stream_events(worker: &VectorizeWorker) -> ExitCode {
    let mut stdout = std::io::stdout().lock();
    let mut status = ExitCode::FAILURE;
    for event in worker.events() {
        if let WorkerEvent::Finished { ref result, .. } = event {
            status = if result.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
        let line = match event.to_json() {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error serializing event: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = writeln!(stdout, "{line}") {
            eprintln!("Error writing event: {e}");
            return ExitCode::FAILURE;
        }
    }
    status
}

/// Write the document as pretty JSON to `--output` or stdout.
fn write_document(cli: &Cli, output: &VectorizeOutput) -> ExitCode {
    let json = match serde_json::to_string_pretty(&output.document) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error serializing document: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.output {
        Some(ref path) => match std::fs::write(path, &json) {
            Ok(()) => {
                log::info!(
                    "{} paths written to {} ({} bytes)",
                    output.document.path_count(),
                    path.display(),
                    json.len(),
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error writing {}: {e}", path.display());
                ExitCode::FAILURE
            }
        },
        None => {
            println!("{json}");
            ExitCode::SUCCESS
        }
    }
}
