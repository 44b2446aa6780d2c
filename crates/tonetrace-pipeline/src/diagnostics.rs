//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for tuning.
//! [`vectorize_with_diagnostics`](crate::vectorize_with_diagnostics)
//! collects them alongside the document; [`vectorize`](crate::vectorize)
//! discards them.
//!
//! Time is read through the [`Clock`] trait so callers (and tests) choose
//! the time source. [`SystemClock`] uses the `web-time` crate, which maps
//! to `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Color;

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single vectorization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Perceptual gray conversion.
    pub grayscale: StageDiagnostics,
    /// Palette selection.
    pub quantize: StageDiagnostics,
    /// Threshold distribution.
    pub thresholds: StageDiagnostics,
    /// Edge mask computation.
    pub edge_detection: StageDiagnostics,
    /// One entry per layer, lightest first.
    pub layers: Vec<LayerDiagnostics>,
    /// Total wall-clock duration of the entire run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    Grayscale {
        width: u32,
        height: u32,
    },
    Quantize {
        /// Strategy name, e.g. `Dominant`.
        strategy: String,
        /// Selected colors, lightest first.
        colors: Vec<Color>,
    },
    Thresholds {
        /// Cut values, ascending.
        values: Vec<u8>,
    },
    EdgeDetection {
        /// Number of pixels on the edge mask.
        edge_pixel_count: u64,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
}

/// Metrics for one color layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDiagnostics {
    /// Position in painter's order (0 = lightest).
    pub index: usize,
    pub color: Color,
    /// Gray cutoff, or `None` for the background layer.
    pub cutoff: Option<u8>,
    /// Wall-clock duration of this layer (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Foreground pixels after binarization (and thinning in stroke mode).
    pub foreground_pixels: u64,
    /// Contours returned by the tracer.
    pub traced_contours: usize,
    /// Contours left after the per-layer cap.
    pub kept_contours: usize,
    /// Contour points before simplification.
    pub points_before: usize,
    /// Contour points after simplification.
    pub points_after: usize,
    /// Shapes skipped for degenerate geometry.
    pub skipped_shapes: usize,
    /// Paths dropped as exact duplicates.
    pub duplicate_paths: usize,
    /// Paths emitted for this layer.
    pub path_count: usize,
}

impl LayerDiagnostics {
    /// Diagnostics for a layer that emits nothing.
    #[must_use]
    pub const fn background(index: usize, color: Color, duration: Duration) -> Self {
        Self {
            index,
            color,
            cutoff: None,
            duration,
            foreground_pixels: 0,
            traced_contours: 0,
            kept_contours: 0,
            points_before: 0,
            points_after: 0,
            skipped_shapes: 0,
            duplicate_paths: 0,
            path_count: 0,
        }
    }
}

/// High-level summary counts for the entire run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub image_width: u32,
    pub image_height: u32,
    pub pixel_count: u64,
    pub layer_count: usize,
    pub path_count: usize,
    /// Coordinate points across all emitted path commands.
    pub point_count: usize,
    pub duplicate_paths: usize,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let pct = |d: Duration| {
            if total_ms > 0.0 {
                duration_ms(d) / total_ms * 100.0
            } else {
                0.0
            }
        };

        let stages = [
            ("Grayscale", &self.grayscale),
            ("Quantize", &self.quantize),
            ("Thresholds", &self.thresholds),
            ("Edge Detection", &self.edge_detection),
        ];
        for (name, diag) in stages {
            let details = format_metrics(&diag.metrics);
            lines.push(format!(
                "{name:<24} {:>8.3}ms {:>9.1}%  {details}",
                duration_ms(diag.duration),
                pct(diag.duration),
            ));
        }

        for layer in &self.layers {
            let name = format!("Layer {} {}", layer.index, hex(layer.color));
            let details = layer.cutoff.map_or_else(
                || "background".to_string(),
                |cutoff| {
                    format!(
                        "cutoff={cutoff} fg={} contours={}->{} pts={}->{} skipped={} dup={} paths={}",
                        layer.foreground_pixels,
                        layer.traced_contours,
                        layer.kept_contours,
                        layer.points_before,
                        layer.points_after,
                        layer.skipped_shapes,
                        layer.duplicate_paths,
                        layer.path_count,
                    )
                },
            );
            lines.push(format!(
                "{name:<24} {:>8.3}ms {:>9.1}%  {details}",
                duration_ms(layer.duration),
                pct(layer.duration),
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Layers: {}  |  Paths: {}  |  Points: {}  |  Duplicates dropped: {}",
            self.summary.layer_count,
            self.summary.path_count,
            self.summary.point_count,
            self.summary.duplicate_paths,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn hex(c: Color) -> String {
    format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Grayscale { width, height } => format!("{width}x{height}"),
        StageMetrics::Quantize { strategy, colors } => {
            let colors: Vec<String> = colors.iter().copied().map(hex).collect();
            format!("{strategy} [{}]", colors.join(" "))
        }
        StageMetrics::Thresholds { values } => format!("{values:?}"),
        StageMetrics::EdgeDetection {
            edge_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixel_count > 0 {
                *edge_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!("edges={edge_pixel_count} ({density:.1}%)")
        }
    }
}
