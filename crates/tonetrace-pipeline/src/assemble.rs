//! Layer assembly: runs the per-layer stages and builds the document.
//!
//! Palette and thresholds are computed once. Layers are then processed
//! strictly lightest to darkest and appended in that order, so darker
//! layers paint on top. The lightest layer is the background: its color
//! fills the canvas and it carries no paths. Every other layer runs
//! bitmap -> (thinning) -> tracing -> cap -> simplification -> curve
//! fitting, and drops any path whose command string was already emitted
//! in this layer or an earlier one.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::bitmap::{EdgeMask, build_layer_bitmap};
use crate::contour::{ContourTracer, ContourTracerKind, MIN_CONTOUR_POINTS, MIN_SKELETON_POINTS};
use crate::curve::{CurveSegment, fit_curve};
use crate::diagnostics::{
    Clock, LayerDiagnostics, PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics,
};
use crate::simplify::{adaptive_tolerance, simplify_contour};
use crate::types::{
    Color, Contour, Document, Layer, LumaImage, PathCommand, PathStyle, PipelineError, Point, Progress,
    RasterImage, ThresholdSet, VectorPath, VectorizeConfig,
};
use crate::{edge, luminance, quantize, raster, skeleton, threshold};

/// Progress after palette and thresholds are ready.
pub const QUANTIZE_PERCENT: u8 = 5;

/// Progress after the edge mask is ready.
pub const EDGES_PERCENT: u8 = 10;

/// Progress after the last layer.
pub const LAYERS_DONE_PERCENT: u8 = 95;

/// Receives progress checkpoints.
///
/// Returning [`ControlFlow::Break`] cancels the run: the pipeline stops
/// at that checkpoint and returns [`PipelineError::Cancelled`].
pub trait ProgressSink {
    fn report(&mut self, progress: Progress) -> ControlFlow<()>;
}

impl<F: FnMut(Progress) -> ControlFlow<()>> ProgressSink for F {
    fn report(&mut self, progress: Progress) -> ControlFlow<()> {
        self(progress)
    }
}

fn checkpoint<S: ProgressSink + ?Sized>(
    sink: &mut S,
    percentage: u8,
    detail: impl Into<String>,
) -> Result<(), PipelineError> {
    let progress = Progress {
        percentage,
        detail: detail.into(),
    };
    match sink.report(progress) {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(()) => {
            log::debug!("progress receiver stopped the run at {percentage}%");
            Err(PipelineError::Cancelled)
        }
    }
}

/// Progress after `done` of `total` layers, spread over 10..=95.
fn layer_percent(done: usize, total: usize) -> u8 {
    let span = usize::from(LAYERS_DONE_PERCENT - EDGES_PERCENT);
    let step = span * done / total.max(1);
    EDGES_PERCENT + u8::try_from(step).unwrap_or(LAYERS_DONE_PERCENT - EDGES_PERCENT)
}

/// Gray cutoff for layer `index` (0 = lightest), or `None` for the
/// background layer.
///
/// Layer `i >= 1` uses `thresholds[K-1-i]`, so the darkest layer gets
/// the lowest cutoff and covers the least area.
#[must_use]
pub fn layer_cutoff(thresholds: &ThresholdSet, index: usize) -> Option<u8> {
    if index == 0 {
        return None;
    }
    let values = thresholds.values();
    values
        .len()
        .checked_sub(index)
        .and_then(|i| values.get(i))
        .copied()
}

/// Vectorize an image, timing every stage with `clock`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an out-of-range config,
/// [`PipelineError::EmptyInput`] for a zero-sized image, and
/// [`PipelineError::Cancelled`] when `sink` breaks.
pub fn vectorize_with_diagnostics<C: Clock, S: ProgressSink + ?Sized>(
    image: &RasterImage,
    config: &VectorizeConfig,
    clock: &C,
    sink: &mut S,
) -> Result<(Document, PipelineDiagnostics), PipelineError> {
    config.validate()?;
    raster::ensure_non_empty(image)?;
    let (width, height) = image.dimensions();
    let pixel_count = u64::from(width) * u64::from(height);
    let k = usize::from(config.color_steps);
    let run_start = clock.now();

    let start = clock.now();
    let gray = luminance::gray_image(image);
    let grayscale = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Grayscale { width, height },
    };

    let start = clock.now();
    let palette = quantize::quantize(image, k, config.fill_strategy);
    let quantize = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Quantize {
            strategy: format!("{:?}", config.fill_strategy),
            colors: palette.entries().iter().map(|e| e.color).collect(),
        },
    };

    let start = clock.now();
    let thresholds = threshold::distribute(k);
    let thresholds_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Thresholds {
            values: thresholds.values().to_vec(),
        },
    };
    log::debug!(
        "palette of {} colors, thresholds {:?}",
        palette.len(),
        thresholds.values()
    );
    checkpoint(sink, QUANTIZE_PERCENT, format!("quantized to {k} colors"))?;

    let start = clock.now();
    let edges = edge::detect_edges(&gray);
    let edge_detection = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::EdgeDetection {
            edge_pixel_count: edges.count_foreground() as u64,
            total_pixel_count: pixel_count,
        },
    };
    checkpoint(sink, EDGES_PERCENT, "edges detected")?;

    let mut emitted: HashSet<String> = HashSet::new();
    let mut layers = Vec::with_capacity(palette.len());
    let mut layer_diags = Vec::with_capacity(palette.len());
    let total = palette.len();

    for (index, entry) in palette.entries().iter().enumerate() {
        let start = clock.now();
        let (paths, mut diag) = match layer_cutoff(&thresholds, index) {
            None => (
                Vec::new(),
                LayerDiagnostics::background(index, entry.color, Duration::ZERO),
            ),
            Some(cutoff) => {
                let mut builder = LayerBuilder::new(config, &mut emitted);
                let paths = builder.build(&gray, &edges, cutoff);
                (paths, builder.into_diagnostics(index, entry.color, cutoff))
            }
        };
        diag.duration = clock.elapsed(&start);
        diag.path_count = paths.len();
        log::debug!(
            "layer {index} {:?}: {} paths ({} duplicates, {} skipped)",
            entry.color,
            paths.len(),
            diag.duplicate_paths,
            diag.skipped_shapes,
        );
        layers.push(Layer {
            color: entry.color,
            paths,
        });
        layer_diags.push(diag);
        checkpoint(
            sink,
            layer_percent(index + 1, total),
            format!("layer {}/{total}", index + 1),
        )?;
    }

    let document = Document {
        width,
        height,
        layers,
    };
    let summary = PipelineSummary {
        image_width: width,
        image_height: height,
        pixel_count,
        layer_count: document.layers.len(),
        path_count: document.path_count(),
        point_count: document.paths().map(VectorPath::point_count).sum(),
        duplicate_paths: layer_diags.iter().map(|d| d.duplicate_paths).sum(),
    };
    log::info!(
        "vectorized {width}x{height} into {} layers, {} paths",
        summary.layer_count,
        summary.path_count,
    );
    checkpoint(sink, 100, "done")?;

    let diagnostics = PipelineDiagnostics {
        grayscale,
        quantize,
        thresholds: thresholds_diag,
        edge_detection,
        layers: layer_diags,
        total_duration: clock.elapsed(&run_start),
        summary,
    };
    Ok((document, diagnostics))
}

/// Per-layer state: the shared dedup set plus counters.
struct LayerBuilder<'a> {
    config: &'a VectorizeConfig,
    emitted: &'a mut HashSet<String>,
    foreground_pixels: u64,
    traced_contours: usize,
    kept_contours: usize,
    points_before: usize,
    points_after: usize,
    skipped_shapes: usize,
    duplicate_paths: usize,
}

impl<'a> LayerBuilder<'a> {
    fn new(config: &'a VectorizeConfig, emitted: &'a mut HashSet<String>) -> Self {
        Self {
            config,
            emitted,
            foreground_pixels: 0,
            traced_contours: 0,
            kept_contours: 0,
            points_before: 0,
            points_after: 0,
            skipped_shapes: 0,
            duplicate_paths: 0,
        }
    }

    fn build(&mut self, gray: &LumaImage, edges: &EdgeMask, cutoff: u8) -> Vec<VectorPath> {
        let bitmap = build_layer_bitmap(gray, f32::from(cutoff), edges);
        let (grid, min_points) = if self.config.stroke_mode {
            (skeleton::thin(&bitmap), MIN_SKELETON_POINTS)
        } else {
            (bitmap, MIN_CONTOUR_POINTS)
        };
        self.foreground_pixels = grid.count_foreground() as u64;
        if grid.is_blank() {
            return Vec::new();
        }

        let contours = ContourTracerKind::default().trace(&grid, min_points);
        self.traced_contours = contours.len();

        let candidates = if self.config.stroke_mode {
            self.stroke_paths(contours)
        } else {
            self.fill_paths(contours)
        };
        self.dedup(candidates)
    }

    /// Every contour becomes an open stroked centerline.
    fn stroke_paths(&mut self, mut contours: Vec<Contour>) -> Vec<VectorPath> {
        contours.truncate(self.config.max_paths_per_layer);
        self.kept_contours = contours.len();
        let style = PathStyle::Stroke {
            width: self.config.stroke_width,
        };
        contours
            .iter()
            .filter_map(|c| {
                let commands = self.contour_commands(c, false)?;
                Some(VectorPath::new(commands, style))
            })
            .collect()
    }

    /// Outer contours become filled paths; holes ride along as subpaths
    /// of the smallest outer that contains them.
    fn fill_paths(&mut self, contours: Vec<Contour>) -> Vec<VectorPath> {
        let (holes, mut outers): (Vec<Contour>, Vec<Contour>) =
            contours.into_iter().partition(Contour::is_hole);
        outers.truncate(self.config.max_paths_per_layer);
        self.kept_contours = outers.len();

        let mut children: Vec<Vec<&Contour>> = vec![Vec::new(); outers.len()];
        for hole in &holes {
            match smallest_container(&outers, hole) {
                Some(parent) => children[parent].push(hole),
                None => log::trace!("dropping hole of area {:.1} with no kept parent", hole.area),
            }
        }

        outers
            .iter()
            .zip(&children)
            .filter_map(|(outer, holes)| {
                let mut commands = self.contour_commands(outer, true)?;
                for hole in holes {
                    if let Some(sub) = self.contour_commands(hole, true) {
                        commands.extend(sub);
                    }
                }
                Some(VectorPath::new(commands, PathStyle::Fill))
            })
            .collect()
    }

    /// Simplify and fit one contour. `None` skips the shape.
    fn contour_commands(&mut self, contour: &Contour, close: bool) -> Option<Vec<PathCommand>> {
        self.points_before += contour.points.len();
        let tolerance = adaptive_tolerance(contour, self.config.simplify_scale);
        let simplified = simplify_contour(contour, tolerance);
        self.points_after += simplified.points.len();

        let mut points = simplified.points.into_points();
        let min_len = if simplified.closed { 3 } else { 2 };
        if points.len() < min_len || !points.iter().all(|p| p.is_finite()) {
            log::trace!("skipping degenerate contour with {} points", points.len());
            self.skipped_shapes += 1;
            return None;
        }
        let first = points[0];
        let closes = simplified.closed && close;
        if closes {
            points.push(first);
        }

        let segments = fit_curve(&points, self.config.curve_tolerance);
        if !segments.iter().all(segment_is_finite) {
            log::trace!("skipping contour with a non-finite fitted segment");
            self.skipped_shapes += 1;
            return None;
        }

        let mut commands = Vec::with_capacity(segments.len() + 2);
        commands.push(PathCommand::MoveTo(first));
        commands.extend(segments.into_iter().map(|s| match s {
            CurveSegment::Line { to } => PathCommand::LineTo(to),
            CurveSegment::Cubic { ctrl1, ctrl2, to } => PathCommand::CubicTo(ctrl1, ctrl2, to),
        }));
        if closes {
            commands.push(PathCommand::Close);
        }
        Some(commands)
    }

    /// Drop paths already seen in this layer, then paths emitted by any
    /// earlier layer.
    fn dedup(&mut self, candidates: Vec<VectorPath>) -> Vec<VectorPath> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(candidates.len());
        for path in candidates {
            if !seen.insert(path.d.clone()) || self.emitted.contains(&path.d) {
                self.duplicate_paths += 1;
                continue;
            }
            out.push(path);
        }
        self.emitted.extend(seen);
        out
    }

    fn into_diagnostics(self, index: usize, color: Color, cutoff: u8) -> LayerDiagnostics {
        LayerDiagnostics {
            index,
            color,
            cutoff: Some(cutoff),
            duration: Duration::ZERO,
            foreground_pixels: self.foreground_pixels,
            traced_contours: self.traced_contours,
            kept_contours: self.kept_contours,
            points_before: self.points_before,
            points_after: self.points_after,
            skipped_shapes: self.skipped_shapes,
            duplicate_paths: self.duplicate_paths,
            path_count: 0,
        }
    }
}

fn segment_is_finite(segment: &CurveSegment) -> bool {
    match *segment {
        CurveSegment::Line { to } => to.is_finite(),
        CurveSegment::Cubic { ctrl1, ctrl2, to } => {
            ctrl1.is_finite() && ctrl2.is_finite() && to.is_finite()
        }
    }
}

/// Index of the smallest closed outer whose polygon contains the hole's
/// first point.
fn smallest_container(outers: &[Contour], hole: &Contour) -> Option<usize> {
    let probe = *hole.points.first()?;
    outers
        .iter()
        .enumerate()
        .filter(|(_, o)| o.closed && contains(o.points.points(), probe))
        .min_by(|a, b| a.1.area.abs().total_cmp(&b.1.area.abs()))
        .map(|(i, _)| i)
}

/// Even-odd ray casting.
fn contains(polygon: &[Point], p: Point) -> bool {
    let n = polygon.len();
    let mut inside = false;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if (a.y > p.y) != (b.y > p.y) {
            let x = (b.x - a.x).mul_add((p.y - a.y) / (b.y - a.y), a.x);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::diagnostics::SystemClock;

    fn run(image: &RasterImage, config: &VectorizeConfig) -> (Document, PipelineDiagnostics) {
        vectorize_with_diagnostics(image, config, &SystemClock, &mut |_: Progress| ControlFlow::Continue(()))
            .unwrap()
    }

    fn frame_with_hole() -> RasterImage {
        RasterImage::from_fn(40, 40, |x, y| {
            let outer = (8..32).contains(&x) && (8..32).contains(&y);
            let hole = (16..24).contains(&x) && (16..24).contains(&y);
            if outer && !hole {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn cutoffs_run_darker_with_layer_index() {
        let thresholds = threshold::distribute(4);
        assert_eq!(layer_cutoff(&thresholds, 0), None);
        let cutoffs: Vec<u8> = (1..4).map(|i| layer_cutoff(&thresholds, i).unwrap()).collect();
        assert!(cutoffs.windows(2).all(|w| w[0] > w[1]), "{cutoffs:?}");
        assert_eq!(layer_cutoff(&thresholds, 4), None);
    }

    #[test]
    fn layer_percent_spans_checkpoints() {
        assert_eq!(layer_percent(0, 4), EDGES_PERCENT);
        assert_eq!(layer_percent(4, 4), LAYERS_DONE_PERCENT);
        for k in 2..=8 {
            let steps: Vec<u8> = (1..=k).map(|i| layer_percent(i, k)).collect();
            assert!(steps.windows(2).all(|w| w[0] < w[1]), "{steps:?}");
        }
    }

    #[test]
    fn ray_casting_containment() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(contains(&square, Point::new(5.0, 5.0)));
        assert!(!contains(&square, Point::new(15.0, 5.0)));
        assert!(!contains(&square, Point::new(5.0, -1.0)));
    }

    #[test]
    fn hole_becomes_subpath_of_its_outer() {
        let config = VectorizeConfig {
            color_steps: 2,
            ..VectorizeConfig::default()
        };
        let (doc, _) = run(&frame_with_hole(), &config);
        assert_eq!(doc.path_count(), 1);
        let path = doc.paths().next().unwrap();
        let moves = path
            .commands
            .iter()
            .filter(|c| matches!(c, PathCommand::MoveTo(_)))
            .count();
        let closes = path.commands.iter().filter(|c| **c == PathCommand::Close).count();
        assert_eq!(moves, 2);
        assert_eq!(closes, 2);
        assert_eq!(path.style, PathStyle::Fill);
    }

    #[test]
    fn background_layer_has_no_paths() {
        let (doc, diag) = run(&frame_with_hole(), &VectorizeConfig::default());
        assert!(doc.layers[0].paths.is_empty());
        assert_eq!(diag.layers[0].cutoff, None);
        assert!(diag.layers.iter().skip(1).all(|l| l.cutoff.is_some()));
    }

    #[test]
    fn coinciding_layers_are_deduplicated() {
        // Pure black on white: every non-background layer binarizes to
        // the same frame, so only the first of them keeps it.
        let config = VectorizeConfig {
            color_steps: 4,
            ..VectorizeConfig::default()
        };
        let (doc, diag) = run(&frame_with_hole(), &config);
        assert_eq!(doc.path_count(), 1);
        assert_eq!(diag.summary.duplicate_paths, 2);
        let mut strings: Vec<&str> = doc.paths().map(|p| p.d.as_str()).collect();
        strings.dedup();
        assert_eq!(strings.len(), doc.path_count());
    }

    #[test]
    fn stroke_mode_paths_never_close() {
        let config = VectorizeConfig {
            color_steps: 2,
            stroke_mode: true,
            stroke_width: 2.5,
            ..VectorizeConfig::default()
        };
        let (doc, _) = run(&frame_with_hole(), &config);
        assert!(doc.path_count() >= 1);
        for path in doc.paths() {
            assert!(!path.is_closed(), "{}", path.d);
            assert_eq!(path.style, PathStyle::Stroke { width: 2.5 });
        }
    }

    #[test]
    fn closed_loop_repeats_its_start_only_when_closing() {
        let config = VectorizeConfig::default();
        let mut emitted = HashSet::new();
        let mut builder = LayerBuilder::new(&config, &mut emitted);
        let start = Point::new(0.0, 0.0);
        let square = Contour::new(
            vec![
                start,
                Point::new(20.0, 0.0),
                Point::new(20.0, 20.0),
                Point::new(0.0, 20.0),
            ],
            true,
        );
        let end_of = |commands: &[PathCommand]| {
            commands
                .iter()
                .rev()
                .find_map(|c| c.points().last().copied())
                .unwrap()
        };

        let stroke = builder.contour_commands(&square, false).unwrap();
        assert_eq!(stroke[0], PathCommand::MoveTo(start));
        assert!(!stroke.contains(&PathCommand::Close));
        assert_eq!(end_of(&stroke), Point::new(0.0, 20.0));

        let fill = builder.contour_commands(&square, true).unwrap();
        assert_eq!(fill.last(), Some(&PathCommand::Close));
        assert_eq!(end_of(&fill), start);
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let config = VectorizeConfig {
            color_steps: 9,
            ..VectorizeConfig::default()
        };
        let result = vectorize_with_diagnostics(
            &frame_with_hole(),
            &config,
            &SystemClock,
            &mut |_: Progress| ControlFlow::Continue(()),
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn breaking_sink_cancels() {
        let mut calls = 0;
        let result = vectorize_with_diagnostics(
            &frame_with_hole(),
            &VectorizeConfig::default(),
            &SystemClock,
            &mut |_: Progress| {
                calls += 1;
                if calls == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        );
        assert_eq!(result, Err(PipelineError::Cancelled));
        assert_eq!(calls, 2);
    }
}
