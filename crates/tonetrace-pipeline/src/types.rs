//! Shared types for the tonetrace vectorization pipeline.

use std::fmt::Write as _;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::quantize::FillStrategy;

/// Re-export `RgbaImage` so downstream crates can hand pixel buffers to
/// the pipeline without depending on `image` directly.
pub use image::RgbaImage;

/// The pipeline input: an RGBA8 buffer already composited over opaque
/// white (see [`crate::raster::composite_over_white`]).
pub type RasterImage = RgbaImage;

/// Single-channel floating point image holding perceptual gray values
/// in `0.0..=255.0`.
pub type LumaImage = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Dot product, treating both points as vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x.mul_add(other.x, self.y * other.y)
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero vector.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        (len > f64::EPSILON).then(|| Self::new(self.x / len, self.y / len))
    }

    /// Returns `true` if both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// A sequence of connected points forming a path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the first point, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Point> {
        self.0.first()
    }

    /// Returns the last point, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Point> {
        self.0.last()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the polyline and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

/// A traced boundary between foreground and background.
///
/// Closed contours wrap around to their first point; the first point is
/// not repeated at the end. `area` is the signed shoelace area in image
/// coordinates: positive for outer boundaries, negative for holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    /// Ordered sub-pixel boundary points.
    pub points: Polyline,
    /// Whether the boundary wraps around (`false` only when a walk left
    /// the grid).
    pub closed: bool,
    /// Signed shoelace area.
    pub area: f64,
}

impl Contour {
    /// Build a contour and compute its signed area.
    #[must_use]
    pub fn new(points: Vec<Point>, closed: bool) -> Self {
        let area = if closed { signed_area(&points) } else { 0.0 };
        Self {
            points: Polyline::new(points),
            closed,
            area,
        }
    }

    /// Returns `true` for a closed contour enclosing background.
    #[must_use]
    pub fn is_hole(&self) -> bool {
        self.closed && self.area < 0.0
    }

    /// Total length of the boundary, including the closing edge for
    /// closed contours.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        let pts = self.points.points();
        let open: f64 = pts.windows(2).map(|w| w[0].distance(w[1])).sum();
        match (self.closed, pts.first(), pts.last()) {
            (true, Some(&first), Some(&last)) => open + last.distance(first),
            _ => open,
        }
    }
}

/// Signed polygon area via the shoelace formula.
///
/// In image coordinates (y pointing down) a boundary walked clockwise on
/// screen has positive area.
#[must_use]
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x.mul_add(b.y, -(b.x * a.y))
        })
        .sum();
    twice / 2.0
}

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Mid gray, used when a color box carries no weight.
    pub const MID_GRAY: Self = Self::new(128, 128, 128);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Per-channel midpoint of two colors.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        let mid = |a: u8, b: u8| {
            let sum = u16::from(a) + u16::from(b);
            u8::try_from(sum.div_ceil(2)).unwrap_or(u8::MAX)
        };
        Self::new(mid(self.r, other.r), mid(self.g, other.g), mid(self.b, other.b))
    }
}

/// One palette color together with its relative luminance in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub color: Color,
    /// Rec. 709 relative luminance of `color`, `0.0` black to `1.0` white.
    pub luminance: f64,
}

impl PaletteEntry {
    /// Build an entry, deriving luminance from the color.
    #[must_use]
    pub fn from_color(color: Color) -> Self {
        Self {
            color,
            luminance: crate::luminance::relative_luminance(color),
        }
    }
}

/// The K representative colors of an image, ordered lightest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorPalette(Vec<PaletteEntry>);

impl ColorPalette {
    /// Wrap entries, sorting them lightest first.
    #[must_use]
    pub fn new(mut entries: Vec<PaletteEntry>) -> Self {
        entries.sort_by(|a, b| b.luminance.total_cmp(&a.luminance));
        Self(entries)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[PaletteEntry] {
        &self.0
    }
}

/// Strictly increasing 8-bit binarization cut values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSet(Vec<u8>);

impl ThresholdSet {
    /// Wrap a list of values. Callers guarantee strict ordering.
    #[must_use]
    pub(crate) const fn new(values: Vec<u8>) -> Self {
        Self(values)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[u8] {
        &self.0
    }
}

/// How a path is painted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathStyle {
    /// Filled with the layer color (nonzero rule; holes wind the other way).
    Fill,
    /// Stroked with the layer color at the given width in pixels.
    Stroke { width: f64 },
}

/// A single absolute path command. Coordinates are rounded to two
/// decimal places on construction through [`PathCommand::rounded`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    CubicTo(Point, Point, Point),
    Close,
}

impl PathCommand {
    /// Round every coordinate to two decimal places.
    #[must_use]
    pub fn rounded(self) -> Self {
        match self {
            Self::MoveTo(p) => Self::MoveTo(round_point(p)),
            Self::LineTo(p) => Self::LineTo(round_point(p)),
            Self::CubicTo(c1, c2, p) => {
                Self::CubicTo(round_point(c1), round_point(c2), round_point(p))
            }
            Self::Close => Self::Close,
        }
    }

    /// Points carried by this command.
    #[must_use]
    pub fn points(&self) -> Vec<Point> {
        match *self {
            Self::MoveTo(p) | Self::LineTo(p) => vec![p],
            Self::CubicTo(c1, c2, p) => vec![c1, c2, p],
            Self::Close => Vec::new(),
        }
    }

    fn write_to(&self, out: &mut String) {
        match *self {
            Self::MoveTo(p) => {
                let _ = write!(out, "M{} {}", coord(p.x), coord(p.y));
            }
            Self::LineTo(p) => {
                let _ = write!(out, "L{} {}", coord(p.x), coord(p.y));
            }
            Self::CubicTo(c1, c2, p) => {
                let _ = write!(
                    out,
                    "C{} {} {} {} {} {}",
                    coord(c1.x),
                    coord(c1.y),
                    coord(c2.x),
                    coord(c2.y),
                    coord(p.x),
                    coord(p.y),
                );
            }
            Self::Close => out.push('Z'),
        }
    }
}

/// Round to two decimal places, normalizing negative zero.
#[must_use]
pub fn round2(v: f64) -> f64 {
    let r = (v * 100.0).round() / 100.0;
    if r == 0.0 { 0.0 } else { r }
}

fn round_point(p: Point) -> Point {
    Point::new(round2(p.x), round2(p.y))
}

/// Format an already-rounded coordinate with no trailing zeros.
fn coord(v: f64) -> String {
    format!("{}", round2(v))
}

/// A finished vector path: its commands plus the absolute command
/// string used for output and deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPath {
    /// Absolute command string, e.g. `M1 2L3 4Z`.
    pub d: String,
    /// Structured commands with rounded coordinates.
    pub commands: Vec<PathCommand>,
    /// Fill or stroke.
    pub style: PathStyle,
}

impl VectorPath {
    /// Build a path, rounding coordinates and rendering the command string.
    #[must_use]
    pub fn new(commands: Vec<PathCommand>, style: PathStyle) -> Self {
        let commands: Vec<PathCommand> = commands.into_iter().map(PathCommand::rounded).collect();
        let mut d = String::new();
        for cmd in &commands {
            cmd.write_to(&mut d);
        }
        Self { d, commands, style }
    }

    /// Returns `true` if the path ends a subpath with a close command.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.contains(&PathCommand::Close)
    }

    /// Number of coordinate points across all commands.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.commands.iter().map(|c| c.points().len()).sum()
    }
}

/// One flat-color slice of the posterized image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Palette color the layer is filled or stroked with.
    pub color: Color,
    /// Paths largest first. Always empty for the background layer.
    pub paths: Vec<VectorPath>,
}

/// The pipeline output: layers in painter's order (lightest first,
/// darkest last and on top) plus the canvas size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Canvas width in pixels, matching the source image.
    pub width: u32,
    /// Canvas height in pixels, matching the source image.
    pub height: u32,
    /// Exactly `color_steps` layers, lightest first.
    pub layers: Vec<Layer>,
}

impl Document {
    /// Total number of paths across all layers.
    #[must_use]
    pub fn path_count(&self) -> usize {
        self.layers.iter().map(|l| l.paths.len()).sum()
    }

    /// Iterate all paths in painter's order.
    pub fn paths(&self) -> impl Iterator<Item = &VectorPath> {
        self.layers.iter().flat_map(|l| l.paths.iter())
    }
}

/// A progress update: percentage in `0..=100` plus a short description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: u8,
    pub detail: String,
}

/// Configuration for a vectorization run.
///
/// Fields are public; [`validate`](Self::validate) checks the ranges
/// before the pipeline touches any pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizeConfig {
    /// Number of color layers, `2..=8`.
    pub color_steps: u8,

    /// How the palette is chosen from the quantized color boxes.
    pub fill_strategy: FillStrategy,

    /// Trace 1-pixel skeletons and emit open stroked centerlines instead
    /// of filled outlines.
    pub stroke_mode: bool,

    /// Stroke width in pixels (stroke mode only).
    pub stroke_width: f64,

    /// Maximum number of paths kept per layer, largest area first.
    pub max_paths_per_layer: usize,

    /// Multiplier on the adaptive simplification base tolerance.
    pub simplify_scale: f64,

    /// Maximum allowed deviation of a fitted cubic from its source
    /// points, in pixels.
    pub curve_tolerance: f64,
}

impl VectorizeConfig {
    pub const DEFAULT_COLOR_STEPS: u8 = 4;
    pub const MIN_COLOR_STEPS: u8 = 2;
    pub const MAX_COLOR_STEPS: u8 = 8;
    pub const DEFAULT_FILL_STRATEGY: FillStrategy = FillStrategy::Dominant;
    pub const DEFAULT_STROKE_WIDTH: f64 = 1.0;
    pub const DEFAULT_MAX_PATHS_PER_LAYER: usize = 2000;
    pub const DEFAULT_SIMPLIFY_SCALE: f64 = 1.0;
    pub const DEFAULT_CURVE_TOLERANCE: f64 = 1.0;

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(Self::MIN_COLOR_STEPS..=Self::MAX_COLOR_STEPS).contains(&self.color_steps) {
            return Err(PipelineError::InvalidConfig(format!(
                "color_steps must be in {}..={}, got {}",
                Self::MIN_COLOR_STEPS,
                Self::MAX_COLOR_STEPS,
                self.color_steps,
            )));
        }
        if !(self.stroke_width.is_finite() && self.stroke_width > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "stroke_width must be positive, got {}",
                self.stroke_width,
            )));
        }
        if self.max_paths_per_layer == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_paths_per_layer must be at least 1".to_string(),
            ));
        }
        if !(self.simplify_scale.is_finite() && self.simplify_scale > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "simplify_scale must be positive, got {}",
                self.simplify_scale,
            )));
        }
        if !(self.curve_tolerance.is_finite() && self.curve_tolerance > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "curve_tolerance must be positive, got {}",
                self.curve_tolerance,
            )));
        }
        Ok(())
    }
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            color_steps: Self::DEFAULT_COLOR_STEPS,
            fill_strategy: Self::DEFAULT_FILL_STRATEGY,
            stroke_mode: false,
            stroke_width: Self::DEFAULT_STROKE_WIDTH,
            max_paths_per_layer: Self::DEFAULT_MAX_PATHS_PER_LAYER,
            simplify_scale: Self::DEFAULT_SIMPLIFY_SCALE,
            curve_tolerance: Self::DEFAULT_CURVE_TOLERANCE,
        }
    }
}

/// Errors that can occur during a vectorization run.
///
/// Degenerate geometry is never an error; every stage has a fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The pixel buffer has zero width or height.
    #[error("input image is empty")]
    EmptyInput,

    /// The pixel buffer could not be interpreted.
    #[error("invalid input image: {0}")]
    InvalidInput(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The progress receiver went away before the run finished.
    #[error("vectorization was cancelled")]
    Cancelled,
}
