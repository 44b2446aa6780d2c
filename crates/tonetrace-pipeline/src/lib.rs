//! tonetrace-pipeline: Pure multi-layer vectorization pipeline (sans-IO).
//!
//! Converts a decoded RGBA image into K flat-color vector layers through:
//! grayscale -> quantize -> thresholds -> edge detection -> per layer
//! (bitmap -> optional thinning -> contour tracing -> simplification ->
//! curve fitting) -> deduplicated document.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers and returns structured data. Decoding files and
//! printing results live in the `tonetrace` binary.

pub mod assemble;
pub mod bitmap;
pub mod contour;
pub mod curve;
pub mod diagnostics;
pub mod edge;
pub mod luminance;
pub mod quantize;
pub mod raster;
pub mod simplify;
pub mod skeleton;
pub mod threshold;
pub mod types;

pub use assemble::{ProgressSink, vectorize_with_diagnostics};
pub use bitmap::{BinaryBitmap, EdgeMask};
pub use contour::{ContourTracer, ContourTracerKind};
pub use curve::CurveSegment;
pub use diagnostics::{Clock, PipelineDiagnostics, SystemClock};
pub use quantize::FillStrategy;
pub use types::{
    Color, ColorPalette, Contour, Document, Layer, PaletteEntry, PathCommand, PathStyle,
    PipelineError, Point, Polyline, Progress, RasterImage, ThresholdSet, VectorPath,
    VectorizeConfig,
};

/// Run the full vectorization pipeline.
///
/// Takes an RGBA image already composited over white (see
/// [`raster::composite_over_white`]) and returns one [`Layer`] per palette
/// color, lightest first. `sink` receives progress checkpoints and may
/// cancel the run by returning [`std::ops::ControlFlow::Break`].
///
/// # Pipeline steps
///
/// 1. Validate the configuration and image size
/// 2. Perceptual grayscale
/// 3. Color quantization to K colors
/// 4. Perceptual threshold distribution
/// 5. Canny edge detection
/// 6. Per layer: binarize, thin (stroke mode), trace, cap, simplify, fit
/// 7. Path deduplication across the whole document
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` is out of range.
/// Returns [`PipelineError::EmptyInput`] if the image has no pixels.
/// Returns [`PipelineError::Cancelled`] if `sink` stops the run.
pub fn vectorize<S: ProgressSink + ?Sized>(
    image: &RasterImage,
    config: &VectorizeConfig,
    sink: &mut S,
) -> Result<Document, PipelineError> {
    vectorize_with_diagnostics(image, config, &SystemClock, sink).map(|(document, _)| document)
}
