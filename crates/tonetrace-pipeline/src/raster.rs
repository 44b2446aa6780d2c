//! Input preparation: validating pixel buffers and compositing them over
//! opaque white.
//!
//! The pipeline never decodes image containers. Callers decode (the CLI
//! uses the `image` crate) and hand over an RGBA buffer; this module
//! turns raw parts into a [`RasterImage`] and flattens any transparency.

use image::Rgba;

use crate::types::{PipelineError, RasterImage};

/// Build a [`RasterImage`] from raw RGBA8 parts.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if either dimension is zero.
/// Returns [`PipelineError::InvalidInput`] if the buffer length is not
/// `width * height * 4`.
pub fn from_raw_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<RasterImage, PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::EmptyInput);
    }
    let expected = u64::from(width) * u64::from(height) * 4;
    let actual = pixels.len() as u64;
    if actual != expected {
        return Err(PipelineError::InvalidInput(format!(
            "expected {expected} bytes for {width}x{height} RGBA8, got {actual}",
        )));
    }
    RasterImage::from_raw(width, height, pixels).ok_or_else(|| {
        PipelineError::InvalidInput(format!("buffer does not fit {width}x{height}"))
    })
}

/// Check that an image has at least one pixel.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] for a zero-sized image.
pub fn ensure_non_empty(image: &RasterImage) -> Result<(), PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::EmptyInput);
    }
    Ok(())
}

/// Alpha-blend every pixel over opaque white.
///
/// The output is fully opaque, which is the form the pipeline expects.
#[must_use = "returns the composited image"]
pub fn composite_over_white(image: &RasterImage) -> RasterImage {
    RasterImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let blend = |c: u8| {
            let c = u16::from(c);
            let a = u16::from(a);
            // c*a + 255*(255-a), divided by 255 with rounding
            let v = (c * a + 255 * (255 - a) + 127) / 255;
            u8::try_from(v).unwrap_or(u8::MAX)
        };
        Rgba([blend(r), blend(g), blend(b), 255])
    })
}
