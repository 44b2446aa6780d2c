//! Perceptual luminance helpers shared by the quantizer, the threshold
//! distributor, and the per-layer binarization.
//!
//! Gray values live in the same gamma-2.2 encoding that thresholds are
//! expressed in, so `gray < threshold` compares like with like.

use image::Luma;

use crate::types::{Color, LumaImage, RasterImage};

/// Pixels with alpha below this are read as background (white).
pub const ALPHA_THRESHOLD: u8 = 128;

/// Rec.709 luma weights applied to linear RGB.
const REC709: [f64; 3] = [0.2126, 0.7152, 0.0722];

/// Display gamma used to encode linear luminance into 8-bit gray.
pub const DISPLAY_GAMMA: f64 = 2.2;

/// Convert an 8-bit sRGB channel to linear light in `[0, 1]`.
#[must_use]
pub fn srgb_to_linear(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Rec.709 relative luminance of an sRGB color, in `[0, 1]`.
#[must_use]
pub fn relative_luminance(color: Color) -> f64 {
    linear_luminance(color.r, color.g, color.b)
}

fn linear_luminance(r: u8, g: u8, b: u8) -> f64 {
    REC709[0].mul_add(
        srgb_to_linear(r),
        REC709[1].mul_add(srgb_to_linear(g), REC709[2] * srgb_to_linear(b)),
    )
}

/// Encode linear luminance as a gamma-2.2 gray value in `0.0..=255.0`.
#[must_use]
pub fn encode_gray(linear: f64) -> f64 {
    linear.clamp(0.0, 1.0).powf(1.0 / DISPLAY_GAMMA) * 255.0
}

/// Perceptual gray value of one RGBA pixel.
///
/// Transparent pixels (alpha below [`ALPHA_THRESHOLD`]) read as white.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn perceptual_gray(rgba: [u8; 4]) -> f32 {
    let [r, g, b, a] = rgba;
    if a < ALPHA_THRESHOLD {
        return 255.0;
    }
    encode_gray(linear_luminance(r, g, b)) as f32
}

/// Convert the whole image to a floating point perceptual gray grid.
#[must_use = "returns the gray image"]
pub fn gray_image(image: &RasterImage) -> LumaImage {
    LumaImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([perceptual_gray(image.get_pixel(x, y).0)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_endpoints() {
        assert!(srgb_to_linear(0).abs() < f64::EPSILON);
        assert!((srgb_to_linear(255) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn linear_is_monotonic() {
        let values: Vec<f64> = (0..=255u8).map(srgb_to_linear).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn green_is_brightest_channel() {
        let r = relative_luminance(Color::new(255, 0, 0));
        let g = relative_luminance(Color::new(0, 255, 0));
        let b = relative_luminance(Color::new(0, 0, 255));
        assert!(g > r && r > b, "expected G > R > B, got R={r} G={g} B={b}");
    }

    #[test]
    fn white_and_black_gray() {
        assert!((perceptual_gray([255, 255, 255, 255]) - 255.0).abs() < 1e-3);
        assert!(perceptual_gray([0, 0, 0, 255]).abs() < 1e-3);
    }

    #[test]
    fn transparent_pixel_reads_as_white() {
        assert!((perceptual_gray([0, 0, 0, 10]) - 255.0).abs() < f32::EPSILON);
    }

    #[test]
    fn gray_image_matches_dimensions() {
        let img = RasterImage::from_pixel(7, 3, image::Rgba([10, 20, 30, 255]));
        let gray = gray_image(&img);
        assert_eq!(gray.dimensions(), (7, 3));
    }
}
