//! Canny-style edge detection over the perceptual gray grid.
//!
//! Produces the [`EdgeMask`] that tells the bitmap builder where a raw
//! binarization is authoritative. Steps:
//!
//! 1. 5x5 Gaussian blur (integer weights summing to 159, sigma about 1.0)
//! 2. Sobel gradients, magnitude, and direction quantized to 0/45/90/135
//! 3. Non-maximum suppression along the gradient direction
//! 4. Hysteresis relative to the strongest response: strong pixels seed
//!    a breadth-first search that promotes 8-connected weak pixels
//!
//! The blur and Sobel passes run through `imageproc`'s clamped-border
//! filter with `f32` kernels, so no precision is lost to `u8` rounding.
//! Suppression and hysteresis are local: suppression clamps its neighbor
//! reads, and the hysteresis search bounds-checks every neighbor before
//! touching it.

use std::collections::VecDeque;

use image::Luma;
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;

use crate::bitmap::{EdgeMask, NEIGHBORS_8};
use crate::types::LumaImage;

/// 5x5 Gaussian kernel, row-major.
const GAUSSIAN_5X5: [f32; 25] = [
    2.0, 4.0, 5.0, 4.0, 2.0, //
    4.0, 9.0, 12.0, 9.0, 4.0, //
    5.0, 12.0, 15.0, 12.0, 5.0, //
    4.0, 9.0, 12.0, 9.0, 4.0, //
    2.0, 4.0, 5.0, 4.0, 2.0,
];

/// Sum of [`GAUSSIAN_5X5`].
const GAUSSIAN_SUM: f32 = 159.0;

const SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
const SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];

/// Strong edge threshold as a fraction of the maximum magnitude.
pub const STRONG_RATIO: f32 = 0.15;

/// Weak edge threshold as a fraction of the maximum magnitude.
pub const WEAK_RATIO: f32 = 0.05;

/// Smooth with the fixed 5x5 Gaussian.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur_5x5(image: &LumaImage) -> LumaImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let weights = GAUSSIAN_5X5.map(|w| w / GAUSSIAN_SUM);
    filter_clamped::<_, f32, f32>(image, Kernel::new(&weights, 5, 5))
}

/// Gradient direction bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Deg0,
    Deg45,
    Deg90,
    Deg135,
}

impl Direction {
    fn from_gradient(gx: f32, gy: f32) -> Self {
        let mut angle = gy.atan2(gx).to_degrees();
        if angle < 0.0 {
            angle += 180.0;
        }
        if !(22.5..157.5).contains(&angle) {
            Self::Deg0
        } else if angle < 67.5 {
            Self::Deg45
        } else if angle < 112.5 {
            Self::Deg90
        } else {
            Self::Deg135
        }
    }

    /// The two neighbor offsets along the gradient.
    const fn neighbors(self) -> [(i64, i64); 2] {
        match self {
            Self::Deg0 => [(-1, 0), (1, 0)],
            Self::Deg45 => [(1, 1), (-1, -1)],
            Self::Deg90 => [(0, -1), (0, 1)],
            Self::Deg135 => [(-1, 1), (1, -1)],
        }
    }
}

/// Gradient magnitude and direction per pixel.
struct Gradient {
    magnitude: LumaImage,
    direction: Vec<Direction>,
}

fn sobel(blurred: &LumaImage) -> Gradient {
    let gx: LumaImage = filter_clamped::<_, f32, f32>(blurred, Kernel::new(&SOBEL_X, 3, 3));
    let gy: LumaImage = filter_clamped::<_, f32, f32>(blurred, Kernel::new(&SOBEL_Y, 3, 3));
    let magnitude = LumaImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        Luma([gx.get_pixel(x, y).0[0].hypot(gy.get_pixel(x, y).0[0])])
    });
    let direction = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(h, v)| Direction::from_gradient(h.0[0], v.0[0]))
        .collect();
    Gradient {
        magnitude,
        direction,
    }
}

/// Keep only pixels that are local maxima along their gradient.
fn non_maximum_suppression(gradient: &Gradient) -> LumaImage {
    let g = &gradient.magnitude;
    let width = g.width();
    LumaImage::from_fn(g.width(), g.height(), |x, y| {
        let m = g.get_pixel(x, y).0[0];
        if m <= 0.0 {
            return Luma([0.0]);
        }
        let dir = gradient.direction[y as usize * width as usize + x as usize];
        let (ix, iy) = (i64::from(x), i64::from(y));
        let [(ax, ay), (bx, by)] = dir.neighbors();
        let a = magnitude_at(g, ix + ax, iy + ay);
        let b = magnitude_at(g, ix + bx, iy + by);
        if m < a || m < b { Luma([0.0]) } else { Luma([m]) }
    })
}

/// Magnitude with coordinates clamped into the image.
fn magnitude_at(g: &LumaImage, x: i64, y: i64) -> f32 {
    let max_x = i64::from(g.width()) - 1;
    let max_y = i64::from(g.height()) - 1;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (cx, cy) = (x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32);
    g.get_pixel(cx, cy).0[0]
}

/// Promote weak pixels connected to strong ones.
fn hysteresis(thinned: &LumaImage, low: f32, high: f32) -> EdgeMask {
    let (w, h) = thinned.dimensions();
    let mut out = EdgeMask::new(w, h);
    let mut queue = VecDeque::new();

    for (x, y, p) in thinned.enumerate_pixels() {
        if p.0[0] >= high {
            out.set(x, y, true);
            queue.push_back((i64::from(x), i64::from(y)));
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in NEIGHBORS_8 {
            let (nx, ny) = (x + dx, y + dy);
            let (Ok(ux), Ok(uy)) = (u32::try_from(nx), u32::try_from(ny)) else {
                continue;
            };
            if ux >= w || uy >= h || out.get(nx, ny) {
                continue;
            }
            if thinned.get_pixel(ux, uy).0[0] >= low {
                out.set(ux, uy, true);
                queue.push_back((nx, ny));
            }
        }
    }
    out
}

/// Detect high-confidence boundary pixels.
///
/// Thresholds are relative to the strongest suppressed gradient, so the
/// result does not depend on image contrast. A flat image has no
/// gradient and yields an empty mask.
#[must_use = "returns the edge mask"]
pub fn detect_edges(gray: &LumaImage) -> EdgeMask {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return EdgeMask::new(width, height);
    }

    let blurred = gaussian_blur_5x5(gray);
    let gradient = sobel(&blurred);
    let thinned = non_maximum_suppression(&gradient);

    let max = thinned.pixels().map(|p| p.0[0]).fold(0.0f32, f32::max);
    if max <= 0.0 {
        return EdgeMask::new(width, height);
    }
    hysteresis(&thinned, max * WEAK_RATIO, max * STRONG_RATIO)
}
