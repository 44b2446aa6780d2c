//! Color quantization by variance-minimizing histogram partitioning.
//!
//! Pixels are binned into a 33x33x33 RGB histogram (5 bits per channel,
//! index 0 reserved so prefix sums need no bounds checks). Cumulative
//! moment tables turn any axis-aligned box into an O(1) query, and boxes
//! are split greedily, always cutting the one with the largest internal
//! variance at the cut that maximizes the between-group sum of squares.
//!
//! [`FillStrategy`] selects how the final K colors are taken from the
//! resulting boxes.

use serde::{Deserialize, Serialize};

use crate::luminance::ALPHA_THRESHOLD;
use crate::types::{Color, ColorPalette, PaletteEntry, RasterImage};

/// Histogram side length: 32 bins per channel plus one reserved row.
const SIDE: usize = 33;

/// Total histogram cell count.
const TABLE_LEN: usize = SIDE * SIDE * SIDE;

/// Dropped low bits per channel.
const CHANNEL_SHIFT: u8 = 3;

/// Images larger than this are sampled with a fixed stride.
const TARGET_SAMPLES: usize = 200_000;

/// Box multiplier for strategies that pick from an oversampled set.
const OVERSAMPLE: usize = 4;

/// Upper bound on the oversampled box count.
const MAX_OVERSAMPLED_BOXES: usize = 32;

/// Selects how the K palette colors are chosen from the color boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    /// The K boxes of the partition, by centroid.
    #[default]
    Dominant,
    /// K entries evenly spaced through an oversampled, luminance-sorted
    /// box set. Favors contrast over pixel share.
    Spread,
    /// One box per equal-width luminance band. Falls back to
    /// [`Dominant`](Self::Dominant) when two bands land on the same box.
    Mean,
    /// Same boxes as [`Dominant`](Self::Dominant).
    Median,
}

impl FillStrategy {
    /// All strategies, in declaration order.
    pub const ALL: [Self; 4] = [Self::Dominant, Self::Spread, Self::Mean, Self::Median];
}

#[inline]
const fn idx(r: usize, g: usize, b: usize) -> usize {
    (r * SIDE + g) * SIDE + b
}

/// Cumulative per-cell moments over the histogram.
struct Moments {
    weight: Vec<f64>,
    sum_r: Vec<f64>,
    sum_g: Vec<f64>,
    sum_b: Vec<f64>,
    sum_sq: Vec<f64>,
}

/// Aggregate statistics of one box.
#[derive(Debug, Clone, Copy, Default)]
struct BoxStats {
    weight: f64,
    r: f64,
    g: f64,
    b: f64,
    sq: f64,
}

impl BoxStats {
    /// Squared magnitude of the channel sums divided by weight.
    fn mean_energy(&self) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        self.b
            .mul_add(self.b, self.r.mul_add(self.r, self.g * self.g))
            / self.weight
    }

    fn variance(&self) -> f64 {
        if self.weight <= 0.0 {
            0.0
        } else {
            self.sq - self.mean_energy()
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn centroid(&self) -> Color {
        if self.weight <= 0.0 {
            return Color::MID_GRAY;
        }
        let channel = |sum: f64| (sum / self.weight).round().clamp(0.0, 255.0) as u8;
        Color::new(channel(self.r), channel(self.g), channel(self.b))
    }
}

/// An axis-aligned histogram box: `lo` exclusive, `hi` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColorBox {
    lo: [usize; 3],
    hi: [usize; 3],
}

impl ColorBox {
    const fn whole() -> Self {
        Self {
            lo: [0; 3],
            hi: [SIDE - 1; 3],
        }
    }
}

impl Moments {
    fn from_image(image: &RasterImage) -> Self {
        let mut m = Self {
            weight: vec![0.0; TABLE_LEN],
            sum_r: vec![0.0; TABLE_LEN],
            sum_g: vec![0.0; TABLE_LEN],
            sum_b: vec![0.0; TABLE_LEN],
            sum_sq: vec![0.0; TABLE_LEN],
        };

        let total = image.width() as usize * image.height() as usize;
        let stride = total.div_ceil(TARGET_SAMPLES).max(1);
        for pixel in image.pixels().step_by(stride) {
            let [r, g, b, a] = pixel.0;
            if a < ALPHA_THRESHOLD {
                continue;
            }
            let cell = idx(
                usize::from(r >> CHANNEL_SHIFT) + 1,
                usize::from(g >> CHANNEL_SHIFT) + 1,
                usize::from(b >> CHANNEL_SHIFT) + 1,
            );
            let (fr, fg, fb) = (f64::from(r), f64::from(g), f64::from(b));
            m.weight[cell] += 1.0;
            m.sum_r[cell] += fr;
            m.sum_g[cell] += fg;
            m.sum_b[cell] += fb;
            m.sum_sq[cell] += fb.mul_add(fb, fr.mul_add(fr, fg * fg));
        }

        for table in [
            &mut m.weight,
            &mut m.sum_r,
            &mut m.sum_g,
            &mut m.sum_b,
            &mut m.sum_sq,
        ] {
            cumulate(table);
        }
        m
    }

    fn stats(&self, bx: ColorBox) -> BoxStats {
        BoxStats {
            weight: volume(&self.weight, bx),
            r: volume(&self.sum_r, bx),
            g: volume(&self.sum_g, bx),
            b: volume(&self.sum_b, bx),
            sq: volume(&self.sum_sq, bx),
        }
    }
}

/// Turn per-cell values into 3D prefix sums in place.
fn cumulate(t: &mut [f64]) {
    for r in 1..SIDE {
        for g in 1..SIDE {
            for b in 1..SIDE {
                t[idx(r, g, b)] += t[idx(r - 1, g, b)] + t[idx(r, g - 1, b)] + t[idx(r, g, b - 1)]
                    - t[idx(r - 1, g - 1, b)]
                    - t[idx(r - 1, g, b - 1)]
                    - t[idx(r, g - 1, b - 1)]
                    + t[idx(r - 1, g - 1, b - 1)];
            }
        }
    }
}

/// Sum of a prefix-summed table over a box (8-term inclusion-exclusion).
fn volume(t: &[f64], bx: ColorBox) -> f64 {
    let [r0, g0, b0] = bx.lo;
    let [r1, g1, b1] = bx.hi;
    t[idx(r1, g1, b1)] - t[idx(r0, g1, b1)] - t[idx(r1, g0, b1)] - t[idx(r1, g1, b0)]
        + t[idx(r0, g0, b1)]
        + t[idx(r0, g1, b0)]
        + t[idx(r1, g0, b0)]
        - t[idx(r0, g0, b0)]
}

/// Find the best cut of a box across all three axes.
///
/// Returns the two halves, or `None` when no internal position leaves
/// weight on both sides.
fn cut(moments: &Moments, bx: ColorBox) -> Option<(ColorBox, ColorBox)> {
    let whole = moments.stats(bx);
    let mut best: Option<(f64, ColorBox, ColorBox)> = None;

    for axis in 0..3 {
        for pos in (bx.lo[axis] + 1)..bx.hi[axis] {
            let mut lower = bx;
            lower.hi[axis] = pos;
            let mut upper = bx;
            upper.lo[axis] = pos;

            let low = moments.stats(lower);
            let high = BoxStats {
                weight: whole.weight - low.weight,
                r: whole.r - low.r,
                g: whole.g - low.g,
                b: whole.b - low.b,
                sq: whole.sq - low.sq,
            };
            if low.weight <= 0.0 || high.weight <= 0.0 {
                continue;
            }

            let gain = low.mean_energy() + high.mean_energy();
            if best.as_ref().is_none_or(|(g, _, _)| gain > *g) {
                best = Some((gain, lower, upper));
            }
        }
    }

    best.map(|(_, lower, upper)| (lower, upper))
}

/// Split the histogram into at most `k` boxes.
fn partition(moments: &Moments, k: usize) -> Vec<BoxStats> {
    let mut boxes = vec![ColorBox::whole()];
    let mut variances = vec![moments.stats(ColorBox::whole()).variance()];

    while boxes.len() < k {
        let Some((i, &v)) = variances
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            break;
        };
        if v <= 0.0 {
            break;
        }
        match cut(moments, boxes[i]) {
            Some((lower, upper)) => {
                boxes[i] = lower;
                variances[i] = moments.stats(lower).variance();
                boxes.push(upper);
                variances.push(moments.stats(upper).variance());
            }
            // A single histogram cell cannot be split further.
            None => variances[i] = 0.0,
        }
    }

    boxes.into_iter().map(|bx| moments.stats(bx)).collect()
}

fn entries_of(stats: &[BoxStats]) -> Vec<PaletteEntry> {
    stats
        .iter()
        .map(|s| PaletteEntry::from_color(s.centroid()))
        .collect()
}

fn sort_by_luminance(entries: &mut [PaletteEntry]) {
    entries.sort_by(|a, b| a.luminance.total_cmp(&b.luminance));
}

fn dominant(moments: &Moments, k: usize) -> Vec<PaletteEntry> {
    let mut entries = entries_of(&partition(moments, k));
    sort_by_luminance(&mut entries);
    entries
}

fn oversampled(moments: &Moments, k: usize) -> Vec<PaletteEntry> {
    let n = (k * OVERSAMPLE).clamp(k, MAX_OVERSAMPLED_BOXES.max(k));
    let mut entries = entries_of(&partition(moments, n));
    sort_by_luminance(&mut entries);
    entries
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn spread(moments: &Moments, k: usize) -> Vec<PaletteEntry> {
    let candidates = oversampled(moments, k);
    if candidates.len() <= k || k < 2 {
        return candidates.into_iter().take(k).collect();
    }
    let last = (candidates.len() - 1) as f64;
    (0..k)
        .map(|i| {
            let at = (i as f64 * last / (k - 1) as f64).round() as usize;
            candidates[at.min(candidates.len() - 1)]
        })
        .collect()
}

/// Nearest box per luminance band, or `None` on any collision.
#[allow(clippy::cast_precision_loss)]
fn mean(moments: &Moments, k: usize) -> Option<Vec<PaletteEntry>> {
    let candidates = oversampled(moments, k);
    if candidates.len() < k {
        return None;
    }
    let mut taken = vec![false; candidates.len()];
    let mut picked = Vec::with_capacity(k);
    for band in 0..k {
        let center = (band as f64 + 0.5) / k as f64;
        let (nearest, _) = candidates.iter().enumerate().min_by(|a, b| {
            (a.1.luminance - center)
                .abs()
                .total_cmp(&(b.1.luminance - center).abs())
        })?;
        if taken[nearest] {
            return None;
        }
        taken[nearest] = true;
        picked.push(candidates[nearest]);
    }
    Some(picked)
}

/// Grow a color list to exactly `k` entries by splitting the widest
/// luminance gaps.
fn pad(mut entries: Vec<PaletteEntry>, k: usize) -> Vec<PaletteEntry> {
    entries.truncate(k);
    if entries.is_empty() && k > 0 {
        entries.push(PaletteEntry::from_color(Color::MID_GRAY));
    }
    while entries.len() < k {
        sort_by_luminance(&mut entries);
        let insert = if let [only] = entries.as_slice() {
            // Nothing to interpolate between yet: head for the far end.
            let anchor = if only.luminance >= 0.5 {
                Color::new(0, 0, 0)
            } else {
                Color::new(255, 255, 255)
            };
            only.color.midpoint(anchor)
        } else {
            let gap = entries
                .windows(2)
                .enumerate()
                .max_by(|a, b| {
                    (a.1[1].luminance - a.1[0].luminance)
                        .total_cmp(&(b.1[1].luminance - b.1[0].luminance))
                })
                .map_or(0, |(i, _)| i);
            entries[gap].color.midpoint(entries[gap + 1].color)
        };
        entries.push(PaletteEntry::from_color(insert));
    }
    entries
}

/// Reduce an image to exactly `k` representative colors.
///
/// The returned palette is ordered lightest first. Images with fewer than
/// `k` distinct colors are padded; images with no opaque pixels yield
/// mid gray plus padding.
#[must_use = "returns the palette"]
pub fn quantize(image: &RasterImage, k: usize, strategy: FillStrategy) -> ColorPalette {
    let moments = Moments::from_image(image);
    let entries = match strategy {
        FillStrategy::Dominant | FillStrategy::Median => dominant(&moments, k),
        FillStrategy::Spread => spread(&moments, k),
        FillStrategy::Mean => mean(&moments, k).unwrap_or_else(|| {
            log::debug!("mean strategy collided on {k} bands, using dominant boxes");
            dominant(&moments, k)
        }),
    };
    ColorPalette::new(pad(entries, k))
}
