//! Perceptually spaced binarization thresholds.
//!
//! N color steps need N-1 cut values between adjacent layers. Cuts are
//! placed evenly in CIE lightness (L*) over the usable range 5..95, then
//! encoded the same way pixel gray values are (see
//! [`crate::luminance::encode_gray`]).

use crate::luminance::encode_gray;
use crate::types::ThresholdSet;

/// Lightness of the darkest usable cut.
const L_STAR_MIN: f64 = 5.0;

/// Lightness span covered by the cuts.
const L_STAR_SPAN: f64 = 90.0;

/// CIE constants: `kappa * epsilon` is the L* below which the curve is
/// linear.
const CIE_KAPPA: f64 = 24_389.0 / 27.0;
const CIE_KAPPA_EPSILON: f64 = 8.0;

/// Smallest and largest allowed cut values.
const MIN_CUT: u8 = 1;
const MAX_CUT: u8 = 254;

/// Convert CIE L* (0..100) to relative luminance Y (0..1).
#[must_use]
pub fn lightness_to_luminance(l_star: f64) -> f64 {
    if l_star > CIE_KAPPA_EPSILON {
        ((l_star + 16.0) / 116.0).powi(3)
    } else {
        l_star / CIE_KAPPA
    }
}

/// Generate `steps - 1` strictly increasing cut values.
///
/// Fewer than two steps yields an empty set.
#[must_use = "returns the threshold set"]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn distribute(steps: usize) -> ThresholdSet {
    if steps < 2 {
        return ThresholdSet::new(Vec::new());
    }
    let wanted = steps - 1;

    let mut values: Vec<u8> = (1..steps)
        .map(|i| {
            let l_star = (i as f64 / steps as f64).mul_add(L_STAR_SPAN, L_STAR_MIN);
            let gray = encode_gray(lightness_to_luminance(l_star)).round();
            gray.clamp(f64::from(MIN_CUT), f64::from(MAX_CUT)) as u8
        })
        .collect();
    values.dedup();

    while values.len() < wanted {
        if !insert_in_widest_gap(&mut values) {
            break;
        }
    }
    ThresholdSet::new(values)
}

/// Insert the midpoint of the widest gap, counting the open ends down to
/// 0 and up to 255. Returns `false` once no gap can hold another value.
fn insert_in_widest_gap(values: &mut Vec<u8>) -> bool {
    let mut bounds = Vec::with_capacity(values.len() + 2);
    bounds.push(0u16);
    bounds.extend(values.iter().map(|&v| u16::from(v)));
    bounds.push(255);

    let Some((i, width)) = bounds
        .windows(2)
        .map(|w| w[1] - w[0])
        .enumerate()
        .max_by_key(|&(i, width)| (width, std::cmp::Reverse(i)))
    else {
        return false;
    };
    if width < 2 {
        return false;
    }
    let mid = (bounds[i] + bounds[i + 1]) / 2;
    let Ok(mid) = u8::try_from(mid) else {
        return false;
    };
    let mid = mid.clamp(MIN_CUT, MAX_CUT);
    if values.contains(&mid) {
        return false;
    }
    values.insert(i, mid);
    true
}
