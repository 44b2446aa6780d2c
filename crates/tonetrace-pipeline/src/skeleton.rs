//! Zhang-Suen thinning for centerline (stroke) mode.
//!
//! Reduces each foreground blob to a one-pixel-wide skeleton that keeps
//! the blob's connectivity. Every iteration runs two subiterations; each
//! marks removable pixels against a snapshot and then clears them all at
//! once. Iteration stops at a fixed point or after `width * height`
//! iterations, whichever comes first.

use crate::bitmap::BinaryBitmap;

/// Neighbor offsets P2..P9, clockwise from north.
const RING: [(i64, i64); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subiteration {
    First,
    Second,
}

/// P2..P9 around `(x, y)`, out-of-range reads as background.
fn ring(bitmap: &BinaryBitmap, x: i64, y: i64) -> [bool; 8] {
    RING.map(|(dx, dy)| bitmap.get(x + dx, y + dy))
}

/// Number of background-to-foreground transitions walking P2..P9..P2.
fn transitions(p: &[bool; 8]) -> usize {
    (0..8).filter(|&i| !p[i] && p[(i + 1) % 8]).count()
}

fn removable(p: &[bool; 8], pass: Subiteration) -> bool {
    let b = p.iter().filter(|&&v| v).count();
    if !(2..=6).contains(&b) || transitions(p) != 1 {
        return false;
    }
    let [p2, _, p4, _, p6, _, p8, _] = *p;
    match pass {
        Subiteration::First => !(p2 && p4 && p6) && !(p4 && p6 && p8),
        Subiteration::Second => !(p2 && p4 && p8) && !(p2 && p6 && p8),
    }
}

/// Run one subiteration in place. Returns the number of removed pixels.
fn subiterate(bitmap: &mut BinaryBitmap, pass: Subiteration) -> usize {
    let mut marked = Vec::new();
    for y in 0..bitmap.height() {
        for x in 0..bitmap.width() {
            let (ix, iy) = (i64::from(x), i64::from(y));
            if bitmap.get(ix, iy) && removable(&ring(bitmap, ix, iy), pass) {
                marked.push((x, y));
            }
        }
    }
    for &(x, y) in &marked {
        bitmap.set(x, y, false);
    }
    marked.len()
}

/// Thin every blob to a one-pixel-wide skeleton.
#[must_use = "returns the skeleton"]
pub fn thin(bitmap: &BinaryBitmap) -> BinaryBitmap {
    let mut out = bitmap.clone();
    let cap = bitmap.pixel_count().max(1);
    let mut iterations = 0;
    loop {
        let removed =
            subiterate(&mut out, Subiteration::First) + subiterate(&mut out, Subiteration::Second);
        iterations += 1;
        if removed == 0 {
            break;
        }
        if iterations >= cap {
            log::warn!("thinning stopped after {iterations} iterations without converging");
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_from(rows: &[&str]) -> BinaryBitmap {
        let height = u32::try_from(rows.len()).unwrap_or(0);
        let width = u32::try_from(rows.first().map_or(0, |r| r.len())).unwrap_or(0);
        BinaryBitmap::from_fn(width, height, |x, y| {
            rows[y as usize].as_bytes()[x as usize] == b'#'
        })
    }

    /// True if no 2x2 block is entirely foreground.
    fn has_no_solid_block(bm: &BinaryBitmap) -> bool {
        for y in 0..i64::from(bm.height()) - 1 {
            for x in 0..i64::from(bm.width()) - 1 {
                if bm.get(x, y) && bm.get(x + 1, y) && bm.get(x, y + 1) && bm.get(x + 1, y + 1) {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn transitions_counts_rising_edges() {
        assert_eq!(transitions(&[false; 8]), 0);
        assert_eq!(transitions(&[true; 8]), 0);
        assert_eq!(
            transitions(&[true, false, true, false, false, false, false, false]),
            2
        );
        assert_eq!(
            transitions(&[true, true, false, false, false, false, false, false]),
            1
        );
    }

    #[test]
    fn empty_bitmap_is_unchanged() {
        let bm = BinaryBitmap::new(6, 6);
        assert_eq!(thin(&bm), bm);
    }

    #[test]
    fn single_line_is_already_thin() {
        let bm = bitmap_from(&["........", ".######.", "........"]);
        let out = thin(&bm);
        // End pixels have one neighbor (B = 1) and are never removed.
        assert!(out.get(1, 1) && out.get(6, 1));
        assert_eq!(out.count_foreground(), bm.count_foreground());
    }

    #[test]
    fn thick_bar_thins_to_one_pixel() {
        let bm = bitmap_from(&[
            "............",
            ".##########.",
            ".##########.",
            ".##########.",
            ".##########.",
            "............",
        ]);
        let out = thin(&bm);
        assert!(!out.is_blank());
        assert!(out.count_foreground() < bm.count_foreground() / 2);
        assert!(has_no_solid_block(&out));
    }

    #[test]
    fn filled_disc_keeps_a_small_core() {
        let bm = BinaryBitmap::from_fn(21, 21, |x, y| {
            let dx = f64::from(x) - 10.0;
            let dy = f64::from(y) - 10.0;
            dx.hypot(dy) <= 7.0
        });
        let out = thin(&bm);
        assert!(!out.is_blank(), "thinning must not erase a blob");
        assert!(out.count_foreground() * 10 < bm.count_foreground());
    }

    #[test]
    fn ring_keeps_its_loop() {
        let bm = BinaryBitmap::from_fn(21, 21, |x, y| {
            let d = (f64::from(x) - 10.0).hypot(f64::from(y) - 10.0);
            (4.0..=7.0).contains(&d)
        });
        let out = thin(&bm);
        // The hole stays open: the center is still background and the
        // skeleton still surrounds it on all four sides.
        assert!(!out.get(10, 10));
        assert!((0..10).any(|x| out.get(x, 10)));
        assert!((11..21).any(|x| out.get(x, 10)));
        assert!((0..10).any(|y| out.get(10, y)));
        assert!((11..21).any(|y| out.get(10, y)));
    }
}
