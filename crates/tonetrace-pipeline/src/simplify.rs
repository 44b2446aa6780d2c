//! Path simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Reduces point count in contours by removing points that are within
//! a given tolerance of the line between their neighbors. Implemented
//! from scratch to keep the pipeline free of geometry crates.
//!
//! Closed contours are simplified as an open polyline from the first
//! point to the last, which leaves the wrap-around chord (last retained
//! point back to the first) unchecked. [`simplify_contour`] repairs that
//! seam afterwards.

use crate::types::{Contour, Point, Polyline};

/// Smallest tolerance [`adaptive_tolerance`] returns.
pub const MIN_TOLERANCE: f64 = 0.25;

/// Largest tolerance [`adaptive_tolerance`] returns.
pub const MAX_TOLERANCE: f64 = 2.0;

/// Base tolerance for a tiny contour.
const BASE_TOLERANCE: f64 = 0.4;

/// Extra tolerance reached at [`PERIMETER_SATURATION`] pixels of boundary.
const PERIMETER_BONUS: f64 = 0.5;

const PERIMETER_SATURATION: f64 = 100.0;

/// Fraction of the tolerance removed for maximally complex contours.
const COMPLEXITY_DISCOUNT: f64 = 0.5;

/// Error bound for one contour.
///
/// Long boundaries tolerate more deviation (base 0.4 to 0.9 px). Busy
/// contours, with many points for their enclosed area, tolerate less.
/// `scale` multiplies the result before clamping to
/// [`MIN_TOLERANCE`]..=[`MAX_TOLERANCE`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn adaptive_tolerance(contour: &Contour, scale: f64) -> f64 {
    let growth = (contour.perimeter() / PERIMETER_SATURATION).min(1.0);
    let base = PERIMETER_BONUS.mul_add(growth, BASE_TOLERANCE);
    let complexity = (contour.points.len() as f64 / contour.area.abs().max(1.0)).min(1.0);
    let discount = COMPLEXITY_DISCOUNT.mul_add(-complexity, 1.0);
    let tol = base * scale * discount;
    if tol.is_finite() {
        tol.clamp(MIN_TOLERANCE, MAX_TOLERANCE)
    } else {
        MIN_TOLERANCE
    }
}

/// Simplify a single polyline using the Ramer-Douglas-Peucker algorithm.
///
/// Points within `tolerance` pixels of the line between their endpoints
/// are removed. A tolerance of 0.0 preserves all points.
///
/// Polylines with fewer than 3 points are returned unchanged.
#[must_use = "returns the simplified polyline"]
pub fn simplify(polyline: &Polyline, tolerance: f64) -> Polyline {
    let points = polyline.points();
    if points.len() < 3 {
        return polyline.clone();
    }
    Polyline::new(retain(points, &rdp_mask(points, tolerance)))
}

/// Simplify a contour, keeping its closed/open tag.
///
/// Open contours are plain RDP. For closed contours the final point is
/// dropped when it lies within `tolerance` of the closing chord, then the
/// skipped points between the last retained point and the first are
/// checked against that chord; the farthest one beyond `tolerance` is
/// kept so the seam does not cut a corner.
#[must_use = "returns the simplified contour"]
pub fn simplify_contour(contour: &Contour, tolerance: f64) -> Contour {
    let points = contour.points.points();
    if !contour.closed {
        return Contour::new(simplify(&contour.points, tolerance).into_points(), false);
    }
    if points.len() < 4 {
        return contour.clone();
    }

    let n = points.len();
    let mut kept = rdp_mask(points, tolerance);

    if let Some(prev) = (1..n - 1).rev().find(|&i| kept[i]) {
        if perpendicular_distance(points[n - 1], points[prev], points[0]) <= tolerance {
            kept[n - 1] = false;
        }
    }

    if let Some(last) = (0..n).rev().find(|&i| kept[i]) {
        let seam = (last + 1..n)
            .map(|i| (i, perpendicular_distance(points[i], points[last], points[0])))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((i, d)) = seam {
            if d > tolerance {
                kept[i] = true;
            }
        }
    }

    Contour::new(retain(points, &kept), true)
}

fn rdp_mask(points: &[Point], tolerance: f64) -> Vec<bool> {
    let mut kept = vec![false; points.len()];
    if let Some(last) = points.len().checked_sub(1) {
        kept[0] = true;
        kept[last] = true;
        rdp_recurse(points, 0, last, tolerance, &mut kept);
    }
    kept
}

fn retain(points: &[Point], kept: &[bool]) -> Vec<Point> {
    points
        .iter()
        .zip(kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect()
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` that is farthest from the
/// line segment between them. If that distance exceeds `tolerance`, the
/// point is kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from point `p` to the line defined by `a` and `b`.
///
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
pub(crate) fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dense closed square, clockwise on screen, one point per pixel.
    #[allow(clippy::cast_precision_loss)]
    fn square_contour(side: usize) -> Contour {
        let s = side as f64;
        let mut pts = Vec::new();
        for i in 0..side {
            pts.push(Point::new(i as f64, 0.0));
        }
        for i in 0..side {
            pts.push(Point::new(s, i as f64));
        }
        for i in 0..side {
            pts.push(Point::new(s - i as f64, s));
        }
        for i in 0..side {
            pts.push(Point::new(0.0, s - i as f64));
        }
        Contour::new(pts, true)
    }

    #[test]
    fn empty_polyline_unchanged() {
        let pl = Polyline::new(vec![]);
        assert!(simplify(&pl, 1.0).is_empty());
    }

    #[test]
    fn two_points_unchanged() {
        let pl = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        assert_eq!(simplify(&pl, 1.0).len(), 2);
    }

    #[test]
    fn zero_tolerance_preserves_all_points() {
        let pl = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.1),
            Point::new(2.0, 0.0),
            Point::new(3.0, 0.05),
            Point::new(4.0, 0.0),
        ]);
        assert_eq!(simplify(&pl, 0.0).len(), 5);
    }

    #[test]
    fn collinear_points_collapse_to_endpoints() {
        let pl = Polyline::new((0..5).map(|i| Point::new(f64::from(i), f64::from(i))).collect());
        let result = simplify(&pl, 0.1);
        assert_eq!(result.points(), &[Point::new(0.0, 0.0), Point::new(4.0, 4.0)]);
    }

    #[test]
    fn zigzag_retains_peaks() {
        let pl = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 5.0),
            Point::new(4.0, 0.0),
            Point::new(6.0, 5.0),
            Point::new(8.0, 0.0),
        ]);
        assert_eq!(simplify(&pl, 1.0).len(), 5);
        assert_eq!(simplify(&pl, 10.0).len(), 2);
    }

    #[test]
    fn closed_square_keeps_its_four_corners() {
        let c = square_contour(10);
        let out = simplify_contour(&c, 0.5);
        assert!(out.closed);
        let pts = out.points.points();
        for corner in [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ] {
            assert!(pts.contains(&corner), "missing corner {corner:?} in {pts:?}");
        }
        assert!((out.area - c.area).abs() < 1e-9);
    }

    #[test]
    fn seam_point_is_restored() {
        // RDP over the open sequence skips (0.6, 5), which is close to the
        // chord (0, 10) -> (0.45, 1). The last point is then dropped for
        // being close to the closing chord (0, 10) -> (0, 0), and the
        // skipped bulge is more than the tolerance away from that chord.
        let c = Contour::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
                Point::new(0.6, 5.0),
                Point::new(0.45, 1.0),
            ],
            true,
        );
        let out = simplify_contour(&c, 0.5);
        let pts = out.points.points();
        assert_eq!(pts.len(), 5, "{pts:?}");
        assert_eq!(pts[4], Point::new(0.6, 5.0));
    }

    #[test]
    fn trailing_point_on_closing_chord_is_dropped() {
        let c = Contour::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(5.0, 10.0),
                Point::new(0.0, 10.0),
                Point::new(0.0, 5.0),
            ],
            true,
        );
        let out = simplify_contour(&c, 0.5);
        assert_eq!(
            out.points.points(),
            &[
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ]
        );
    }

    #[test]
    fn open_contour_stays_open() {
        let c = Contour::new(
            (0..6).map(|i| Point::new(f64::from(i), 0.0)).collect(),
            false,
        );
        let out = simplify_contour(&c, 0.5);
        assert!(!out.closed);
        assert_eq!(out.points.len(), 2);
    }

    #[test]
    fn tolerance_is_clamped() {
        let c = square_contour(10);
        for scale in [0.0, 0.01, 1.0, 100.0, f64::INFINITY] {
            let t = adaptive_tolerance(&c, scale);
            assert!((MIN_TOLERANCE..=MAX_TOLERANCE).contains(&t), "scale {scale}: {t}");
        }
    }

    #[test]
    fn longer_contours_get_looser_tolerance() {
        let small = adaptive_tolerance(&square_contour(10), 1.0);
        let large = adaptive_tolerance(&square_contour(60), 1.0);
        assert!(large > small, "{large} <= {small}");
    }

    #[test]
    fn perpendicular_distance_on_axis() {
        let d = perpendicular_distance(
            Point::new(1.0, 3.0),
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
        );
        assert!((d - 3.0).abs() < 1e-10);
    }

    #[test]
    fn perpendicular_distance_coincident_endpoints() {
        let d = perpendicular_distance(
            Point::new(3.0, 4.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
        );
        assert!((d - 5.0).abs() < 1e-10);
    }
}
