//! Least-squares cubic Bezier fitting.
//!
//! Turns a simplified point sequence into piecewise cubic segments. Each
//! run of points is chord-length parameterized, endpoint tangents are
//! taken from the neighboring points, and the two tangent lengths are
//! solved from the 2x2 normal equations. A fit whose worst point deviates
//! more than the tolerance is split at that point and both halves are
//! fitted recursively. Two points always become a straight line, which
//! bounds the recursion.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Below this the normal-equation determinant or a tangent length is
/// treated as degenerate.
const EPSILON: f64 = 1e-12;

/// One output segment. The start point is the previous segment's end (or
/// the path's first point).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CurveSegment {
    Line { to: Point },
    Cubic { ctrl1: Point, ctrl2: Point, to: Point },
}

impl CurveSegment {
    /// End point of the segment.
    #[must_use]
    pub const fn end(&self) -> Point {
        match *self {
            Self::Line { to } | Self::Cubic { to, .. } => to,
        }
    }
}

/// A fitted segment together with the source points it approximates.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FittedSpan {
    pub(crate) source: RangeInclusive<usize>,
    pub(crate) segment: CurveSegment,
}

/// Fit `points` with cubic segments within `tolerance` pixels.
///
/// Fewer than two points yield no segments.
#[must_use = "returns the fitted segments"]
pub fn fit_curve(points: &[Point], tolerance: f64) -> Vec<CurveSegment> {
    fit_spans(points, tolerance)
        .into_iter()
        .map(|span| span.segment)
        .collect()
}

pub(crate) fn fit_spans(points: &[Point], tolerance: f64) -> Vec<FittedSpan> {
    let mut out = Vec::new();
    if points.len() >= 2 {
        fit_range(points, 0, points.len() - 1, tolerance, &mut out);
    }
    out
}

fn fit_range(points: &[Point], start: usize, end: usize, tolerance: f64, out: &mut Vec<FittedSpan>) {
    let slice = &points[start..=end];
    let line = FittedSpan {
        source: start..=end,
        segment: CurveSegment::Line { to: points[end] },
    };
    if slice.len() <= 2 {
        out.push(line);
        return;
    }

    let Some(cubic) = fit_cubic(slice) else {
        out.push(line);
        return;
    };

    let params = chord_parameters(slice);
    let (worst, error) = max_deviation(slice, &params, &cubic);
    if error <= tolerance {
        out.push(FittedSpan {
            source: start..=end,
            segment: cubic.into_segment(),
        });
        return;
    }

    let split = start + worst.clamp(1, slice.len() - 2);
    fit_range(points, start, split, tolerance, out);
    fit_range(points, split, end, tolerance, out);
}

/// A cubic Bezier with explicit start point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cubic {
    pub(crate) p0: Point,
    pub(crate) p1: Point,
    pub(crate) p2: Point,
    pub(crate) p3: Point,
}

impl Cubic {
    pub(crate) fn eval(&self, t: f64) -> Point {
        let [b0, b1, b2, b3] = bernstein(t);
        self.p0 * b0 + self.p1 * b1 + self.p2 * b2 + self.p3 * b3
    }

    const fn into_segment(self) -> CurveSegment {
        CurveSegment::Cubic {
            ctrl1: self.p1,
            ctrl2: self.p2,
            to: self.p3,
        }
    }
}

fn bernstein(t: f64) -> [f64; 4] {
    let mt = 1.0 - t;
    [mt * mt * mt, 3.0 * mt * mt * t, 3.0 * mt * t * t, t * t * t]
}

/// Cumulative chord length of each point, normalized to `[0, 1]`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn chord_parameters(points: &[Point]) -> Vec<f64> {
    let mut acc = 0.0;
    let mut params = Vec::with_capacity(points.len());
    params.push(0.0);
    for w in points.windows(2) {
        acc += w[0].distance(w[1]);
        params.push(acc);
    }
    if acc > EPSILON {
        for u in &mut params {
            *u /= acc;
        }
    } else {
        // All points coincide; spread parameters evenly.
        let last = params.len().saturating_sub(1).max(1);
        for (i, u) in params.iter_mut().enumerate() {
            *u = i as f64 / last as f64;
        }
    }
    params
}

fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Unit tangent leaving `points[0]`, falling back to the overall
/// direction when the neighbor coincides with the endpoint.
fn start_tangent(points: &[Point]) -> Option<Point> {
    let first = points[0];
    let last = points[points.len() - 1];
    (points[1] - first)
        .normalized()
        .or_else(|| (last - first).normalized())
}

fn end_tangent(points: &[Point]) -> Option<Point> {
    let n = points.len();
    let first = points[0];
    let last = points[n - 1];
    (points[n - 2] - last)
        .normalized()
        .or_else(|| (first - last).normalized())
}

/// Least-squares cubic through the endpoints of `points`.
///
/// Returns `None` when no tangent direction exists (every point
/// coincides with an endpoint).
fn fit_cubic(points: &[Point]) -> Option<Cubic> {
    let n = points.len();
    let p0 = points[0];
    let p3 = points[n - 1];
    let t1 = start_tangent(points)?;
    let t2 = end_tangent(points)?;
    let params = chord_parameters(points);

    let (mut c00, mut c01, mut c11, mut x0, mut x1) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&p, &u) in points.iter().zip(&params) {
        let [b0, b1, b2, b3] = bernstein(u);
        let a0 = t1 * b1;
        let a1 = t2 * b2;
        c00 += a0.dot(a0);
        c01 += a0.dot(a1);
        c11 += a1.dot(a1);
        let residual = p - (p0 * (b0 + b1) + p3 * (b2 + b3));
        x0 += a0.dot(residual);
        x1 += a1.dot(residual);
    }

    let det = c00.mul_add(c11, -(c01 * c01));
    let fallback = polyline_length(points) / 3.0;
    let (mut alpha1, mut alpha2) = if det.abs() > EPSILON {
        (
            x0.mul_add(c11, -(x1 * c01)) / det,
            c00.mul_add(x1, -(c01 * x0)) / det,
        )
    } else {
        (fallback, fallback)
    };
    if !(alpha1.is_finite() && alpha2.is_finite()) || alpha1 < EPSILON || alpha2 < EPSILON {
        alpha1 = fallback;
        alpha2 = fallback;
    }

    Some(Cubic {
        p0,
        p1: p0 + t1 * alpha1,
        p2: p3 + t2 * alpha2,
        p3,
    })
}

/// Index and distance of the point farthest from the curve, measured at
/// each point's chord-length parameter.
pub(crate) fn max_deviation(points: &[Point], params: &[f64], cubic: &Cubic) -> (usize, f64) {
    points
        .iter()
        .zip(params)
        .enumerate()
        .map(|(i, (&p, &u))| (i, cubic.eval(u).distance(p)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(n: usize, radius: f64, sweep: f64) -> Vec<Point> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let a = sweep * i as f64 / (n - 1) as f64;
                Point::new(radius * a.cos(), radius * a.sin())
            })
            .collect()
    }

    fn start_of(points: &[Point], span: &FittedSpan) -> Point {
        points[*span.source.start()]
    }

    #[test]
    fn two_points_make_a_line() {
        let pts = [Point::new(0.0, 0.0), Point::new(5.0, 5.0)];
        assert_eq!(
            fit_curve(&pts, 0.1),
            vec![CurveSegment::Line {
                to: Point::new(5.0, 5.0)
            }]
        );
    }

    #[test]
    fn fewer_than_two_points_make_nothing() {
        assert!(fit_curve(&[], 1.0).is_empty());
        assert!(fit_curve(&[Point::new(1.0, 1.0)], 1.0).is_empty());
    }

    #[test]
    fn coincident_points_make_a_line() {
        let pts = [Point::new(2.0, 2.0); 4];
        let segments = fit_curve(&pts, 0.5);
        assert_eq!(segments.len(), 1);
        assert!(matches!(segments[0], CurveSegment::Line { .. }));
    }

    #[test]
    fn quarter_circle_fits_one_cubic() {
        let pts = arc(20, 20.0, std::f64::consts::FRAC_PI_2);
        let segments = fit_curve(&pts, 0.5);
        assert_eq!(segments.len(), 1, "{segments:?}");
        assert!(matches!(segments[0], CurveSegment::Cubic { .. }));
        assert_eq!(segments[0].end(), pts[19]);
    }

    #[test]
    fn segments_chain_end_to_end() {
        let pts = arc(40, 30.0, 1.8 * std::f64::consts::PI);
        let spans = fit_spans(&pts, 0.25);
        assert!(spans.len() > 1);
        assert_eq!(*spans[0].source.start(), 0);
        assert_eq!(*spans[spans.len() - 1].source.end(), pts.len() - 1);
        for w in spans.windows(2) {
            assert_eq!(w[0].source.end(), w[1].source.start());
        }
    }

    #[test]
    fn every_cubic_is_within_tolerance() {
        let mut pts = arc(30, 40.0, std::f64::consts::PI);
        // A sharp corner forces at least one split.
        pts.extend((1..10).map(|i| Point::new(-40.0 + f64::from(i) * 4.0, -20.0)));
        let tolerance = 0.5;
        for span in fit_spans(&pts, tolerance) {
            let source = &pts[span.source.clone()];
            if let CurveSegment::Cubic { ctrl1, ctrl2, to } = span.segment {
                let cubic = Cubic {
                    p0: start_of(&pts, &span),
                    p1: ctrl1,
                    p2: ctrl2,
                    p3: to,
                };
                let (_, error) = max_deviation(source, &chord_parameters(source), &cubic);
                assert!(error <= tolerance, "span {:?} error {error}", span.source);
            } else {
                assert_eq!(source.len(), 2, "lines only for 2-point spans or degenerate input");
            }
        }
    }

    #[test]
    fn collinear_points_fit_exactly() {
        let pts: Vec<Point> = (0..6).map(|i| Point::new(f64::from(i), 0.0)).collect();
        let spans = fit_spans(&pts, 0.01);
        assert_eq!(spans.len(), 1);
        if let CurveSegment::Cubic { ctrl1, ctrl2, .. } = spans[0].segment {
            assert!(ctrl1.y.abs() < 1e-9 && ctrl2.y.abs() < 1e-9);
        }
    }

    #[test]
    fn chord_parameters_span_unit_interval() {
        let pts = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(3.0, 0.0),
        ];
        let u = chord_parameters(&pts);
        assert_eq!(u.len(), 3);
        assert!(u[0].abs() < f64::EPSILON);
        assert!((u[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!((u[2] - 1.0).abs() < f64::EPSILON);
    }
}
