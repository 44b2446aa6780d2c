//! Contour tracing: extract sub-pixel boundaries from a binary grid.
//!
//! This module defines the [`ContourTracer`] trait for pluggable contour
//! tracing algorithms and the [`ContourTracerKind`] enum for selecting
//! which algorithm to use at runtime.
//!
//! # Marching squares
//!
//! Grid corners sit on pixel centers, so every 2x2 block of pixels forms
//! one cell. Each cell's 4-bit case (TL=8, TR=4, BR=2, BL=1) selects one
//! or two oriented segments from a fixed table. Segments are oriented so
//! foreground lies to the right of the walking direction in image
//! coordinates (y down); as a result outer boundaries come out with
//! positive signed area and holes with negative area. The two saddle
//! cases (5 and 10) keep diagonal pixels apart.
//!
//! A walk follows exit edges from cell to cell, recording `(cell, entry
//! edge)` keys. It closes on returning to its start key and ends open when
//! it leaves the grid. Walks that enter from the grid boundary run first so
//! that open chains are traced from their true start.

use crate::bitmap::BinaryBitmap;
use crate::types::{Contour, Point};

/// Contours with fewer points than this are discarded.
pub const MIN_CONTOUR_POINTS: usize = 5;

/// Minimum point count when tracing skeletons.
///
/// Thinning can collapse a whole blob to a single pixel, whose boundary
/// has four points; it is still the only trace of that shape.
pub const MIN_SKELETON_POINTS: usize = 3;

/// Total walk steps are capped at this multiple of the cell count.
const STEP_CAP_FACTOR: usize = 4;

/// Iso-level between background (0) and foreground (1).
const ISO_LEVEL: f64 = 0.5;

/// Selects which contour tracing algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContourTracerKind {
    /// Marching squares with linear interpolation at the 0.5 iso-level.
    #[default]
    MarchingSquares,
}

/// Trait for contour tracing strategies.
///
/// Input: a binary grid (foreground = `true`).
/// Output: boundaries ranked by absolute area, largest first.
pub trait ContourTracer {
    /// Trace contours, dropping those with fewer than `min_points` points.
    fn trace(&self, bitmap: &BinaryBitmap, min_points: usize) -> Vec<Contour>;
}

impl ContourTracer for ContourTracerKind {
    fn trace(&self, bitmap: &BinaryBitmap, min_points: usize) -> Vec<Contour> {
        match *self {
            Self::MarchingSquares => MarchingSquares::new(bitmap).run(min_points),
        }
    }
}

/// Trace with the default tracer and [`MIN_CONTOUR_POINTS`].
#[must_use = "returns the traced contours"]
pub fn trace(bitmap: &BinaryBitmap) -> Vec<Contour> {
    ContourTracerKind::default().trace(bitmap, MIN_CONTOUR_POINTS)
}

/// Cell edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    const fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Right => Self::Left,
            Self::Bottom => Self::Top,
            Self::Left => Self::Right,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Top => 0,
            Self::Right => 1,
            Self::Bottom => 2,
            Self::Left => 3,
        }
    }
}

/// Oriented `(entry, exit)` segments per case.
fn segments(case: u8) -> &'static [(Edge, Edge)] {
    use Edge::{Bottom as B, Left as L, Right as R, Top as T};
    match case {
        1 => &[(L, B)],
        2 => &[(B, R)],
        3 => &[(L, R)],
        4 => &[(R, T)],
        5 => &[(L, B), (R, T)],
        6 => &[(B, T)],
        7 => &[(L, T)],
        8 => &[(T, L)],
        9 => &[(T, B)],
        10 => &[(T, L), (B, R)],
        11 => &[(T, R)],
        12 => &[(R, L)],
        13 => &[(R, B)],
        14 => &[(B, L)],
        _ => &[],
    }
}

/// Interpolation parameter of the iso crossing between two corner values.
fn crossing(a: f64, b: f64) -> f64 {
    if (b - a).abs() < f64::EPSILON {
        0.5
    } else {
        (ISO_LEVEL - a) / (b - a)
    }
}

struct MarchingSquares<'a> {
    bitmap: &'a BinaryBitmap,
    /// Cells per row (`width - 1`).
    cols: i64,
    /// Cell rows (`height - 1`).
    rows: i64,
    /// One flag per `(cell, entry edge)`.
    visited: Vec<bool>,
    steps_left: usize,
}

impl<'a> MarchingSquares<'a> {
    fn new(bitmap: &'a BinaryBitmap) -> Self {
        let cols = (i64::from(bitmap.width()) - 1).max(0);
        let rows = (i64::from(bitmap.height()) - 1).max(0);
        let cells = usize::try_from(cols * rows).unwrap_or(0);
        Self {
            bitmap,
            cols,
            rows,
            visited: vec![false; cells * 4],
            steps_left: cells.saturating_mul(STEP_CAP_FACTOR),
        }
    }

    fn value(&self, x: i64, y: i64) -> f64 {
        if self.bitmap.get(x, y) { 1.0 } else { 0.0 }
    }

    fn case(&self, cx: i64, cy: i64) -> u8 {
        let b = self.bitmap;
        u8::from(b.get(cx, cy)) << 3
            | u8::from(b.get(cx + 1, cy)) << 2
            | u8::from(b.get(cx + 1, cy + 1)) << 1
            | u8::from(b.get(cx, cy + 1))
    }

    fn key(&self, cx: i64, cy: i64, edge: Edge) -> usize {
        usize::try_from(cy * self.cols + cx).unwrap_or(0) * 4 + edge.index()
    }

    /// Crossing point on a cell edge, shifted onto pixel centers.
    #[allow(clippy::cast_precision_loss)]
    fn point_on(&self, cx: i64, cy: i64, edge: Edge) -> Point {
        let (x, y) = (cx as f64 + 0.5, cy as f64 + 0.5);
        match edge {
            Edge::Top => {
                let t = crossing(self.value(cx, cy), self.value(cx + 1, cy));
                Point::new(x + t, y)
            }
            Edge::Right => {
                let t = crossing(self.value(cx + 1, cy), self.value(cx + 1, cy + 1));
                Point::new(x + 1.0, y + t)
            }
            Edge::Bottom => {
                let t = crossing(self.value(cx, cy + 1), self.value(cx + 1, cy + 1));
                Point::new(x + t, y + 1.0)
            }
            Edge::Left => {
                let t = crossing(self.value(cx, cy), self.value(cx, cy + 1));
                Point::new(x, y + t)
            }
        }
    }

    /// The cell across `edge`, or `None` outside the grid.
    fn neighbor(&self, cx: i64, cy: i64, edge: Edge) -> Option<(i64, i64)> {
        let (nx, ny) = match edge {
            Edge::Top => (cx, cy - 1),
            Edge::Right => (cx + 1, cy),
            Edge::Bottom => (cx, cy + 1),
            Edge::Left => (cx - 1, cy),
        };
        ((0..self.cols).contains(&nx) && (0..self.rows).contains(&ny)).then_some((nx, ny))
    }

    fn walk(&mut self, start: (i64, i64, Edge)) -> Contour {
        let (mut cx, mut cy, mut entry) = start;
        let mut points = Vec::new();
        if self.neighbor(cx, cy, entry).is_none() {
            points.push(self.point_on(cx, cy, entry));
        }

        let mut closed = false;
        loop {
            if self.steps_left == 0 {
                log::warn!("contour walk hit the step cap; keeping it open");
                break;
            }
            self.steps_left -= 1;

            let key = self.key(cx, cy, entry);
            self.visited[key] = true;
            let Some(&(_, exit)) = segments(self.case(cx, cy)).iter().find(|s| s.0 == entry) else {
                break;
            };
            points.push(self.point_on(cx, cy, exit));
            let Some((nx, ny)) = self.neighbor(cx, cy, exit) else {
                break;
            };
            (cx, cy, entry) = (nx, ny, exit.opposite());
            if (cx, cy, entry) == start {
                closed = true;
                break;
            }
            if self.visited[self.key(cx, cy, entry)] {
                break;
            }
        }
        Contour::new(points, closed)
    }

    fn run(mut self, min_points: usize) -> Vec<Contour> {
        let mut contours = Vec::new();
        for boundary_pass in [true, false] {
            for cy in 0..self.rows {
                for cx in 0..self.cols {
                    for &(entry, _) in segments(self.case(cx, cy)) {
                        if self.visited[self.key(cx, cy, entry)] {
                            continue;
                        }
                        if boundary_pass && self.neighbor(cx, cy, entry).is_some() {
                            continue;
                        }
                        contours.push(self.walk((cx, cy, entry)));
                    }
                }
            }
        }

        let mut kept: Vec<Contour> = contours
            .into_iter()
            .filter(|c| c.points.len() >= min_points)
            .filter(|c| !c.closed || c.area.abs() > f64::EPSILON)
            .collect();
        kept.sort_by(|a, b| b.area.abs().total_cmp(&a.area.abs()));
        kept
    }
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

    #[test]
    fn default_is_marching_squares() {
        assert_eq!(
            ContourTracerKind::default(),
            ContourTracerKind::MarchingSquares
        );
    }

    #[test]
    fn empty_image_produces_no_contours() {
        assert!(trace(&BinaryBitmap::new(10, 10)).is_empty());
    }

    #[test]
    fn degenerate_grids_produce_no_contours() {
        assert!(trace(&BinaryBitmap::from_fn(1, 5, |_, _| true)).is_empty());
        assert!(trace(&BinaryBitmap::new(0, 0)).is_empty());
    }

    #[test]
    fn square_is_closed_with_positive_area() {
        let bm = bitmap_from(&["......", "......", "..##..", "..##..", "......", "......"]);
        let contours = trace(&bm);
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert!(c.closed);
        assert_eq!(c.points.len(), 8);
        assert!((c.area - 3.5).abs() < 1e-9, "area {}", c.area);
    }

    #[test]
    fn coordinates_are_offset_to_pixel_centers() {
        let bm = bitmap_from(&["......", "......", "..##..", "..##..", "......", "......"]);
        let c = &trace(&bm)[0];
        let pts = c.points.points();
        let min_x = pts.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = pts.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        // Pixels 2 and 3 span [2, 4].
        assert!((min_x - 2.0).abs() < 1e-9);
        assert!((max_x - 4.0).abs() < 1e-9);
    }

    #[test]
    fn hole_has_negative_area() {
        let bm = bitmap_from(&[
            ".......", ".#####.", ".#####.", ".##.##.", ".#####.", ".#####.", ".......",
        ]);
        let contours = ContourTracerKind::MarchingSquares.trace(&bm, MIN_SKELETON_POINTS);
        assert_eq!(contours.len(), 2);
        assert!(contours[0].area > 0.0 && !contours[0].is_hole());
        assert!(contours[1].is_hole());
    }

    #[test]
    fn single_pixel_needs_low_minimum() {
        let bm = bitmap_from(&[".....", "..#..", "....."]);
        assert!(trace(&bm).is_empty());
        let contours = ContourTracerKind::MarchingSquares.trace(&bm, MIN_SKELETON_POINTS);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points.len(), 4);
        assert!((contours[0].area - 0.5).abs() < 1e-9);
    }

    #[test]
    fn saddle_keeps_diagonal_pixels_apart() {
        let bm = bitmap_from(&[".....", ".#...", "..#..", "....."]);
        let contours = ContourTracerKind::MarchingSquares.trace(&bm, MIN_SKELETON_POINTS);
        assert_eq!(contours.len(), 2);
        assert!(contours.iter().all(|c| c.closed && c.points.len() == 4));
    }

    #[test]
    fn foreground_on_grid_edge_yields_open_contour() {
        let bm = bitmap_from(&["##...", "##...", "....."]);
        let contours = ContourTracerKind::MarchingSquares.trace(&bm, MIN_SKELETON_POINTS);
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert!(!c.closed);
        assert_eq!(c.points.len(), 4);
        assert_eq!(c.points.first(), Some(&Point::new(2.0, 0.5)));
        assert_eq!(c.points.last(), Some(&Point::new(0.5, 2.0)));
    }

    #[test]
    fn contours_are_ranked_by_area() {
        let bm = BinaryBitmap::from_fn(30, 12, |x, y| {
            let small = (2..4).contains(&x) && (2..4).contains(&y);
            let large = (10..20).contains(&x) && (2..10).contains(&y);
            small || large
        });
        let contours = trace(&bm);
        assert_eq!(contours.len(), 2);
        assert!(contours[0].area.abs() > contours[1].area.abs());
    }
}
