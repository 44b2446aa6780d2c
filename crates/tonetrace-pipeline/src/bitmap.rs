//! Binary grids and per-layer binarization.
//!
//! [`BinaryBitmap`] is the common currency between the edge detector,
//! the bitmap builder, the skeletonizer, and the contour tracer.
//! [`build_layer_bitmap`] thresholds the gray image for one layer and
//! cleans isolated noise everywhere the edge mask does not vouch for the
//! raw result.

use crate::types::LumaImage;

/// Offsets of the 8-neighborhood.
pub(crate) const NEIGHBORS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

/// A width x height grid of booleans, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryBitmap {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

/// High-confidence boundary pixels, computed once per image.
pub type EdgeMask = BinaryBitmap;

impl BinaryBitmap {
    /// An all-background grid.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width as usize * height as usize],
        }
    }

    /// Build a grid by evaluating `f` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Total number of cells.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.cells.len()
    }

    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Value at `(x, y)`. Out-of-range coordinates read as background.
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> bool {
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) if x < self.width && y < self.height => self.cells[self.index(x, y)],
            _ => false,
        }
    }

    /// Set the value at `(x, y)`. Out-of-range writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.cells[i] = value;
        }
    }

    /// Number of foreground cells among the 8 neighbors.
    #[must_use]
    pub fn count_neighbors(&self, x: u32, y: u32) -> usize {
        let (x, y) = (i64::from(x), i64::from(y));
        NEIGHBORS_8
            .iter()
            .filter(|&&(dx, dy)| self.get(x + dx, y + dy))
            .count()
    }

    /// Number of foreground cells.
    #[must_use]
    pub fn count_foreground(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Returns `true` if no cell is foreground.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    /// Set every cell on the outer ring to background.
    pub fn clear_border(&mut self) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        for x in 0..self.width {
            self.set(x, 0, false);
            self.set(x, self.height - 1, false);
        }
        for y in 0..self.height {
            self.set(0, y, false);
            self.set(self.width - 1, y, false);
        }
    }
}

/// Foreground pixels with fewer foreground neighbors than this erode.
const ERODE_BELOW: usize = 3;

/// Background pixels with at least this many foreground neighbors fill.
const FILL_AT: usize = 5;

/// Edge-assisted fill: this many foreground neighbors...
const EDGE_FILL_AT: usize = 3;

/// ...plus at least this many edge-marked neighbors.
const EDGE_NEIGHBORS_AT: usize = 2;

/// Binarize one layer.
///
/// A pixel is foreground when its gray value is below `cutoff`. Pixels
/// on the edge mask keep that raw value. Elsewhere isolated foreground
/// erodes and enclosed background fills, using neighbor counts from the
/// raw binarization. The outer ring is always background.
#[must_use = "returns the layer bitmap"]
pub fn build_layer_bitmap(gray: &LumaImage, cutoff: f32, edges: &EdgeMask) -> BinaryBitmap {
    let (width, height) = gray.dimensions();
    let raw = BinaryBitmap::from_fn(width, height, |x, y| gray.get_pixel(x, y).0[0] < cutoff);

    let mut out = BinaryBitmap::from_fn(width, height, |x, y| {
        let (ix, iy) = (i64::from(x), i64::from(y));
        let value = raw.get(ix, iy);
        if edges.get(ix, iy) {
            return value;
        }
        let fg = raw.count_neighbors(x, y);
        if value {
            fg >= ERODE_BELOW
        } else {
            fg >= FILL_AT || (fg >= EDGE_FILL_AT && edges.count_neighbors(x, y) >= EDGE_NEIGHBORS_AT)
        }
    });
    out.clear_border();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gray_from(rows: &[&str]) -> LumaImage {
        let height = u32::try_from(rows.len()).unwrap_or(0);
        let width = u32::try_from(rows.first().map_or(0, |r| r.len())).unwrap_or(0);
        LumaImage::from_fn(width, height, |x, y| {
            let c = rows[y as usize].as_bytes()[x as usize];
            Luma([if c == b'#' { 0.0 } else { 255.0 }])
        })
    }

    #[test]
    fn out_of_range_reads_background() {
        let mut bm = BinaryBitmap::new(3, 3);
        bm.set(0, 0, true);
        assert!(bm.get(0, 0));
        assert!(!bm.get(-1, 0));
        assert!(!bm.get(3, 0));
        bm.set(5, 5, true);
        assert_eq!(bm.count_foreground(), 1);
    }

    #[test]
    fn neighbor_count_ignores_center() {
        let bm = BinaryBitmap::from_fn(3, 3, |_, _| true);
        assert_eq!(bm.count_neighbors(1, 1), 8);
        assert_eq!(bm.count_neighbors(0, 0), 3);
    }

    #[test]
    fn clear_border_keeps_interior() {
        let mut bm = BinaryBitmap::from_fn(4, 4, |_, _| true);
        bm.clear_border();
        assert_eq!(bm.count_foreground(), 4);
        assert!(bm.get(1, 1) && bm.get(2, 2));
    }

    #[test]
    fn isolated_pixel_erodes_without_edges() {
        let gray = gray_from(&[".....", ".....", "..#..", ".....", "....."]);
        let edges = EdgeMask::new(5, 5);
        let bm = build_layer_bitmap(&gray, 128.0, &edges);
        assert!(bm.is_blank());
    }

    #[test]
    fn edge_marked_pixel_survives() {
        let gray = gray_from(&[".....", ".....", "..#..", ".....", "....."]);
        let mut edges = EdgeMask::new(5, 5);
        edges.set(2, 2, true);
        let bm = build_layer_bitmap(&gray, 128.0, &edges);
        assert!(bm.get(2, 2));
        assert_eq!(bm.count_foreground(), 1);
    }

    #[test]
    fn pinhole_fills() {
        let gray = gray_from(&[
            ".......", ".#####.", ".#####.", ".##.##.", ".#####.", ".#####.", ".......",
        ]);
        let edges = EdgeMask::new(7, 7);
        let bm = build_layer_bitmap(&gray, 128.0, &edges);
        assert!(bm.get(3, 3), "enclosed background pixel should fill");
    }

    #[test]
    fn two_by_two_square_survives() {
        let gray = gray_from(&["......", "......", "..##..", "..##..", "......", "......"]);
        let edges = EdgeMask::new(6, 6);
        let bm = build_layer_bitmap(&gray, 128.0, &edges);
        assert_eq!(bm.count_foreground(), 4);
    }

    #[test]
    fn border_is_forced_to_background() {
        let gray = LumaImage::from_pixel(6, 6, Luma([0.0]));
        let edges = EdgeMask::new(6, 6);
        let bm = build_layer_bitmap(&gray, 128.0, &edges);
        assert_eq!(bm.count_foreground(), 16);
        assert!(!bm.get(0, 3) && !bm.get(5, 3));
    }
}
