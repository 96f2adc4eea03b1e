//! Affine mapping between grid indices and map coordinates.

use serde::{Deserialize, Serialize};

/// Affine georeferencing coefficients.
///
/// Maps a (col, row) cell index to map coordinates:
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// The origin is the outer corner of the top-left cell. North-up imagery
/// has zero rotation terms and a negative `pixel_height`, which is the only
/// orientation the sampling walk accepts; the rotation terms are carried so
/// a rotated file can at least be detected and refused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform with the given origin and cell dimensions.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    fn corner(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Map coordinates of the center of cell (col, row).
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.corner(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional (col, row) index of a map coordinate.
    ///
    /// The integer part selects the cell; callers floor it themselves.
    /// A degenerate transform yields NaN.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-10 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        (col, row)
    }

    /// Cell edge length, assuming square cells.
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// True for unrotated imagery with rows running north to south.
    pub fn is_north_up(&self) -> bool {
        self.row_rotation.abs() < 1e-10
            && self.col_rotation.abs() < 1e-10
            && self.pixel_height < 0.0
    }

    /// Extent of a `cols` x `rows` grid as (min_x, min_y, max_x, max_y).
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let (c, r) = (cols as f64, rows as f64);
        let corners = [
            self.corner(0.0, 0.0),
            self.corner(c, 0.0),
            self.corner(0.0, r),
            self.corner(c, r),
        ];
        let mut extent = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (x, y) in corners {
            extent.0 = extent.0.min(x);
            extent.1 = extent.1.min(y);
            extent.2 = extent.2.max(x);
            extent.3 = extent.3.max(y);
        }
        extent
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        GeoTransform::new(0.0, 0.0, 1.0, -1.0)
    }
}
