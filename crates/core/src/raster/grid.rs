//! The raster grid type.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// A georeferenced grid of cells.
///
/// Cells live in an [`Array2`] indexed (row, col) with row 0 at the top.
/// The [`GeoTransform`] places the grid on the map, an optional [`CRS`]
/// names the coordinate system, and an optional nodata sentinel marks
/// cells to skip during reduction.
///
/// ```
/// use zonalis_core::Raster;
///
/// let mut ndvi: Raster<f64> = Raster::filled(2, 3, 0.5);
/// ndvi.set(0, 2, 0.82).unwrap();
/// assert_eq!(ndvi.get(0, 2).unwrap(), 0.82);
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Zero-filled grid with identity georeferencing.
    pub fn new(rows: usize, cols: usize) -> Self {
        Raster::from_array(Array2::zeros((rows, cols)))
    }

    /// Grid filled with one value.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Raster::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Grid from a row-major buffer of exactly `rows * cols` cells.
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Raster::from_array(array))
    }

    fn from_array(data: Array2<T>) -> Self {
        Raster {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Fresh zero-filled grid of another element type carrying this one's
    /// georeferencing. Derived indices are written through this so outputs
    /// stay registered with their inputs.
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total cell count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at (row, col), bounds-checked.
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Value at (row, col) without the bounds check.
    ///
    /// # Safety
    /// Caller must ensure `row < self.rows()` and `col < self.cols()`.
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Store a value at (row, col), bounds-checked.
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// The underlying array.
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Mutable view of the underlying array.
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// The affine georeferencing.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Declared coordinate system, if any.
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Declared nodata sentinel, if any.
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell edge length in map units.
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Extent as (min_x, min_y, max_x, max_y).
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Map coordinates of the center of cell (col, row).
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Fractional (col, row) index of a map coordinate.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    /// Sample the cell containing a map coordinate (nearest neighbor).
    ///
    /// Returns `None` outside the extent or when the cell holds nodata.
    pub fn value_at(&self, x: f64, y: f64) -> Option<T> {
        let (col, row) = self.geo_to_pixel(x, y);
        if col.is_nan() || row.is_nan() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        let value = self.data.get((row, col)).copied()?;
        if self.is_nodata(value) {
            return None;
        }
        Some(value)
    }

    /// Whether a value is masked under this raster's sentinel.
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Whole-grid min, max, mean and valid-cell count in one pass.
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum = 0.0;
        let mut valid = 0usize;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }
            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }
            if let Some(v) = value.to_f64() {
                sum += v;
                valid += 1;
            }
        }

        RasterStatistics {
            min,
            max,
            mean: (valid > 0).then(|| sum / valid as f64),
            valid_count: valid,
            nodata_count: self.len() - valid,
        }
    }
}

/// Whole-grid summary produced by [`Raster::statistics`].
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}
