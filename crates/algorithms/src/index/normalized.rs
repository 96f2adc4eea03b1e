//! Normalized-ratio indices
//!
//! The `(a - b) / (a + b + eps)` family used for vegetation, water and
//! moisture mapping. The small epsilon keeps dark pixels (both bands near
//! zero) from dividing by zero; pixels whose denominator still vanishes
//! come out as NaN, never as a fabricated zero.

use crate::maybe_rayon::*;
use zonalis_core::{Raster, Result};

use super::{build_output, check_dimensions, is_nodata_f64};

/// Denominator stabilizer used by every ratio index unless overridden.
pub const DEFAULT_EPSILON: f64 = 1e-4;

/// Compute the stabilized normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b + epsilon)`
///
/// Result is in the range [-1, 1]. Pixels where either band is nodata,
/// or where the stabilized denominator still vanishes, are set to NaN.
pub fn normalized_difference(
    band_a: &Raster<f64>,
    band_b: &Raster<f64>,
    epsilon: f64,
) -> Result<Raster<f64>> {
    check_dimensions(band_a, band_b)?;

    let (rows, cols) = band_a.shape();
    let nodata_a = band_a.nodata();
    let nodata_b = band_b.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };

                if is_nodata_f64(a, nodata_a) || is_nodata_f64(b, nodata_b) {
                    continue;
                }

                let denom = a + b + epsilon;
                if denom.abs() < 1e-10 {
                    continue;
                }

                row_data[col] = (a - b) / denom;
            }
            row_data
        })
        .collect();

    build_output(band_a, rows, cols, data)
}

/// Scalar form of [`normalized_difference`] for values that already went
/// through a regional reduction. Nulls propagate.
pub fn normalized_ratio(a: Option<f64>, b: Option<f64>, epsilon: f64) -> Option<f64> {
    let (a, b) = (a?, b?);
    if a.is_nan() || b.is_nan() {
        return None;
    }
    let denom = a + b + epsilon;
    if denom.abs() < 1e-10 {
        return None;
    }
    Some((a - b) / denom)
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red + eps)`
///
/// Values range from -1 to 1:
/// - Dense vegetation: 0.6 to 0.9
/// - Sparse vegetation: 0.2 to 0.5
/// - Bare soil: 0.1 to 0.2
/// - Water/clouds: -1.0 to 0.0
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red, DEFAULT_EPSILON)
}

/// Normalized Difference Water Index (McFeeters, 1996)
///
/// `NDWI = (Green - NIR) / (Green + NIR + eps)`
///
/// Positive values indicate water bodies.
pub fn ndwi(green: &Raster<f64>, nir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(green, nir, DEFAULT_EPSILON)
}

/// Normalized Difference Moisture Index
///
/// `NDMI = (NIR - SWIR) / (NIR + SWIR + eps)`
///
/// Tracks vegetation water content; high values mean moist canopy.
pub fn ndmi(nir: &Raster<f64>, swir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, swir, DEFAULT_EPSILON)
}

/// Modified Difference Vegetation Index
///
/// `MDVI = (2 * NIR - Red) / (2 * NIR + Red + eps)`
///
/// Doubling the NIR term stretches the dynamic range over dense canopy.
pub fn mdvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    check_dimensions(nir, red)?;

    let (rows, cols) = nir.shape();
    let nodata_nir = nir.nodata();
    let nodata_red = red.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let n = unsafe { nir.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };

                if is_nodata_f64(n, nodata_nir) || is_nodata_f64(r, nodata_red) {
                    continue;
                }

                let denom = 2.0 * n + r + DEFAULT_EPSILON;
                if denom.abs() < 1e-10 {
                    continue;
                }

                row_data[col] = (2.0 * n - r) / denom;
            }
            row_data
        })
        .collect();

    build_output(nir, rows, cols, data)
}

/// Parameters for the Enhanced Vegetation Index
#[derive(Debug, Clone, Copy)]
pub struct EviParams {
    /// Gain factor (default 2.5)
    pub g: f64,
    /// Red coefficient (default 6.0)
    pub c1: f64,
    /// Blue coefficient (default 7.5)
    pub c2: f64,
    /// Canopy background adjustment (default 1.0)
    pub l: f64,
    /// Denominator stabilizer (default [`DEFAULT_EPSILON`])
    pub epsilon: f64,
}

impl Default for EviParams {
    fn default() -> Self {
        Self {
            g: 2.5,
            c1: 6.0,
            c2: 7.5,
            l: 1.0,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Enhanced Vegetation Index (Huete et al., 2002)
///
/// `EVI = G * (NIR - Red) / (NIR + C1 * Red - C2 * Blue + L + eps)`
///
/// More sensitive than NDVI in high biomass areas and reduces
/// atmospheric and soil noise.
pub fn evi(
    nir: &Raster<f64>,
    red: &Raster<f64>,
    blue: &Raster<f64>,
    params: EviParams,
) -> Result<Raster<f64>> {
    check_dimensions(nir, red)?;
    check_dimensions(nir, blue)?;

    let (rows, cols) = nir.shape();
    let nodata_nir = nir.nodata();
    let nodata_red = red.nodata();
    let nodata_blue = blue.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let n = unsafe { nir.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };
                let b = unsafe { blue.get_unchecked(row, col) };

                if is_nodata_f64(n, nodata_nir)
                    || is_nodata_f64(r, nodata_red)
                    || is_nodata_f64(b, nodata_blue)
                {
                    continue;
                }

                let denom = n + params.c1 * r - params.c2 * b + params.l + params.epsilon;
                if denom.abs() < 1e-10 {
                    continue;
                }

                row_data[col] = params.g * (n - r) / denom;
            }
            row_data
        })
        .collect();

    build_output(nir, rows, cols, data)
}
