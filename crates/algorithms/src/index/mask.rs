//! Binary masks over rasters
//!
//! Masks are `f64` rasters holding 1.0 (set), 0.0 (clear) or NaN (no
//! data), so they compose with every other raster operation without a
//! separate cell type. Build one with [`threshold_mask`], combine masks
//! with [`mask_and`] / [`mask_or`] / [`mask_not`], and cut a raster down
//! to the masked cells with [`apply_mask`].

use crate::maybe_rayon::*;
use zonalis_core::{Error, Raster, Result};

use super::{build_output, check_dimensions, is_nodata_f64};

/// Comparison operator of a threshold test.
///
/// `Eq` and `Ne` compare exactly, which is only meaningful for rasters
/// holding class codes or other integral values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Cmp {
    fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            Cmp::Gt => value > threshold,
            Cmp::Ge => value >= threshold,
            Cmp::Lt => value < threshold,
            Cmp::Le => value <= threshold,
            Cmp::Eq => value == threshold,
            Cmp::Ne => value != threshold,
        }
    }
}

/// What a threshold test does with nodata cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodataPolicy {
    /// Nodata stays nodata in the mask.
    #[default]
    Propagate,
    /// Nodata counts as failing the test and becomes 0.
    TreatAsFalse,
}

/// Mask of cells passing `value <cmp> threshold`.
pub fn threshold_mask(
    raster: &Raster<f64>,
    cmp: Cmp,
    threshold: f64,
    policy: NodataPolicy,
) -> Result<Raster<f64>> {
    if threshold.is_nan() {
        return Err(Error::InvalidParameter {
            name: "threshold",
            value: "NaN".to_string(),
            reason: "the threshold must be a number".to_string(),
        });
    }
    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let v = unsafe { raster.get_unchecked(row, col) };
                if is_nodata_f64(v, nodata) {
                    if policy == NodataPolicy::TreatAsFalse {
                        row_data[col] = 0.0;
                    }
                    continue;
                }
                row_data[col] = if cmp.evaluate(v, threshold) { 1.0 } else { 0.0 };
            }
            row_data
        })
        .collect();

    build_output(raster, rows, cols, data)
}

/// Cells set in both masks. Nodata in either side propagates.
pub fn mask_and(a: &Raster<f64>, b: &Raster<f64>) -> Result<Raster<f64>> {
    combine(a, b, |x, y| x && y)
}

/// Cells set in either mask. Nodata in either side propagates.
pub fn mask_or(a: &Raster<f64>, b: &Raster<f64>) -> Result<Raster<f64>> {
    combine(a, b, |x, y| x || y)
}

fn combine(
    a: &Raster<f64>,
    b: &Raster<f64>,
    op: impl Fn(bool, bool) -> bool + Sync,
) -> Result<Raster<f64>> {
    check_dimensions(a, b)?;
    let (rows, cols) = a.shape();
    let nodata_a = a.nodata();
    let nodata_b = b.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let x = unsafe { a.get_unchecked(row, col) };
                let y = unsafe { b.get_unchecked(row, col) };
                if is_nodata_f64(x, nodata_a) || is_nodata_f64(y, nodata_b) {
                    continue;
                }
                row_data[col] = if op(x != 0.0, y != 0.0) { 1.0 } else { 0.0 };
            }
            row_data
        })
        .collect();

    build_output(a, rows, cols, data)
}

/// Inverted mask. Nodata stays nodata.
pub fn mask_not(mask: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = mask.shape();
    let nodata = mask.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let v = unsafe { mask.get_unchecked(row, col) };
                if is_nodata_f64(v, nodata) {
                    continue;
                }
                row_data[col] = if v != 0.0 { 0.0 } else { 1.0 };
            }
            row_data
        })
        .collect();

    build_output(mask, rows, cols, data)
}

/// Keep raster cells where the mask is set; everything else is nodata.
pub fn apply_mask(raster: &Raster<f64>, mask: &Raster<f64>) -> Result<Raster<f64>> {
    check_dimensions(raster, mask)?;
    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();
    let mask_nodata = mask.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let m = unsafe { mask.get_unchecked(row, col) };
                if is_nodata_f64(m, mask_nodata) || m == 0.0 {
                    continue;
                }
                let v = unsafe { raster.get_unchecked(row, col) };
                if !is_nodata_f64(v, nodata) {
                    row_data[col] = v;
                }
            }
            row_data
        })
        .collect();

    build_output(raster, rows, cols, data)
}

/// Share of valid mask cells that are set, in [0, 1].
///
/// `None` when the mask has no valid cells at all.
pub fn mask_coverage(mask: &Raster<f64>) -> Option<f64> {
    let nodata = mask.nodata();
    let mut valid = 0u64;
    let mut set = 0u64;
    for &v in mask.data().iter() {
        if is_nodata_f64(v, nodata) {
            continue;
        }
        valid += 1;
        if v != 0.0 {
            set += 1;
        }
    }
    if valid == 0 {
        return None;
    }
    Some(set as f64 / valid as f64)
}
