//! Weighted composite indices
//!
//! Combines several inputs into one score per pixel or per region:
//! `score = sum(w_i * normalize(input_i))` with the weights summing to 1,
//! so a score always lands in [0, 1]. The classic use is a vulnerability
//! index blending vegetation, temperature, population pressure and
//! imperviousness.

use crate::maybe_rayon::*;
use zonalis_core::{Error, Raster, Result};

use super::{build_output, check_dimensions, is_nodata_f64};

/// How an input is rescaled to [0, 1] before weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// Rescale by the input's own valid minimum and maximum.
    MinMax,
    /// Rescale by a fixed domain; values outside it are clamped.
    Domain { lo: f64, hi: f64 },
}

/// One weighted input of a raster composite.
#[derive(Debug, Clone, Copy)]
pub struct CompositeInput<'a> {
    pub raster: &'a Raster<f64>,
    pub weight: f64,
    pub normalization: Normalization,
}

/// One weighted column of per-region values.
///
/// `MinMax` normalization here rescales across the regions of the column,
/// mirroring what the raster form does across pixels.
#[derive(Debug, Clone)]
pub struct CompositeColumn {
    pub values: Vec<Option<f64>>,
    pub weight: f64,
    pub normalization: Normalization,
}

fn check_weights<I: Iterator<Item = f64>>(weights: I) -> Result<()> {
    let mut total = 0.0;
    for weight in weights {
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::InvalidParameter {
                name: "weights",
                value: weight.to_string(),
                reason: "composite weights must be finite and non-negative".to_string(),
            });
        }
        total += weight;
    }
    if (total - 1.0).abs() > 1e-9 {
        return Err(Error::InvalidParameter {
            name: "weights",
            value: total.to_string(),
            reason: "composite weights must sum to 1".to_string(),
        });
    }
    Ok(())
}

/// Resolve the (lo, hi) scaling bounds for one raster input.
/// A degenerate span comes back as (0, 0), which nulls the whole input.
fn raster_bounds(input: &CompositeInput) -> Result<(f64, f64)> {
    match input.normalization {
        Normalization::Domain { lo, hi } => {
            if !(hi > lo) {
                return Err(Error::InvalidParameter {
                    name: "normalization",
                    value: format!("[{}, {}]", lo, hi),
                    reason: "domain upper bound must exceed the lower bound".to_string(),
                });
            }
            Ok((lo, hi))
        }
        Normalization::MinMax => {
            let stats = input.raster.statistics();
            match (stats.min, stats.max) {
                (Some(lo), Some(hi)) => Ok((lo, hi)),
                // No valid pixels: a zero-width span nulls the input.
                _ => Ok((0.0, 0.0)),
            }
        }
    }
}

/// Weighted composite over co-registered rasters.
///
/// Every input is rescaled to [0, 1], weighted and summed per pixel. A
/// pixel where any input is nodata, or where an input's scaling span is
/// degenerate (max equals min), is null rather than zero.
pub fn composite_index(inputs: &[CompositeInput]) -> Result<Raster<f64>> {
    let first = match inputs.first() {
        Some(input) => input,
        None => {
            return Err(Error::InvalidParameter {
                name: "inputs",
                value: "[]".to_string(),
                reason: "a composite needs at least one input".to_string(),
            })
        }
    };
    for input in &inputs[1..] {
        check_dimensions(first.raster, input.raster)?;
    }
    check_weights(inputs.iter().map(|i| i.weight))?;

    let bounds: Vec<(f64, f64)> = inputs
        .iter()
        .map(raster_bounds)
        .collect::<Result<Vec<_>>>()?;
    let nodatas: Vec<Option<f64>> = inputs.iter().map(|i| i.raster.nodata()).collect();
    let (rows, cols) = first.raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let mut score = 0.0;
                let mut valid = true;
                for (i, input) in inputs.iter().enumerate() {
                    let v = unsafe { input.raster.get_unchecked(row, col) };
                    if is_nodata_f64(v, nodatas[i]) {
                        valid = false;
                        break;
                    }
                    match scale_to_unit(v, bounds[i]) {
                        Some(scaled) => score += input.weight * scaled,
                        None => {
                            valid = false;
                            break;
                        }
                    }
                }
                if valid {
                    row_data[col] = score;
                }
            }
            row_data
        })
        .collect();

    build_output(first.raster, rows, cols, data)
}

/// Weighted composite over per-region columns.
///
/// Columns must be equal length (one entry per region, in region order).
/// A region with a null in any column gets a null score.
pub fn composite_scores(columns: &[CompositeColumn]) -> Result<Vec<Option<f64>>> {
    let first = match columns.first() {
        Some(column) => column,
        None => {
            return Err(Error::InvalidParameter {
                name: "columns",
                value: "[]".to_string(),
                reason: "a composite needs at least one column".to_string(),
            })
        }
    };
    let len = first.values.len();
    for column in columns {
        if column.values.len() != len {
            return Err(Error::InvalidParameter {
                name: "columns",
                value: format!("{} vs {}", column.values.len(), len),
                reason: "composite columns must be the same length".to_string(),
            });
        }
    }
    check_weights(columns.iter().map(|c| c.weight))?;

    let mut bounds = Vec::with_capacity(columns.len());
    for column in columns {
        bounds.push(column_bounds(column)?);
    }

    let scores = (0..len)
        .map(|i| {
            let mut score = 0.0;
            for (column, bound) in columns.iter().zip(&bounds) {
                let v = column.values[i]?;
                if v.is_nan() {
                    return None;
                }
                score += column.weight * scale_to_unit(v, *bound)?;
            }
            Some(score)
        })
        .collect();
    Ok(scores)
}

fn column_bounds(column: &CompositeColumn) -> Result<(f64, f64)> {
    match column.normalization {
        Normalization::Domain { lo, hi } => {
            if !(hi > lo) {
                return Err(Error::InvalidParameter {
                    name: "normalization",
                    value: format!("[{}, {}]", lo, hi),
                    reason: "domain upper bound must exceed the lower bound".to_string(),
                });
            }
            Ok((lo, hi))
        }
        Normalization::MinMax => {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for v in column.values.iter().flatten() {
                if v.is_nan() {
                    continue;
                }
                lo = lo.min(*v);
                hi = hi.max(*v);
            }
            if lo > hi {
                return Ok((0.0, 0.0));
            }
            Ok((lo, hi))
        }
    }
}

/// `None` when the span is degenerate; clamped to [0, 1] otherwise.
fn scale_to_unit(v: f64, (lo, hi): (f64, f64)) -> Option<f64> {
    let span = hi - lo;
    if span.abs() < 1e-10 {
        return None;
    }
    Some(((v - lo) / span).clamp(0.0, 1.0))
}
