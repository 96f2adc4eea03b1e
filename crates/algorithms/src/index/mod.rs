//! Derived indices
//!
//! Everything that turns input layers into new values:
//! - Normalized-ratio indices: NDVI, NDWI, NDMI, MDVI, EVI
//! - Formula evaluation: arbitrary band arithmetic per pixel or per region
//! - Composites: weighted multi-input scores in [0, 1]
//! - Growth rates: land consumption vs population growth (SDG 11.3.1)
//! - Masks: thresholding, boolean combination, masking a raster
//! - Reclassify: continuous index to discrete classes

use ndarray::Array2;

use zonalis_core::{Error, Raster, Result};

mod composite;
mod formula;
mod growth;
mod mask;
mod normalized;
mod reclassify;

pub use composite::{
    composite_index, composite_scores, CompositeColumn, CompositeInput, Normalization,
};
pub use formula::{derive_index, derive_value};
pub use growth::{
    growth_rates, land_consumption_rate, lcr_pgr_ratio, population_growth_rate, regional_growth,
    GrowthInputs, GrowthLayers, GrowthRates, RegionGrowth,
};
pub use mask::{
    apply_mask, mask_and, mask_coverage, mask_not, mask_or, threshold_mask, Cmp, NodataPolicy,
};
pub use normalized::{
    evi, mdvi, ndmi, ndvi, ndwi, normalized_difference, normalized_ratio, EviParams,
    DEFAULT_EPSILON,
};
pub use reclassify::{reclassify, ClassRange, ReclassifyParams};

// Shared plumbing of the per-pixel operations above.

pub(crate) fn is_nodata_f64(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) => (value - nd).abs() < f64::EPSILON,
        None => false,
    }
}

pub(crate) fn check_dimensions(a: &Raster<f64>, b: &Raster<f64>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            expected: a.shape(),
            actual: b.shape(),
        });
    }
    Ok(())
}

pub(crate) fn build_output(
    template: &Raster<f64>,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
) -> Result<Raster<f64>> {
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}
