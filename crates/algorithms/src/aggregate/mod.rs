//! Regional statistics over raster layers.
//!
//! [`aggregate`] reduces every band of a [`Layer`] over every region of a
//! [`RegionSet`] in a single spatial pass per region. Each region yields a
//! [`RegionReduction`] keyed `<band>_<statistic>`; regions that miss the
//! layer or blow the pixel budget come back all-null with an explicit
//! status instead of failing the batch.

mod footprint;
mod reducer;
mod result;
mod strategy;

pub use reducer::StatKind;
pub use result::{RegionReduction, ReductionStatus};
pub use strategy::{CancelFlag, ParallelStrategy, ProcessingMode};

use std::collections::BTreeMap;

use tracing::debug;
use zonalis_core::{Error, Layer, Raster, Region, RegionSet, Result};

use footprint::{clip_window, for_each_inside, plan_sampling, SamplePlan};
use reducer::{validate_statistics, StatAccumulator};

/// Default per-region pixel budget.
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

/// Parameters for [`aggregate`].
#[derive(Debug, Clone)]
pub struct AggregateParams {
    /// Statistics computed for every band of the layer.
    pub statistics: Vec<StatKind>,
    /// Sampling step in map units. `None` samples at the layer's native
    /// cell size, visiting every pixel center exactly once.
    pub scale: Option<f64>,
    /// Upper bound on lattice points per region.
    pub max_pixels: u64,
    /// Coarsen the sampling step (doubling it) until the budget is met
    /// instead of refusing. Affected regions report
    /// [`ReductionStatus::Approximate`] with the step actually used.
    pub best_effort: bool,
    /// How the batch is driven over regions.
    pub mode: ProcessingMode,
    /// Cooperative cancellation, polled between regions. Once raised, the
    /// batch returns [`Error::Cancelled`].
    pub cancel: Option<CancelFlag>,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            statistics: vec![StatKind::Mean],
            scale: None,
            max_pixels: DEFAULT_MAX_PIXELS,
            best_effort: false,
            mode: ProcessingMode::default(),
            cancel: None,
        }
    }
}

/// Reduce every band of `layer` over every region of `regions`.
///
/// Results come back in region order. Spatial misses never abort the
/// batch: a region outside the layer extent yields nulls under
/// [`ReductionStatus::NoIntersection`], and a footprint larger than
/// `max_pixels` yields nulls under [`ReductionStatus::BudgetExceeded`]
/// unless `best_effort` allows coarsening.
pub fn aggregate(
    regions: &RegionSet,
    layer: &Layer,
    params: &AggregateParams,
) -> Result<Vec<RegionReduction>> {
    validate_statistics(&params.statistics)?;

    let transform = layer.transform();
    if !transform.is_north_up() {
        return Err(Error::InvalidParameter {
            name: "layer",
            value: "rotated grid".to_string(),
            reason: "regional aggregation requires a north-up layer".to_string(),
        });
    }

    let scale = params.scale.unwrap_or_else(|| layer.cell_size());
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "scale",
            value: scale.to_string(),
            reason: "sampling step must be finite and positive".to_string(),
        });
    }
    if params.max_pixels == 0 {
        return Err(Error::InvalidParameter {
            name: "max_pixels",
            value: "0".to_string(),
            reason: "pixel budget must allow at least one sample".to_string(),
        });
    }
    if let (Some(region_crs), Some(layer_crs)) = (regions.crs(), layer.crs()) {
        if !region_crs.is_equivalent(layer_crs) {
            return Err(Error::CrsMismatch(
                region_crs.identifier(),
                layer_crs.identifier(),
            ));
        }
    }

    let keys = result_keys(layer, &params.statistics);
    let bounds = layer.bounds();
    let cancel = params.cancel.clone();

    let reductions: Vec<Option<RegionReduction>> =
        params.mode.par_map(0..regions.len(), |i| {
            if cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                return None;
            }
            let region = &regions.regions()[i];
            Some(reduce_region(region, layer, scale, bounds, &keys, params))
        });

    if cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
        return Err(Error::Cancelled);
    }
    Ok(reductions.into_iter().flatten().collect())
}

/// Copy every reduction value onto the matching region's derived bag.
///
/// Regions are matched by primary name. Reductions without a matching
/// region are skipped so partial batches can still be attached.
pub fn attach(regions: &mut RegionSet, reductions: &[RegionReduction]) {
    for reduction in reductions {
        if let Some(region) = regions.get_mut(reduction.region()) {
            for (key, value) in reduction.values() {
                region.set_derived(key.clone(), *value);
            }
        }
    }
}

/// Result keys in band-major order: `<band>_<statistic>`.
fn result_keys(layer: &Layer, stats: &[StatKind]) -> Vec<String> {
    let mut keys = Vec::with_capacity(layer.band_count() * stats.len());
    for name in layer.band_names() {
        for stat in stats {
            keys.push(format!("{}_{}", name, stat.key()));
        }
    }
    keys
}

fn reduce_region(
    region: &Region,
    layer: &Layer,
    scale: f64,
    bounds: (f64, f64, f64, f64),
    keys: &[String],
    params: &AggregateParams,
) -> RegionReduction {
    let window = match clip_window(region.geometry(), bounds) {
        Some(window) => window,
        None => {
            return RegionReduction::all_null(region.name(), ReductionStatus::NoIntersection, keys)
        }
    };

    let plan = plan_sampling(
        layer.transform(),
        window,
        scale,
        params.max_pixels,
        params.best_effort,
    );
    let (grid, status) = match plan {
        SamplePlan::Grid {
            grid,
            approximate: false,
        } => (grid, ReductionStatus::Exact),
        SamplePlan::Grid {
            grid,
            approximate: true,
        } => {
            debug!(
                region = region.name(),
                requested_scale = scale,
                effective_scale = grid.step(),
                "coarsened sampling step to fit the pixel budget"
            );
            let status = ReductionStatus::Approximate {
                effective_scale: grid.step(),
            };
            (grid, status)
        }
        SamplePlan::TooLarge { required } => {
            let status = ReductionStatus::BudgetExceeded {
                required,
                budget: params.max_pixels,
            };
            return RegionReduction::all_null(region.name(), status, keys);
        }
    };

    let bands: Vec<&Raster<f64>> = layer.bands().map(|(_, raster)| raster).collect();
    let keep_values = params.statistics.iter().any(|s| s.needs_values());
    let mut accumulators: Vec<StatAccumulator> =
        bands.iter().map(|_| StatAccumulator::new(keep_values)).collect();

    let mut sampled: u64 = 0;
    for_each_inside(&grid, region.geometry(), |x, y| {
        sampled += 1;
        for (accumulator, band) in accumulators.iter_mut().zip(&bands) {
            if let Some(value) = band.value_at(x, y) {
                accumulator.push(value);
            }
        }
    });

    let mut values = BTreeMap::new();
    let mut key_iter = keys.iter();
    for accumulator in accumulators {
        for out in accumulator.finalize(&params.statistics) {
            // keys is band-major, exactly one entry per accumulator output.
            if let Some(key) = key_iter.next() {
                values.insert(key.clone(), out);
            }
        }
    }

    RegionReduction::new(region.name().to_string(), status, sampled, values)
}
