//! Urban growth rates (SDG 11.3.1)
//!
//! Land consumption rate, population growth rate and their ratio, computed
//! either from scalar totals or per region from built-up and population
//! layers across two points in time.
//!
//! Rates use the standard definitions:
//!
//! * `LCR = (built_t2 - built_t1) / built_t1 / years`
//! * `PGR = ln(pop_t2 / pop_t1) / years`
//! * `LCRPGR = LCR / PGR`
//!
//! A ratio against a zero or undefined rate is null, never infinite.

use tracing::debug;

use crate::aggregate::{aggregate, AggregateParams, ReductionStatus, StatKind};
use zonalis_core::{Error, Layer, RegionSet, Result};

/// Annualized land consumption rate.
///
/// Returns `None` when the starting extent is zero or either extent is
/// null, since the rate is undefined rather than infinite.
pub fn land_consumption_rate(
    built_t1: Option<f64>,
    built_t2: Option<f64>,
    years: f64,
) -> Result<Option<f64>> {
    check_years(years)?;
    let (v1, v2) = match (built_t1, built_t2) {
        (Some(v1), Some(v2)) => (v1, v2),
        _ => return Ok(None),
    };
    if v1 == 0.0 || v1.is_nan() || v2.is_nan() {
        return Ok(None);
    }
    Ok(Some((v2 - v1) / v1 / years))
}

/// Annualized population growth rate (natural log form).
///
/// Returns `None` when either population is null or non-positive.
pub fn population_growth_rate(
    pop_t1: Option<f64>,
    pop_t2: Option<f64>,
    years: f64,
) -> Result<Option<f64>> {
    check_years(years)?;
    let (p1, p2) = match (pop_t1, pop_t2) {
        (Some(p1), Some(p2)) => (p1, p2),
        _ => return Ok(None),
    };
    if !(p1 > 0.0) || !(p2 > 0.0) {
        return Ok(None);
    }
    Ok(Some((p2 / p1).ln() / years))
}

/// Ratio of land consumption to population growth.
///
/// Null when either rate is null or when the population growth rate is
/// zero (a stable population makes the ratio undefined).
pub fn lcr_pgr_ratio(lcr: Option<f64>, pgr: Option<f64>) -> Option<f64> {
    let lcr = lcr?;
    let pgr = pgr?;
    if pgr == 0.0 || pgr.is_nan() || lcr.is_nan() {
        return None;
    }
    Some(lcr / pgr)
}

fn check_years(years: f64) -> Result<()> {
    if !years.is_finite() || years <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "years",
            value: years.to_string(),
            reason: "the interval between observations must be positive".to_string(),
        });
    }
    Ok(())
}

/// Scalar totals for one region at two points in time.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrowthInputs {
    pub built_t1: Option<f64>,
    pub built_t2: Option<f64>,
    pub pop_t1: Option<f64>,
    pub pop_t2: Option<f64>,
}

/// The derived rates. Any of them can be null independently.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GrowthRates {
    pub lcr: Option<f64>,
    pub pgr: Option<f64>,
    pub lcrpgr: Option<f64>,
    /// Built-up share of the region area, in percent. Only populated by
    /// [`regional_growth`], where the region geometry is known.
    pub built_pct: Option<f64>,
}

/// All three rates from scalar totals.
pub fn growth_rates(inputs: &GrowthInputs, years: f64) -> Result<GrowthRates> {
    let lcr = land_consumption_rate(inputs.built_t1, inputs.built_t2, years)?;
    let pgr = population_growth_rate(inputs.pop_t1, inputs.pop_t2, years)?;
    Ok(GrowthRates {
        lcr,
        pgr,
        lcrpgr: lcr_pgr_ratio(lcr, pgr),
        built_pct: None,
    })
}

/// The four layers the per-region computation reads. Built-up layers hold
/// built fraction per cell (a 0/1 mask works); population layers hold
/// counts per cell.
#[derive(Debug, Clone, Copy)]
pub struct GrowthLayers<'a> {
    pub built_t1: &'a Layer,
    pub built_t2: &'a Layer,
    pub pop_t1: &'a Layer,
    pub pop_t2: &'a Layer,
}

/// Growth rates for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGrowth {
    pub region: String,
    pub rates: GrowthRates,
}

/// Per-region growth rates from raster layers.
///
/// Each layer is summed over every region with the supplied aggregation
/// parameters (the statistic is forced to `sum`), then the scalar rate
/// formulas run per region. A region that misses a layer gets null rates
/// rather than failing the batch. `built_pct` converts the summed built
/// fraction to area through the sampling step actually used for that
/// region, so it stays honest under budget coarsening.
pub fn regional_growth(
    regions: &RegionSet,
    layers: GrowthLayers<'_>,
    years: f64,
    params: &AggregateParams,
) -> Result<Vec<RegionGrowth>> {
    check_years(years)?;
    let mut sum_params = params.clone();
    sum_params.statistics = vec![StatKind::Sum];

    let built_t1 = layer_sums(regions, layers.built_t1, &sum_params)?;
    let built_t2 = layer_sums(regions, layers.built_t2, &sum_params)?;
    let pop_t1 = layer_sums(regions, layers.pop_t1, &sum_params)?;
    let pop_t2 = layer_sums(regions, layers.pop_t2, &sum_params)?;

    let mut out = Vec::with_capacity(regions.len());
    for (i, region) in regions.iter().enumerate() {
        let inputs = GrowthInputs {
            built_t1: built_t1[i].0,
            built_t2: built_t2[i].0,
            pop_t1: pop_t1[i].0,
            pop_t2: pop_t2[i].0,
        };
        let mut rates = growth_rates(&inputs, years)?;
        rates.built_pct = built_share(inputs.built_t2, built_t2[i].1, region.area());
        if rates.lcrpgr.is_none() {
            debug!(region = region.name(), "growth ratio is null");
        }
        out.push(RegionGrowth {
            region: region.name().to_string(),
            rates,
        });
    }
    Ok(out)
}

/// Sum one layer over every region. Returns `(sum, step)` per region in
/// region order, where `step` is the sampling step that produced the sum.
fn layer_sums(
    regions: &RegionSet,
    layer: &Layer,
    params: &AggregateParams,
) -> Result<Vec<(Option<f64>, f64)>> {
    let band = match layer.band_names().next() {
        Some(name) => name.to_string(),
        None => {
            return Err(Error::InvalidParameter {
                name: "layer",
                value: "empty".to_string(),
                reason: "a growth layer needs at least one band".to_string(),
            })
        }
    };
    let key = format!("{}_sum", band);
    let requested = params.scale.unwrap_or_else(|| layer.cell_size());

    let reductions = aggregate(regions, layer, params)?;
    Ok(reductions
        .iter()
        .map(|r| {
            let step = match r.status() {
                ReductionStatus::Approximate { effective_scale } => effective_scale,
                _ => requested,
            };
            (r.value(&key), step)
        })
        .collect())
}

fn built_share(built_sum: Option<f64>, step: f64, region_area: f64) -> Option<f64> {
    let sum = built_sum?;
    if !(region_area > 0.0) {
        return None;
    }
    Some(sum * step * step / region_area * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::polygon;
    use zonalis_core::{AdminLevel, GeoTransform, Raster, Region};

    #[test]
    fn test_land_consumption_rate() {
        let lcr = land_consumption_rate(Some(10.0), Some(15.0), 5.0)
            .unwrap()
            .unwrap();
        assert_relative_eq!(lcr, 0.10);
    }

    #[test]
    fn test_population_growth_rate() {
        let pgr = population_growth_rate(Some(1_000_000.0), Some(1_200_000.0), 5.0)
            .unwrap()
            .unwrap();
        assert_relative_eq!(pgr, (1.2f64).ln() / 5.0);
        assert_relative_eq!(pgr, 0.036464, epsilon = 1e-6);
    }

    #[test]
    fn test_ratio_of_rates() {
        let lcr = land_consumption_rate(Some(10.0), Some(15.0), 5.0).unwrap();
        let pgr = population_growth_rate(Some(1_000_000.0), Some(1_200_000.0), 5.0).unwrap();
        let ratio = lcr_pgr_ratio(lcr, pgr).unwrap();
        assert_relative_eq!(ratio, 0.10 / ((1.2f64).ln() / 5.0));
        assert_relative_eq!(ratio, 2.742410, epsilon = 1e-6);
    }

    #[test]
    fn test_stable_population_gives_null_ratio() {
        let pgr = population_growth_rate(Some(500.0), Some(500.0), 10.0).unwrap();
        assert_eq!(pgr, Some(0.0));
        assert_eq!(lcr_pgr_ratio(Some(0.1), pgr), None);
    }

    #[test]
    fn test_undefined_inputs_are_null() {
        // Zero starting extent: LCR undefined.
        assert_eq!(land_consumption_rate(Some(0.0), Some(5.0), 5.0).unwrap(), None);
        // Null input propagates.
        assert_eq!(land_consumption_rate(None, Some(5.0), 5.0).unwrap(), None);
        // Non-positive population: PGR undefined.
        assert_eq!(
            population_growth_rate(Some(0.0), Some(100.0), 5.0).unwrap(),
            None
        );
        assert_eq!(
            population_growth_rate(Some(100.0), Some(-1.0), 5.0).unwrap(),
            None
        );
    }

    #[test]
    fn test_non_positive_interval_is_an_error() {
        assert!(land_consumption_rate(Some(1.0), Some(2.0), 0.0).is_err());
        assert!(population_growth_rate(Some(1.0), Some(2.0), -3.0).is_err());
        assert!(land_consumption_rate(Some(1.0), Some(2.0), f64::NAN).is_err());
    }

    #[test]
    fn test_growth_rates_bundle() {
        let inputs = GrowthInputs {
            built_t1: Some(10.0),
            built_t2: Some(15.0),
            pop_t1: Some(1_000_000.0),
            pop_t2: Some(1_200_000.0),
        };
        let rates = growth_rates(&inputs, 5.0).unwrap();
        assert_relative_eq!(rates.lcr.unwrap(), 0.10);
        assert!(rates.lcrpgr.is_some());
        assert_eq!(rates.built_pct, None);

        let partial = GrowthInputs {
            pop_t1: Some(100.0),
            pop_t2: Some(120.0),
            ..Default::default()
        };
        let rates = growth_rates(&partial, 5.0).unwrap();
        assert_eq!(rates.lcr, None);
        assert!(rates.pgr.is_some());
        assert_eq!(rates.lcrpgr, None);
    }

    fn uniform_layer(name: &str, rows: usize, cols: usize, value: f64) -> Layer {
        let mut raster = Raster::filled(rows, cols, value);
        raster.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        Layer::from_bands(vec![(name.to_string(), raster)]).unwrap()
    }

    #[test]
    fn test_regional_growth_end_to_end() {
        // One region covering a 2x2 grid with unit cells. Built-up goes
        // from one cell to two; population grows by a factor of e.
        let mut built_t1 = Raster::filled(2, 2, 0.0);
        built_t1.set(0, 0, 1.0).unwrap();
        built_t1.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        let built_t1 = Layer::from_bands(vec![("built".to_string(), built_t1)]).unwrap();

        let mut built_t2 = Raster::filled(2, 2, 0.0);
        built_t2.set(0, 0, 1.0).unwrap();
        built_t2.set(0, 1, 1.0).unwrap();
        built_t2.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        let built_t2 = Layer::from_bands(vec![("built".to_string(), built_t2)]).unwrap();

        let pop_t1 = uniform_layer("pop", 2, 2, 25.0);
        let pop_t2 = uniform_layer("pop", 2, 2, 25.0 * std::f64::consts::E);

        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ];
        let region = Region::from_polygon("centro", AdminLevel::Commune, square);
        let regions = RegionSet::new(AdminLevel::Commune, vec![region]).unwrap();

        let layers = GrowthLayers {
            built_t1: &built_t1,
            built_t2: &built_t2,
            pop_t1: &pop_t1,
            pop_t2: &pop_t2,
        };
        let results =
            regional_growth(&regions, layers, 5.0, &AggregateParams::default()).unwrap();
        assert_eq!(results.len(), 1);

        let rates = results[0].rates;
        // LCR: (2 - 1) / 1 / 5.
        assert_relative_eq!(rates.lcr.unwrap(), 0.2);
        // PGR: ln(100e / 100) / 5.
        assert_relative_eq!(rates.pgr.unwrap(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(rates.lcrpgr.unwrap(), 1.0, epsilon = 1e-12);
        // Two built cells of unit area over a region of area 4.
        assert_relative_eq!(rates.built_pct.unwrap(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_regional_growth_isolates_missing_region() {
        let built = uniform_layer("built", 2, 2, 1.0);
        let pop = uniform_layer("pop", 2, 2, 10.0);

        let inside = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ];
        let outside = polygon![
            (x: 50.0, y: 50.0),
            (x: 52.0, y: 50.0),
            (x: 52.0, y: 52.0),
            (x: 50.0, y: 52.0),
        ];
        let regions = RegionSet::new(
            AdminLevel::Commune,
            vec![
                Region::from_polygon("inside", AdminLevel::Commune, inside),
                Region::from_polygon("outside", AdminLevel::Commune, outside),
            ],
        )
        .unwrap();

        let layers = GrowthLayers {
            built_t1: &built,
            built_t2: &built,
            pop_t1: &pop,
            pop_t2: &pop,
        };
        let results =
            regional_growth(&regions, layers, 5.0, &AggregateParams::default()).unwrap();
        assert_eq!(results.len(), 2);

        // Stable inputs: LCR 0, PGR 0, ratio null.
        assert_eq!(results[0].rates.lcr, Some(0.0));
        assert_eq!(results[0].rates.lcrpgr, None);
        // The disjoint region is null across the board, not an error.
        assert_eq!(results[1].rates, GrowthRates::default());
    }
}
