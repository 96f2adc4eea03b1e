//! End-to-end pipeline tests over synthetic layers.
//!
//! Builds small in-memory grids and region sets, then drives the full
//! chain: per-region aggregation, derived indices, growth rates, point
//! lookup and table export, checking the numbers against values worked
//! out by hand.

use geo_types::polygon;

use zonalis_algorithms::aggregate::{
    aggregate, attach, AggregateParams, ProcessingMode, ReductionStatus, StatKind,
};
use zonalis_algorithms::index::{
    composite_scores, derive_index, growth_rates, ndvi, CompositeColumn, GrowthInputs,
    Normalization,
};
use zonalis_algorithms::lookup::HierarchyIndex;
use zonalis_algorithms::report::{RegionTable, TableOptions};
use zonalis_core::{AdminLevel, GeoTransform, Layer, Raster, Region, RegionSet};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Uniform single-band layer on a unit grid with origin (0, rows).
fn uniform_layer(band: &str, rows: usize, cols: usize, value: f64) -> Layer {
    let mut raster = Raster::filled(rows, cols, value);
    raster.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
    Layer::single(band, raster)
}

fn rect(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
    Region::from_polygon(
        name,
        AdminLevel::Commune,
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ],
    )
}

/// Three communes of 100, 200 and 300 cells tiling a 20x30 grid.
fn three_communes() -> RegionSet {
    RegionSet::new(
        AdminLevel::Commune,
        vec![
            rect("alpha", 0.0, 0.0, 10.0, 10.0),
            rect("beta", 10.0, 0.0, 30.0, 10.0),
            rect("gamma", 0.0, 10.0, 30.0, 20.0),
        ],
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[test]
fn uniform_density_sums_scale_with_region_area() {
    let layer = uniform_layer("pop", 20, 30, 10.0);
    let params = AggregateParams {
        statistics: vec![StatKind::Sum, StatKind::Mean, StatKind::Count],
        ..Default::default()
    };

    let results = aggregate(&three_communes(), &layer, &params).unwrap();
    assert_eq!(results.len(), 3);

    let expected = [("alpha", 1000.0), ("beta", 2000.0), ("gamma", 3000.0)];
    for (result, (name, sum)) in results.iter().zip(expected) {
        assert_eq!(result.region(), name);
        assert_eq!(result.status(), ReductionStatus::Exact);
        assert_eq!(result.value("pop_sum"), Some(sum));
        assert_eq!(result.value("pop_mean"), Some(10.0));
    }
    assert_eq!(results[0].value("pop_count"), Some(100.0));
    assert_eq!(results[2].value("pop_count"), Some(300.0));
}

#[test]
fn disjoint_region_is_isolated_without_failing_the_batch() {
    let layer = uniform_layer("pop", 20, 30, 10.0);
    let regions = RegionSet::new(
        AdminLevel::Commune,
        vec![
            rect("inside", 0.0, 0.0, 10.0, 10.0),
            rect("offshore", 500.0, 500.0, 510.0, 510.0),
        ],
    )
    .unwrap();

    let results = aggregate(&regions, &layer, &AggregateParams::default()).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].value("pop_mean"), Some(10.0));

    assert_eq!(results[1].status(), ReductionStatus::NoIntersection);
    // The key exists with a null value: the region was processed.
    assert_eq!(results[1].get("pop_mean"), Some(None));
}

#[test]
fn pixel_budget_blocks_or_coarsens() {
    let layer = uniform_layer("pop", 20, 30, 10.0);
    let whole = RegionSet::new(
        AdminLevel::Commune,
        vec![rect("everything", 0.0, 0.0, 30.0, 20.0)],
    )
    .unwrap();

    // 600 cells against a budget of 150: strict mode refuses.
    let strict = AggregateParams {
        max_pixels: 150,
        ..Default::default()
    };
    let refused = aggregate(&whole, &layer, &strict).unwrap();
    assert_eq!(
        refused[0].status(),
        ReductionStatus::BudgetExceeded {
            required: 600,
            budget: 150
        }
    );
    assert_eq!(refused[0].value("pop_mean"), None);

    // Best effort doubles the step once: 600 / 4 = 150 samples fit.
    let relaxed = AggregateParams {
        max_pixels: 150,
        best_effort: true,
        ..Default::default()
    };
    let coarsened = aggregate(&whole, &layer, &relaxed).unwrap();
    match coarsened[0].status() {
        ReductionStatus::Approximate { effective_scale } => {
            assert_eq!(effective_scale, 2.0);
        }
        other => panic!("expected Approximate, got {:?}", other),
    }
    assert_eq!(coarsened[0].pixels_sampled(), 150);
    // A uniform field is insensitive to the sampling step.
    assert_eq!(coarsened[0].value("pop_mean"), Some(10.0));
}

#[test]
fn sequential_and_parallel_agree() {
    let layer = uniform_layer("pop", 20, 30, 10.0);
    let regions = three_communes();

    let runs: Vec<_> = [
        ProcessingMode::Sequential,
        ProcessingMode::Parallel,
        ProcessingMode::ParallelWith(2),
    ]
    .into_iter()
    .map(|mode| {
        let params = AggregateParams {
            statistics: vec![StatKind::Sum, StatKind::Median, StatKind::Percentile(90)],
            mode,
            ..Default::default()
        };
        aggregate(&regions, &layer, &params).unwrap()
    })
    .collect();

    for run in &runs[1..] {
        for (a, b) in runs[0].iter().zip(run.iter()) {
            assert_eq!(a.region(), b.region());
            assert_eq!(a.values(), b.values());
        }
    }
}

// ---------------------------------------------------------------------------
// Derived indices
// ---------------------------------------------------------------------------

#[test]
fn formula_engine_matches_ndvi_battery_and_aggregates() {
    let rows = 20;
    let cols = 30;
    let mut nir = Raster::filled(rows, cols, 0.5);
    nir.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
    let mut red = Raster::filled(rows, cols, 0.1);
    red.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));

    let builtin = ndvi(&nir, &red).unwrap();
    let bands = std::collections::HashMap::from([("NIR", &nir), ("Red", &red)]);
    let formulated = derive_index("(NIR - Red) / (NIR + Red + 0.0001)", &bands).unwrap();

    let expected = 0.4 / (0.6 + 1e-4);
    assert!((builtin.get(3, 7).unwrap() - expected).abs() < 1e-12);
    assert!((formulated.get(3, 7).unwrap() - expected).abs() < 1e-12);
    assert!((expected - 2.0 / 3.0).abs() < 1e-3);

    // The derived raster aggregates like any other layer.
    let layer = Layer::single("ndvi", builtin);
    let results = aggregate(&three_communes(), &layer, &AggregateParams::default()).unwrap();
    for result in &results {
        let mean = result.value("ndvi_mean").unwrap();
        assert!((mean - expected).abs() < 1e-12);
    }
}

#[test]
fn vulnerability_composite_from_reductions_stays_bounded() {
    let ndvi_layer = uniform_layer("ndvi", 20, 30, 0.3);
    let pop_layer = uniform_layer("pop", 20, 30, 10.0);
    let regions = RegionSet::new(
        AdminLevel::Commune,
        vec![
            rect("alpha", 0.0, 0.0, 10.0, 10.0),
            rect("beta", 10.0, 0.0, 30.0, 10.0),
            rect("offshore", 500.0, 500.0, 510.0, 510.0),
        ],
    )
    .unwrap();

    let params = AggregateParams {
        statistics: vec![StatKind::Mean, StatKind::Sum],
        ..Default::default()
    };
    let ndvi_results = aggregate(&regions, &ndvi_layer, &params).unwrap();
    let pop_results = aggregate(&regions, &pop_layer, &params).unwrap();

    let columns = [
        CompositeColumn {
            values: ndvi_results.iter().map(|r| r.value("ndvi_mean")).collect(),
            weight: 0.25,
            normalization: Normalization::Domain { lo: -1.0, hi: 1.0 },
        },
        CompositeColumn {
            values: pop_results.iter().map(|r| r.value("pop_sum")).collect(),
            weight: 0.30,
            normalization: Normalization::Domain { lo: 0.0, hi: 5000.0 },
        },
        CompositeColumn {
            values: pop_results.iter().map(|r| r.value("pop_mean")).collect(),
            weight: 0.30,
            normalization: Normalization::Domain { lo: 0.0, hi: 100.0 },
        },
        CompositeColumn {
            values: ndvi_results.iter().map(|r| r.value("ndvi_mean")).collect(),
            weight: 0.15,
            normalization: Normalization::Domain { lo: 0.0, hi: 1.0 },
        },
    ];

    let scores = composite_scores(&columns).unwrap();
    assert_eq!(scores.len(), 3);
    for score in &scores[..2] {
        let s = score.unwrap();
        assert!((0.0..=1.0).contains(&s), "score out of bounds: {}", s);
    }
    // The offshore region reduced to nulls, so its score is null.
    assert_eq!(scores[2], None);
}

#[test]
fn growth_rates_from_aggregated_totals() {
    let pop_t1 = uniform_layer("pop", 20, 30, 4.0);
    let pop_t2 = uniform_layer("pop", 20, 30, 4.0 * std::f64::consts::E);
    let built_t1 = uniform_layer("built", 20, 30, 0.2);
    let built_t2 = uniform_layer("built", 20, 30, 0.3);

    let regions = three_communes();
    let params = AggregateParams {
        statistics: vec![StatKind::Sum],
        ..Default::default()
    };

    let sums = |layer: &Layer, key: &str| -> Vec<Option<f64>> {
        aggregate(&regions, layer, &params)
            .unwrap()
            .iter()
            .map(|r| r.value(key))
            .collect()
    };

    let p1 = sums(&pop_t1, "pop_sum");
    let p2 = sums(&pop_t2, "pop_sum");
    let b1 = sums(&built_t1, "built_sum");
    let b2 = sums(&built_t2, "built_sum");

    // First commune: pop 400 -> 400e over 5 years, built 20 -> 30.
    let inputs = GrowthInputs {
        built_t1: b1[0],
        built_t2: b2[0],
        pop_t1: p1[0],
        pop_t2: p2[0],
    };
    let rates = growth_rates(&inputs, 5.0).unwrap();
    assert!((rates.pgr.unwrap() - 0.2).abs() < 1e-9);
    assert!((rates.lcr.unwrap() - 0.1).abs() < 1e-9);
    assert!((rates.lcrpgr.unwrap() - 0.5).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Lookup and export
// ---------------------------------------------------------------------------

#[test]
fn attached_results_flow_into_lookup() {
    let layer = uniform_layer("pop", 20, 30, 10.0);
    let mut regions = three_communes();

    let params = AggregateParams {
        statistics: vec![StatKind::Sum],
        ..Default::default()
    };
    let results = aggregate(&regions, &layer, &params).unwrap();
    attach(&mut regions, &results);

    let index = HierarchyIndex::build(vec![regions]).unwrap();
    let hits = index.locate(15.0, 5.0);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].region, "beta");
    assert_eq!(hits[0].derived.get("pop_sum"), Some(&Some(2000.0)));

    assert!(index.locate(-10.0, -10.0).is_empty());
}

#[test]
fn exported_table_keeps_null_distinct_from_zero() {
    let mut zero_band = Raster::filled(20, 30, 0.0);
    zero_band.set_transform(GeoTransform::new(0.0, 20.0, 1.0, -1.0));
    let layer = Layer::single("idle", zero_band);

    let regions = RegionSet::new(
        AdminLevel::Commune,
        vec![
            rect("alpha", 0.0, 0.0, 10.0, 10.0),
            rect("offshore", 500.0, 500.0, 510.0, 510.0),
        ],
    )
    .unwrap();

    let params = AggregateParams {
        statistics: vec![StatKind::Sum],
        ..Default::default()
    };
    let results = aggregate(&regions, &layer, &params).unwrap();

    let table = RegionTable::from_reductions(&results, &["idle_sum"]);
    let text = table.to_csv_string(&TableOptions::default()).unwrap();

    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("region,idle_sum"));
    // A region full of zeros really sums to zero; a region the layer
    // never saw has no value at all.
    assert_eq!(lines.next(), Some("alpha,0.00"));
    assert_eq!(lines.next(), Some("offshore,N/A"));
}
