//! Per-region reduction results.

use std::collections::BTreeMap;

/// How a region's statistics were obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReductionStatus {
    /// Reduced at the requested scale.
    Exact,
    /// Reduced at a coarser scale so the footprint fits the pixel budget.
    Approximate {
        /// Sampling step actually used, in map units.
        effective_scale: f64,
    },
    /// The region lies entirely outside the layer extent.
    NoIntersection,
    /// The footprint exceeds the pixel budget and coarsening was not allowed.
    BudgetExceeded { required: u64, budget: u64 },
}

impl ReductionStatus {
    /// Whether the reduction ran at all. `NoIntersection` and
    /// `BudgetExceeded` regions carry nothing but nulls.
    pub fn produced_values(&self) -> bool {
        matches!(
            self,
            ReductionStatus::Exact | ReductionStatus::Approximate { .. }
        )
    }
}

/// Statistics for one region of a batch.
///
/// Keys are `<band>_<statistic>` (`population_sum`, `NDVI_mean`). A key
/// mapped to `None` is a null: the reduction ran but has no defined value
/// for it. Null and `0.0` are different outcomes and stay different all the
/// way to export.
#[derive(Debug, Clone)]
pub struct RegionReduction {
    region: String,
    status: ReductionStatus,
    pixels_sampled: u64,
    values: BTreeMap<String, Option<f64>>,
}

impl RegionReduction {
    pub(crate) fn new(
        region: String,
        status: ReductionStatus,
        pixels_sampled: u64,
        values: BTreeMap<String, Option<f64>>,
    ) -> Self {
        Self {
            region,
            status,
            pixels_sampled,
            values,
        }
    }

    /// A reduction where every requested key is null.
    pub(crate) fn all_null(region: &str, status: ReductionStatus, keys: &[String]) -> Self {
        let values = keys.iter().map(|k| (k.clone(), None)).collect();
        Self {
            region: region.to_string(),
            status,
            pixels_sampled: 0,
            values,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn status(&self) -> ReductionStatus {
        self.status
    }

    /// Number of sample points that fell inside the region footprint,
    /// before any nodata filtering.
    pub fn pixels_sampled(&self) -> u64 {
        self.pixels_sampled
    }

    /// All keyed statistics, in stable (sorted) key order.
    pub fn values(&self) -> &BTreeMap<String, Option<f64>> {
        &self.values
    }

    /// Value for `key`, flattening nulls: `None` means the key is absent
    /// or its value is null.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().flatten()
    }

    /// Like [`value`](Self::value) but keeps "absent key" (`None`) distinct
    /// from "null value" (`Some(None)`).
    pub fn get(&self, key: &str) -> Option<Option<f64>> {
        self.values.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_null() {
        let keys = vec!["pop_sum".to_string(), "pop_mean".to_string()];
        let r = RegionReduction::all_null("Dakar", ReductionStatus::NoIntersection, &keys);
        assert_eq!(r.region(), "Dakar");
        assert_eq!(r.pixels_sampled(), 0);
        assert_eq!(r.get("pop_sum"), Some(None));
        assert_eq!(r.value("pop_sum"), None);
        assert!(!r.status().produced_values());
    }

    #[test]
    fn test_null_vs_absent() {
        let mut values = BTreeMap::new();
        values.insert("a_mean".to_string(), Some(1.5));
        values.insert("b_mean".to_string(), None);
        let r = RegionReduction::new("X".to_string(), ReductionStatus::Exact, 10, values);
        assert_eq!(r.get("a_mean"), Some(Some(1.5)));
        assert_eq!(r.get("b_mean"), Some(None));
        assert_eq!(r.get("c_mean"), None);
        assert_eq!(r.value("a_mean"), Some(1.5));
        assert_eq!(r.value("b_mean"), None);
    }
}
