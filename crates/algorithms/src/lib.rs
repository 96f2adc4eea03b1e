//! # Zonalis Algorithms
//!
//! Regional statistics and derived-index pipeline for Zonalis.
//!
//! ## Available Algorithm Categories
//!
//! - **aggregate**: per-region raster reductions with pixel budgets
//! - **index**: normalized-ratio battery, formula engine, composites,
//!   growth rates, masks, reclassification
//! - **lookup**: point-in-hierarchy queries over indexed regions
//! - **report**: per-region tables and delimited export

pub mod aggregate;
pub mod index;
pub mod lookup;
pub mod maybe_rayon;
pub mod report;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aggregate::{
        aggregate, attach, AggregateParams, CancelFlag, ProcessingMode, RegionReduction,
        ReductionStatus, StatKind, DEFAULT_MAX_PIXELS,
    };
    pub use crate::index::{
        apply_mask, composite_index, composite_scores, derive_index, derive_value, evi,
        growth_rates, land_consumption_rate, lcr_pgr_ratio, mask_and, mask_coverage, mask_not,
        mask_or, mdvi, ndmi, ndvi, ndwi, normalized_difference, normalized_ratio,
        population_growth_rate, reclassify, regional_growth, threshold_mask, ClassRange, Cmp,
        CompositeColumn, CompositeInput, EviParams, GrowthInputs, GrowthLayers, GrowthRates,
        NodataPolicy, Normalization, ReclassifyParams, RegionGrowth, DEFAULT_EPSILON,
    };
    pub use crate::lookup::{HierarchyIndex, LevelHit};
    pub use crate::report::{NullPolicy, RegionTable, TableOptions};
    pub use zonalis_core::prelude::*;
}
