//! # Zonalis Core
//!
//! Core types and I/O for the zonalis regional statistics toolkit.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `Layer`: Named raster bands sharing one grid, the aggregation input
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - `Region` / `RegionSet`: administrative polygons with attributes
//! - I/O for GeoTIFF rasters and GeoJSON region sources

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod region;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Layer, Raster, RasterElement};
pub use region::{AdminLevel, AttributeValue, Region, RegionSchema, RegionSet};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Layer, Raster, RasterElement};
    pub use crate::region::{AdminLevel, AttributeValue, Region, RegionSchema, RegionSet};
}
