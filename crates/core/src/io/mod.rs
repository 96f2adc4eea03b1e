//! I/O operations for reading and writing geospatial data

mod geojson;
mod geotiff;

pub use geojson::{parse_regions, read_regions_geojson};
pub use geotiff::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
