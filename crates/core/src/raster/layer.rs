//! Multi-band layer: named rasters sharing one grid

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use crate::CRS;

/// An ordered collection of named single-band rasters on a common grid.
///
/// All bands must share dimensions and geotransform; declared CRS must be
/// equivalent across bands. Band names key reduction outputs, so they must
/// be unique within a layer.
#[derive(Debug, Clone)]
pub struct Layer {
    bands: Vec<(String, Raster<f64>)>,
}

impl Layer {
    /// Create a single-band layer
    pub fn single(name: impl Into<String>, raster: Raster<f64>) -> Self {
        Self {
            bands: vec![(name.into(), raster)],
        }
    }

    /// Create a layer from named bands, validating grid agreement
    pub fn from_bands(bands: Vec<(String, Raster<f64>)>) -> Result<Self> {
        let mut it = bands.into_iter();
        let (name, first) = it.next().ok_or_else(|| Error::InvalidParameter {
            name: "bands",
            value: "[]".to_string(),
            reason: "a layer needs at least one band".to_string(),
        })?;

        let mut layer = Self::single(name, first);
        for (name, raster) in it {
            layer.push_band(name, raster)?;
        }
        Ok(layer)
    }

    /// Append a band, validating against the existing grid
    pub fn push_band(&mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<()> {
        let name = name.into();
        if self.bands.iter().any(|(n, _)| *n == name) {
            return Err(Error::InvalidParameter {
                name: "band",
                value: name,
                reason: "band name already present in layer".to_string(),
            });
        }

        let (_, base) = &self.bands[0];
        if base.shape() != raster.shape() {
            return Err(Error::ShapeMismatch {
                expected: base.shape(),
                actual: raster.shape(),
            });
        }
        if base.transform() != raster.transform() {
            return Err(Error::InvalidParameter {
                name: "band",
                value: name,
                reason: "band geotransform differs from layer grid".to_string(),
            });
        }
        if let (Some(a), Some(b)) = (base.crs(), raster.crs()) {
            if !a.is_equivalent(b) {
                return Err(Error::CrsMismatch(a.identifier(), b.identifier()));
            }
        }

        self.bands.push((name, raster));
        Ok(())
    }

    /// Number of bands
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band names in order
    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|(n, _)| n.as_str())
    }

    /// Look up a band by name
    pub fn band(&self, name: &str) -> Option<&Raster<f64>> {
        self.bands
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    /// Iterate over (name, raster) pairs in order
    pub fn bands(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.bands.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Dimensions of the shared grid as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.bands[0].1.shape()
    }

    /// Geotransform of the shared grid
    pub fn transform(&self) -> &GeoTransform {
        self.bands[0].1.transform()
    }

    /// CRS of the shared grid, if declared
    pub fn crs(&self) -> Option<&CRS> {
        self.bands[0].1.crs()
    }

    /// Cell size of the shared grid
    pub fn cell_size(&self) -> f64 {
        self.bands[0].1.cell_size()
    }

    /// Geographic bounds of the shared grid (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.bands[0].1.bounds()
    }
}

impl From<Raster<f64>> for Layer {
    fn from(raster: Raster<f64>) -> Self {
        Self::single("band_1", raster)
    }
}
