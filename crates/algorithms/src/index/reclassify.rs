//! Index classification
//!
//! Maps a continuous index raster onto discrete classes through a range
//! table, e.g. turning NDVI into water / bare / sparse / dense classes
//! before counting class areas per region.

use crate::maybe_rayon::*;
use zonalis_core::{Error, Raster, Result};

use super::{build_output, is_nodata_f64};

/// One class of the table, matching `min <= value < max`.
#[derive(Debug, Clone, Copy)]
pub struct ClassRange {
    pub min: f64,
    /// Exclusive, except for the last class of the table which also
    /// claims its own upper bound so the domain maximum is not lost.
    pub max: f64,
    /// Class code written to the output.
    pub value: f64,
}

impl ClassRange {
    pub fn new(min: f64, max: f64, value: f64) -> Self {
        Self { min, max, value }
    }
}

/// Classification table plus the fallback for unmatched cells.
#[derive(Debug, Clone)]
pub struct ReclassifyParams {
    /// Ranges tried in order; the first match wins.
    pub classes: Vec<ClassRange>,
    /// Written where no range matches. NaN leaves such cells as nodata.
    pub default_value: f64,
}

impl Default for ReclassifyParams {
    fn default() -> Self {
        Self {
            classes: Vec::new(),
            default_value: f64::NAN,
        }
    }
}

/// Classify a raster through a range table.
///
/// Nodata cells stay nodata. Cells matching no range get the default
/// value, except that a cell sitting exactly on the last range's upper
/// bound joins that range.
pub fn reclassify(raster: &Raster<f64>, params: &ReclassifyParams) -> Result<Raster<f64>> {
    for entry in &params.classes {
        if !(entry.min < entry.max) {
            return Err(Error::InvalidParameter {
                name: "classes",
                value: format!("[{}, {})", entry.min, entry.max),
                reason: "each class range needs min < max".to_string(),
            });
        }
    }

    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();
    let classes = &params.classes;
    let default = params.default_value;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let val = unsafe { raster.get_unchecked(row, col) };
                if is_nodata_f64(val, nodata) {
                    continue;
                }

                let mut matched = None;
                for entry in classes {
                    if val >= entry.min && val < entry.max {
                        matched = Some(entry.value);
                        break;
                    }
                }
                if matched.is_none() {
                    if let Some(last) = classes.last() {
                        if val == last.max {
                            matched = Some(last.value);
                        }
                    }
                }

                row_data[col] = matched.unwrap_or(default);
            }
            row_data
        })
        .collect();

    build_output(raster, rows, cols, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonalis_core::GeoTransform;

    fn ndvi_like() -> Raster<f64> {
        let values = vec![
            -0.4, 0.0, 0.15, //
            0.2, 0.45, 0.5, //
            0.8, 1.0, f64::NAN,
        ];
        let mut r = Raster::from_vec(values, 3, 3).unwrap();
        r.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        r
    }

    fn vegetation_classes() -> ReclassifyParams {
        ReclassifyParams {
            classes: vec![
                ClassRange::new(-1.0, 0.0, 1.0), // water
                ClassRange::new(0.0, 0.2, 2.0),  // bare
                ClassRange::new(0.2, 0.5, 3.0),  // sparse
                ClassRange::new(0.5, 1.0, 4.0),  // dense
            ],
            default_value: 0.0,
        }
    }

    #[test]
    fn test_range_boundaries() {
        let out = reclassify(&ndvi_like(), &vegetation_classes()).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 1.0); // -0.4
        assert_eq!(out.get(0, 1).unwrap(), 2.0); // 0.0 starts bare, not water
        assert_eq!(out.get(1, 0).unwrap(), 3.0); // 0.2 starts sparse
        assert_eq!(out.get(1, 1).unwrap(), 3.0); // 0.45
        assert_eq!(out.get(1, 2).unwrap(), 4.0); // 0.5 starts dense
        assert_eq!(out.get(2, 0).unwrap(), 4.0); // 0.8
    }

    #[test]
    fn test_last_class_keeps_its_upper_bound() {
        let out = reclassify(&ndvi_like(), &vegetation_classes()).unwrap();
        assert_eq!(out.get(2, 1).unwrap(), 4.0); // exactly 1.0
    }

    #[test]
    fn test_nodata_stays_nodata() {
        let out = reclassify(&ndvi_like(), &vegetation_classes()).unwrap();
        assert!(out.get(2, 2).unwrap().is_nan());
    }

    #[test]
    fn test_unmatched_gets_default() {
        let mut params = vegetation_classes();
        params.classes.remove(0);
        let out = reclassify(&ndvi_like(), &params).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 0.0); // -0.4 matches nothing
    }

    #[test]
    fn test_invalid_range_rejected() {
        let params = ReclassifyParams {
            classes: vec![ClassRange::new(0.5, 0.5, 1.0)],
            default_value: 0.0,
        };
        assert!(reclassify(&ndvi_like(), &params).is_err());
    }
}
