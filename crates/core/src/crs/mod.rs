//! Coordinate reference system metadata.
//!
//! Zonalis never reprojects. A CRS rides along with rasters and region sets
//! so that the aggregation entry points can refuse mixed inputs instead of
//! silently sampling the wrong cells.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the coordinate system a raster or region set is expressed in.
///
/// Either an EPSG code or a raw WKT string may be present. Two values
/// compare as equivalent only when they share an identifier of the same kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    epsg: Option<u32>,
    wkt: Option<String>,
}

impl CRS {
    /// CRS from an EPSG code.
    pub fn from_epsg(code: u32) -> Self {
        CRS {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// CRS from a WKT definition.
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        CRS {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// WGS 84 geographic coordinates (EPSG:4326), the coordinate system
    /// GeoJSON sources are defined in.
    pub fn wgs84() -> Self {
        CRS::from_epsg(4326)
    }

    /// The EPSG code, if one is known.
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// The WKT definition, if one is known.
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether coordinates are geographic (degrees) rather than projected.
    ///
    /// EPSG reserves the 4000 block for geographic 2D systems; WKT declares
    /// it in the header keyword.
    pub fn is_geographic(&self) -> bool {
        if let Some(code) = self.epsg {
            return (4000..5000).contains(&code);
        }
        match &self.wkt {
            Some(wkt) => {
                let head = wkt.trim_start();
                head.starts_with("GEOGCS") || head.starts_with("GEOGCRS")
            }
            None => false,
        }
    }

    /// Whether two coordinate systems can be treated as the same.
    ///
    /// EPSG codes compare numerically. Two WKT-only values compare by
    /// trimmed text. An EPSG-only value never matches a WKT-only one; that
    /// case reports non-equivalent so the caller surfaces the mismatch.
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (&self.wkt, &other.wkt) {
                (Some(a), Some(b)) => a.trim() == b.trim(),
                _ => false,
            },
            _ => false,
        }
    }

    /// Short human-readable identifier for log and error messages.
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            // WKT opens with KEYWORD["Name",... so the quoted name is the
            // friendliest label available.
            if let Some(name) = wkt.split('"').nth(1) {
                return name.to_string();
            }
            return "custom WKT".to_string();
        }
        "unspecified".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_codes_compare_numerically() {
        assert!(CRS::from_epsg(4326).is_equivalent(&CRS::wgs84()));
        assert!(!CRS::from_epsg(32719).is_equivalent(&CRS::wgs84()));
    }

    #[test]
    fn wkt_comparison_ignores_surrounding_whitespace() {
        let a = CRS::from_wkt("GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\"]]");
        let b = CRS::from_wkt("  GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\"]]\n");
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn epsg_never_matches_wkt_only() {
        let by_code = CRS::from_epsg(4326);
        let by_text = CRS::from_wkt("GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\"]]");
        assert!(!by_code.is_equivalent(&by_text));
        assert!(!by_text.is_equivalent(&by_code));
    }

    #[test]
    fn geographic_detection() {
        assert!(CRS::wgs84().is_geographic());
        assert!(!CRS::from_epsg(32719).is_geographic());
        assert!(CRS::from_wkt("GEOGCS[\"WGS 84\"]").is_geographic());
        assert!(!CRS::from_wkt("PROJCS[\"UTM 19S\"]").is_geographic());
    }

    #[test]
    fn identifier_prefers_code_then_wkt_name() {
        assert_eq!(CRS::wgs84().identifier(), "EPSG:4326");
        assert_eq!(
            CRS::from_wkt("PROJCS[\"UTM Zone 19S\",GEOGCS[\"WGS 84\"]]").identifier(),
            "UTM Zone 19S"
        );
        let unspecified = CRS {
            epsg: None,
            wkt: None,
        };
        assert_eq!(unspecified.identifier(), "unspecified");
    }
}
