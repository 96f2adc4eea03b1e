//! Administrative regions: polygons, attributes, hierarchy levels

mod schema;

pub use schema::{RegionSchema, ResolvedSchema};

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo::{Area, BoundingRect, Centroid, Contains};
use geo_types::{LineString, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Attribute value types carried through from region sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of the value, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, ""),
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
        }
    }
}

/// Administrative hierarchy levels (GADM depth numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdminLevel {
    /// Level 0: national boundary
    Nation,
    /// Level 1: first subdivision (region / state)
    Region,
    /// Level 2: second subdivision (department / district)
    Department,
    /// Level 3: third subdivision (commune / arrondissement)
    Commune,
}

impl AdminLevel {
    /// GADM depth index (0 for Nation .. 3 for Commune)
    pub fn depth(self) -> u8 {
        match self {
            AdminLevel::Nation => 0,
            AdminLevel::Region => 1,
            AdminLevel::Department => 2,
            AdminLevel::Commune => 3,
        }
    }

    pub fn from_depth(depth: u8) -> Option<Self> {
        match depth {
            0 => Some(AdminLevel::Nation),
            1 => Some(AdminLevel::Region),
            2 => Some(AdminLevel::Department),
            3 => Some(AdminLevel::Commune),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AdminLevel::Nation => "nation",
            AdminLevel::Region => "region",
            AdminLevel::Department => "department",
            AdminLevel::Commune => "commune",
        }
    }
}

impl fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// An administrative polygon with source properties and derived attributes.
///
/// Derived attributes are numeric values attached after aggregation; a key
/// mapped to `None` records that the value could not be computed, which is
/// distinct from the key being absent and from `Some(0.0)`.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    code: Option<String>,
    level: AdminLevel,
    geometry: MultiPolygon<f64>,
    properties: HashMap<String, AttributeValue>,
    derived: HashMap<String, Option<f64>>,
}

impl Region {
    /// Create a region from a multipolygon
    pub fn new(name: impl Into<String>, level: AdminLevel, geometry: MultiPolygon<f64>) -> Self {
        Self {
            name: name.into(),
            code: None,
            level,
            geometry,
            properties: HashMap::new(),
            derived: HashMap::new(),
        }
    }

    /// Create a region from a single polygon
    pub fn from_polygon(name: impl Into<String>, level: AdminLevel, polygon: Polygon<f64>) -> Self {
        Self::new(name, level, MultiPolygon(vec![polygon]))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn set_code(&mut self, code: Option<String>) {
        self.code = code;
    }

    pub fn level(&self) -> AdminLevel {
        self.level
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    // Source properties

    pub fn property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn properties(&self) -> &HashMap<String, AttributeValue> {
        &self.properties
    }

    // Derived attributes

    /// Attach a derived value under `key`. `None` records an uncomputable value.
    pub fn set_derived(&mut self, key: impl Into<String>, value: Option<f64>) {
        self.derived.insert(key.into(), value);
    }

    /// Derived value under `key`; outer `None` means the key was never attached
    pub fn derived(&self, key: &str) -> Option<Option<f64>> {
        self.derived.get(key).copied()
    }

    pub fn derived_map(&self) -> &HashMap<String, Option<f64>> {
        &self.derived
    }

    // Geometry queries

    /// Planar area in squared map units
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    /// Planar perimeter in map units (exterior and interior rings)
    pub fn perimeter(&self) -> f64 {
        self.geometry
            .0
            .iter()
            .map(|poly| {
                ring_length(poly.exterior())
                    + poly.interiors().iter().map(ring_length).sum::<f64>()
            })
            .sum()
    }

    /// Isoperimetric compactness 4*pi*A/P^2 (1.0 for a disc, 0 for degenerate)
    pub fn compactness(&self) -> f64 {
        let p = self.perimeter();
        if p <= 0.0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area() / (p * p)
    }

    /// Axis-aligned bounding rectangle, if the geometry is non-empty
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    /// Centroid as (x, y), if the geometry is non-empty
    pub fn centroid(&self) -> Option<(f64, f64)> {
        self.geometry.centroid().map(|p| (p.x(), p.y()))
    }

    /// Point-in-region test
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.geometry.contains(&Point::new(x, y))
    }
}

fn ring_length(ring: &LineString<f64>) -> f64 {
    ring.0
        .windows(2)
        .map(|w| {
            let dx = w[1].x - w[0].x;
            let dy = w[1].y - w[0].y;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Non-empty, ordered collection of regions at one admin level.
///
/// Source order is preserved; primary names are unique within the set.
#[derive(Debug, Clone)]
pub struct RegionSet {
    level: AdminLevel,
    regions: Vec<Region>,
    crs: Option<CRS>,
}

impl RegionSet {
    pub fn new(level: AdminLevel, regions: Vec<Region>) -> Result<Self> {
        if regions.is_empty() {
            return Err(Error::InvalidParameter {
                name: "regions",
                value: "[]".to_string(),
                reason: "a region set needs at least one region".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for region in &regions {
            if !seen.insert(region.name().to_string()) {
                return Err(Error::DuplicateRegion(region.name().to_string()));
            }
        }

        Ok(Self {
            level,
            regions,
            crs: None,
        })
    }

    pub fn level(&self) -> AdminLevel {
        self.level
    }

    /// Coordinate system the geometries are expressed in, when known.
    /// The GeoJSON loader stamps WGS 84; hand-built sets carry `None`
    /// until set explicitly.
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        self.regions.iter_mut()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

impl<'a> IntoIterator for &'a RegionSet {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

impl IntoIterator for RegionSet {
    type Item = Region;
    type IntoIter = std::vec::IntoIter<Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.into_iter()
    }
}
