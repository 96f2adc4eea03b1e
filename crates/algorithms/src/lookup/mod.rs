//! Point-in-hierarchy lookup
//!
//! Builds one R-tree per admin level over region envelopes and answers
//! "which nation / region / department / commune contains this point",
//! returning each match together with the derived attributes already
//! attached to it. Lookups are read-only; attach aggregation results
//! before building the index.

use std::collections::HashMap;

use geo::Contains;
use geo_types::{MultiPolygon, Point};
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, warn};

use zonalis_core::{AdminLevel, Error, RegionSet, Result};

/// A region stored in the R-tree with everything a lookup reports.
struct RegionEntry {
    name: String,
    code: Option<String>,
    area: f64,
    envelope: AABB<[f64; 2]>,
    geometry: MultiPolygon<f64>,
    derived: HashMap<String, Option<f64>>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// The containing region at one admin level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelHit<'a> {
    pub level: AdminLevel,
    pub region: &'a str,
    pub code: Option<&'a str>,
    pub derived: &'a HashMap<String, Option<f64>>,
}

/// Pre-built spatial indexes over an administrative hierarchy.
///
/// Envelope prefilter through the R-tree, exact `contains` test on the
/// candidates. Levels can overlap (enclaves, disputed boundaries); a
/// point inside several regions of one level resolves to the smallest
/// area.
pub struct HierarchyIndex {
    /// Outermost level first.
    levels: Vec<(AdminLevel, RTree<RegionEntry>)>,
}

impl HierarchyIndex {
    /// Index every set, one R-tree per admin level.
    ///
    /// The same level twice is an error. Regions with empty geometry are
    /// skipped with a warning; they can never contain a point.
    pub fn build(sets: Vec<RegionSet>) -> Result<Self> {
        let mut levels: Vec<(AdminLevel, RTree<RegionEntry>)> = Vec::with_capacity(sets.len());

        for set in sets {
            let level = set.level();
            if levels.iter().any(|(existing, _)| *existing == level) {
                return Err(Error::InvalidParameter {
                    name: "sets",
                    value: level.to_string(),
                    reason: "each admin level can be indexed only once".to_string(),
                });
            }

            let mut entries = Vec::with_capacity(set.len());
            for region in set.iter() {
                let Some(rect) = region.bounding_rect() else {
                    warn!(region = region.name(), "skipping region with empty geometry");
                    continue;
                };
                entries.push(RegionEntry {
                    name: region.name().to_string(),
                    code: region.code().map(str::to_string),
                    area: region.area(),
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    geometry: region.geometry().clone(),
                    derived: region.derived_map().clone(),
                });
            }
            debug!(level = %level, regions = entries.len(), "indexed admin level");
            levels.push((level, RTree::bulk_load(entries)));
        }

        levels.sort_by_key(|(level, _)| level.depth());
        Ok(Self { levels })
    }

    /// Number of indexed levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Containing regions at every indexed level, outermost first.
    ///
    /// A level where nothing contains the point contributes no entry,
    /// so a point in the sea over a nation-only index returns an empty
    /// vector rather than an error.
    pub fn locate(&self, x: f64, y: f64) -> Vec<LevelHit<'_>> {
        self.levels
            .iter()
            .filter_map(|(level, tree)| Self::best_hit(tree, x, y).map(|e| hit(*level, e)))
            .collect()
    }

    /// The containing region at one level only.
    pub fn locate_at(&self, level: AdminLevel, x: f64, y: f64) -> Option<LevelHit<'_>> {
        let tree = self
            .levels
            .iter()
            .find(|(existing, _)| *existing == level)
            .map(|(_, tree)| tree)?;
        Self::best_hit(tree, x, y).map(|e| hit(level, e))
    }

    fn best_hit(tree: &RTree<RegionEntry>, x: f64, y: f64) -> Option<&RegionEntry> {
        let point = Point::new(x, y);
        let query_env = AABB::from_point([x, y]);

        let mut best: Option<&RegionEntry> = None;
        for entry in tree.locate_in_envelope_intersecting(&query_env) {
            if entry.geometry.contains(&point) {
                match best {
                    None => best = Some(entry),
                    Some(current) if entry.area < current.area => best = Some(entry),
                    _ => {}
                }
            }
        }
        best
    }
}

fn hit(level: AdminLevel, entry: &RegionEntry) -> LevelHit<'_> {
    LevelHit {
        level,
        region: &entry.name,
        code: entry.code.as_deref(),
        derived: &entry.derived,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;
    use zonalis_core::Region;

    fn square(name: &str, level: AdminLevel, x0: f64, y0: f64, size: f64) -> Region {
        Region::from_polygon(
            name,
            level,
            polygon![
                (x: x0, y: y0),
                (x: x0 + size, y: y0),
                (x: x0 + size, y: y0 + size),
                (x: x0, y: y0 + size),
            ],
        )
    }

    fn two_level_index() -> HierarchyIndex {
        // One nation covering [0,10]^2, two communes splitting its west
        // and east halves.
        let nation = RegionSet::new(
            AdminLevel::Nation,
            vec![square("Atlantis", AdminLevel::Nation, 0.0, 0.0, 10.0)],
        )
        .unwrap();
        let mut west = square("West", AdminLevel::Commune, 0.0, 0.0, 5.0);
        west.set_derived("pop_sum", Some(1200.0));
        let mut east = square("East", AdminLevel::Commune, 5.0, 0.0, 5.0);
        east.set_derived("pop_sum", None);
        let communes = RegionSet::new(AdminLevel::Commune, vec![west, east]).unwrap();

        HierarchyIndex::build(vec![communes, nation]).unwrap()
    }

    #[test]
    fn test_locate_reports_outermost_first() {
        let index = two_level_index();
        let hits = index.locate(2.0, 2.0);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].level, AdminLevel::Nation);
        assert_eq!(hits[0].region, "Atlantis");
        assert_eq!(hits[1].level, AdminLevel::Commune);
        assert_eq!(hits[1].region, "West");
        assert_eq!(hits[1].derived.get("pop_sum"), Some(&Some(1200.0)));
    }

    #[test]
    fn test_missing_level_is_absent_not_an_error() {
        let index = two_level_index();
        // Inside the nation but on neither commune (east of everything).
        let hits = index.locate(7.0, 2.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].region, "East");
        // A null derived value comes through as a null, not a miss.
        assert_eq!(hits[1].derived.get("pop_sum"), Some(&None));

        let nowhere = index.locate(50.0, 50.0);
        assert!(nowhere.is_empty());
    }

    #[test]
    fn test_overlap_resolves_to_smallest_area() {
        let big = square("outer", AdminLevel::Region, 0.0, 0.0, 10.0);
        let small = square("enclave", AdminLevel::Region, 4.0, 4.0, 2.0);
        let set = RegionSet::new(AdminLevel::Region, vec![big, small]).unwrap();
        let index = HierarchyIndex::build(vec![set]).unwrap();

        let hits = index.locate(5.0, 5.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].region, "enclave");

        // Outside the enclave the outer region still answers.
        assert_eq!(index.locate(1.0, 1.0)[0].region, "outer");
    }

    #[test]
    fn test_duplicate_level_rejected() {
        let a = RegionSet::new(
            AdminLevel::Commune,
            vec![square("a", AdminLevel::Commune, 0.0, 0.0, 1.0)],
        )
        .unwrap();
        let b = RegionSet::new(
            AdminLevel::Commune,
            vec![square("b", AdminLevel::Commune, 2.0, 0.0, 1.0)],
        )
        .unwrap();
        assert!(HierarchyIndex::build(vec![a, b]).is_err());
    }

    #[test]
    fn test_locate_at_single_level() {
        let index = two_level_index();
        let hit = index.locate_at(AdminLevel::Commune, 2.0, 2.0).unwrap();
        assert_eq!(hit.region, "West");

        assert!(index.locate_at(AdminLevel::Department, 2.0, 2.0).is_none());
    }

    #[test]
    fn test_boundary_point_on_shared_edge() {
        // On the shared edge of the two communes: whichever side claims
        // it, exactly one commune answers and the batch never errors.
        let index = two_level_index();
        let hits = index.locate(5.0, 2.5);
        assert!(hits.len() <= 2);
        for hit in &hits {
            if hit.level == AdminLevel::Commune {
                assert!(hit.region == "West" || hit.region == "East");
            }
        }
    }
}
