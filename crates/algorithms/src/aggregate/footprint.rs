//! Sampling footprints: which lattice points inside a region get sampled.

use geo::BoundingRect;
use geo_types::MultiPolygon;
use zonalis_core::GeoTransform;

/// A regular sampling lattice aligned to a raster grid.
///
/// Sample points sit at the cell centers of a virtual grid that shares the
/// layer's origin and has a cell size of `step` map units. At the layer's
/// native scale the lattice therefore visits exactly the layer's own pixel
/// centers; at coarser steps it visits every n-th center, still on-grid.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SamplingGrid {
    origin_x: f64,
    origin_y: f64,
    step: f64,
    k0: i64,
    k1: i64,
    j0: i64,
    j1: i64,
}

impl SamplingGrid {
    /// Lattice over `window` (min_x, min_y, max_x, max_y) at `step` map units.
    pub(crate) fn over_window(
        transform: &GeoTransform,
        window: (f64, f64, f64, f64),
        step: f64,
    ) -> Self {
        let (min_x, min_y, max_x, max_y) = window;
        let ox = transform.origin_x;
        let oy = transform.origin_y;
        // First and last lattice columns whose centers fall inside the window.
        let k0 = ((min_x - ox) / step - 0.5).ceil() as i64;
        let k1 = ((max_x - ox) / step - 0.5).floor() as i64;
        // Lattice rows count downward from the origin.
        let j0 = ((oy - max_y) / step - 0.5).ceil() as i64;
        let j1 = ((oy - min_y) / step - 0.5).floor() as i64;
        Self {
            origin_x: ox,
            origin_y: oy,
            step,
            k0,
            k1,
            j0,
            j1,
        }
    }

    pub(crate) fn step(&self) -> f64 {
        self.step
    }

    /// Number of lattice points in the window, before any polygon test.
    /// This is the quantity charged against the pixel budget.
    pub(crate) fn samples(&self) -> u64 {
        let cols = (self.k1 - self.k0 + 1).max(0) as u64;
        let rows = (self.j1 - self.j0 + 1).max(0) as u64;
        cols.saturating_mul(rows)
    }

    fn x(&self, k: i64) -> f64 {
        self.origin_x + (k as f64 + 0.5) * self.step
    }

    fn y(&self, j: i64) -> f64 {
        self.origin_y - (j as f64 + 0.5) * self.step
    }
}

/// Intersection of the region envelope with the layer extent.
/// `None` means the region cannot touch the layer at all.
pub(crate) fn clip_window(
    geometry: &MultiPolygon<f64>,
    layer_bounds: (f64, f64, f64, f64),
) -> Option<(f64, f64, f64, f64)> {
    let rect = geometry.bounding_rect()?;
    let (layer_min_x, layer_min_y, layer_max_x, layer_max_y) = layer_bounds;
    let min_x = rect.min().x.max(layer_min_x);
    let min_y = rect.min().y.max(layer_min_y);
    let max_x = rect.max().x.min(layer_max_x);
    let max_y = rect.max().y.min(layer_max_y);
    if min_x > max_x || min_y > max_y {
        return None;
    }
    Some((min_x, min_y, max_x, max_y))
}

/// Outcome of fitting a sampling lattice to a pixel budget.
pub(crate) enum SamplePlan {
    Grid {
        grid: SamplingGrid,
        approximate: bool,
    },
    TooLarge {
        required: u64,
    },
}

/// Fit a lattice at `scale` into `max_pixels`, coarsening only when allowed.
pub(crate) fn plan_sampling(
    transform: &GeoTransform,
    window: (f64, f64, f64, f64),
    scale: f64,
    max_pixels: u64,
    best_effort: bool,
) -> SamplePlan {
    let grid = SamplingGrid::over_window(transform, window, scale);
    if grid.samples() <= max_pixels {
        return SamplePlan::Grid {
            grid,
            approximate: false,
        };
    }
    if !best_effort {
        return SamplePlan::TooLarge {
            required: grid.samples(),
        };
    }
    // Double the step until the lattice fits. Each doubling cuts the
    // sample count by about four, so this converges in a few rounds.
    let mut step = scale;
    loop {
        step *= 2.0;
        let grid = SamplingGrid::over_window(transform, window, step);
        if grid.samples() <= max_pixels {
            return SamplePlan::Grid {
                grid,
                approximate: true,
            };
        }
    }
}

/// Visit every lattice point inside `geometry`, row by row.
///
/// Inclusion uses the even-odd rule on scanline crossings, so holes and
/// multi-part geometries come out right without special casing. Spans are
/// half-open (entry edge in, exit edge out), matching the crossing rule in
/// [`row_crossings`].
pub(crate) fn for_each_inside<F>(grid: &SamplingGrid, geometry: &MultiPolygon<f64>, mut visit: F)
where
    F: FnMut(f64, f64),
{
    let mut crossings = Vec::new();
    for j in grid.j0..=grid.j1 {
        let y = grid.y(j);
        row_crossings(geometry, y, &mut crossings);
        for span in crossings.chunks_exact(2) {
            let (enter, exit) = (span[0], span[1]);
            // Lattice columns with enter <= x < exit.
            let lo = ((enter - grid.origin_x) / grid.step - 0.5).ceil() as i64;
            let hi = ((exit - grid.origin_x) / grid.step - 0.5).ceil() as i64 - 1;
            for k in lo.max(grid.k0)..=hi.min(grid.k1) {
                visit(grid.x(k), y);
            }
        }
    }
}

/// X coordinates where ring edges cross the horizontal line at `y`, sorted
/// ascending. The `(a.y > y) != (b.y > y)` vertex rule counts every
/// crossing exactly once, including crossings through shared vertices.
fn row_crossings(geometry: &MultiPolygon<f64>, y: f64, out: &mut Vec<f64>) {
    out.clear();
    for polygon in &geometry.0 {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
        for ring in rings {
            for edge in ring.0.windows(2) {
                let (a, b) = (edge[0], edge[1]);
                if (a.y > y) != (b.y > y) {
                    out.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
        }
    }
    out.sort_unstable_by(f64::total_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, Polygon};

    fn square(min: f64, max: f64) -> Polygon<f64> {
        polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
            (x: min, y: min),
        ]
    }

    fn collect_inside(grid: &SamplingGrid, geom: &MultiPolygon<f64>) -> Vec<(f64, f64)> {
        let mut pts = Vec::new();
        for_each_inside(grid, geom, |x, y| pts.push((x, y)));
        pts
    }

    #[test]
    fn test_native_scale_visits_pixel_centers() {
        let transform = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let window = transform.bounds(4, 4);
        let grid = SamplingGrid::over_window(&transform, window, 10.0);
        assert_eq!(grid.samples(), 16);
        assert_eq!(grid.x(0), 105.0);
        assert_eq!(grid.y(0), 195.0);
        assert_eq!((grid.x(0), grid.y(0)), transform.pixel_to_geo(0, 0));
    }

    #[test]
    fn test_square_footprint() {
        let transform = GeoTransform::new(0.0, 4.0, 1.0, -1.0);
        let geom = MultiPolygon(vec![square(0.0, 4.0)]);
        let window = clip_window(&geom, transform.bounds(4, 4)).unwrap();
        let grid = SamplingGrid::over_window(&transform, window, 1.0);
        let pts = collect_inside(&grid, &geom);
        assert_eq!(pts.len(), 16);
        assert!(pts.contains(&(0.5, 3.5)));
        assert!(pts.contains(&(3.5, 0.5)));
    }

    #[test]
    fn test_hole_is_excluded() {
        let outer = square(0.0, 4.0);
        let hole = square(1.0, 3.0);
        let geom = MultiPolygon(vec![Polygon::new(
            outer.exterior().clone(),
            vec![hole.exterior().clone()],
        )]);
        let transform = GeoTransform::new(0.0, 4.0, 1.0, -1.0);
        let window = clip_window(&geom, transform.bounds(4, 4)).unwrap();
        let grid = SamplingGrid::over_window(&transform, window, 1.0);
        let pts = collect_inside(&grid, &geom);
        // 16 lattice points minus the 4 that fall in the hole.
        assert_eq!(pts.len(), 12);
        assert!(!pts.contains(&(1.5, 1.5)));
        assert!(!pts.contains(&(2.5, 2.5)));
    }

    #[test]
    fn test_triangle_half_open_edges() {
        let geom = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 4.0),
            (x: 0.0, y: 0.0),
        ]]);
        let transform = GeoTransform::new(0.0, 4.0, 1.0, -1.0);
        let window = clip_window(&geom, transform.bounds(4, 4)).unwrap();
        let grid = SamplingGrid::over_window(&transform, window, 1.0);
        let pts = collect_inside(&grid, &geom);
        // Rows from the top: 0, 1, 2, 3 points under the hypotenuse.
        assert_eq!(pts.len(), 6);
    }

    #[test]
    fn test_disjoint_window() {
        let geom = MultiPolygon(vec![square(100.0, 110.0)]);
        assert!(clip_window(&geom, (0.0, 0.0, 50.0, 50.0)).is_none());
    }

    #[test]
    fn test_plan_respects_budget() {
        let transform = GeoTransform::new(0.0, 1000.0, 1.0, -1.0);
        let window = transform.bounds(1000, 1000);

        match plan_sampling(&transform, window, 1.0, 1_000_000, false) {
            SamplePlan::Grid { grid, approximate } => {
                assert!(!approximate);
                assert_eq!(grid.samples(), 1_000_000);
            }
            SamplePlan::TooLarge { .. } => panic!("fits exactly"),
        }

        match plan_sampling(&transform, window, 1.0, 10_000, false) {
            SamplePlan::TooLarge { required } => assert_eq!(required, 1_000_000),
            SamplePlan::Grid { .. } => panic!("must refuse without best effort"),
        }

        match plan_sampling(&transform, window, 1.0, 10_000, true) {
            SamplePlan::Grid { grid, approximate } => {
                assert!(approximate);
                assert!(grid.samples() <= 10_000);
                assert!(grid.step() > 1.0);
            }
            SamplePlan::TooLarge { .. } => panic!("best effort always fits"),
        }
    }
}
