//! Uniform grid over bounding boxes.
//!
//! Broad phase for neighbor queries: a record is referenced from every cell
//! its bounds touch, a query unions the cells under its expanded bounds, and
//! the narrow phase keeps candidates whose exact distance is in range.
//! Records covering more than [`MAX_CELLS_PER_BOX`] cells are kept in a side
//! list that every query scans. Built once, then only read; safe to share
//! between worker threads.

use crate::kernel::{self, Bounds, Geom};
use hashbrown::HashMap;
use log::warn;
use serde_json::{Map, Value};
use smallvec::SmallVec;

pub type CellKey = (i64, i64);

/// Largest number of cells a record is registered in, or a query visits.
pub const MAX_CELLS_PER_BOX: u64 = 4096;

#[derive(Debug, Clone, Copy)]
pub struct GridEntry<'a> {
    pub index: usize,
    pub geometry: &'a Geom,
    pub properties: Option<&'a Map<String, Value>>,
    pub bounds: Bounds,
}

#[derive(Debug)]
pub struct SpatialGrid<'a> {
    cell_size: f64,
    entries: Vec<GridEntry<'a>>,
    /// Cell to positions in `entries`.
    cells: HashMap<CellKey, SmallVec<[u32; 4]>>,
    /// Positions of entries too large to register cell by cell.
    oversized: Vec<u32>,
}

impl<'a> SpatialGrid<'a> {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            entries: Vec::new(),
            cells: HashMap::new(),
            oversized: Vec::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_key(&self, x: f64, y: f64) -> CellKey {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    /// Corner cells of `bounds`, or `None` when the box covers more than
    /// [`MAX_CELLS_PER_BOX`] cells.
    fn cell_range(&self, bounds: &Bounds) -> Option<(CellKey, CellKey)> {
        let (x0, y0) = self.cell_key(bounds.min_x, bounds.min_y);
        let (x1, y1) = self.cell_key(bounds.max_x, bounds.max_y);
        let nx = i128::from(x1) - i128::from(x0) + 1;
        let ny = i128::from(y1) - i128::from(y0) + 1;
        (nx * ny <= i128::from(MAX_CELLS_PER_BOX)).then_some(((x0, y0), (x1, y1)))
    }

    /// Index `geometry` under `index`. Returns false, with a warning, when
    /// the geometry has no usable bounds.
    pub fn insert(
        &mut self,
        geometry: &'a Geom,
        index: usize,
        properties: Option<&'a Map<String, Value>>,
    ) -> bool {
        let bounds = match geometry.bounds() {
            Some(b) if b.is_finite() && b.width() * b.height() > 0.0 => b,
            Some(_) => {
                warn!("record {index}: degenerate bounds, not indexed");
                return false;
            }
            None => {
                warn!("record {index}: no bounds, not indexed");
                return false;
            }
        };
        if !(self.cell_size > 0.0) {
            warn!("record {index}: grid cell size {} is unusable", self.cell_size);
            return false;
        }

        let slot = self.entries.len() as u32;
        self.entries.push(GridEntry {
            index,
            geometry,
            properties,
            bounds,
        });

        let Some(((x0, y0), (x1, y1))) = self.cell_range(&bounds) else {
            warn!(
                "record {index}: {:e} x {:e} degrees spans too many cells, always scanned",
                bounds.width(),
                bounds.height()
            );
            self.oversized.push(slot);
            return true;
        };
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                self.cells.entry((cx, cy)).or_default().push(slot);
            }
        }
        true
    }

    /// Entries within `distance` of `geometry`, sorted by index.
    ///
    /// The query itself is left out both by `exclude` (its record index) and
    /// by identity of the geometry reference.
    pub fn find_neighbors(
        &self,
        geometry: &Geom,
        distance: f64,
        exclude: Option<usize>,
    ) -> Vec<GridEntry<'a>> {
        let Some(query) = geometry.bounds().filter(Bounds::is_finite) else {
            return Vec::new();
        };
        if self.entries.is_empty() || !(self.cell_size > 0.0) {
            return Vec::new();
        }

        // The box of a round buffer of `distance` is the box grown by it.
        let window = query.expand(distance.max(0.0));
        let mut slots: Vec<u32> = match self.cell_range(&window) {
            Some(((x0, y0), (x1, y1))) => {
                let mut slots = self.oversized.clone();
                for cx in x0..=x1 {
                    for cy in y0..=y1 {
                        if let Some(cell) = self.cells.get(&(cx, cy)) {
                            slots.extend_from_slice(cell);
                        }
                    }
                }
                slots
            }
            // Visiting the cells would cost more than checking every entry.
            None => (0..self.entries.len() as u32).collect(),
        };
        slots.sort_unstable();
        slots.dedup();

        let mut found: Vec<GridEntry<'a>> = slots
            .into_iter()
            .map(|slot| self.entries[slot as usize])
            .filter(|e| Some(e.index) != exclude && !std::ptr::eq(e.geometry, geometry))
            .filter(|e| e.bounds.distance(&query) <= distance)
            .filter(|e| kernel::distance(geometry, e.geometry) <= distance)
            .collect();
        found.sort_by_key(|e| e.index);
        found.dedup_by_key(|e| e.index);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::testutil::rect;

    fn checkerboard() -> Vec<Geom> {
        let mut out = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let (x, y) = (i as f64 * 1.5, j as f64 * 1.5);
                out.push(rect(x, y, x + 1.0, y + 1.0));
            }
        }
        out
    }

    #[test]
    fn no_false_negatives_against_brute_force() {
        let geoms = checkerboard();
        // Small cells so most records span several.
        let mut grid = SpatialGrid::new(0.7);
        for (i, g) in geoms.iter().enumerate() {
            assert!(grid.insert(g, i, None));
        }

        for distance in [0.0, 0.4, 0.5, 0.8, 3.0] {
            for (i, g) in geoms.iter().enumerate() {
                let got: Vec<usize> = grid
                    .find_neighbors(g, distance, Some(i))
                    .iter()
                    .map(|e| e.index)
                    .collect();
                let expected: Vec<usize> = geoms
                    .iter()
                    .enumerate()
                    .filter(|(j, other)| *j != i && kernel::distance(g, other) <= distance)
                    .map(|(j, _)| j)
                    .collect();
                assert_eq!(got, expected, "record {i} at distance {distance}");
            }
        }
    }

    #[test]
    fn query_is_excluded_by_reference_and_index() {
        let geoms = vec![rect(0.0, 0.0, 1.0, 1.0), rect(1.0, 0.0, 2.0, 1.0)];
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(&geoms[0], 0, None);
        grid.insert(&geoms[1], 1, None);

        let by_ref: Vec<usize> = grid
            .find_neighbors(&geoms[0], 0.1, None)
            .iter()
            .map(|e| e.index)
            .collect();
        assert_eq!(by_ref, vec![1]);

        // An equal but distinct geometry is only excluded through its index.
        let copy = geoms[0].clone();
        assert_eq!(grid.find_neighbors(&copy, 0.1, None).len(), 2);
        assert_eq!(grid.find_neighbors(&copy, 0.1, Some(0)).len(), 1);
    }

    #[test]
    fn degenerate_geometry_is_not_indexed() {
        use geo::{LineString, Polygon};
        let flat = Geom::polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]),
            vec![],
        ));
        let mut grid = SpatialGrid::new(1.0);
        assert!(!grid.insert(&flat, 0, None));
        assert!(grid.is_empty());
    }

    #[test]
    fn wide_record_lands_in_every_cell() {
        let wide = rect(0.5, 0.5, 3.5, 1.5);
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(&wide, 0, None);
        assert_eq!(grid.cell_count(), 4 * 2);
    }

    #[test]
    fn huge_record_is_found_without_cell_registration() {
        let county = rect(0.0, 0.0, 1000.0, 1000.0);
        let parcel = rect(500.002, 500.002, 500.004, 500.004);
        let mut grid = SpatialGrid::new(0.01);
        assert!(grid.insert(&county, 0, None));
        assert!(grid.insert(&parcel, 1, None));
        assert_eq!(grid.cell_count(), 1);

        let found: Vec<usize> = grid
            .find_neighbors(&parcel, 0.0, Some(1))
            .iter()
            .map(|e| e.index)
            .collect();
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn huge_query_scans_every_entry() {
        let geoms = checkerboard();
        let mut grid = SpatialGrid::new(0.7);
        for (i, g) in geoms.iter().enumerate() {
            grid.insert(g, i, None);
        }

        let sweep = rect(-1.0e6, -1.0e6, 1.0e6, 1.0e6);
        assert_eq!(grid.find_neighbors(&sweep, 0.0, None).len(), geoms.len());
        let far = rect(1.0e6, 1.0e6, 1.0e6 + 1.0, 1.0e6 + 1.0);
        assert_eq!(grid.find_neighbors(&far, f64::INFINITY, None).len(), geoms.len());
    }
}
