use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::BuildWarning;
use crate::inventory::InventoryIndex;
use crate::types::{Cell, CoverKey, Placement, Tile};

/// Sparse `(tile, x, y, cell_x, cell_y) → {0, 1}` mapping.
///
/// Only covered pairs are stored. Any key that is absent reads as `0`, so
/// the relation can be queried for cells anywhere on the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageRelation {
    covered: BTreeSet<CoverKey>,
}

impl CoverageRelation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CoverKey) -> u8 {
        u8::from(self.covered.contains(key))
    }

    pub fn covers(&self, placement: Placement, cell: Cell) -> bool {
        self.covered.contains(&CoverKey { placement, cell })
    }

    pub fn set(&mut self, key: CoverKey) {
        self.covered.insert(key);
    }

    pub fn len(&self) -> usize {
        self.covered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoverKey> {
        self.covered.iter()
    }
}

impl Extend<CoverKey> for CoverageRelation {
    fn extend<T: IntoIterator<Item = CoverKey>>(&mut self, iter: T) {
        self.covered.extend(iter);
    }
}

/// Anchor coordinates (per axis) at which a tile of `size` fits a
/// `dimension`x`dimension` square. Empty when the tile is too large.
pub fn legal_anchors(size: u32, dimension: u32) -> RangeInclusive<u32> {
    1..=(dimension + 1).saturating_sub(size)
}

pub fn no_legal_placement(tile: &Tile, dimension: u32) -> Option<BuildWarning> {
    legal_anchors(tile.size, dimension)
        .is_empty()
        .then_some(BuildWarning::NoLegalPlacement {
            tile_id: tile.id,
            size: tile.size,
            dimension,
        })
}

fn tile_placements(tile: Tile, dimension: u32) -> impl Iterator<Item = Placement> {
    let anchors = legal_anchors(tile.size, dimension);
    anchors
        .clone()
        .flat_map(move |x| anchors.clone().map(move |y| Placement::new(tile.id, x, y)))
}

fn tile_cover(tile: Tile, dimension: u32) -> Vec<CoverKey> {
    tile_placements(tile, dimension)
        .flat_map(|placement| {
            placement
                .footprint(tile.size)
                .map(move |cell| CoverKey { placement, cell })
                .collect::<Vec<_>>()
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CoverageIndex<'a> {
    inventory: &'a InventoryIndex,
    relation: Arc<CoverageRelation>,
    warnings: Vec<BuildWarning>,
}

impl<'a> CoverageIndex<'a> {
    pub fn new(inventory: &'a InventoryIndex) -> Self {
        Self {
            inventory,
            relation: Arc::default(),
            warnings: Vec::new(),
        }
    }

    pub fn inventory(&self) -> &'a InventoryIndex {
        self.inventory
    }

    pub fn relation(&self) -> &CoverageRelation {
        &self.relation
    }

    pub fn shared_relation(&self) -> Arc<CoverageRelation> {
        Arc::clone(&self.relation)
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    /// All grid cells `[1, E]²`, margin included, row by row.
    pub fn area(&self) -> impl Iterator<Item = Cell> {
        let extent = self.inventory.grid_extent();
        (1..=extent).flat_map(move |x| (1..=extent).map(move |y| Cell::new(x, y)))
    }

    /// Marks the footprint of a single placement as covered.
    ///
    /// The anchor is not checked for legality; unknown tiles are ignored.
    pub fn create_cover(&mut self, placement: Placement) {
        let Some(size) = self.inventory.size_of(placement.tile_id) else {
            warn!(tile = placement.tile_id, "cover requested for unknown tile");
            return;
        };
        Arc::make_mut(&mut self.relation).extend(
            placement
                .footprint(size)
                .map(|cell| CoverKey { placement, cell }),
        );
    }

    pub fn create_full_cover(&mut self) -> &CoverageRelation {
        let dimension = self.inventory.dimension();

        let per_tile: Vec<(Vec<CoverKey>, Option<BuildWarning>)> = self
            .inventory
            .tiles()
            .par_iter()
            .map(|&tile| {
                let keys = tile_cover(tile, dimension);
                debug!(tile = tile.id, size = tile.size, cells = keys.len(), "tile cover");
                (keys, no_legal_placement(&tile, dimension))
            })
            .collect();

        let mut relation = CoverageRelation::new();
        self.warnings.clear();
        for (keys, warning) in per_tile {
            relation.extend(keys);
            if let Some(warning) = warning {
                warn!("{warning}");
                self.warnings.push(warning);
            }
        }

        self.relation = Arc::new(relation);

        info!(
            entries = self.relation.len(),
            no_placement = self.warnings.len(),
            "full cover created"
        );
        &self.relation
    }

    pub fn placements(&self) -> Vec<Placement> {
        let dimension = self.inventory.dimension();
        self.inventory
            .tiles()
            .iter()
            .flat_map(|&tile| tile_placements(tile, dimension))
            .collect()
    }

    pub fn placements_by_cell(&self) -> BTreeMap<Cell, Vec<Placement>> {
        let mut by_cell: BTreeMap<Cell, Vec<Placement>> = BTreeMap::new();
        for key in self.relation.iter() {
            by_cell.entry(key.cell).or_default().push(key.placement);
        }
        by_cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Inventory;

    fn index(pairs: &[(i64, i64)]) -> InventoryIndex {
        let inv: Inventory = pairs.iter().copied().collect();
        InventoryIndex::build(&inv).unwrap()
    }

    fn demo() -> InventoryIndex {
        index(&[(1, 6), (2, 5), (3, 4), (4, 3)])
    }

    #[test]
    fn test_area_has_margin_row_and_column() {
        let inv = demo();
        let cover = CoverageIndex::new(&inv);
        assert_eq!(inv.dimension(), 10);
        assert_eq!(cover.area().count(), 11 * 11);
        assert_eq!(cover.area().last(), Some(Cell::new(11, 11)));
    }

    #[test]
    fn test_single_cover() {
        let inv = demo();
        let mut cover = CoverageIndex::new(&inv);
        cover.create_cover(Placement::new(5, 1, 5));
        let relation = cover.relation();
        assert_eq!(relation.get(&CoverKey::new(5, 1, 5, 1, 5)), 1);
        assert_eq!(relation.get(&CoverKey::new(5, 1, 5, 6, 9)), 0);
        assert_eq!(relation.len(), 1, "tile 5 is a 1x1 tile");
    }

    #[test]
    fn test_single_cover_of_large_tile() {
        let inv = demo();
        // Tiles 16..=18 are the 4x4 ones.
        let mut cover = CoverageIndex::new(&inv);
        cover.create_cover(Placement::new(16, 1, 5));
        let relation = cover.relation();
        assert_eq!(relation.len(), 16);
        for x in 1..=4 {
            for y in 5..=8 {
                assert_eq!(relation.get(&CoverKey::new(16, 1, 5, x, y)), 1, "cell ({x},{y})");
            }
        }
        assert_eq!(relation.get(&CoverKey::new(16, 1, 5, 5, 5)), 0);
        assert_eq!(relation.get(&CoverKey::new(16, 1, 5, 1, 9)), 0);
    }

    #[test]
    fn test_unknown_tile_is_ignored() {
        let inv = demo();
        let mut cover = CoverageIndex::new(&inv);
        cover.create_cover(Placement::new(99, 1, 1));
        assert!(cover.relation().is_empty());
    }

    #[test]
    fn test_full_cover_entry_count() {
        let inv = demo();
        let mut cover = CoverageIndex::new(&inv);
        assert_eq!(cover.create_full_cover().len(), 6876);

        let extent = inv.grid_extent() as usize;
        let expected: usize = inv
            .tiles()
            .iter()
            .map(|t| {
                let s = t.size as usize;
                (extent - s).pow(2) * s * s
            })
            .sum();
        assert_eq!(cover.relation().len(), expected);
        assert!(cover.warnings().is_empty());
    }

    #[test]
    fn test_full_cover_is_idempotent() {
        let inv = demo();
        let mut cover = CoverageIndex::new(&inv);
        let first = cover.create_full_cover().clone();
        let second = cover.create_full_cover().clone();
        assert_eq!(first, second);
        assert_eq!(second.len(), 6876);
    }

    #[test]
    fn test_footprints_stay_inside_target_square() {
        let inv = index(&[(1, 4), (2, 3), (3, 2)]);
        let mut cover = CoverageIndex::new(&inv);
        cover.create_full_cover();
        let dim = inv.dimension();
        assert!(
            cover
                .relation()
                .iter()
                .all(|k| k.cell.x <= dim && k.cell.y <= dim)
        );
        let by_cell = cover.placements_by_cell();
        assert_eq!(by_cell.len(), (dim * dim) as usize);
        assert!(!by_cell.contains_key(&Cell::new(dim + 1, 1)));
    }

    #[test]
    fn test_placements_match_relation() {
        let inv = index(&[(1, 5), (2, 1)]);
        let mut cover = CoverageIndex::new(&inv);
        cover.create_full_cover();
        let placements = cover.placements();
        // 5 unit tiles with 3x3 anchors, one 2x2 tile with 2x2 anchors
        assert_eq!(placements.len(), 5 * 9 + 4);
        for p in &placements {
            let size = inv.size_of(p.tile_id).unwrap();
            assert!(p.footprint(size).all(|c| cover.relation().covers(*p, c)));
        }
    }

    #[test]
    fn test_oversized_tile_has_no_placement() {
        let inv = index(&[(1, 4), (3, 1)]).with_dimension(2).unwrap();
        let mut cover = CoverageIndex::new(&inv);
        cover.create_full_cover();
        assert_eq!(
            cover.warnings(),
            &[BuildWarning::NoLegalPlacement {
                tile_id: 5,
                size: 3,
                dimension: 2
            }]
        );
        assert!(cover.relation().iter().all(|k| k.placement.tile_id != 5));
        assert_eq!(cover.relation().len(), 4 * 4);
    }

    #[test]
    fn test_legal_anchors() {
        assert_eq!(legal_anchors(1, 3), 1..=3);
        assert_eq!(legal_anchors(3, 3), 1..=1);
        assert!(legal_anchors(4, 3).is_empty());
        assert!(legal_anchors(9, 3).is_empty());
    }
}
