use std::collections::BTreeMap;

use tracing::info;

use crate::error::{PackingError, Result};
use crate::types::{Inventory, Tile};

/// Flat enumeration of an inventory: one [`Tile`] per unit, identifiers
/// dense from 1 in ascending size order, plus the derived target square.
#[derive(Debug, Clone)]
pub struct InventoryIndex {
    counts: BTreeMap<u32, u32>,
    tiles: Vec<Tile>,
    total_area: u64,
    dimension: u32,
    max_size: u32,
}

impl InventoryIndex {
    pub fn build(inventory: &Inventory) -> Result<Self> {
        let mut counts = BTreeMap::new();
        for (&size, &count) in inventory {
            if size <= 0 {
                return Err(PackingError::InvalidInventory(format!(
                    "tile size must be positive, got {size}"
                )));
            }
            if count < 0 {
                return Err(PackingError::InvalidInventory(format!(
                    "count for size {size} must not be negative, got {count}"
                )));
            }
            let size = u32::try_from(size).map_err(|_| {
                PackingError::InvalidInventory(format!("tile size {size} is too large"))
            })?;
            let count = u32::try_from(count).map_err(|_| {
                PackingError::InvalidInventory(format!("count {count} for size {size} is too large"))
            })?;
            counts.insert(size, count);
        }

        let tile_count = counts
            .values()
            .try_fold(0u32, |acc, &count| acc.checked_add(count))
            .ok_or_else(|| {
                PackingError::InvalidInventory("too many tiles to number".to_string())
            })?;
        if tile_count == 0 {
            return Err(PackingError::InvalidInventory(
                "inventory contains no tiles".to_string(),
            ));
        }
        let total_area = counts
            .iter()
            .try_fold(0u64, |acc, (&size, &count)| {
                u64::from(size)
                    .checked_mul(u64::from(size))?
                    .checked_mul(u64::from(count))
                    .and_then(|area| acc.checked_add(area))
            })
            .ok_or_else(|| {
                PackingError::InvalidInventory("total tile area overflows".to_string())
            })?;

        let tiles = Self::create_tiles(&counts);
        // The grid needs one margin row past the square, so `D + 1` must fit.
        let dimension = u32::try_from(total_area.isqrt())
            .ok()
            .filter(|&d| d < u32::MAX)
            .ok_or_else(|| {
                PackingError::InvalidInventory(format!("total area {total_area} is too large"))
            })?;
        let max_size = tiles.iter().map(|t| t.size).max().unwrap_or(0);

        info!(
            dimension,
            longest_tile = max_size,
            total_area,
            tiles = tiles.len(),
            "inventory indexed"
        );

        Ok(Self {
            counts,
            tiles,
            total_area,
            dimension,
            max_size,
        })
    }

    fn create_tiles(counts: &BTreeMap<u32, u32>) -> Vec<Tile> {
        counts
            .iter()
            .flat_map(|(&size, &count)| std::iter::repeat_n(size, count as usize))
            .zip(1..=u32::MAX)
            .map(|(size, id)| Tile::new(id, size))
            .collect()
    }

    /// Targets a smaller square than the one derived from the total area.
    /// Tiles larger than it lose every placement.
    pub fn with_dimension(mut self, dimension: u32) -> Result<Self> {
        if dimension == 0 || dimension > self.dimension {
            return Err(PackingError::InvalidInventory(format!(
                "dimension must be between 1 and {}, got {dimension}",
                self.dimension
            )));
        }
        info!(from = self.dimension, to = dimension, "target dimension overridden");
        self.dimension = dimension;
        Ok(self)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, id: u32) -> Option<&Tile> {
        let idx = usize::try_from(id).ok()?.checked_sub(1)?;
        self.tiles.get(idx)
    }

    pub fn size_of(&self, id: u32) -> Option<u32> {
        self.tile(id).map(|t| t.size)
    }

    /// Validated size → count mapping, zero counts included.
    pub fn counts(&self) -> &BTreeMap<u32, u32> {
        &self.counts
    }

    pub fn total_area(&self) -> u64 {
        self.total_area
    }

    /// Side of the largest square whose area does not exceed the total tile
    /// area.
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Upper bound of the row/column index sets: one margin row past the
    /// target square.
    pub fn grid_extent(&self) -> u32 {
        self.dimension + 1
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Consecutive tile pairs of equal size, the only pairs that receive
    /// symmetry-breaking constraints.
    pub fn same_size_pairs(&self) -> impl Iterator<Item = (Tile, Tile)> + '_ {
        self.tiles
            .windows(2)
            .filter(|w| w[0].size == w[1].size)
            .map(|w| (w[0], w[1]))
    }
}
