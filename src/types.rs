use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tile size → number of tiles of that size. Iterates in ascending size
/// order, which fixes the identifier assignment.
pub type Inventory = BTreeMap<i64, i64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tile {
    pub id: u32,
    pub size: u32,
}

impl Tile {
    pub fn new(id: u32, size: u32) -> Self {
        Self { id, size }
    }

    pub fn area(&self) -> u64 {
        self.size as u64 * self.size as u64
    }
}

impl std::fmt::Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({}x{})", self.id, self.size, self.size)
    }
}

/// A unit grid cell, 1-based on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Tile `tile_id` anchored with its top-left cell at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Placement {
    pub tile_id: u32,
    pub x: u32,
    pub y: u32,
}

impl Placement {
    pub fn new(tile_id: u32, x: u32, y: u32) -> Self {
        Self { tile_id, x, y }
    }

    /// Cells covered by this placement for a tile of side `size`, row by row.
    pub fn footprint(&self, size: u32) -> impl Iterator<Item = Cell> + '_ {
        (0..size).flat_map(move |dx| (0..size).map(move |dy| Cell::new(self.x + dx, self.y + dy)))
    }
}

/// Key of the coverage relation: a placement together with one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoverKey {
    pub placement: Placement,
    pub cell: Cell,
}

impl CoverKey {
    pub fn new(tile_id: u32, x: u32, y: u32, cell_x: u32, cell_y: u32) -> Self {
        Self {
            placement: Placement::new(tile_id, x, y),
            cell: Cell::new(cell_x, cell_y),
        }
    }
}

/// A tile as read back from a solved model, ready for drawing.
///
/// Origins are 0-based in continuous coordinates; unselected tiles are kept
/// with `selected == false` and a zero origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacedTile {
    pub tile_id: u32,
    pub size: u32,
    pub origin_x: f64,
    pub origin_y: f64,
    pub selected: bool,
}

impl PlacedTile {
    pub fn end_x(&self) -> f64 {
        self.origin_x + self.size as f64
    }

    pub fn end_y(&self) -> f64 {
        self.origin_y + self.size as f64
    }
}

impl std::fmt::Display for PlacedTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tile {} ({}x{}) @ ({}, {})",
            self.tile_id, self.size, self.size, self.origin_x, self.origin_y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_covers_square() {
        let cells: Vec<Cell> = Placement::new(1, 2, 3).footprint(2).collect();
        assert_eq!(
            cells,
            vec![Cell::new(2, 3), Cell::new(2, 4), Cell::new(3, 3), Cell::new(3, 4)]
        );
    }

    #[test]
    fn test_tile_area() {
        assert_eq!(Tile::new(1, 7).area(), 49);
    }
}
