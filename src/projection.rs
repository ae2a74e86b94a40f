use crate::builder::Strategy;
use crate::error::LayoutError;
use crate::geometric;
use crate::grid;
use crate::inventory::InventoryIndex;
use crate::model::{Index, idx};
use crate::solver::{Assignment, SolveResult};
use crate::types::PlacedTile;

const EPS: f64 = 1e-6;

/// Reads placed tiles back out of a solved model.
#[derive(Debug, Clone, Copy)]
pub struct ResultProjector<'a> {
    inventory: &'a InventoryIndex,
}

impl<'a> ResultProjector<'a> {
    pub fn new(inventory: &'a InventoryIndex) -> Self {
        Self { inventory }
    }

    /// One record per tile in id order. Tiles the solution leaves out (or
    /// every tile, if the result is unsolved) have `selected == false`.
    pub fn project(&self, strategy: Strategy, result: &SolveResult) -> Vec<PlacedTile> {
        let mut tiles: Vec<PlacedTile> = self
            .inventory
            .tiles()
            .iter()
            .map(|t| PlacedTile {
                tile_id: t.id,
                size: t.size,
                origin_x: 0.0,
                origin_y: 0.0,
                selected: false,
            })
            .collect();

        if !result.is_solved() {
            return tiles;
        }

        match strategy {
            Strategy::Grid => project_grid(&mut tiles, &result.assignment),
            Strategy::Geometric => project_geometric(&mut tiles, &result.assignment),
        }
        tiles
    }
}

fn project_grid(tiles: &mut [PlacedTile], assignment: &Assignment) {
    for (index, value) in assignment.family(grid::PLACE) {
        if value < 0.5 {
            continue;
        }
        let (Some(k), Some(i), Some(j)) = (index.int(0), index.int(1), index.int(2)) else {
            continue;
        };
        if let Some(tile) = tile_mut(tiles, k)
            && !tile.selected
        {
            tile.selected = true;
            tile.origin_x = f64::from(i - 1);
            tile.origin_y = f64::from(j - 1);
        }
    }
}

fn project_geometric(tiles: &mut [PlacedTile], assignment: &Assignment) {
    for tile in tiles.iter_mut() {
        let selected = assignment
            .get(geometric::SELECT, &idx![tile.tile_id])
            .is_some_and(|t| t > 0.5);
        if !selected {
            continue;
        }
        let coordinate = |axis: &str| {
            assignment
                .get(geometric::POSITION, &idx![tile.tile_id, axis])
                .map_or(0.0, snap)
        };
        tile.origin_x = coordinate("x");
        tile.origin_y = coordinate("y");
        tile.selected = true;
    }
}

fn tile_mut(tiles: &mut [PlacedTile], id: u32) -> Option<&mut PlacedTile> {
    tiles.iter_mut().find(|t| t.tile_id == id)
}

/// Rounds away solver noise around whole numbers.
fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < EPS {
        rounded + 0.0
    } else {
        value
    }
}

/// Side length of the filled square, read from the `w` variable.
pub fn filled_width(result: &SolveResult) -> Option<f64> {
    if !result.is_solved() {
        return None;
    }
    result.assignment.get(grid::WIDTH, &Index::scalar()).map(snap)
}

/// Checks that every selected tile lies in `[0, width]²` and that no two
/// selected tiles share interior area.
pub fn validate_layout(tiles: &[PlacedTile], width: f64) -> Result<(), LayoutError> {
    let selected: Vec<&PlacedTile> = tiles.iter().filter(|t| t.selected).collect();

    for t in &selected {
        if t.origin_x < -EPS
            || t.origin_y < -EPS
            || t.end_x() > width + EPS
            || t.end_y() > width + EPS
        {
            return Err(LayoutError::OutOfBounds {
                tile_id: t.tile_id,
                size: t.size,
                x: t.origin_x,
                y: t.origin_y,
                width,
            });
        }
    }

    for (n, a) in selected.iter().enumerate() {
        for b in &selected[n + 1..] {
            let overlap_x = a.origin_x < b.end_x() - EPS && b.origin_x < a.end_x() - EPS;
            let overlap_y = a.origin_y < b.end_y() - EPS && b.origin_y < a.end_y() - EPS;
            if overlap_x && overlap_y {
                return Err(LayoutError::Overlap {
                    first: a.tile_id,
                    second: b.tile_id,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolveStatus;
    use crate::types::Inventory;
    use std::time::Duration;

    fn inventory(pairs: &[(i64, i64)]) -> InventoryIndex {
        let inv: Inventory = pairs.iter().copied().collect();
        InventoryIndex::build(&inv).unwrap()
    }

    fn solved(assignment: Assignment) -> SolveResult {
        SolveResult {
            status: SolveStatus::Optimal,
            objective_value: assignment.get("w", &Index::scalar()),
            assignment,
            elapsed: Duration::ZERO,
        }
    }

    fn placed(tile_id: u32, size: u32, x: f64, y: f64) -> PlacedTile {
        PlacedTile {
            tile_id,
            size,
            origin_x: x,
            origin_y: y,
            selected: true,
        }
    }

    #[test]
    fn test_grid_projection_uses_zero_based_origins() {
        let inv = inventory(&[(1, 1), (2, 1)]);
        let mut assignment = Assignment::new();
        assignment.insert("x", idx![2u32, 1u32, 1u32], 1.0);
        assignment.insert("x", idx![1u32, 3u32, 3u32], 0.0);
        assignment.insert("w", idx![], 2.0);

        let tiles = ResultProjector::new(&inv).project(Strategy::Grid, &solved(assignment));
        assert_eq!(tiles.len(), 2);
        assert!(!tiles[0].selected, "unit tile was not placed");
        assert_eq!(tiles[1], placed(2, 2, 0.0, 0.0));
    }

    #[test]
    fn test_geometric_projection_reads_positions() {
        let inv = inventory(&[(1, 2)]);
        let mut assignment = Assignment::new();
        assignment.insert("t", idx![1u32], 1.0);
        assignment.insert("p", idx![1u32, "x"], 0.9999999);
        assignment.insert("p", idx![1u32, "y"], 0.0);
        assignment.insert("t", idx![2u32], 0.0);
        assignment.insert("p", idx![2u32, "x"], 0.0);
        assignment.insert("p", idx![2u32, "y"], 0.0);

        let tiles = ResultProjector::new(&inv).project(Strategy::Geometric, &solved(assignment));
        assert_eq!(tiles[0], placed(1, 1, 1.0, 0.0));
        assert!(!tiles[1].selected);
    }

    #[test]
    fn test_unsolved_result_selects_nothing() {
        let inv = inventory(&[(2, 4)]);
        let result = SolveResult {
            status: SolveStatus::Infeasible,
            objective_value: None,
            assignment: Assignment::new(),
            elapsed: Duration::ZERO,
        };
        let tiles = ResultProjector::new(&inv).project(Strategy::Grid, &result);
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|t| !t.selected));
        assert_eq!(filled_width(&result), None);
    }

    #[test]
    fn test_validate_accepts_exact_tiling() {
        let tiles = [
            placed(1, 2, 0.0, 0.0),
            placed(2, 2, 2.0, 0.0),
            placed(3, 2, 0.0, 2.0),
            placed(4, 2, 2.0, 2.0),
        ];
        assert_eq!(validate_layout(&tiles, 4.0), Ok(()));
    }

    #[test]
    fn test_validate_reports_overlap() {
        let tiles = [placed(1, 2, 0.0, 0.0), placed(2, 2, 1.0, 1.0)];
        assert_eq!(
            validate_layout(&tiles, 4.0),
            Err(LayoutError::Overlap { first: 1, second: 2 })
        );
    }

    #[test]
    fn test_validate_reports_out_of_bounds() {
        let tiles = [placed(1, 3, 2.0, 0.0)];
        assert!(matches!(
            validate_layout(&tiles, 4.0),
            Err(LayoutError::OutOfBounds { tile_id: 1, .. })
        ));
    }

    #[test]
    fn test_validate_ignores_unselected_tiles() {
        let mut ghost = placed(2, 2, 0.0, 0.0);
        ghost.selected = false;
        let tiles = [placed(1, 2, 0.0, 0.0), ghost];
        assert_eq!(validate_layout(&tiles, 2.0), Ok(()));
    }
}
