use std::collections::BTreeMap;

use crate::builder::{PackingModelBuilder, Strategy};
use crate::coverage::CoverageIndex;
use crate::model::{Constraint, Domain, LinearExpr, PackingModel, Sense, VarId, idx};
use crate::types::{Cell, Placement, Tile};

pub const PLACE: &str = "x";
pub const COVERED: &str = "y";
pub const ACTIVE: &str = "delta";
pub const WIDTH: &str = "w";

pub struct GridModelBuilder<'a> {
    coverage: &'a CoverageIndex<'a>,
}

impl<'a> GridModelBuilder<'a> {
    /// `coverage` must already hold the full cover.
    pub fn new(coverage: &'a CoverageIndex<'a>) -> Self {
        Self { coverage }
    }
}

impl PackingModelBuilder for GridModelBuilder<'_> {
    fn strategy(&self) -> Strategy {
        Strategy::Grid
    }

    fn build(&self, name: &str) -> PackingModel {
        let inventory = self.coverage.inventory();
        let tiles = inventory.tiles();
        let extent = inventory.grid_extent();
        let area: Vec<Cell> = self.coverage.area().collect();

        let mut model = PackingModel::new(name, Strategy::Grid);

        model.add_set("I", 1..=extent);
        model.add_set("J", 1..=extent);
        model.add_set("K", tiles.iter().map(|t| t.id));
        model.add_param("size", tiles.iter().map(|t| (idx![t.id], t.area() as f64)));
        model.add_cover_param("cover", self.coverage.shared_relation());

        let x: BTreeMap<Placement, VarId> = self
            .coverage
            .placements()
            .into_iter()
            .map(|p| (p, model.add_variable(PLACE, idx![p.tile_id, p.x, p.y], Domain::Binary)))
            .collect();
        let y: BTreeMap<Cell, VarId> = area
            .iter()
            .map(|&c| (c, model.add_variable(COVERED, idx![c.x, c.y], Domain::Binary)))
            .collect();
        let delta: Vec<VarId> = (1..=extent)
            .map(|i| model.add_variable(ACTIVE, idx![i], Domain::Binary))
            .collect();
        let w = model.add_variable(WIDTH, idx![], Domain::NonNegativeReal);

        let by_cell = self.coverage.placements_by_cell();

        model.add_constraints(tile_rule(tiles, &x));
        model.add_constraints(all_covered_rule(&area, &by_cell, &x, &y));
        model.add_constraints(pattern_compact_rule(&delta));
        model.add_constraint(pattern_length_rule(&delta, w));
        model.add_constraints(active_cell_rules(&area, &y, &delta));

        model.maximize(LinearExpr::from(w));
        model.add_warnings(self.coverage.warnings().iter().cloned());
        model
    }
}

fn placements_of(x: &BTreeMap<Placement, VarId>, tile_id: u32) -> impl Iterator<Item = VarId> + '_ {
    x.range(Placement::new(tile_id, 0, 0)..=Placement::new(tile_id, u32::MAX, u32::MAX))
        .map(|(_, &v)| v)
}

fn tile_rule(tiles: &[Tile], x: &BTreeMap<Placement, VarId>) -> Vec<Constraint> {
    tiles
        .iter()
        .filter_map(|tile| {
            let lhs: LinearExpr = placements_of(x, tile.id).collect();
            (!lhs.terms().is_empty()).then(|| {
                Constraint::new(
                    "tile_c",
                    idx![tile.id],
                    lhs,
                    Sense::Le,
                    LinearExpr::from_constant(1.0),
                )
            })
        })
        .collect()
}

/// The selected placements covering a cell sum to its coverage flag.
/// Margin cells have no covering placement and are pinned to 0.
fn all_covered_rule(
    area: &[Cell],
    by_cell: &BTreeMap<Cell, Vec<Placement>>,
    x: &BTreeMap<Placement, VarId>,
    y: &BTreeMap<Cell, VarId>,
) -> Vec<Constraint> {
    area.iter()
        .map(|cell| {
            let lhs: LinearExpr = by_cell
                .get(cell)
                .into_iter()
                .flatten()
                .filter_map(|p| x.get(p).copied())
                .collect();
            Constraint::new(
                "all_covered_c",
                idx![cell.x, cell.y],
                lhs,
                Sense::Eq,
                LinearExpr::from(y[cell]),
            )
        })
        .collect()
}

fn pattern_compact_rule(delta: &[VarId]) -> Vec<Constraint> {
    delta
        .windows(2)
        .zip(2u32..)
        .map(|(pair, i)| {
            Constraint::new(
                "pattern_compact_c",
                idx![i],
                LinearExpr::from(pair[1]),
                Sense::Le,
                LinearExpr::from(pair[0]),
            )
        })
        .collect()
}

fn pattern_length_rule(delta: &[VarId], w: VarId) -> Constraint {
    Constraint::new(
        "pattern_length_c",
        idx![],
        delta.iter().copied().collect(),
        Sense::Eq,
        LinearExpr::from(w),
    )
}

/// `y[i,j] = delta[i] AND delta[j]` as three inequalities per cell.
fn active_cell_rules(
    area: &[Cell],
    y: &BTreeMap<Cell, VarId>,
    delta: &[VarId],
) -> Vec<Constraint> {
    let active = |n: u32| LinearExpr::from(delta[n as usize - 1]);
    let mut rows = Vec::with_capacity(area.len() * 3);
    for cell in area {
        let covered = LinearExpr::from(y[cell]);
        rows.push(Constraint::new(
            "y_i_c",
            idx![cell.x, cell.y],
            covered.clone(),
            Sense::Le,
            active(cell.x),
        ));
        rows.push(Constraint::new(
            "y_j_c",
            idx![cell.x, cell.y],
            covered.clone(),
            Sense::Le,
            active(cell.y),
        ));
        rows.push(Constraint::new(
            "y_c",
            idx![cell.x, cell.y],
            covered,
            Sense::Ge,
            active(cell.x) + active(cell.y) - LinearExpr::from_constant(1.0),
        ));
    }
    rows
}
