use crate::builder::{PackingModelBuilder, Strategy};
use crate::coverage::no_legal_placement;
use crate::inventory::InventoryIndex;
use crate::model::{Constraint, Domain, LinearExpr, PackingModel, Sense, VarId, idx};
use crate::types::Tile;

pub const SELECT: &str = "t";
pub const POSITION: &str = "p";
pub const SEPARATE: &str = "delta";
pub const CHOOSE_WIDTH: &str = "theta";
pub const WIDTH: &str = "w";
pub const AREA: &str = "area";

pub const AXES: [&str; 2] = ["x", "y"];
/// `true`: the second tile of a pair lies after the first on the axis.
pub const CASES: [bool; 2] = [true, false];

struct TileVars {
    tile: Tile,
    select: VarId,
    position: [VarId; 2],
}

pub struct GeometricModelBuilder<'a> {
    inventory: &'a InventoryIndex,
}

impl<'a> GeometricModelBuilder<'a> {
    pub fn new(inventory: &'a InventoryIndex) -> Self {
        Self { inventory }
    }
}

impl PackingModelBuilder for GeometricModelBuilder<'_> {
    fn strategy(&self) -> Strategy {
        Strategy::Geometric
    }

    fn build(&self, name: &str) -> PackingModel {
        let tiles = self.inventory.tiles();
        let dim = self.inventory.dimension();
        let big_m = dim as f64;

        let mut model = PackingModel::new(name, Strategy::Geometric);

        model.add_set("I", tiles.iter().map(|t| t.id));
        model.add_set("J", tiles.iter().map(|t| t.id));
        model.add_set("C", AXES);
        model.add_set("K", CASES);
        model.add_set("A", 1..=dim);
        model.add_param("size", tiles.iter().map(|t| (idx![t.id], t.size as f64)));
        model.add_param("M", [(idx![], big_m)]);

        let vars: Vec<TileVars> = tiles
            .iter()
            .map(|&tile| TileVars {
                tile,
                select: model.add_variable(SELECT, idx![tile.id], Domain::Binary),
                position: AXES.map(|c| {
                    model.add_bounded_variable(
                        POSITION,
                        idx![tile.id, c],
                        Domain::NonNegativeReal,
                        big_m,
                    )
                }),
            })
            .collect();

        let warnings: Vec<_> = tiles
            .iter()
            .filter_map(|t| no_legal_placement(t, dim))
            .collect();
        let (placeable, unplaceable): (Vec<&TileVars>, Vec<&TileVars>) = vars
            .iter()
            .partition(|v| no_legal_placement(&v.tile, dim).is_none());

        let mut pairs = Vec::new();
        for (n, first) in placeable.iter().enumerate() {
            for second in &placeable[n + 1..] {
                let separators = CASES.map(|case| {
                    AXES.map(|axis| {
                        model.add_variable(
                            SEPARATE,
                            idx![first.tile.id, second.tile.id, case, axis],
                            Domain::Binary,
                        )
                    })
                });
                pairs.push((*first, *second, separators));
            }
        }

        let theta: Vec<(u32, VarId)> = (1..=dim)
            .map(|a| (a, model.add_variable(CHOOSE_WIDTH, idx![a], Domain::Binary)))
            .collect();
        let w = model.add_variable(WIDTH, idx![], Domain::NonNegativeReal);
        let area = model.add_variable(AREA, idx![], Domain::NonNegativeReal);

        model.add_constraints(contain_rule(&placeable, w));
        model.add_constraints(unplaceable_rule(&unplaceable));
        for (first, second, separators) in &pairs {
            model.add_constraints(order_rule(first, second, separators, big_m));
            model.add_constraint(separate_rule(first, second, separators));
        }
        model.add_constraints(width_rules(&theta, w, area));
        model.add_constraint(area_rule(&vars, area));
        model.add_constraints(symmetry_rules(self.inventory.same_size_pairs(), &vars, big_m));

        model.maximize(LinearExpr::from(w));
        model.add_warnings(warnings);
        model
    }
}

fn contain_rule(tiles: &[&TileVars], w: VarId) -> Vec<Constraint> {
    tiles
        .iter()
        .flat_map(|v| {
            AXES.into_iter().zip(v.position).map(move |(axis, p)| {
                Constraint::new(
                    "contain_c",
                    idx![v.tile.id, axis],
                    LinearExpr::from(p).plus_constant(v.tile.size as f64),
                    Sense::Le,
                    LinearExpr::from(w),
                )
            })
        })
        .collect()
}

fn unplaceable_rule(tiles: &[&TileVars]) -> Vec<Constraint> {
    tiles
        .iter()
        .map(|v| {
            Constraint::new(
                "unplaceable_c",
                idx![v.tile.id],
                LinearExpr::from(v.select),
                Sense::Le,
                LinearExpr::new(),
            )
        })
        .collect()
}

/// Big-M ordering rows for one pair `i < j`, one per case and axis. A row
/// binds only when its separator and both selection flags are 1.
fn order_rule(
    first: &TileVars,
    second: &TileVars,
    separators: &[[VarId; 2]; 2],
    big_m: f64,
) -> Vec<Constraint> {
    let relax = |separator: VarId| {
        LinearExpr::from_constant(-3.0 * big_m)
            .plus(separator, big_m)
            .plus(first.select, big_m)
            .plus(second.select, big_m)
    };

    let mut rows = Vec::with_capacity(4);
    for (ci, case) in CASES.into_iter().enumerate() {
        let (before, after) = if case { (first, second) } else { (second, first) };
        for (ai, axis) in AXES.into_iter().enumerate() {
            rows.push(Constraint::new(
                "order_c",
                idx![first.tile.id, second.tile.id, case, axis],
                LinearExpr::from(after.position[ai]),
                Sense::Ge,
                LinearExpr::from(before.position[ai])
                    .plus_constant(before.tile.size as f64)
                    + relax(separators[ci][ai]),
            ));
        }
    }
    rows
}

fn separate_rule(first: &TileVars, second: &TileVars, separators: &[[VarId; 2]; 2]) -> Constraint {
    Constraint::new(
        "separate_c",
        idx![first.tile.id, second.tile.id],
        separators.iter().flatten().copied().collect(),
        Sense::Ge,
        LinearExpr::from_constant(1.0),
    )
}

fn width_rules(theta: &[(u32, VarId)], w: VarId, area: VarId) -> Vec<Constraint> {
    vec![
        Constraint::new(
            "width_select_c",
            idx![],
            theta.iter().map(|&(_, v)| v).collect(),
            Sense::Eq,
            LinearExpr::from_constant(1.0),
        ),
        Constraint::new(
            "width_c",
            idx![],
            LinearExpr::from(w),
            Sense::Eq,
            theta.iter().map(|&(a, v)| (v, a as f64)).collect(),
        ),
        Constraint::new(
            "area_select_c",
            idx![],
            LinearExpr::from(area),
            Sense::Eq,
            theta
                .iter()
                .map(|&(a, v)| (v, (a as f64).powi(2)))
                .collect(),
        ),
    ]
}

fn area_rule(tiles: &[TileVars], area: VarId) -> Constraint {
    Constraint::new(
        "area_c",
        idx![],
        LinearExpr::from(area),
        Sense::Eq,
        tiles
            .iter()
            .map(|v| (v.select, v.tile.area() as f64))
            .collect(),
    )
}

/// Orders adjacent equal-size tiles: the lower id is selected first, and
/// among selected ones it has the larger coordinate sum.
fn symmetry_rules(
    pairs: impl Iterator<Item = (Tile, Tile)>,
    vars: &[TileVars],
    big_m: f64,
) -> Vec<Constraint> {
    let of = |tile: Tile| vars.iter().find(|v| v.tile.id == tile.id);
    pairs
        .filter_map(|(lower, upper)| Some((of(lower)?, of(upper)?)))
        .flat_map(|(lower, upper)| {
            let coordinate_sum =
                |v: &TileVars| -> LinearExpr { v.position.iter().copied().collect() };
            [
                Constraint::new(
                    "sym_select_c",
                    idx![lower.tile.id],
                    LinearExpr::from(lower.select),
                    Sense::Ge,
                    LinearExpr::from(upper.select),
                ),
                Constraint::new(
                    "sym_position_c",
                    idx![lower.tile.id],
                    coordinate_sum(lower),
                    Sense::Ge,
                    coordinate_sum(upper)
                        + LinearExpr::from_constant(-2.0 * big_m).plus(upper.select, 2.0 * big_m),
                ),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildWarning;
    use crate::model::Index;
    use crate::types::Inventory;

    fn inventory(pairs: &[(i64, i64)]) -> InventoryIndex {
        let inv: Inventory = pairs.iter().copied().collect();
        InventoryIndex::build(&inv).unwrap()
    }

    fn build(inventory: &InventoryIndex) -> PackingModel {
        GeometricModelBuilder::new(inventory).build("geometric")
    }

    /// Full assignment for the selected `(tile, x, y)` anchors. Separators
    /// are switched on wherever the corresponding ordering holds, or on an
    /// arbitrary one when a pair is not fully selected.
    fn assignment(
        model: &PackingModel,
        inventory: &InventoryIndex,
        selected: &[(u32, f64, f64)],
        width: u32,
    ) -> Vec<f64> {
        let mut values = vec![0.0; model.variables().len()];
        let mut set = |family: &str, index: Index, value: f64| {
            let var = model.var(family, &index).unwrap();
            values[var.position()] = value;
        };

        let anchor = |id: u32| selected.iter().find(|s| s.0 == id).map(|s| [s.1, s.2]);
        let tiles = inventory.tiles();
        let mut area = 0.0;
        for tile in tiles {
            let pos = anchor(tile.id);
            let [px, py] = pos.unwrap_or([0.0, 0.0]);
            set(SELECT, idx![tile.id], if pos.is_some() { 1.0 } else { 0.0 });
            set(POSITION, idx![tile.id, "x"], px);
            set(POSITION, idx![tile.id, "y"], py);
            if pos.is_some() {
                area += tile.area() as f64;
            }
        }
        for (n, a) in tiles.iter().enumerate() {
            for b in &tiles[n + 1..] {
                let (Some(pa), Some(pb)) = (anchor(a.id), anchor(b.id)) else {
                    let any = idx![a.id, b.id, true, "x"];
                    if model.var(SEPARATE, &any).is_some() {
                        set(SEPARATE, any, 1.0);
                    }
                    continue;
                };
                for (ai, axis) in AXES.into_iter().enumerate() {
                    if pb[ai] >= pa[ai] + a.size as f64 {
                        set(SEPARATE, idx![a.id, b.id, true, axis], 1.0);
                    }
                    if pa[ai] >= pb[ai] + b.size as f64 {
                        set(SEPARATE, idx![a.id, b.id, false, axis], 1.0);
                    }
                }
            }
        }
        set(CHOOSE_WIDTH, idx![width], 1.0);
        set(WIDTH, idx![], width as f64);
        set(AREA, idx![], area);
        values
    }

    #[test]
    fn test_component_counts() {
        let inv = inventory(&[(2, 4)]);
        let stats = build(&inv).stats();
        // t 4, p 8, delta 6 pairs x 4, theta 4, w, area
        assert_eq!(stats.variables, 4 + 8 + 24 + 4 + 2);
        assert_eq!(stats.binaries, 4 + 24 + 4);
        let families = &stats.constraint_families;
        assert_eq!(families["contain_c"], 8);
        assert_eq!(families["order_c"], 24);
        assert_eq!(families["separate_c"], 6);
        assert_eq!(families["width_select_c"], 1);
        assert_eq!(families["width_c"], 1);
        assert_eq!(families["area_select_c"], 1);
        assert_eq!(families["area_c"], 1);
        assert_eq!(families["sym_select_c"], 3);
        assert_eq!(families["sym_position_c"], 3);
        assert!(!families.contains_key("unplaceable_c"));
    }

    #[test]
    fn test_symmetry_rows_only_between_adjacent_equal_sizes() {
        let inv = inventory(&[(1, 3), (2, 1), (3, 2)]);
        let model = build(&inv);
        let lowers: Vec<u32> = model
            .constraints_of("sym_select_c")
            .filter_map(|c| c.index.int(0))
            .collect();
        assert_eq!(lowers, vec![1, 2, 5]);
        assert_eq!(model.constraints_of("sym_position_c").count(), 3);
    }

    #[test]
    fn test_exact_tiling_is_feasible() {
        let inv = inventory(&[(1, 0), (2, 4)]);
        let model = build(&inv);
        // Coordinate sums must not increase with the tile id.
        let values = assignment(
            &model,
            &inv,
            &[(1, 2.0, 2.0), (2, 2.0, 0.0), (3, 0.0, 2.0), (4, 0.0, 0.0)],
            4,
        );
        assert!(model.is_feasible(&values, 1e-9));
        assert_eq!(model.objective().expr.evaluate(&values), 4.0);
    }

    #[test]
    fn test_position_symmetry_is_enforced() {
        let inv = inventory(&[(2, 4)]);
        let model = build(&inv);
        let values = assignment(
            &model,
            &inv,
            &[(1, 0.0, 0.0), (2, 2.0, 0.0), (3, 0.0, 2.0), (4, 2.0, 2.0)],
            4,
        );
        assert!(!model.is_feasible(&values, 1e-9));
    }

    #[test]
    fn test_overlap_is_infeasible() {
        let inv = inventory(&[(1, 5), (2, 1)]);
        let model = build(&inv);
        // Unit tile 5 sits inside the 2x2 tile; cell (0, 2) stays empty.
        let values = assignment(
            &model,
            &inv,
            &[
                (1, 2.0, 2.0),
                (2, 2.0, 1.0),
                (3, 1.0, 2.0),
                (4, 2.0, 0.0),
                (5, 1.0, 1.0),
                (6, 0.0, 0.0),
            ],
            3,
        );
        assert!(!model.is_feasible(&values, 1e-9));
        let broken: Vec<String> = model
            .constraints()
            .iter()
            .filter(|c| !c.is_satisfied(&values, 1e-9))
            .map(|c| format!("{}{}", c.family, c.index))
            .collect();
        assert_eq!(broken, vec!["separate_c[5,6]".to_string()]);
    }

    #[test]
    fn test_lower_id_is_selected_first() {
        let inv = inventory(&[(2, 4)]);
        let model = build(&inv);
        let values = assignment(&model, &inv, &[(1, 0.0, 0.0)], 2);
        assert!(model.is_feasible(&values, 1e-9));
        let values = assignment(&model, &inv, &[(2, 0.0, 0.0)], 2);
        assert!(!model.is_feasible(&values, 1e-9));
    }

    #[test]
    fn test_area_must_fill_square() {
        let inv = inventory(&[(2, 4)]);
        let model = build(&inv);
        // Two tiles side by side cover 8 cells, not a square.
        let values = assignment(&model, &inv, &[(1, 2.0, 0.0), (2, 0.0, 0.0)], 4);
        assert!(!model.is_feasible(&values, 1e-9));
    }

    #[test]
    fn test_oversized_tile_is_pinned_unselected() {
        let inv = inventory(&[(1, 4), (3, 1)]).with_dimension(2).unwrap();
        let model = build(&inv);
        assert_eq!(
            model.warnings(),
            &[BuildWarning::NoLegalPlacement {
                tile_id: 5,
                size: 3,
                dimension: 2
            }]
        );
        let pinned: Vec<u32> = model
            .constraints_of("unplaceable_c")
            .filter_map(|c| c.index.int(0))
            .collect();
        assert_eq!(pinned, vec![5]);
        assert!(model.constraints_of("contain_c").all(|c| c.index.int(0) != Some(5)));
        assert!(model.constraints_of("separate_c").all(|c| c.index.int(1) != Some(5)));

        let values = assignment(
            &model,
            &inv,
            &[(1, 1.0, 1.0), (2, 1.0, 0.0), (3, 0.0, 1.0), (4, 0.0, 0.0)],
            2,
        );
        assert!(model.is_feasible(&values, 1e-9));
    }
}
