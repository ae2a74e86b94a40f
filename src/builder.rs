use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coverage::CoverageIndex;
use crate::geometric::GeometricModelBuilder;
use crate::grid::GridModelBuilder;
use crate::inventory::InventoryIndex;
use crate::model::PackingModel;

/// Which encoding of the packing problem to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Boolean placement variables over the coverage grid. Compact to
    /// reason about, but grows with `tiles × E²`.
    #[default]
    Grid,
    /// Continuous positions with pairwise big-M separation.
    Geometric,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid" => Ok(Strategy::Grid),
            "geometric" => Ok(Strategy::Geometric),
            _ => Err(format!(
                "invalid strategy '{}', expected: grid or geometric",
                s
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Grid => "grid",
            Strategy::Geometric => "geometric",
        })
    }
}

pub trait PackingModelBuilder {
    fn strategy(&self) -> Strategy;

    fn build(&self, name: &str) -> PackingModel;
}

/// Builds the model for `strategy`. The coverage index is only computed
/// for the grid encoding.
pub fn build_model(strategy: Strategy, name: &str, inventory: &InventoryIndex) -> PackingModel {
    let model = match strategy {
        Strategy::Grid => {
            let mut coverage = CoverageIndex::new(inventory);
            coverage.create_full_cover();
            GridModelBuilder::new(&coverage).build(name)
        }
        Strategy::Geometric => GeometricModelBuilder::new(inventory).build(name),
    };

    let stats = model.stats();
    info!(
        %strategy,
        variables = stats.variables,
        binaries = stats.binaries,
        constraints = stats.constraints,
        "model built"
    );
    model
}
