use tracing::info;

use crate::builder::{Strategy, build_model};
use crate::error::Result;
use crate::inventory::InventoryIndex;
use crate::model::PackingModel;
use crate::report::SolvedInstance;
use crate::solver::{GoodLpSolver, SolverAdapter, SolverConfig};
use crate::types::Inventory;

/// One named packing attempt: inventory, strategy and target square.
#[derive(Debug, Clone)]
pub struct Packer {
    name: String,
    inventory: InventoryIndex,
    strategy: Strategy,
}

impl Packer {
    pub fn new(name: impl Into<String>, inventory: &Inventory, strategy: Strategy) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            inventory: InventoryIndex::build(inventory)?,
            strategy,
        })
    }

    pub fn with_dimension(mut self, dimension: u32) -> Result<Self> {
        self.inventory = self.inventory.with_dimension(dimension)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn inventory(&self) -> &InventoryIndex {
        &self.inventory
    }

    pub fn build_model(&self) -> PackingModel {
        build_model(self.strategy, &self.name, &self.inventory)
    }

    /// Builds and solves with the default `good_lp` adapter.
    pub fn solve(&self, config: &SolverConfig) -> SolvedInstance {
        self.solve_with(&GoodLpSolver, config)
    }

    pub fn solve_with(&self, solver: &dyn SolverAdapter, config: &SolverConfig) -> SolvedInstance {
        let model = self.build_model();
        self.solve_model(&model, solver, config)
    }

    /// Solves a model previously returned by [`Packer::build_model`].
    pub fn solve_model(
        &self,
        model: &PackingModel,
        solver: &dyn SolverAdapter,
        config: &SolverConfig,
    ) -> SolvedInstance {
        let result = solver.solve(model, config);
        let instance = SolvedInstance::new(&self.inventory, model, result);
        info!(
            name = %self.name,
            strategy = %self.strategy,
            status = %instance.status,
            width = instance.filled_width,
            elapsed_ms = instance.elapsed_ms,
            "packing finished"
        );
        instance
    }
}
