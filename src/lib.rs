pub mod builder;
pub mod coverage;
pub mod error;
pub mod geometric;
pub mod grid;
pub mod inventory;
pub mod model;
pub mod packer;
pub mod presets;
pub mod projection;
pub mod report;
pub mod solver;
pub mod types;

pub use builder::{PackingModelBuilder, Strategy, build_model};
pub use error::{BuildWarning, LayoutError, PackingError, Result};
pub use inventory::InventoryIndex;
pub use model::PackingModel;
pub use packer::Packer;
pub use report::SolvedInstance;
pub use solver::{GoodLpSolver, SolveResult, SolveStatus, SolverAdapter, SolverConfig};
pub use types::{Inventory, PlacedTile};
