use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::Strategy;
use crate::error::{BuildWarning, LayoutError, PackingError, Result};
use crate::inventory::InventoryIndex;
use crate::model::{ModelStats, PackingModel};
use crate::projection::{ResultProjector, filled_width, validate_layout};
use crate::solver::{Assignment, SolveResult, SolveStatus};
use crate::types::PlacedTile;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvedInstance {
    pub schema_version: u32,
    pub name: String,
    pub strategy: Strategy,
    /// Tile size to count, as given.
    pub inventory: BTreeMap<u32, u32>,
    pub dimension: u32,
    pub status: SolveStatus,
    pub objective_value: Option<f64>,
    pub filled_width: Option<f64>,
    pub assignment: Assignment,
    pub tiles: Vec<PlacedTile>,
    pub warnings: Vec<BuildWarning>,
    pub stats: ModelStats,
    pub elapsed_ms: u64,
}

impl SolvedInstance {
    pub fn new(inventory: &InventoryIndex, model: &PackingModel, result: SolveResult) -> Self {
        let tiles = ResultProjector::new(inventory).project(model.strategy(), &result);
        let instance = Self {
            schema_version: SCHEMA_VERSION,
            name: model.name().to_string(),
            strategy: model.strategy(),
            inventory: inventory.counts().clone(),
            dimension: inventory.dimension(),
            filled_width: filled_width(&result),
            status: result.status,
            objective_value: result.objective_value,
            assignment: result.assignment,
            tiles,
            warnings: model.warnings().to_vec(),
            stats: model.stats(),
            elapsed_ms: u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
        };

        if let Err(e) = instance.validate() {
            warn!(name = %instance.name, error = %e, "solved layout is not geometrically valid");
        }
        instance
    }

    pub fn is_solved(&self) -> bool {
        self.status.is_solved()
    }

    pub fn selected_tiles(&self) -> impl Iterator<Item = &PlacedTile> {
        self.tiles.iter().filter(|t| t.selected)
    }

    /// Geometric check of the projected tiles. Unsolved instances are
    /// trivially valid.
    pub fn validate(&self) -> std::result::Result<(), LayoutError> {
        match self.filled_width {
            Some(width) if self.is_solved() => validate_layout(&self.tiles, width),
            _ => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a stored instance, refusing schema versions other than
    /// [`SCHEMA_VERSION`] before looking at any other field.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        check_version(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        info!(path = %path.display(), "result saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let value: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        check_version(&value)?;
        let instance = serde_json::from_value(value)?;
        info!(path = %path.display(), "result loaded");
        Ok(instance)
    }
}

fn check_version(value: &serde_json::Value) -> Result<()> {
    match value.get("schema_version").and_then(serde_json::Value::as_u64) {
        Some(v) if v == u64::from(SCHEMA_VERSION) => Ok(()),
        Some(v) => Err(PackingError::Schema(format!(
            "expected schema_version {SCHEMA_VERSION}, found {v}"
        ))),
        None => Err(PackingError::Schema("missing schema_version".to_string())),
    }
}
