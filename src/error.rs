use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackingError>;

#[derive(Debug, Error)]
pub enum PackingError {
    /// Negative count, non-positive size or no tiles at all.
    #[error("invalid inventory: {0}")]
    InvalidInventory(String),

    #[error("invalid layout: {0}")]
    Layout(#[from] LayoutError),

    /// A stored result with a schema this build cannot read.
    #[error("unsupported result schema: {0}")]
    Schema(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Geometric violations found when checking a projected layout.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("tile {tile_id} at ({x}, {y}) with size {size} leaves the {width}x{width} square")]
    OutOfBounds {
        tile_id: u32,
        size: u32,
        x: f64,
        y: f64,
        width: f64,
    },

    #[error("tile {first} overlaps tile {second}")]
    Overlap { first: u32, second: u32 },
}

/// Non-fatal findings made while building a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum BuildWarning {
    /// The tile is larger than the target square and can never be selected.
    #[error("tile {tile_id} of size {size} has no legal placement in a {dimension}x{dimension} square")]
    NoLegalPlacement {
        tile_id: u32,
        size: u32,
        dimension: u32,
    },
}
