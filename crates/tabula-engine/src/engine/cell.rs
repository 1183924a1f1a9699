//! Identifiers and the read-only view of a workbook the evaluator works on.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::coords::{Position, Zone};

/// Caller-supplied sheet identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub String);

impl SheetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SheetId {
    fn from(id: &str) -> Self {
        SheetId(id.to_string())
    }
}

impl From<String> for SheetId {
    fn from(id: String) -> Self {
        SheetId(id)
    }
}

/// Stable cell identifier; survives moves.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Whether raw cell content is a formula.
pub fn is_formula(content: &str) -> bool {
    content.starts_with('=')
}

/// What the evaluator needs to know about the cells of a workbook.
pub trait Workbook {
    /// Resolve a sheet name (case-insensitive) to its id.
    fn sheet_by_name(&self, name: &str) -> Option<SheetId>;

    fn sheet_name(&self, sheet: &SheetId) -> Option<&str>;

    fn cell_content(&self, cell: CellId) -> Option<&str>;

    fn cell_position(&self, cell: CellId) -> Option<(SheetId, Position)>;

    fn cell_at(&self, sheet: &SheetId, position: Position) -> Option<CellId>;

    /// Every cell of the workbook.
    fn cell_ids(&self) -> Vec<CellId>;

    /// Cells inside `zone`, in any order.
    fn cells_in_zone(&self, sheet: &SheetId, zone: &Zone) -> Vec<(Position, CellId)> {
        zone.positions()
            .filter_map(|p| self.cell_at(sheet, p).map(|id| (p, id)))
            .collect()
    }
}
