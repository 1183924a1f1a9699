//! Serialized workbook format.
//!
//! [`WorkbookData`] is the plain data every plugin exports into and
//! imports from; [`json`] reads and writes it as JSON.

pub mod json;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabula_engine::engine::SheetId;

use crate::model::Style;

pub use json::{parse_workbook, parse_workbook_content, write_workbook, write_workbook_content};

pub const CURRENT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookData {
    pub version: u32,
    pub sheets: Vec<SheetData>,
    #[serde(default)]
    pub styles: BTreeMap<u64, Style>,
    #[serde(default)]
    pub active_sheet: Option<SheetId>,
}

impl Default for WorkbookData {
    fn default() -> Self {
        WorkbookData {
            version: CURRENT_VERSION,
            sheets: Vec::new(),
            styles: BTreeMap::new(),
            active_sheet: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetData {
    pub id: SheetId,
    pub name: String,
    pub col_number: usize,
    pub row_number: usize,
    /// Sizes that differ from the configured default, by index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cols: BTreeMap<usize, HeaderData>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rows: BTreeMap<usize, HeaderData>,
    /// Cells keyed by address ("B3").
    #[serde(default)]
    pub cells: BTreeMap<String, CellData>,
    /// Merged zones ("B2:C3").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merges: Vec<String>,
}

impl SheetData {
    pub fn new(id: &str, name: &str, col_number: usize, row_number: usize) -> Self {
        SheetData {
            id: SheetId::from(id),
            name: name.to_string(),
            col_number,
            row_number,
            cols: BTreeMap::new(),
            rows: BTreeMap::new(),
            cells: BTreeMap::new(),
            merges: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeaderData {
    pub size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u64>,
}
