//! The tracked workbook state.
//!
//! Every mutation is a write of a [`Field`] at a [`Path`]. Plugins never
//! touch [`WorkbookState`] directly: they go through
//! [`Transaction::update`](super::Transaction::update), which records the
//! old and new field so the history can replay the change either way.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tabula_engine::engine::{
    CellId, Position, SheetId, Workbook, Zone, number_to_letters,
};

use super::command::Style;

/// A column or row header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// "A", "B", ... for columns, "1", "2", ... for rows.
    pub name: String,
    /// Offset of the header's leading edge.
    pub start: u64,
    /// Offset of the trailing edge, `start + size`.
    pub end: u64,
    pub size: u32,
}

/// Rebuild names and offsets of `headers` from their sizes.
pub fn layout_headers(sizes: &[u32], columns: bool) -> Vec<Header> {
    let mut start = 0u64;
    sizes
        .iter()
        .enumerate()
        .map(|(index, &size)| {
            let name = if columns {
                number_to_letters(index)
            } else {
                (index + 1).to_string()
            };
            let header = Header {
                name,
                start,
                end: start + u64::from(size),
                size,
            };
            start = header.end;
            header
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub id: SheetId,
    pub name: String,
    pub cols: Vec<Header>,
    pub rows: Vec<Header>,
    /// Sparse map of occupied positions.
    pub cells: HashMap<Position, CellId>,
    pub merges: BTreeMap<u64, Zone>,
}

impl Sheet {
    pub fn new(id: SheetId, name: &str, cols: &[u32], rows: &[u32]) -> Self {
        Sheet {
            id,
            name: name.to_string(),
            cols: layout_headers(cols, true),
            rows: layout_headers(rows, false),
            cells: HashMap::new(),
            merges: BTreeMap::new(),
        }
    }

    /// Zone covering the whole sheet.
    pub fn bounds(&self) -> Zone {
        Zone::new(
            0,
            0,
            self.cols.len().saturating_sub(1),
            self.rows.len().saturating_sub(1),
        )
    }

    pub fn contains(&self, zone: &Zone) -> bool {
        zone.right < self.cols.len() && zone.bottom < self.rows.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub content: String,
    pub style: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Position,
    pub zones: Vec<Zone>,
}

impl Default for Selection {
    fn default() -> Self {
        Selection {
            anchor: Position::new(0, 0),
            zones: vec![Zone::single(0, 0)],
        }
    }
}

/// Address of one tracked field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Path {
    Sheet(SheetId),
    SheetName(SheetId),
    VisibleSheets,
    ActiveSheet,
    Cols(SheetId),
    Rows(SheetId),
    Position(SheetId, Position),
    Cell(CellId),
    NextCellId,
    Style(u64),
    NextStyleId,
    Merge(SheetId, u64),
    NextMergeId,
    Selection,
}

/// Value stored at a [`Path`]. `None` marks an absent entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Field {
    None,
    Sheet(Box<Sheet>),
    SheetIds(Vec<SheetId>),
    SheetId(SheetId),
    Text(String),
    Headers(Vec<Header>),
    CellId(CellId),
    Cell(CellRecord),
    Counter(u64),
    Style(Style),
    Zone(Zone),
    Selection(Selection),
}

impl Field {
    pub fn is_none(&self) -> bool {
        matches!(self, Field::None)
    }
}

/// One recorded write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub path: Path,
    pub old: Field,
    pub new: Field,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkbookState {
    pub(crate) sheets: HashMap<SheetId, Sheet>,
    pub(crate) visible_sheets: Vec<SheetId>,
    pub(crate) active_sheet: Option<SheetId>,
    pub(crate) cells: HashMap<CellId, CellRecord>,
    pub(crate) next_cell_id: u64,
    pub(crate) styles: BTreeMap<u64, Style>,
    pub(crate) next_style_id: u64,
    pub(crate) next_merge_id: u64,
    pub(crate) selection: Selection,
    /// Derived from the sheets' cell maps.
    positions: HashMap<CellId, (SheetId, Position)>,
}

impl WorkbookState {
    pub fn sheet(&self, id: &SheetId) -> Option<&Sheet> {
        self.sheets.get(id)
    }

    pub fn cell(&self, id: CellId) -> Option<&CellRecord> {
        self.cells.get(&id)
    }

    pub(crate) fn read(&self, path: &Path) -> Field {
        let sheet = |id: &SheetId| self.sheets.get(id);
        match path {
            Path::Sheet(id) => sheet(id)
                .map(|s| Field::Sheet(Box::new(s.clone())))
                .unwrap_or(Field::None),
            Path::SheetName(id) => sheet(id)
                .map(|s| Field::Text(s.name.clone()))
                .unwrap_or(Field::None),
            Path::VisibleSheets => Field::SheetIds(self.visible_sheets.clone()),
            Path::ActiveSheet => self
                .active_sheet
                .clone()
                .map(Field::SheetId)
                .unwrap_or(Field::None),
            Path::Cols(id) => sheet(id)
                .map(|s| Field::Headers(s.cols.clone()))
                .unwrap_or(Field::None),
            Path::Rows(id) => sheet(id)
                .map(|s| Field::Headers(s.rows.clone()))
                .unwrap_or(Field::None),
            Path::Position(id, position) => sheet(id)
                .and_then(|s| s.cells.get(position))
                .map(|c| Field::CellId(*c))
                .unwrap_or(Field::None),
            Path::Cell(id) => self
                .cells
                .get(id)
                .map(|c| Field::Cell(c.clone()))
                .unwrap_or(Field::None),
            Path::NextCellId => Field::Counter(self.next_cell_id),
            Path::Style(id) => self
                .styles
                .get(id)
                .map(|s| Field::Style(s.clone()))
                .unwrap_or(Field::None),
            Path::NextStyleId => Field::Counter(self.next_style_id),
            Path::Merge(id, merge) => sheet(id)
                .and_then(|s| s.merges.get(merge))
                .map(|z| Field::Zone(*z))
                .unwrap_or(Field::None),
            Path::NextMergeId => Field::Counter(self.next_merge_id),
            Path::Selection => Field::Selection(self.selection.clone()),
        }
    }

    /// Store `field` at `path`. A field of the wrong kind, or a path inside
    /// a sheet that does not exist, is ignored.
    pub(crate) fn write(&mut self, path: &Path, field: Field) {
        match (path, field) {
            (Path::Sheet(id), Field::Sheet(sheet)) => {
                self.unindex_sheet(id);
                for (position, cell) in &sheet.cells {
                    self.positions.insert(*cell, (id.clone(), *position));
                }
                self.sheets.insert(id.clone(), *sheet);
            }
            (Path::Sheet(id), Field::None) => {
                self.unindex_sheet(id);
                self.sheets.remove(id);
            }
            (Path::VisibleSheets, Field::SheetIds(ids)) => self.visible_sheets = ids,
            (Path::ActiveSheet, Field::SheetId(id)) => self.active_sheet = Some(id),
            (Path::ActiveSheet, Field::None) => self.active_sheet = None,
            (Path::Cell(id), Field::Cell(record)) => {
                self.cells.insert(*id, record);
            }
            (Path::Cell(id), Field::None) => {
                self.cells.remove(id);
            }
            (Path::NextCellId, Field::Counter(n)) => self.next_cell_id = n,
            (Path::Style(id), Field::Style(style)) => {
                self.styles.insert(*id, style);
            }
            (Path::Style(id), Field::None) => {
                self.styles.remove(id);
            }
            (Path::NextStyleId, Field::Counter(n)) => self.next_style_id = n,
            (Path::NextMergeId, Field::Counter(n)) => self.next_merge_id = n,
            (Path::Selection, Field::Selection(selection)) => self.selection = selection,
            (path, field) => self.write_in_sheet(path, field),
        }
    }

    fn write_in_sheet(&mut self, path: &Path, field: Field) {
        let id = match path {
            Path::SheetName(id)
            | Path::Cols(id)
            | Path::Rows(id)
            | Path::Position(id, _)
            | Path::Merge(id, _) => id,
            _ => {
                tracing::warn!(?path, "mismatched field kind, write ignored");
                return;
            }
        };
        let Some(sheet) = self.sheets.get_mut(id) else {
            tracing::warn!(?path, "write into missing sheet ignored");
            return;
        };
        match (path, field) {
            (Path::SheetName(_), Field::Text(name)) => sheet.name = name,
            (Path::Cols(_), Field::Headers(headers)) => sheet.cols = headers,
            (Path::Rows(_), Field::Headers(headers)) => sheet.rows = headers,
            (Path::Position(_, position), Field::CellId(cell)) => {
                if let Some(previous) = sheet.cells.insert(*position, cell) {
                    self.positions.remove(&previous);
                }
                self.positions.insert(cell, (id.clone(), *position));
            }
            (Path::Position(_, position), Field::None) => {
                if let Some(previous) = sheet.cells.remove(position) {
                    let indexed_here = self
                        .positions
                        .get(&previous)
                        .is_some_and(|(s, p)| s == id && p == position);
                    if indexed_here {
                        self.positions.remove(&previous);
                    }
                }
            }
            (Path::Merge(_, merge), Field::Zone(zone)) => {
                sheet.merges.insert(*merge, zone);
            }
            (Path::Merge(_, merge), Field::None) => {
                sheet.merges.remove(merge);
            }
            (path, _) => tracing::warn!(?path, "mismatched field kind, write ignored"),
        }
    }

    fn unindex_sheet(&mut self, id: &SheetId) {
        if let Some(sheet) = self.sheets.get(id) {
            for cell in sheet.cells.values() {
                self.positions.remove(cell);
            }
        }
    }
}

impl Workbook for WorkbookState {
    fn sheet_by_name(&self, name: &str) -> Option<SheetId> {
        self.sheets
            .values()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.id.clone())
    }

    fn sheet_name(&self, sheet: &SheetId) -> Option<&str> {
        self.sheets.get(sheet).map(|s| s.name.as_str())
    }

    fn cell_content(&self, cell: CellId) -> Option<&str> {
        self.cells.get(&cell).map(|c| c.content.as_str())
    }

    fn cell_position(&self, cell: CellId) -> Option<(SheetId, Position)> {
        self.positions.get(&cell).cloned()
    }

    fn cell_at(&self, sheet: &SheetId, position: Position) -> Option<CellId> {
        self.sheets.get(sheet)?.cells.get(&position).copied()
    }

    fn cell_ids(&self) -> Vec<CellId> {
        let mut ids: Vec<CellId> = self.cells.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn cells_in_zone(&self, sheet: &SheetId, zone: &Zone) -> Vec<(Position, CellId)> {
        let Some(sheet) = self.sheets.get(sheet) else {
            return Vec::new();
        };
        if zone.area() <= sheet.cells.len() {
            zone.positions()
                .filter_map(|p| sheet.cells.get(&p).map(|id| (p, *id)))
                .collect()
        } else {
            sheet
                .cells
                .iter()
                .filter(|(p, _)| zone.contains(p.col, p.row))
                .map(|(p, id)| (*p, *id))
                .collect()
        }
    }
}
