//! Read-only views over the model.

use tabula_engine::engine::{
    CellId, EvalState, Evaluator, Position, SheetId, Value, Workbook, Zone, offset_formula,
    to_cartesian,
};

use super::command::Style;
use super::history::History;
use super::state::{CellRecord, Header, Selection, Sheet, WorkbookState};
use crate::config::ModelConfig;

/// Side-effect free accessors, handed to plugins and callers alike.
#[derive(Clone, Copy)]
pub struct Getters<'a> {
    pub(crate) state: &'a WorkbookState,
    pub(crate) evaluator: &'a Evaluator,
    pub(crate) history: &'a History,
    pub(crate) config: &'a ModelConfig,
}

impl<'a> Getters<'a> {
    pub fn config(&self) -> &'a ModelConfig {
        self.config
    }

    // Sheets

    pub fn sheet(&self, id: &SheetId) -> Option<&'a Sheet> {
        self.state.sheets.get(id)
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&'a Sheet> {
        let id = self.state.sheet_by_name(name)?;
        self.state.sheets.get(&id)
    }

    pub fn sheet_name(&self, id: &SheetId) -> Option<&'a str> {
        self.sheet(id).map(|s| s.name.as_str())
    }

    /// Sheet ids in display order.
    pub fn visible_sheets(&self) -> &'a [SheetId] {
        &self.state.visible_sheets
    }

    pub fn active_sheet(&self) -> Option<&'a SheetId> {
        self.state.active_sheet.as_ref()
    }

    pub fn col_headers(&self, sheet: &SheetId) -> &'a [Header] {
        self.sheet(sheet).map(|s| s.cols.as_slice()).unwrap_or(&[])
    }

    pub fn row_headers(&self, sheet: &SheetId) -> &'a [Header] {
        self.sheet(sheet).map(|s| s.rows.as_slice()).unwrap_or(&[])
    }

    /// Number of columns and rows.
    pub fn dimensions(&self, sheet: &SheetId) -> (usize, usize) {
        self.sheet(sheet)
            .map(|s| (s.cols.len(), s.rows.len()))
            .unwrap_or((0, 0))
    }

    /// Total width and height of the grid.
    pub fn grid_size(&self, sheet: &SheetId) -> (u64, u64) {
        let end = |headers: &[Header]| headers.last().map(|h| h.end).unwrap_or(0);
        (end(self.col_headers(sheet)), end(self.row_headers(sheet)))
    }

    /// Zone spanning columns `left..=right` over every row.
    pub fn cols_zone(&self, sheet: &SheetId, left: usize, right: usize) -> Zone {
        let rows = self.dimensions(sheet).1;
        Zone::new(left, 0, right, rows.saturating_sub(1))
    }

    /// Zone spanning rows `top..=bottom` over every column.
    pub fn rows_zone(&self, sheet: &SheetId, top: usize, bottom: usize) -> Zone {
        let cols = self.dimensions(sheet).0;
        Zone::new(0, top, cols.saturating_sub(1), bottom)
    }

    // Cells

    pub fn cell_id(&self, sheet: &SheetId, col: usize, row: usize) -> Option<CellId> {
        self.state.cell_at(sheet, Position::new(col, row))
    }

    pub fn cell(&self, sheet: &SheetId, col: usize, row: usize) -> Option<&'a CellRecord> {
        let id = self.cell_id(sheet, col, row)?;
        self.state.cells.get(&id)
    }

    /// Cell at an address such as "B3".
    pub fn cell_by_xc(&self, sheet: &SheetId, xc: &str) -> Option<&'a CellRecord> {
        let (col, row) = to_cartesian(xc).ok()?;
        self.cell(sheet, col, row)
    }

    pub fn cell_record(&self, id: CellId) -> Option<&'a CellRecord> {
        self.state.cells.get(&id)
    }

    pub fn cell_position(&self, id: CellId) -> Option<(SheetId, Position)> {
        self.state.cell_position(id)
    }

    /// Raw content at a position, empty when there is no cell.
    pub fn content(&self, sheet: &SheetId, col: usize, row: usize) -> &'a str {
        self.cell(sheet, col, row)
            .map(|c| c.content.as_str())
            .unwrap_or("")
    }

    /// Cells of one column, top to bottom.
    pub fn column_cells(&self, sheet: &SheetId, col: usize) -> Vec<(usize, CellId)> {
        let mut cells: Vec<(usize, CellId)> = self
            .sheet(sheet)
            .into_iter()
            .flat_map(|s| s.cells.iter())
            .filter(|(p, _)| p.col == col)
            .map(|(p, id)| (p.row, *id))
            .collect();
        cells.sort_unstable();
        cells
    }

    /// Cells of one row, left to right.
    pub fn row_cells(&self, sheet: &SheetId, row: usize) -> Vec<(usize, CellId)> {
        let mut cells: Vec<(usize, CellId)> = self
            .sheet(sheet)
            .into_iter()
            .flat_map(|s| s.cells.iter())
            .filter(|(p, _)| p.row == row)
            .map(|(p, id)| (p.col, *id))
            .collect();
        cells.sort_unstable();
        cells
    }

    // Values

    /// Evaluated value of a position. Never triggers evaluation.
    pub fn value(&self, sheet: &SheetId, col: usize, row: usize) -> Value {
        self.evaluator
            .value_at(self.state, sheet, Position::new(col, row))
    }

    pub fn value_of(&self, id: CellId) -> Value {
        self.evaluator.value(self.state, id)
    }

    pub fn formatted(&self, sheet: &SheetId, col: usize, row: usize) -> String {
        self.value(sheet, col, row).format()
    }

    /// Values of a zone, row by row.
    pub fn range_values(&self, sheet: &SheetId, zone: &Zone) -> Vec<Vec<Value>> {
        (zone.top..=zone.bottom)
            .map(|row| {
                (zone.left..=zone.right)
                    .map(|col| self.value(sheet, col, row))
                    .collect()
            })
            .collect()
    }

    pub fn range_formatted(&self, sheet: &SheetId, zone: &Zone) -> Vec<Vec<String>> {
        self.range_values(sheet, zone)
            .into_iter()
            .map(|row| row.iter().map(Value::format).collect())
            .collect()
    }

    /// Evaluation state of a formula cell; `None` for plain values.
    pub fn eval_state(&self, sheet: &SheetId, col: usize, row: usize) -> Option<EvalState> {
        self.evaluator.state(self.cell_id(sheet, col, row)?)
    }

    pub fn pending_async(&self) -> usize {
        self.evaluator.pending_async()
    }

    // Merges

    pub fn merges(&self, sheet: &SheetId) -> Vec<Zone> {
        self.sheet(sheet)
            .map(|s| s.merges.values().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn merge_entries(&self, sheet: &SheetId) -> Vec<(u64, Zone)> {
        self.sheet(sheet)
            .map(|s| s.merges.iter().map(|(id, z)| (*id, *z)).collect())
            .unwrap_or_default()
    }

    pub fn merge_at(&self, sheet: &SheetId, col: usize, row: usize) -> Option<Zone> {
        self.sheet(sheet)?
            .merges
            .values()
            .find(|z| z.contains(col, row))
            .copied()
    }

    pub fn is_in_merge(&self, sheet: &SheetId, col: usize, row: usize) -> bool {
        self.merge_at(sheet, col, row).is_some()
    }

    /// Whether merging `zone` would discard content held outside its
    /// top-left cell.
    pub fn is_merge_destructive(&self, sheet: &SheetId, zone: &Zone) -> bool {
        let top_left = zone.top_left();
        self.state
            .cells_in_zone(sheet, zone)
            .into_iter()
            .filter(|(p, _)| *p != top_left)
            .any(|(_, id)| {
                self.state
                    .cells
                    .get(&id)
                    .is_some_and(|c| !c.content.is_empty())
            })
    }

    /// Grow `zone` until every merge it touches lies inside it.
    pub fn expand_zone(&self, sheet: &SheetId, zone: &Zone) -> Zone {
        let merges = self.merges(sheet);
        let mut expanded = *zone;
        loop {
            let grown = merges
                .iter()
                .filter(|m| m.intersects(&expanded))
                .fold(expanded, |acc, m| acc.union(m));
            if grown == expanded {
                return expanded;
            }
            expanded = grown;
        }
    }

    // Styles

    pub fn style(&self, id: u64) -> Option<&'a Style> {
        self.state.styles.get(&id)
    }

    pub fn styles(&self) -> impl Iterator<Item = (u64, &'a Style)> + 'a {
        self.state.styles.iter().map(|(id, s)| (*id, s))
    }

    pub fn cell_style(&self, sheet: &SheetId, col: usize, row: usize) -> Option<&'a Style> {
        self.style(self.cell(sheet, col, row)?.style?)
    }

    /// Id of a registered style equal to `style`.
    pub fn find_style(&self, style: &Style) -> Option<u64> {
        self.styles().find(|(_, s)| *s == style).map(|(id, _)| id)
    }

    // Selection

    pub fn selection(&self) -> &'a Selection {
        &self.state.selection
    }

    pub fn active_cell(&self) -> Position {
        self.state.selection.anchor
    }

    // Misc

    /// Shift every relative reference of `formula` by `(dx, dy)`.
    pub fn apply_offset(&self, formula: &str, dx: isize, dy: isize) -> String {
        offset_formula(formula, dx, dy)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}
