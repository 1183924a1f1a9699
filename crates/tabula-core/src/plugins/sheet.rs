//! Sheets, their headers and the position of every cell.

use std::collections::BTreeMap;
use tabula_engine::engine::{
    Axis, CellId, EditKind, MAX_COLS, MAX_ROWS, Position, SheetId, StructuralEdit,
    invalidate_sheet_in_formula, rename_sheet_in_formula, transform_formula,
};

use super::{Plugin, rewrite_formulas, structural_edits};
use crate::error::{Result, TabulaError};
use crate::model::{
    CancelledReason, Command, CommandResult, Direction, Field, Getters, Header, Path, Sheet,
    StyleChange, Transaction, layout_headers,
};
use crate::storage::{HeaderData, SheetData, WorkbookData};

pub struct SheetPlugin;

fn name_is_valid(getters: &Getters, name: &str, renamed: Option<&SheetId>) -> bool {
    let name = name.trim();
    if name.is_empty() || name.contains('!') {
        return false;
    }
    getters
        .visible_sheets()
        .iter()
        .filter(|id| Some(*id) != renamed)
        .filter_map(|id| getters.sheet_name(id))
        .all(|existing| !existing.eq_ignore_ascii_case(name))
}

/// First "<prefix>N" not taken yet.
fn generate_sheet_name(getters: &Getters) -> String {
    let prefix = &getters.config().sheet_name_prefix;
    (1..)
        .map(|i| format!("{prefix}{i}"))
        .find(|name| name_is_valid(getters, name, None))
        .unwrap_or_else(|| prefix.clone())
}

fn copy_name(getters: &Getters, source: &str) -> String {
    let base = format!("Copy of {source}");
    if name_is_valid(getters, &base, None) {
        return base;
    }
    (2..)
        .map(|i| format!("{base} ({i})"))
        .find(|name| name_is_valid(getters, name, None))
        .unwrap_or(base)
}

fn sizes(headers: &[Header]) -> Vec<u32> {
    headers.iter().map(|h| h.size).collect()
}

impl SheetPlugin {
    fn create_sheet(
        &self,
        tx: &mut Transaction,
        sheet_id: &SheetId,
        name: Option<&str>,
        position: usize,
        cols: Option<usize>,
        rows: Option<usize>,
    ) {
        let config = tx.config();
        let name = match name {
            Some(name) => name.trim().to_string(),
            None => generate_sheet_name(&tx.getters()),
        };
        let cols = vec![config.default_col_width; cols.unwrap_or(config.default_cols)];
        let rows = vec![config.default_row_height; rows.unwrap_or(config.default_rows)];
        let sheet = Sheet::new(sheet_id.clone(), &name, &cols, &rows);
        tx.update(Path::Sheet(sheet_id.clone()), Field::Sheet(Box::new(sheet)));

        let mut visible = tx.getters().visible_sheets().to_vec();
        visible.insert(position.min(visible.len()), sheet_id.clone());
        tx.update(Path::VisibleSheets, Field::SheetIds(visible));
        tracing::debug!(sheet = %sheet_id, %name, "created sheet");
    }

    fn duplicate_sheet(
        &self,
        tx: &mut Transaction,
        from: &SheetId,
        to: &SheetId,
        name: Option<&str>,
    ) {
        let getters = tx.getters();
        let Some(source) = getters.sheet(from) else {
            return;
        };
        let name = match name {
            Some(name) => name.trim().to_string(),
            None => copy_name(&getters, &source.name),
        };
        let copy = Sheet::new(to.clone(), &name, &sizes(&source.cols), &sizes(&source.rows));
        let mut cells: Vec<(Position, CellId)> =
            source.cells.iter().map(|(p, c)| (*p, *c)).collect();
        cells.sort_unstable();
        let contents: Vec<(Position, String, Option<u64>)> = cells
            .into_iter()
            .filter_map(|(p, id)| getters.cell_record(id).map(|r| (p, r.content.clone(), r.style)))
            .collect();
        let mut visible = getters.visible_sheets().to_vec();
        let index = visible.iter().position(|id| id == from).map_or(visible.len(), |i| i + 1);
        visible.insert(index, to.clone());

        tx.update(Path::Sheet(to.clone()), Field::Sheet(Box::new(copy)));
        tx.update(Path::VisibleSheets, Field::SheetIds(visible));
        for (position, content, style) in contents {
            tx.dispatch(&Command::UpdateCell {
                sheet_id: to.clone(),
                col: position.col,
                row: position.row,
                content: Some(content),
                style: style.map_or(StyleChange::Clear, StyleChange::Set),
            });
        }
    }

    fn rename_sheet(&self, tx: &mut Transaction, sheet_id: &SheetId, name: &str) {
        let Some(old_name) = tx.getters().sheet_name(sheet_id).map(str::to_string) else {
            return;
        };
        let name = name.trim();
        tx.update(Path::SheetName(sheet_id.clone()), Field::Text(name.to_string()));
        rewrite_formulas(tx, |_, content| {
            rename_sheet_in_formula(content, &old_name, name)
        });
    }

    fn delete_sheet(&self, tx: &mut Transaction, sheet_id: &SheetId) {
        let getters = tx.getters();
        let Some(sheet) = getters.sheet(sheet_id) else {
            return;
        };
        let name = sheet.name.clone();
        let mut positions: Vec<Position> = sheet.cells.keys().copied().collect();
        positions.sort_unstable();
        let mut visible = getters.visible_sheets().to_vec();
        let index = visible.iter().position(|id| id == sheet_id);
        if getters.active_sheet() == Some(sheet_id) {
            let neighbor = index.and_then(|i| {
                if i > 0 {
                    visible.get(i - 1)
                } else {
                    visible.get(i + 1)
                }
            });
            if let Some(neighbor) = neighbor.cloned() {
                tx.dispatch(&Command::ActivateSheet { sheet_id: neighbor });
            }
        }
        if let Some(index) = index {
            visible.remove(index);
        }

        for position in positions {
            tx.dispatch(&Command::ClearCell {
                sheet_id: sheet_id.clone(),
                col: position.col,
                row: position.row,
            });
        }
        tx.update(Path::VisibleSheets, Field::SheetIds(visible));
        tx.update(Path::Sheet(sheet_id.clone()), Field::None);
        rewrite_formulas(tx, |_, content| invalidate_sheet_in_formula(content, &name));
        tracing::debug!(sheet = %sheet_id, %name, "deleted sheet");
    }

    fn move_sheet(&self, tx: &mut Transaction, sheet_id: &SheetId, direction: Direction) {
        let mut visible = tx.getters().visible_sheets().to_vec();
        let Some(index) = visible.iter().position(|id| id == sheet_id) else {
            return;
        };
        let target = match direction {
            Direction::Left => index.checked_sub(1),
            Direction::Right => Some(index + 1).filter(|t| *t < visible.len()),
        };
        if let Some(target) = target {
            visible.swap(index, target);
            tx.update(Path::VisibleSheets, Field::SheetIds(visible));
        }
    }

    fn resize(&self, tx: &mut Transaction, sheet_id: &SheetId, axis: Axis, indices: &[usize], size: u32) {
        let Some(sheet) = tx.getters().sheet(sheet_id) else {
            return;
        };
        let headers = match axis {
            Axis::Column => &sheet.cols,
            Axis::Row => &sheet.rows,
        };
        let mut sizes = sizes(headers);
        for &index in indices {
            if let Some(slot) = sizes.get_mut(index) {
                *slot = size;
            }
        }
        self.write_headers(tx, sheet_id, axis, &sizes);
    }

    fn write_headers(&self, tx: &mut Transaction, sheet_id: &SheetId, axis: Axis, sizes: &[u32]) {
        match axis {
            Axis::Column => tx.update(
                Path::Cols(sheet_id.clone()),
                Field::Headers(layout_headers(sizes, true)),
            ),
            Axis::Row => tx.update(
                Path::Rows(sheet_id.clone()),
                Field::Headers(layout_headers(sizes, false)),
            ),
        }
    }

    /// Apply one row/column edit: rewrite formulas while coordinates are
    /// still the old ones, then move the cells, then rebuild the headers.
    fn apply_edit(&self, tx: &mut Transaction, sheet_id: &SheetId, edit: &StructuralEdit, base: usize) {
        let Some(sheet) = tx.getters().sheet(sheet_id) else {
            return;
        };
        let edited_name = sheet.name.clone();
        rewrite_formulas(tx, |host, content| {
            transform_formula(content, host, &edited_name, edit)
        });

        let Some(sheet) = tx.getters().sheet(sheet_id) else {
            return;
        };
        let index_of = |p: &Position| match edit.axis {
            Axis::Column => p.col,
            Axis::Row => p.row,
        };
        let mut cells: Vec<(Position, CellId)> = sheet.cells.iter().map(|(p, c)| (*p, *c)).collect();
        // Removals pull cells towards lower indices, insertions push them
        // away: move the cells nearest the destination first.
        cells.sort_unstable_by_key(|(p, _)| (index_of(p), p.col, p.row));
        if edit.kind == EditKind::Insert {
            cells.reverse();
        }
        let headers = match edit.axis {
            Axis::Column => &sheet.cols,
            Axis::Row => &sheet.rows,
        };
        let mut sizes = sizes(headers);

        for (position, cell) in cells {
            let index = index_of(&position);
            match edit.map_index(index) {
                None => tx.dispatch(&Command::ClearCell {
                    sheet_id: sheet_id.clone(),
                    col: position.col,
                    row: position.row,
                }),
                Some(moved) if moved != index => {
                    let (col, row) = match edit.axis {
                        Axis::Column => (moved, position.row),
                        Axis::Row => (position.col, moved),
                    };
                    tx.dispatch(&Command::UpdateCellPosition {
                        sheet_id: sheet_id.clone(),
                        cell_id: cell,
                        col,
                        row,
                    });
                }
                Some(_) => {}
            }
        }

        match edit.kind {
            EditKind::Insert => {
                let size = sizes.get(base).copied().unwrap_or_else(|| match edit.axis {
                    Axis::Column => tx.config().default_col_width,
                    Axis::Row => tx.config().default_row_height,
                });
                let at = edit.at.min(sizes.len());
                sizes.splice(at..at, std::iter::repeat_n(size, edit.count));
            }
            EditKind::Remove => {
                let end = (edit.at + edit.count).min(sizes.len());
                sizes.drain(edit.at.min(end)..end);
            }
        }
        self.write_headers(tx, sheet_id, edit.axis, &sizes);
        tracing::debug!(sheet = %sheet_id, ?edit, "applied structural edit");
    }

    fn move_cell(&self, tx: &mut Transaction, sheet_id: &SheetId, cell: CellId, col: usize, row: usize) {
        let target = Position::new(col, row);
        let previous = tx.getters().cell_position(cell);
        tx.update(
            Path::Position(sheet_id.clone(), target),
            Field::CellId(cell),
        );
        if let Some((sheet, position)) = previous {
            let still_here = tx.getters().sheet(&sheet).and_then(|s| s.cells.get(&position)) == Some(&cell);
            if (sheet != *sheet_id || position != target) && still_here {
                tx.update(Path::Position(sheet, position), Field::None);
            }
        }
    }
}

fn sizes_with_overrides(
    count: usize,
    default: u32,
    overrides: &BTreeMap<usize, HeaderData>,
    sheet_name: &str,
) -> Result<Vec<u32>> {
    let mut sizes = vec![default; count];
    for (index, header) in overrides {
        let Some(slot) = sizes.get_mut(*index) else {
            return Err(TabulaError::invalid(format!(
                "header {index} lies outside sheet {sheet_name:?}"
            )));
        };
        *slot = header.size;
    }
    Ok(sizes)
}

fn base_index(command: &Command) -> usize {
    match command {
        Command::AddColumns { column, .. } => *column,
        Command::AddRows { row, .. } => *row,
        _ => 0,
    }
}

fn check_removal(count: usize, indices: &[usize], too_few: CancelledReason) -> CommandResult {
    if indices.is_empty() {
        return Err(CancelledReason::InvalidQuantity);
    }
    if indices.iter().any(|i| *i >= count) {
        return Err(CancelledReason::TargetOutOfSheet);
    }
    let mut distinct = indices.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() >= count {
        return Err(too_few);
    }
    Ok(())
}

impl Plugin for SheetPlugin {
    fn name(&self) -> &'static str {
        "sheet"
    }

    fn allow_dispatch(&self, command: &Command, getters: &Getters) -> CommandResult {
        match command {
            Command::CreateSheet {
                sheet_id,
                name,
                position,
                cols,
                rows,
                ..
            } => {
                if getters.sheet(sheet_id).is_some() {
                    return Err(CancelledReason::DuplicatedSheetId);
                }
                if *position > getters.visible_sheets().len() {
                    return Err(CancelledReason::WrongSheetPosition);
                }
                if name.as_deref().is_some_and(|n| !name_is_valid(getters, n, None)) {
                    return Err(CancelledReason::WrongSheetName);
                }
                if *cols == Some(0) {
                    return Err(CancelledReason::NotEnoughColumns);
                }
                if *rows == Some(0) {
                    return Err(CancelledReason::NotEnoughRows);
                }
                if cols.is_some_and(|c| c > MAX_COLS) || rows.is_some_and(|r| r > MAX_ROWS) {
                    return Err(CancelledReason::SheetTooLarge);
                }
                Ok(())
            }
            Command::DuplicateSheet {
                sheet_id_to, name, ..
            } => {
                if getters.sheet(sheet_id_to).is_some() {
                    return Err(CancelledReason::DuplicatedSheetId);
                }
                if name.as_deref().is_some_and(|n| !name_is_valid(getters, n, None)) {
                    return Err(CancelledReason::WrongSheetName);
                }
                Ok(())
            }
            Command::RenameSheet { sheet_id, name } => {
                if name_is_valid(getters, name, Some(sheet_id)) {
                    Ok(())
                } else {
                    Err(CancelledReason::WrongSheetName)
                }
            }
            Command::DeleteSheet { .. } => {
                if getters.visible_sheets().len() > 1 {
                    Ok(())
                } else {
                    Err(CancelledReason::NotEnoughSheets)
                }
            }
            Command::MoveSheet {
                sheet_id,
                direction,
            } => {
                let visible = getters.visible_sheets();
                let Some(index) = visible.iter().position(|id| id == sheet_id) else {
                    return Err(CancelledReason::InvalidSheetId);
                };
                match direction {
                    Direction::Left if index == 0 => Err(CancelledReason::WrongSheetMove),
                    Direction::Right if index + 1 == visible.len() => {
                        Err(CancelledReason::WrongSheetMove)
                    }
                    _ => Ok(()),
                }
            }
            Command::ResizeColumns {
                sheet_id, columns, ..
            } => {
                let (cols, _) = getters.dimensions(sheet_id);
                if columns.iter().all(|c| *c < cols) {
                    Ok(())
                } else {
                    Err(CancelledReason::TargetOutOfSheet)
                }
            }
            Command::ResizeRows { sheet_id, rows, .. } => {
                let (_, count) = getters.dimensions(sheet_id);
                if rows.iter().all(|r| *r < count) {
                    Ok(())
                } else {
                    Err(CancelledReason::TargetOutOfSheet)
                }
            }
            Command::AddColumns {
                sheet_id,
                column: index,
                quantity,
                ..
            }
            | Command::AddRows {
                sheet_id,
                row: index,
                quantity,
                ..
            } => {
                if *quantity == 0 {
                    return Err(CancelledReason::InvalidQuantity);
                }
                let (cols, rows) = getters.dimensions(sheet_id);
                let (count, limit) = if matches!(command, Command::AddColumns { .. }) {
                    (cols, MAX_COLS)
                } else {
                    (rows, MAX_ROWS)
                };
                if *index >= count {
                    return Err(CancelledReason::TargetOutOfSheet);
                }
                if count.saturating_add(*quantity) > limit {
                    return Err(CancelledReason::SheetTooLarge);
                }
                Ok(())
            }
            Command::RemoveColumns { sheet_id, columns } => check_removal(
                getters.dimensions(sheet_id).0,
                columns,
                CancelledReason::NotEnoughColumns,
            ),
            Command::RemoveRows { sheet_id, rows } => check_removal(
                getters.dimensions(sheet_id).1,
                rows,
                CancelledReason::NotEnoughRows,
            ),
            Command::UpdateCellPosition {
                sheet_id,
                cell_id,
                col,
                row,
            } => {
                if getters.cell_record(*cell_id).is_none() {
                    return Err(CancelledReason::InvalidCellId);
                }
                let (cols, rows) = getters.dimensions(sheet_id);
                if *col >= cols || *row >= rows {
                    return Err(CancelledReason::TargetOutOfSheet);
                }
                match getters.cell_id(sheet_id, *col, *row) {
                    Some(occupant) if occupant != *cell_id => Err(CancelledReason::TargetOccupied),
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn handle(&self, command: &Command, tx: &mut Transaction) {
        if let Some((sheet_id, edits)) = structural_edits(command) {
            let base = base_index(command);
            for edit in &edits {
                self.apply_edit(tx, sheet_id, edit, base);
            }
            return;
        }
        match command {
            Command::CreateSheet {
                sheet_id,
                name,
                position,
                cols,
                rows,
                ..
            } => self.create_sheet(tx, sheet_id, name.as_deref(), *position, *cols, *rows),
            Command::DuplicateSheet {
                sheet_id_from,
                sheet_id_to,
                name,
            } => self.duplicate_sheet(tx, sheet_id_from, sheet_id_to, name.as_deref()),
            Command::RenameSheet { sheet_id, name } => self.rename_sheet(tx, sheet_id, name),
            Command::DeleteSheet { sheet_id } => self.delete_sheet(tx, sheet_id),
            Command::MoveSheet {
                sheet_id,
                direction,
            } => self.move_sheet(tx, sheet_id, *direction),
            Command::ResizeColumns {
                sheet_id,
                columns,
                size,
            } => self.resize(tx, sheet_id, Axis::Column, columns, *size),
            Command::ResizeRows {
                sheet_id,
                rows,
                size,
            } => self.resize(tx, sheet_id, Axis::Row, rows, *size),
            Command::UpdateCellPosition {
                sheet_id,
                cell_id,
                col,
                row,
            } => self.move_cell(tx, sheet_id, *cell_id, *col, *row),
            _ => {}
        }
    }

    fn import(&self, data: &WorkbookData, tx: &mut Transaction) -> Result<()> {
        let config = tx.config();
        for (index, sheet_data) in data.sheets.iter().enumerate() {
            let getters = tx.getters();
            if getters.sheet(&sheet_data.id).is_some() {
                return Err(TabulaError::invalid(format!(
                    "duplicated sheet id {}",
                    sheet_data.id
                )));
            }
            let name = if sheet_data.name.trim().is_empty() {
                generate_sheet_name(&getters)
            } else {
                sheet_data.name.trim().to_string()
            };
            if !name_is_valid(&getters, &name, None) {
                return Err(TabulaError::invalid(format!("invalid sheet name {name:?}")));
            }
            if sheet_data.col_number == 0 || sheet_data.row_number == 0 {
                return Err(TabulaError::invalid(format!("sheet {name:?} has no cells")));
            }
            let cols = sizes_with_overrides(
                sheet_data.col_number,
                config.default_col_width,
                &sheet_data.cols,
                &name,
            )?;
            let rows = sizes_with_overrides(
                sheet_data.row_number,
                config.default_row_height,
                &sheet_data.rows,
                &name,
            )?;
            let sheet = Sheet::new(sheet_data.id.clone(), &name, &cols, &rows);
            tx.update(Path::Sheet(sheet_data.id.clone()), Field::Sheet(Box::new(sheet)));
            let mut visible = tx.getters().visible_sheets().to_vec();
            visible.push(sheet_data.id.clone());
            tx.update(Path::VisibleSheets, Field::SheetIds(visible));
            tracing::debug!(index, sheet = %sheet_data.id, "imported sheet");
        }
        Ok(())
    }

    fn export(&self, getters: &Getters, data: &mut WorkbookData) {
        let config = getters.config();
        let overrides = |headers: &[Header], default: u32| -> BTreeMap<usize, HeaderData> {
            headers
                .iter()
                .enumerate()
                .filter(|(_, h)| h.size != default)
                .map(|(i, h)| (i, HeaderData { size: h.size }))
                .collect()
        };
        data.sheets = getters
            .visible_sheets()
            .iter()
            .filter_map(|id| getters.sheet(id))
            .map(|sheet| SheetData {
                id: sheet.id.clone(),
                name: sheet.name.clone(),
                col_number: sheet.cols.len(),
                row_number: sheet.rows.len(),
                cols: overrides(&sheet.cols, config.default_col_width),
                rows: overrides(&sheet.rows, config.default_row_height),
                cells: BTreeMap::new(),
                merges: Vec::new(),
            })
            .collect();
    }
}
