//! Plugins own slices of the workbook state and react to commands.
//!
//! The kernel asks every plugin, in order, whether a command is allowed;
//! if all agree, every plugin handles it in the same order. Plugins keep no
//! state of their own: everything lives in the tracked
//! [`WorkbookState`](crate::model::WorkbookState).

mod cell;
mod merge;
mod selection;
mod sheet;
mod style;

pub use cell::CellPlugin;
pub use merge::MergePlugin;
pub use selection::SelectionPlugin;
pub use sheet::SheetPlugin;
pub use style::StylePlugin;

use tabula_engine::engine::{SheetId, StructuralEdit, Workbook, Zone, is_formula};

use crate::error::Result;
use crate::model::{CancelledReason, Command, CommandResult, Getters, Placement, Transaction};
use crate::storage::WorkbookData;

pub trait Plugin {
    fn name(&self) -> &'static str;

    /// Refuse a command before anything is mutated.
    fn allow_dispatch(&self, _command: &Command, _getters: &Getters) -> CommandResult {
        Ok(())
    }

    fn handle(&self, command: &Command, tx: &mut Transaction);

    /// Load this plugin's part of `data` into a fresh state.
    fn import(&self, _data: &WorkbookData, _tx: &mut Transaction) -> Result<()> {
        Ok(())
    }

    fn export(&self, _getters: &Getters, _data: &mut WorkbookData) {}
}

/// The core plugins, in dispatch order.
pub fn default_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(SheetPlugin),
        Box::new(CellPlugin),
        Box::new(MergePlugin),
        Box::new(StylePlugin),
        Box::new(SelectionPlugin),
    ]
}

/// Replace the content of every formula cell by `rewrite(host_sheet_name,
/// content)`, through `UPDATE_CELL` sub-commands.
pub(crate) fn rewrite_formulas(tx: &mut Transaction, mut rewrite: impl FnMut(&str, &str) -> String) {
    let updates: Vec<Command> = {
        let getters = tx.getters();
        let state = getters.state;
        let mut updates = Vec::new();
        for id in state.cell_ids() {
            let Some(record) = state.cell(id).filter(|c| is_formula(&c.content)) else {
                continue;
            };
            let Some((sheet, position)) = state.cell_position(id) else {
                continue;
            };
            let Some(host) = getters.sheet_name(&sheet) else {
                continue;
            };
            let rewritten = rewrite(host, &record.content);
            if rewritten != record.content {
                updates.push(Command::update_cell(
                    &sheet,
                    position.col,
                    position.row,
                    &rewritten,
                ));
            }
        }
        updates
    };
    for command in &updates {
        tx.dispatch(command);
    }
}

/// `TargetOutOfSheet` unless every zone lies inside the sheet.
pub(crate) fn check_zones(getters: &Getters, sheet: &SheetId, zones: &[Zone]) -> CommandResult {
    let Some(sheet) = getters.sheet(sheet) else {
        return Err(CancelledReason::InvalidSheetId);
    };
    if zones.iter().all(|z| sheet.contains(z)) {
        Ok(())
    } else {
        Err(CancelledReason::TargetOutOfSheet)
    }
}

/// Contiguous `(at, count)` runs of `indices`, highest first, so that
/// removing them in order never shifts a run still to be removed.
pub(crate) fn removal_runs(indices: &[usize]) -> Vec<(usize, usize)> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for index in sorted {
        match runs.last_mut() {
            Some((at, count)) if *at + *count == index => *count += 1,
            _ => runs.push((index, 1)),
        }
    }
    runs.reverse();
    runs
}

/// The row/column edits a command performs, in application order.
pub(crate) fn structural_edits(command: &Command) -> Option<(&SheetId, Vec<StructuralEdit>)> {
    let insert_at = |index: usize, position: Placement| match position {
        Placement::Before => index,
        Placement::After => index + 1,
    };
    match command {
        Command::AddColumns {
            sheet_id,
            column,
            position,
            quantity,
        } => Some((
            sheet_id,
            vec![StructuralEdit::insert_columns(
                insert_at(*column, *position),
                *quantity,
            )],
        )),
        Command::AddRows {
            sheet_id,
            row,
            position,
            quantity,
        } => Some((
            sheet_id,
            vec![StructuralEdit::insert_rows(
                insert_at(*row, *position),
                *quantity,
            )],
        )),
        Command::RemoveColumns { sheet_id, columns } => Some((
            sheet_id,
            removal_runs(columns)
                .into_iter()
                .map(|(at, count)| StructuralEdit::remove_columns(at, count))
                .collect(),
        )),
        Command::RemoveRows { sheet_id, rows } => Some((
            sheet_id,
            removal_runs(rows)
                .into_iter()
                .map(|(at, count)| StructuralEdit::remove_rows(at, count))
                .collect(),
        )),
        _ => None,
    }
}
