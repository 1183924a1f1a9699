//! Active sheet, anchor and selected zones.

use tabula_engine::engine::{Position, SheetId, Zone, transform_zone};

use super::{Plugin, structural_edits};
use crate::error::Result;
use crate::model::{CancelledReason, Command, CommandResult, Field, Getters, Path, Selection, Transaction};
use crate::storage::WorkbookData;

pub struct SelectionPlugin;

impl SelectionPlugin {
    fn select(&self, tx: &mut Transaction, anchor: Position, zones: &[Zone]) {
        let selection = {
            let getters = tx.getters();
            let Some(sheet) = getters.active_sheet() else {
                return;
            };
            let mut zones: Vec<Zone> = zones.iter().map(|z| getters.expand_zone(sheet, z)).collect();
            if zones.is_empty() {
                zones.push(getters.expand_zone(sheet, &Zone::single(anchor.col, anchor.row)));
            }
            Selection { anchor, zones }
        };
        tx.update(Path::Selection, Field::Selection(selection));
    }

    fn activate(&self, tx: &mut Transaction, sheet_id: &SheetId) {
        tx.update(Path::ActiveSheet, Field::SheetId(sheet_id.clone()));
        tx.update(Path::Selection, Field::Selection(Selection::default()));
    }

    /// Keep the selection on the same cells across a row/column edit.
    fn follow_edit(&self, tx: &mut Transaction, command: &Command) {
        let Some((sheet_id, edits)) = structural_edits(command) else {
            return;
        };
        let getters = tx.getters();
        if getters.active_sheet() != Some(sheet_id) {
            return;
        }
        let (cols, rows) = getters.dimensions(sheet_id);
        let current = getters.selection().clone();
        let zones: Vec<Zone> = current
            .zones
            .iter()
            .filter_map(|zone| edits.iter().try_fold(*zone, |z, edit| transform_zone(&z, edit)))
            .collect();
        let anchor = edits.iter().fold(current.anchor, |anchor, edit| {
            let moved = transform_zone(&Zone::single(anchor.col, anchor.row), edit)
                .map(|z| z.top_left())
                .unwrap_or(anchor);
            Position::new(
                moved.col.min(cols.saturating_sub(1)),
                moved.row.min(rows.saturating_sub(1)),
            )
        });
        self.select(tx, anchor, &zones);
    }
}

impl Plugin for SelectionPlugin {
    fn name(&self) -> &'static str {
        "selection"
    }

    fn allow_dispatch(&self, command: &Command, getters: &Getters) -> CommandResult {
        let in_active_sheet = |col: usize, row: usize| {
            let Some(sheet) = getters.active_sheet() else {
                return Err(CancelledReason::InvalidSheetId);
            };
            let (cols, rows) = getters.dimensions(sheet);
            if col < cols && row < rows {
                Ok(())
            } else {
                Err(CancelledReason::TargetOutOfSheet)
            }
        };
        match command {
            Command::SelectCell { col, row } => in_active_sheet(*col, *row),
            Command::SetSelection { anchor, zones } => {
                in_active_sheet(anchor.0, anchor.1)?;
                zones
                    .iter()
                    .try_for_each(|zone| in_active_sheet(zone.right, zone.bottom))
            }
            _ => Ok(()),
        }
    }

    fn handle(&self, command: &Command, tx: &mut Transaction) {
        match command {
            Command::SelectCell { col, row } => {
                self.select(tx, Position::new(*col, *row), &[Zone::single(*col, *row)])
            }
            Command::SetSelection { anchor, zones } => {
                self.select(tx, Position::new(anchor.0, anchor.1), zones)
            }
            Command::ActivateSheet { sheet_id } => self.activate(tx, sheet_id),
            Command::CreateSheet {
                sheet_id,
                activate: true,
                ..
            } => self.activate(tx, sheet_id),
            Command::AddMerge { sheet_id, .. }
                if tx.getters().active_sheet() == Some(sheet_id) =>
            {
                let current = tx.getters().selection().clone();
                self.select(tx, current.anchor, &current.zones);
            }
            _ => self.follow_edit(tx, command),
        }
    }

    fn import(&self, data: &WorkbookData, tx: &mut Transaction) -> Result<()> {
        let active = data
            .active_sheet
            .clone()
            .filter(|id| tx.getters().sheet(id).is_some())
            .or_else(|| tx.getters().visible_sheets().first().cloned());
        if let Some(active) = active {
            self.activate(tx, &active);
        }
        Ok(())
    }

    fn export(&self, getters: &Getters, data: &mut WorkbookData) {
        data.active_sheet = getters.active_sheet().cloned();
    }
}

#[cfg(test)]
mod tests {
    use crate::Model;
    use crate::model::{CancelledReason, Command, Placement};
    use pretty_assertions::assert_eq;
    use tabula_engine::engine::{Position, SheetId, Zone};

    fn sheet1() -> SheetId {
        SheetId::from("sheet1")
    }

    #[test]
    fn test_select_cell_expands_over_merges() {
        let mut model = Model::new();
        model
            .dispatch(Command::AddMerge {
                sheet_id: sheet1(),
                zone: Zone::parse("B2:C3").unwrap(),
                force: false,
            })
            .unwrap();
        model.dispatch(Command::SelectCell { col: 2, row: 2 }).unwrap();
        let selection = model.getters().selection().clone();
        assert_eq!(selection.anchor, Position::new(2, 2));
        assert_eq!(selection.zones, vec![Zone::parse("B2:C3").unwrap()]);
        assert_eq!(
            model.dispatch(Command::SelectCell { col: 0, row: 100 }),
            Err(CancelledReason::TargetOutOfSheet)
        );
    }

    #[test]
    fn test_selection_follows_inserted_rows() {
        let mut model = Model::new();
        model.dispatch(Command::SelectCell { col: 1, row: 4 }).unwrap();
        model
            .dispatch(Command::AddRows {
                sheet_id: sheet1(),
                row: 0,
                position: Placement::Before,
                quantity: 3,
            })
            .unwrap();
        let getters = model.getters();
        assert_eq!(getters.active_cell(), Position::new(1, 7));
        assert_eq!(getters.selection().zones, vec![Zone::single(1, 7)]);
    }

    #[test]
    fn test_activate_sheet_resets_selection() {
        let mut model = Model::new();
        model.dispatch(Command::SelectCell { col: 3, row: 3 }).unwrap();
        model
            .dispatch(Command::CreateSheet {
                sheet_id: "s2".into(),
                name: None,
                position: 1,
                cols: None,
                rows: None,
                activate: true,
            })
            .unwrap();
        let getters = model.getters();
        assert_eq!(getters.active_sheet(), Some(&SheetId::from("s2")));
        assert_eq!(getters.active_cell(), Position::new(0, 0));
    }
}
