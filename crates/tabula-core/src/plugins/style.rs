//! The style table and cell formatting.

use std::collections::HashMap;
use tabula_engine::engine::{Position, SheetId, Workbook, Zone};

use super::{Plugin, check_zones};
use crate::error::{Result, TabulaError};
use crate::model::{Command, CommandResult, Field, Getters, Path, Style, StyleChange, Transaction};
use crate::storage::WorkbookData;

pub struct StylePlugin;

fn expanded_positions(getters: &Getters, sheet_id: &SheetId, target: &[Zone]) -> Vec<Position> {
    let mut positions: Vec<Position> = target
        .iter()
        .map(|zone| getters.expand_zone(sheet_id, zone))
        .flat_map(|zone| zone.positions().collect::<Vec<_>>())
        .collect();
    positions.sort_unstable();
    positions.dedup();
    positions
}

impl StylePlugin {
    /// Id of `style` in the table, registering it when new.
    fn intern(&self, tx: &mut Transaction, style: Style) -> u64 {
        if let Some(id) = tx.getters().find_style(&style) {
            return id;
        }
        let id = tx.next_id(Path::NextStyleId);
        tx.update(Path::Style(id), Field::Style(style));
        id
    }

    fn set_formatting(&self, tx: &mut Transaction, sheet_id: &SheetId, target: &[Zone], style: &Style) {
        let positions = expanded_positions(&tx.getters(), sheet_id, target);
        // Cells sharing a style share the result.
        let mut resolved: HashMap<Option<u64>, u64> = HashMap::new();
        for position in positions {
            let current = tx
                .getters()
                .cell(sheet_id, position.col, position.row)
                .and_then(|c| c.style);
            let id = match resolved.get(&current) {
                Some(id) => *id,
                None => {
                    let base = current
                        .and_then(|id| tx.getters().style(id).cloned())
                        .unwrap_or_default();
                    let id = self.intern(tx, base.merged(style));
                    resolved.insert(current, id);
                    id
                }
            };
            tx.dispatch(&Command::UpdateCell {
                sheet_id: sheet_id.clone(),
                col: position.col,
                row: position.row,
                content: None,
                style: StyleChange::Set(id),
            });
        }
    }

    fn clear_formatting(&self, tx: &mut Transaction, sheet_id: &SheetId, target: &[Zone]) {
        let styled: Vec<Position> = {
            let getters = tx.getters();
            expanded_positions(&getters, sheet_id, target)
                .into_iter()
                .filter(|p| getters.cell(sheet_id, p.col, p.row).is_some_and(|c| c.style.is_some()))
                .collect()
        };
        for position in styled {
            tx.dispatch(&Command::UpdateCell {
                sheet_id: sheet_id.clone(),
                col: position.col,
                row: position.row,
                content: None,
                style: StyleChange::Clear,
            });
        }
    }
}

impl Plugin for StylePlugin {
    fn name(&self) -> &'static str {
        "style"
    }

    fn allow_dispatch(&self, command: &Command, getters: &Getters) -> CommandResult {
        match command {
            Command::SetFormatting {
                sheet_id, target, ..
            }
            | Command::ClearFormatting { sheet_id, target } => {
                check_zones(getters, sheet_id, target)
            }
            _ => Ok(()),
        }
    }

    fn handle(&self, command: &Command, tx: &mut Transaction) {
        match command {
            Command::SetFormatting {
                sheet_id,
                target,
                style,
            } => self.set_formatting(tx, sheet_id, target, style),
            Command::ClearFormatting { sheet_id, target } => {
                self.clear_formatting(tx, sheet_id, target)
            }
            _ => {}
        }
    }

    fn import(&self, data: &WorkbookData, tx: &mut Transaction) -> Result<()> {
        for (id, style) in &data.styles {
            tx.update(Path::Style(*id), Field::Style(style.clone()));
        }
        let next = data.styles.keys().next_back().map_or(0, |id| id + 1);
        tx.update(Path::NextStyleId, Field::Counter(next));

        let state = tx.getters().state;
        for id in state.cell_ids() {
            if let Some(style) = state.cell(id).and_then(|c| c.style) {
                if !data.styles.contains_key(&style) {
                    return Err(TabulaError::invalid(format!(
                        "cell uses unknown style {style}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn export(&self, getters: &Getters, data: &mut WorkbookData) {
        data.styles = getters.styles().map(|(id, s)| (id, s.clone())).collect();
    }
}
