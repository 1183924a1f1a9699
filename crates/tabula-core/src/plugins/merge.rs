//! Merged zones.

use tabula_engine::engine::{SheetId, Zone, transform_zone};

use super::{Plugin, check_zones, structural_edits};
use crate::error::{Result, TabulaError};
use crate::model::{CancelledReason, Command, CommandResult, Field, Getters, Path, Transaction};
use crate::storage::WorkbookData;

pub struct MergePlugin;

impl MergePlugin {
    fn add_merge(&self, tx: &mut Transaction, sheet_id: &SheetId, zone: &Zone) {
        if zone.is_single_cell() {
            return;
        }
        let getters = tx.getters();
        let absorbed: Vec<(u64, Zone)> = getters
            .merge_entries(sheet_id)
            .into_iter()
            .filter(|(_, merge)| merge.intersects(zone))
            .collect();
        let merged = absorbed.iter().fold(*zone, |acc, (_, m)| acc.union(m));
        let top_left = merged.top_left();
        let cleared: Vec<(usize, usize)> = merged
            .positions()
            .filter(|p| *p != top_left)
            .filter(|p| !getters.content(sheet_id, p.col, p.row).is_empty())
            .map(|p| (p.col, p.row))
            .collect();

        for (id, _) in absorbed {
            tx.update(Path::Merge(sheet_id.clone(), id), Field::None);
        }
        let id = tx.next_id(Path::NextMergeId);
        tx.update(Path::Merge(sheet_id.clone(), id), Field::Zone(merged));
        for (col, row) in cleared {
            tx.dispatch(&Command::update_cell(sheet_id, col, row, ""));
        }
    }

    fn remove_merge(&self, tx: &mut Transaction, sheet_id: &SheetId, zone: &Zone) {
        let removed: Vec<u64> = tx
            .getters()
            .merge_entries(sheet_id)
            .into_iter()
            .filter(|(_, merge)| merge == zone)
            .map(|(id, _)| id)
            .collect();
        for id in removed {
            tx.update(Path::Merge(sheet_id.clone(), id), Field::None);
        }
    }

    fn copy_merges(&self, tx: &mut Transaction, from: &SheetId, to: &SheetId) {
        let merges = tx.getters().merge_entries(from);
        for (_, zone) in merges {
            let id = tx.next_id(Path::NextMergeId);
            tx.update(Path::Merge(to.clone(), id), Field::Zone(zone));
        }
    }
}

impl Plugin for MergePlugin {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn allow_dispatch(&self, command: &Command, getters: &Getters) -> CommandResult {
        match command {
            Command::AddMerge {
                sheet_id,
                zone,
                force,
            } => {
                check_zones(getters, sheet_id, std::slice::from_ref(zone))?;
                if !force && getters.is_merge_destructive(sheet_id, zone) {
                    return Err(CancelledReason::MergeIsDestructive);
                }
                Ok(())
            }
            Command::RemoveMerge { sheet_id, zone } => {
                check_zones(getters, sheet_id, std::slice::from_ref(zone))
            }
            _ => Ok(()),
        }
    }

    fn handle(&self, command: &Command, tx: &mut Transaction) {
        if let Some((sheet_id, edits)) = structural_edits(command) {
            let merges = tx.getters().merge_entries(sheet_id);
            for (id, zone) in merges {
                let moved = edits
                    .iter()
                    .try_fold(zone, |zone, edit| transform_zone(&zone, edit))
                    .filter(|z| !z.is_single_cell());
                let field = moved.map_or(Field::None, Field::Zone);
                tx.update(Path::Merge(sheet_id.clone(), id), field);
            }
            return;
        }
        match command {
            Command::AddMerge { sheet_id, zone, .. } => self.add_merge(tx, sheet_id, zone),
            Command::RemoveMerge { sheet_id, zone } => self.remove_merge(tx, sheet_id, zone),
            Command::DuplicateSheet {
                sheet_id_from,
                sheet_id_to,
                ..
            } => self.copy_merges(tx, sheet_id_from, sheet_id_to),
            _ => {}
        }
    }

    fn import(&self, data: &WorkbookData, tx: &mut Transaction) -> Result<()> {
        for sheet in &data.sheets {
            let mut zones: Vec<Zone> = Vec::with_capacity(sheet.merges.len());
            for text in &sheet.merges {
                let zone = Zone::parse(text)?;
                if zone.right >= sheet.col_number || zone.bottom >= sheet.row_number {
                    return Err(TabulaError::invalid(format!(
                        "merge {text} lies outside sheet {:?}",
                        sheet.name
                    )));
                }
                if zones.iter().any(|z| z.intersects(&zone)) {
                    return Err(TabulaError::invalid(format!("overlapping merge {text}")));
                }
                zones.push(zone);
            }
            for zone in zones.into_iter().filter(|z| !z.is_single_cell()) {
                let id = tx.next_id(Path::NextMergeId);
                tx.update(Path::Merge(sheet.id.clone(), id), Field::Zone(zone));
            }
        }
        Ok(())
    }

    fn export(&self, getters: &Getters, data: &mut WorkbookData) {
        for sheet in &mut data.sheets {
            sheet.merges = getters
                .merges(&sheet.id)
                .iter()
                .map(|zone| zone.to_string())
                .collect();
        }
    }
}
