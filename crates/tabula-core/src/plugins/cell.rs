//! Cell records: content, style id and id allocation.

use tabula_engine::engine::{CellId, Position, SheetId, Workbook, to_cartesian, to_xc};

use super::{Plugin, check_zones};
use crate::error::{Result, TabulaError};
use crate::model::{
    CancelledReason, CellRecord, Command, CommandResult, Field, Getters, Path, StyleChange,
    Transaction,
};
use crate::storage::{CellData, WorkbookData};

pub struct CellPlugin;

impl CellPlugin {
    fn update_cell(
        &self,
        tx: &mut Transaction,
        sheet_id: &SheetId,
        position: Position,
        content: Option<&str>,
        style: StyleChange,
    ) {
        let getters = tx.getters();
        let existing = getters.cell_id(sheet_id, position.col, position.row);
        let record = existing.and_then(|id| getters.cell_record(id));
        let content = match content {
            Some(content) => content.to_string(),
            None => record.map(|r| r.content.clone()).unwrap_or_default(),
        };
        let style = match style {
            StyleChange::Keep => record.and_then(|r| r.style),
            StyleChange::Set(id) if getters.style(id).is_some() => Some(id),
            StyleChange::Set(id) => {
                tracing::warn!(style = id, "unknown style id, style left unchanged");
                record.and_then(|r| r.style)
            }
            StyleChange::Clear => None,
        };

        match existing {
            Some(id) if content.is_empty() && style.is_none() => {
                tx.update(Path::Cell(id), Field::None);
                tx.update(Path::Position(sheet_id.clone(), position), Field::None);
            }
            Some(id) => tx.update(Path::Cell(id), Field::Cell(CellRecord { content, style })),
            None if content.is_empty() && style.is_none() => {}
            None => {
                let id = CellId(tx.next_id(Path::NextCellId));
                tx.update(Path::Cell(id), Field::Cell(CellRecord { content, style }));
                tx.update(
                    Path::Position(sheet_id.clone(), position),
                    Field::CellId(id),
                );
            }
        }
    }
}

impl Plugin for CellPlugin {
    fn name(&self) -> &'static str {
        "cell"
    }

    fn allow_dispatch(&self, command: &Command, getters: &Getters) -> CommandResult {
        match command {
            Command::UpdateCell {
                sheet_id, col, row, ..
            }
            | Command::ClearCell { sheet_id, col, row } => {
                let (cols, rows) = getters.dimensions(sheet_id);
                if *col < cols && *row < rows {
                    Ok(())
                } else {
                    Err(CancelledReason::TargetOutOfSheet)
                }
            }
            Command::DeleteContent { sheet_id, target } => check_zones(getters, sheet_id, target),
            _ => Ok(()),
        }
    }

    fn handle(&self, command: &Command, tx: &mut Transaction) {
        match command {
            Command::UpdateCell {
                sheet_id,
                col,
                row,
                content,
                style,
            } => self.update_cell(
                tx,
                sheet_id,
                Position::new(*col, *row),
                content.as_deref(),
                *style,
            ),
            Command::ClearCell { sheet_id, col, row } => self.update_cell(
                tx,
                sheet_id,
                Position::new(*col, *row),
                Some(""),
                StyleChange::Clear,
            ),
            Command::DeleteContent { sheet_id, target } => {
                let mut positions: Vec<Position> = target
                    .iter()
                    .flat_map(|zone| tx.getters().state.cells_in_zone(sheet_id, zone))
                    .map(|(position, _)| position)
                    .collect();
                positions.sort_unstable();
                positions.dedup();
                for position in positions {
                    self.update_cell(tx, sheet_id, position, Some(""), StyleChange::Keep);
                }
            }
            _ => {}
        }
    }

    fn import(&self, data: &WorkbookData, tx: &mut Transaction) -> Result<()> {
        for sheet in &data.sheets {
            for (xc, cell) in &sheet.cells {
                let (col, row) = to_cartesian(xc)?;
                if col >= sheet.col_number || row >= sheet.row_number {
                    return Err(TabulaError::invalid(format!(
                        "cell {xc} lies outside sheet {:?}",
                        sheet.name
                    )));
                }
                if cell.content.is_empty() && cell.style.is_none() {
                    continue;
                }
                let id = CellId(tx.next_id(Path::NextCellId));
                tx.update(
                    Path::Cell(id),
                    Field::Cell(CellRecord {
                        content: cell.content.clone(),
                        style: cell.style,
                    }),
                );
                tx.update(
                    Path::Position(sheet.id.clone(), Position::new(col, row)),
                    Field::CellId(id),
                );
            }
        }
        Ok(())
    }

    fn export(&self, getters: &Getters, data: &mut WorkbookData) {
        for sheet_data in &mut data.sheets {
            let Some(sheet) = getters.sheet(&sheet_data.id) else {
                continue;
            };
            for (position, id) in &sheet.cells {
                if let Some(record) = getters.cell_record(*id) {
                    sheet_data.cells.insert(
                        to_xc(position.col, position.row),
                        CellData {
                            content: record.content.clone(),
                            style: record.style,
                        },
                    );
                }
            }
        }
    }
}
