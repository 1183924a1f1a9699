//! Commands accepted by [`crate::Model::dispatch`] and the reasons a
//! command can be refused.

use serde::{Deserialize, Serialize};
use tabula_engine::engine::{CellId, SheetId, Zone};
use thiserror::Error;

/// Why a command was refused. A refused command mutates nothing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
pub enum CancelledReason {
    #[error("sheet does not exist")]
    InvalidSheetId,
    #[error("a sheet with this id already exists")]
    DuplicatedSheetId,
    #[error("sheet name is empty or already taken")]
    WrongSheetName,
    #[error("sheet position is out of range")]
    WrongSheetPosition,
    #[error("sheet cannot move further in that direction")]
    WrongSheetMove,
    #[error("a workbook keeps at least one sheet")]
    NotEnoughSheets,
    #[error("a sheet keeps at least one column")]
    NotEnoughColumns,
    #[error("a sheet keeps at least one row")]
    NotEnoughRows,
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("target lies outside the sheet")]
    TargetOutOfSheet,
    #[error("another cell occupies the target")]
    TargetOccupied,
    #[error("sheet would outgrow the addressable grid")]
    SheetTooLarge,
    #[error("cell does not exist")]
    InvalidCellId,
    #[error("merging would discard cell content")]
    MergeIsDestructive,
    #[error("nothing to undo")]
    EmptyUndoStack,
    #[error("nothing to redo")]
    EmptyRedoStack,
}

pub type CommandResult = Result<(), CancelledReason>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

/// Where new columns or rows go relative to the base index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Before,
    After,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Visual attributes of a cell. Unset fields inherit nothing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
}

impl Style {
    /// `self` with every attribute set in `other` overriding it.
    pub fn merged(&self, other: &Style) -> Style {
        Style {
            fill_color: other.fill_color.clone().or_else(|| self.fill_color.clone()),
            text_color: other.text_color.clone().or_else(|| self.text_color.clone()),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.or(self.align),
            font_size: other.font_size.or(self.font_size),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Style::default()
    }
}

/// How an `UPDATE_CELL` treats the cell's style.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum StyleChange {
    #[default]
    Keep,
    Set(u64),
    Clear,
}

impl StyleChange {
    fn is_keep(&self) -> bool {
        *self == StyleChange::Keep
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    CreateSheet {
        sheet_id: SheetId,
        #[serde(default)]
        name: Option<String>,
        /// Index in the visible sheet order.
        position: usize,
        #[serde(default)]
        cols: Option<usize>,
        #[serde(default)]
        rows: Option<usize>,
        #[serde(default)]
        activate: bool,
    },
    DuplicateSheet {
        sheet_id_from: SheetId,
        sheet_id_to: SheetId,
        #[serde(default)]
        name: Option<String>,
    },
    RenameSheet {
        sheet_id: SheetId,
        name: String,
    },
    DeleteSheet {
        sheet_id: SheetId,
    },
    MoveSheet {
        sheet_id: SheetId,
        direction: Direction,
    },
    ActivateSheet {
        sheet_id: SheetId,
    },
    ResizeColumns {
        sheet_id: SheetId,
        columns: Vec<usize>,
        size: u32,
    },
    ResizeRows {
        sheet_id: SheetId,
        rows: Vec<usize>,
        size: u32,
    },
    AddColumns {
        sheet_id: SheetId,
        column: usize,
        position: Placement,
        quantity: usize,
    },
    AddRows {
        sheet_id: SheetId,
        row: usize,
        position: Placement,
        quantity: usize,
    },
    RemoveColumns {
        sheet_id: SheetId,
        columns: Vec<usize>,
    },
    RemoveRows {
        sheet_id: SheetId,
        rows: Vec<usize>,
    },
    UpdateCell {
        sheet_id: SheetId,
        col: usize,
        row: usize,
        /// New raw content; `None` leaves the content untouched.
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "StyleChange::is_keep")]
        style: StyleChange,
    },
    ClearCell {
        sheet_id: SheetId,
        col: usize,
        row: usize,
    },
    DeleteContent {
        sheet_id: SheetId,
        target: Vec<Zone>,
    },
    UpdateCellPosition {
        sheet_id: SheetId,
        cell_id: CellId,
        col: usize,
        row: usize,
    },
    AddMerge {
        sheet_id: SheetId,
        zone: Zone,
        #[serde(default)]
        force: bool,
    },
    RemoveMerge {
        sheet_id: SheetId,
        zone: Zone,
    },
    SetFormatting {
        sheet_id: SheetId,
        target: Vec<Zone>,
        style: Style,
    },
    ClearFormatting {
        sheet_id: SheetId,
        target: Vec<Zone>,
    },
    SelectCell {
        col: usize,
        row: usize,
    },
    SetSelection {
        anchor: (usize, usize),
        zones: Vec<Zone>,
    },
    Undo,
    Redo,
}

impl Command {
    /// The existing sheet this command operates on, if any. Commands that
    /// create a sheet name a sheet that does not exist yet and return `None`.
    pub fn sheet_id(&self) -> Option<&SheetId> {
        match self {
            Command::DuplicateSheet { sheet_id_from, .. } => Some(sheet_id_from),
            Command::RenameSheet { sheet_id, .. }
            | Command::DeleteSheet { sheet_id }
            | Command::MoveSheet { sheet_id, .. }
            | Command::ActivateSheet { sheet_id }
            | Command::ResizeColumns { sheet_id, .. }
            | Command::ResizeRows { sheet_id, .. }
            | Command::AddColumns { sheet_id, .. }
            | Command::AddRows { sheet_id, .. }
            | Command::RemoveColumns { sheet_id, .. }
            | Command::RemoveRows { sheet_id, .. }
            | Command::UpdateCell { sheet_id, .. }
            | Command::ClearCell { sheet_id, .. }
            | Command::DeleteContent { sheet_id, .. }
            | Command::UpdateCellPosition { sheet_id, .. }
            | Command::AddMerge { sheet_id, .. }
            | Command::RemoveMerge { sheet_id, .. }
            | Command::SetFormatting { sheet_id, .. }
            | Command::ClearFormatting { sheet_id, .. } => Some(sheet_id),
            Command::CreateSheet { .. }
            | Command::SelectCell { .. }
            | Command::SetSelection { .. }
            | Command::Undo
            | Command::Redo => None,
        }
    }

    pub fn update_cell(sheet_id: &SheetId, col: usize, row: usize, content: &str) -> Command {
        Command::UpdateCell {
            sheet_id: sheet_id.clone(),
            col,
            row,
            content: Some(content.to_string()),
            style: StyleChange::Keep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wire_format() {
        let json = r#"{"type":"ADD_COLUMNS","sheetId":"s1","column":2,"position":"after","quantity":3}"#;
        let command: Command = serde_json::from_str(json).unwrap();
        assert_eq!(
            command,
            Command::AddColumns {
                sheet_id: SheetId::from("s1"),
                column: 2,
                position: Placement::After,
                quantity: 3,
            }
        );
        assert_eq!(serde_json::to_string(&command).unwrap(), json);
        assert_eq!(serde_json::to_string(&Command::Undo).unwrap(), r#"{"type":"UNDO"}"#);
    }

    #[test]
    fn test_update_cell_defaults() {
        let command: Command =
            serde_json::from_str(r#"{"type":"UPDATE_CELL","sheetId":"s1","col":0,"row":1,"content":"=A1"}"#)
                .unwrap();
        assert_eq!(command, Command::update_cell(&SheetId::from("s1"), 0, 1, "=A1"));
        let styled: Command = serde_json::from_str(
            r#"{"type":"UPDATE_CELL","sheetId":"s1","col":0,"row":1,"style":{"kind":"set","id":4}}"#,
        )
        .unwrap();
        assert!(matches!(
            styled,
            Command::UpdateCell { content: None, style: StyleChange::Set(4), .. }
        ));
    }

    #[test]
    fn test_style_merge_overrides_set_fields_only() {
        let base = Style {
            bold: Some(true),
            fill_color: Some("#fff".into()),
            ..Style::default()
        };
        let patch = Style {
            fill_color: Some("#f00".into()),
            ..Style::default()
        };
        let merged = base.merged(&patch);
        assert_eq!(merged.bold, Some(true));
        assert_eq!(merged.fill_color.as_deref(), Some("#f00"));
        assert!(Style::default().is_empty());
    }
}
