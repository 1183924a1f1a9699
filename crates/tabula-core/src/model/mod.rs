//! The command kernel.
//!
//! [`Model`] owns the workbook state, the plugins, the evaluator and the
//! history. Callers change it only through [`Model::dispatch`] and read it
//! only through [`Model::getters`].

mod command;
mod getters;
mod history;
mod io;
mod state;
mod transaction;

pub use command::{
    Align, CancelledReason, Command, CommandResult, Direction, Placement, Style, StyleChange,
};
pub use getters::Getters;
pub use history::{History, HistoryEntry};
pub use state::{
    CellRecord, Field, Header, Patch, Path, Selection, Sheet, WorkbookState, layout_headers,
};
pub use transaction::Transaction;

use std::rc::Rc;
use tabula_engine::engine::{Evaluator, FunctionRegistry, SheetId};

use crate::config::ModelConfig;
use crate::error::{Result, TabulaError};
use crate::plugins::{Plugin, default_plugins};
use crate::storage::WorkbookData;
use history::changes_of;

/// Id of the sheet a new model starts with.
pub const DEFAULT_SHEET_ID: &str = "sheet1";

pub struct Model {
    state: WorkbookState,
    plugins: Vec<Box<dyn Plugin>>,
    evaluator: Evaluator,
    history: History,
    config: ModelConfig,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("sheets", &self.state.visible_sheets)
            .field("cells", &self.state.cells.len())
            .field("history", &self.history.undo_len())
            .finish()
    }
}

impl Model {
    /// A model with one empty sheet and the default configuration.
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    pub fn with_config(config: ModelConfig) -> Self {
        Self::with_functions(config, FunctionRegistry::with_builtins())
    }

    /// A model with one empty sheet, evaluating with `functions`.
    pub fn with_functions(config: ModelConfig, functions: FunctionRegistry) -> Self {
        let mut model = Self::empty(config, functions);
        let created = model.dispatch(Command::CreateSheet {
            sheet_id: SheetId::from(DEFAULT_SHEET_ID),
            name: None,
            position: 0,
            cols: None,
            rows: None,
            activate: true,
        });
        debug_assert!(created.is_ok());
        model.history.clear();
        model
    }

    fn empty(config: ModelConfig, functions: FunctionRegistry) -> Self {
        Model {
            state: WorkbookState::default(),
            plugins: default_plugins(),
            evaluator: Evaluator::new(Rc::new(functions)),
            history: History::new(config.history_limit),
            config,
        }
    }

    /// Build a model from serialized data. Nothing is kept if any part of
    /// `data` is invalid.
    pub fn from_data(data: &WorkbookData, config: ModelConfig) -> Result<Self> {
        Self::from_data_with_functions(data, config, FunctionRegistry::with_builtins())
    }

    pub fn from_data_with_functions(
        data: &WorkbookData,
        config: ModelConfig,
        functions: FunctionRegistry,
    ) -> Result<Self> {
        if data.sheets.is_empty() {
            return Err(TabulaError::invalid("workbook has no sheets"));
        }
        let mut model = Self::empty(config, functions);
        {
            let mut tx = Transaction::new(
                &mut model.state,
                &model.plugins,
                &model.evaluator,
                &model.history,
                &model.config,
            );
            for plugin in &model.plugins {
                plugin.import(data, &mut tx).map_err(|err| {
                    tracing::warn!(plugin = plugin.name(), %err, "import failed");
                    err
                })?;
            }
        }
        model.evaluator.rebuild(&model.state);
        tracing::debug!(
            sheets = data.sheets.len(),
            cells = model.state.cells.len(),
            "imported workbook"
        );
        Ok(model)
    }

    /// Serialize the whole workbook.
    pub fn export(&self) -> WorkbookData {
        let getters = self.getters();
        let mut data = WorkbookData::default();
        for plugin in &self.plugins {
            plugin.export(&getters, &mut data);
        }
        data
    }

    pub fn getters(&self) -> Getters<'_> {
        Getters {
            state: &self.state,
            evaluator: &self.evaluator,
            history: &self.history,
            config: &self.config,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Validate and apply a command as one undoable step.
    pub fn dispatch(&mut self, command: Command) -> CommandResult {
        match command {
            Command::Undo => return self.undo(),
            Command::Redo => return self.redo(),
            _ => {}
        }

        let getters = self.getters();
        if let Some(sheet) = command.sheet_id() {
            if getters.sheet(sheet).is_none() {
                tracing::warn!(?command, "command refused: unknown sheet");
                return Err(CancelledReason::InvalidSheetId);
            }
        }
        for plugin in &self.plugins {
            if let Err(reason) = plugin.allow_dispatch(&command, &getters) {
                tracing::warn!(plugin = plugin.name(), ?command, %reason, "command refused");
                return Err(reason);
            }
        }

        let patches = {
            let mut tx = Transaction::new(
                &mut self.state,
                &self.plugins,
                &self.evaluator,
                &self.history,
                &self.config,
            );
            tx.dispatch(&command);
            tx.into_patches()
        };
        self.sync(&patches);
        tracing::debug!(?command, patches = patches.len(), "dispatched");
        self.history.push(HistoryEntry { patches });
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        let Some(entry) = self.history.pop_undo() else {
            return Err(CancelledReason::EmptyUndoStack);
        };
        entry.revert(&mut self.state);
        self.sync(&entry.patches);
        tracing::debug!(patches = entry.patches.len(), "undo");
        self.history.undone(entry);
        Ok(())
    }

    fn redo(&mut self) -> CommandResult {
        let Some(entry) = self.history.pop_redo() else {
            return Err(CancelledReason::EmptyRedoStack);
        };
        entry.replay(&mut self.state);
        self.sync(&entry.patches);
        tracing::debug!(patches = entry.patches.len(), "redo");
        self.history.redone(entry);
        Ok(())
    }

    /// Let the evaluator catch up with a list of writes.
    fn sync(&mut self, patches: &[Patch]) {
        let changes = changes_of(patches);
        self.evaluator.apply_changes(&self.state, &changes);
        self.evaluator.evaluate(&self.state);
    }

    /// Land finished async results without blocking. Returns how many
    /// results were applied.
    pub fn process_async(&mut self) -> usize {
        self.evaluator.process_async(&self.state)
    }

    /// Block until at least one pending async result lands.
    pub fn wait_for_async(&mut self) -> usize {
        self.evaluator.wait_for_async(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabula_engine::engine::{CellError, EvalState, Value};

    fn sheet1() -> SheetId {
        SheetId::from(DEFAULT_SHEET_ID)
    }

    fn set(model: &mut Model, col: usize, row: usize, content: &str) {
        model
            .dispatch(Command::update_cell(&sheet1(), col, row, content))
            .unwrap();
    }

    #[test]
    fn test_new_model_has_one_active_sheet() {
        let model = Model::new();
        let getters = model.getters();
        assert_eq!(getters.visible_sheets(), &[sheet1()]);
        assert_eq!(getters.active_sheet(), Some(&sheet1()));
        assert_eq!(getters.sheet_name(&sheet1()), Some("Sheet1"));
        assert_eq!(getters.dimensions(&sheet1()), (26, 100));
        assert!(!getters.can_undo());
    }

    #[test]
    fn test_dispatch_evaluates_dependents() {
        let mut model = Model::new();
        set(&mut model, 0, 0, "2");
        set(&mut model, 1, 0, "=A1*10");
        assert_eq!(model.getters().value(&sheet1(), 1, 0), Value::Number(20.0));
        set(&mut model, 0, 0, "3");
        assert_eq!(model.getters().value(&sheet1(), 1, 0), Value::Number(30.0));
        assert_eq!(model.getters().formatted(&sheet1(), 1, 0), "30");
    }

    #[test]
    fn test_undo_redo_replays_patches() {
        let mut model = Model::new();
        set(&mut model, 0, 0, "1");
        set(&mut model, 0, 1, "=A1+1");
        set(&mut model, 0, 0, "5");
        assert_eq!(model.getters().value(&sheet1(), 0, 1), Value::Number(6.0));

        model.dispatch(Command::Undo).unwrap();
        assert_eq!(model.getters().content(&sheet1(), 0, 0), "1");
        assert_eq!(model.getters().value(&sheet1(), 0, 1), Value::Number(2.0));

        model.dispatch(Command::Redo).unwrap();
        assert_eq!(model.getters().value(&sheet1(), 0, 1), Value::Number(6.0));
        assert_eq!(model.dispatch(Command::Redo), Err(CancelledReason::EmptyRedoStack));

        for _ in 0..3 {
            model.dispatch(Command::Undo).unwrap();
        }
        assert_eq!(model.dispatch(Command::Undo), Err(CancelledReason::EmptyUndoStack));
        assert!(model.getters().cell(&sheet1(), 0, 0).is_none());
    }

    #[test]
    fn test_undo_restores_identical_state() {
        let mut model = Model::new();
        set(&mut model, 1, 1, "=SUM(A1:A3)");
        set(&mut model, 0, 2, "4");
        model.dispatch(Command::SelectCell { col: 1, row: 1 }).unwrap();
        let before = model.state.clone();
        model
            .dispatch(Command::RemoveRows {
                sheet_id: sheet1(),
                rows: vec![0, 2],
            })
            .unwrap();
        assert_ne!(model.state, before);
        model.dispatch(Command::Undo).unwrap();
        assert_eq!(model.state, before);
        assert_eq!(model.getters().value(&sheet1(), 1, 1), Value::Number(4.0));
    }

    #[test]
    fn test_refused_command_changes_nothing() {
        let mut model = Model::new();
        set(&mut model, 0, 0, "1");
        let before = model.state.clone();
        let result = model.dispatch(Command::RemoveColumns {
            sheet_id: sheet1(),
            columns: (0..26).collect(),
        });
        assert_eq!(result, Err(CancelledReason::NotEnoughColumns));
        assert_eq!(model.state, before);
        assert_eq!(model.history.undo_len(), 1);
    }

    #[test]
    fn test_history_limit() {
        let config = ModelConfig {
            history_limit: Some(2),
            ..ModelConfig::default()
        };
        let mut model = Model::with_config(config);
        for i in 0..5 {
            set(&mut model, 0, 0, &i.to_string());
        }
        model.dispatch(Command::Undo).unwrap();
        model.dispatch(Command::Undo).unwrap();
        assert_eq!(model.getters().content(&sheet1(), 0, 0), "2");
        assert_eq!(model.dispatch(Command::Undo), Err(CancelledReason::EmptyUndoStack));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut model = Model::new();
        set(&mut model, 0, 0, "=B1");
        set(&mut model, 1, 0, "=A1");
        let getters = model.getters();
        assert_eq!(getters.value(&sheet1(), 0, 0), Value::Error(CellError::Cycle));
        assert_eq!(getters.value(&sheet1(), 1, 0), Value::Error(CellError::Cycle));
        assert_eq!(getters.eval_state(&sheet1(), 0, 0), Some(EvalState::Error));
    }

    #[test]
    fn test_unchanged_inputs_are_not_recomputed() {
        let mut model = Model::new();
        set(&mut model, 0, 0, "1");
        set(&mut model, 1, 0, "=A1+1");
        set(&mut model, 2, 0, "=5");
        let executions = model.evaluator().executions();
        set(&mut model, 0, 0, "2");
        assert_eq!(model.evaluator().executions(), executions + 1);
        assert_eq!(model.getters().value(&sheet1(), 2, 0), Value::Number(5.0));
    }

    #[test]
    fn test_import_rejects_bad_data() {
        let data = WorkbookData::default();
        assert!(Model::from_data(&data, ModelConfig::default()).is_err());
    }
}
