//! tabula-core - the command kernel around the formula engine.
//!
//! A [`Model`] holds a workbook. Every change goes through
//! [`Model::dispatch`] as a [`Command`], is validated and applied by the
//! plugins, recorded for undo and followed by re-evaluation.

pub mod config;
pub mod error;
pub mod model;
pub mod plugins;
pub mod storage;

pub use config::ModelConfig;
pub use error::{Result, TabulaError};
pub use model::{
    CancelledReason, Command, CommandResult, Direction, Getters, Model, Placement, Style,
    StyleChange,
};

pub use tabula_engine::engine::{CellError, CellId, Position, SheetId, Value, Zone};
