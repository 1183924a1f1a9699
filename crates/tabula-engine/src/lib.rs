//! tabula_engine - Spreadsheet formula engine.
//!
//! Addressing, formula tokenizer/parser/compiler, function registry,
//! incremental evaluator and the structural transforms shared with
//! collaborative editing.

pub(crate) mod builtins;
pub mod engine;

pub use engine::collab;
