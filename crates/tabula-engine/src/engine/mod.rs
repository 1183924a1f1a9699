//! Spreadsheet engine API.
//!
//! This module provides the computation engine for the spreadsheet:
//!
//! - [`to_cartesian`], [`to_xc`], [`Zone`] - A1 addressing and zone arithmetic
//! - [`Reference`] - references as written in formulas
//! - [`tokenize`], [`parse`], [`compile`] - formula text to executable program
//! - [`FunctionRegistry`] - built-in and host-registered functions
//! - [`Evaluator`] - dependency graph, cycle detection, incremental and async evaluation
//! - [`transform_reference`], [`transform_formula`] - rewriting under row/column edits
//! - [`collab`] - ordering and rebasing of concurrent structural edits

mod cell;
pub mod collab;
mod compiler;
mod coords;
mod cycle;
mod deps;
mod error;
mod eval;
mod functions;
mod parser;
mod reference;
mod tokenizer;
mod transform;
mod value;

pub use cell::{CellId, SheetId, Workbook, is_formula};
pub use collab::{SequencedEdit, rebase_edit, rebase_formula, rebase_reference};
pub use compiler::{Formula, Op, Resolver, Suspended, compile, compile_error_value};
pub use coords::{Position, Zone, letters_to_number, number_to_letters, to_cartesian, to_xc};
pub use cycle::{is_cycle, tarjan_scc};
pub use deps::{DependencyGraph, Target};
pub use error::{EngineError, Result};
pub use eval::{Changes, EvalState, Evaluator};
pub use functions::{
    ArgSpec, ArgType, AsyncCompute, Compute, FunctionDescriptor, FunctionRegistry, SyncCompute,
    parse_args,
};
pub use parser::{Ast, BinaryOp, MAX_NESTING, UnaryOp, parse};
pub use reference::{
    CellAddress, MAX_COLS, MAX_ROWS, Reference, quote_sheet_name, sheet_name_needs_quotes, unquote_sheet_name,
};
pub use tokenizer::{Token, TokenKind, string_literal_value, tokenize};
pub use transform::{
    Axis, EditKind, StructuralEdit, invalidate_sheet_in_formula, offset_formula,
    rename_sheet_in_formula, rewrite_references, transform_formula, transform_reference,
    transform_zone,
};
pub use value::{CellError, Value, format_number};
