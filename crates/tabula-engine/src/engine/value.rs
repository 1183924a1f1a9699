//! Evaluated cell values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// In-band evaluation errors. They are data: they propagate through every
/// formula reading an erroring cell and serialize like any other value.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CellError {
    /// Reference to a removed row/column/sheet.
    #[serde(rename = "#REF")]
    Ref,
    /// Cell takes part in a circular reference.
    #[serde(rename = "#CYCLE")]
    Cycle,
    /// Wrong argument or operand type.
    #[serde(rename = "#VALUE")]
    Value,
    /// Unknown function or name.
    #[serde(rename = "#NAME")]
    Name,
    /// Anything else (syntax errors, failed async computations).
    #[serde(rename = "#ERROR")]
    Error,
}

impl CellError {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellError::Ref => "#REF",
            CellError::Cycle => "#CYCLE",
            CellError::Value => "#VALUE",
            CellError::Name => "#NAME",
            CellError::Error => "#ERROR",
        }
    }

    /// Parse an error literal as it appears in formula text (`#REF`, `#REF!`).
    pub fn from_literal(text: &str) -> Option<CellError> {
        match text.trim_end_matches('!').to_ascii_uppercase().as_str() {
            "#REF" => Some(CellError::Ref),
            "#CYCLE" => Some(CellError::Cycle),
            "#VALUE" => Some(CellError::Value),
            "#NAME" | "#NAME?" => Some(CellError::Name),
            "#ERROR" => Some(CellError::Error),
            _ => None,
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value of a cell after evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl Value {
    /// Interpret raw (non-formula) cell content.
    /// - Empty or whitespace -> Empty
    /// - Valid number -> Number
    /// - TRUE / FALSE (any case) -> Boolean
    /// - Otherwise -> Text
    pub fn from_literal(content: &str) -> Value {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Value::Empty;
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return Value::Number(n);
            }
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Boolean(false);
        }
        Value::Text(content.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn error(&self) -> Option<CellError> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Numeric coercion used by arithmetic operators.
    pub fn to_number(&self) -> Result<f64, CellError> {
        match self {
            Value::Empty => Ok(0.0),
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(0.0);
                }
                s.parse::<f64>().map_err(|_| CellError::Value)
            }
            Value::Error(e) => Err(*e),
        }
    }

    pub fn to_boolean(&self) -> Result<bool, CellError> {
        match self {
            Value::Empty => Ok(false),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Boolean(b) => Ok(*b),
            Value::Text(s) => {
                if s.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if s.eq_ignore_ascii_case("false") || s.is_empty() {
                    Ok(false)
                } else {
                    Err(CellError::Value)
                }
            }
            Value::Error(e) => Err(*e),
        }
    }

    pub fn to_text(&self) -> Result<String, CellError> {
        match self {
            Value::Error(e) => Err(*e),
            other => Ok(other.format()),
        }
    }

    /// Format the value for display.
    pub fn format(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Error(e) => e.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<CellError> for Value {
    fn from(e: CellError) -> Self {
        Value::Error(e)
    }
}

/// Format a number for display.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        let s = format!("{:.10}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
