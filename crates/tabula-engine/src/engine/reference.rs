//! References as they appear in formulas: `A1`, `$B$2`, `Sheet2!A1:C3`,
//! `'My sheet'!B$4`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use super::coords::{Zone, letters_to_number, number_to_letters};
use super::error::EngineError;

/// One corner of a reference, with per-axis absolute (`$`) markers.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellAddress {
    pub col: usize,
    pub row: usize,
    pub col_fixed: bool,
    pub row_fixed: bool,
}

impl CellAddress {
    pub fn new(col: usize, row: usize) -> CellAddress {
        CellAddress {
            col,
            row,
            col_fixed: false,
            row_fixed: false,
        }
    }

    fn parse(text: &str) -> Option<CellAddress> {
        let caps = address_re().captures(text)?;
        let col = letters_to_number(&caps["letters"]).ok()?;
        let row = caps["numbers"].parse::<usize>().ok()?.checked_sub(1)?;
        Some(CellAddress {
            col,
            row,
            col_fixed: !caps["cfix"].is_empty(),
            row_fixed: !caps["rfix"].is_empty(),
        })
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.col_fixed { "$" } else { "" },
            number_to_letters(self.col),
            if self.row_fixed { "$" } else { "" },
            self.row + 1
        )
    }
}

/// Columns addressable by the four letters `A`..`ZZZZ`.
pub const MAX_COLS: usize = 475_254;
/// Rows addressable by seven digits.
pub const MAX_ROWS: usize = 9_999_999;

fn address_re() -> &'static Regex {
    static ADDRESS_RE: OnceLock<Regex> = OnceLock::new();
    ADDRESS_RE.get_or_init(|| {
        Regex::new(r"^(?<cfix>\$?)(?<letters>[A-Za-z]{1,4})(?<rfix>\$?)(?<numbers>[0-9]{1,7})$")
            .expect("address regex must compile")
    })
}

/// A single cell or a range, optionally qualified by a sheet name.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Unquoted sheet name, if the reference is qualified.
    pub sheet: Option<String>,
    pub start: CellAddress,
    /// Second corner for ranges.
    pub end: Option<CellAddress>,
}

impl Reference {
    pub fn cell(sheet: Option<String>, address: CellAddress) -> Reference {
        Reference {
            sheet,
            start: address,
            end: None,
        }
    }

    pub fn range(sheet: Option<String>, start: CellAddress, end: CellAddress) -> Reference {
        Reference {
            sheet,
            start,
            end: Some(end),
        }
    }

    /// Parse a reference written in formula syntax.
    pub fn parse(text: &str) -> Result<Reference, EngineError> {
        let invalid = || EngineError::InvalidReference(text.to_string());
        let (sheet, body) = split_sheet(text).ok_or_else(invalid)?;
        let (start, end) = match body.split_once(':') {
            Some((a, b)) => (
                CellAddress::parse(a).ok_or_else(invalid)?,
                Some(CellAddress::parse(b).ok_or_else(invalid)?),
            ),
            None => (CellAddress::parse(body).ok_or_else(invalid)?, None),
        };
        Ok(Reference { sheet, start, end })
    }

    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }

    /// The normalized zone covered by this reference.
    pub fn zone(&self) -> Zone {
        let end = self.end.unwrap_or(self.start);
        Zone::new(self.start.col, self.start.row, end.col, end.row)
    }

    /// True when the reference targets `sheet`, given the sheet hosting the
    /// formula. Sheet names compare case-insensitively.
    pub fn targets_sheet(&self, host_sheet: &str, sheet: &str) -> bool {
        let target = self.sheet.as_deref().unwrap_or(host_sheet);
        target.eq_ignore_ascii_case(sheet)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        write!(f, "{}", self.start)?;
        if let Some(end) = &self.end {
            write!(f, ":{}", end)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Reference {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reference::parse(s)
    }
}

/// Split `Sheet!A1` / `'My sheet'!A1` into (unquoted sheet, address part).
fn split_sheet(text: &str) -> Option<(Option<String>, &str)> {
    if let Some(rest) = text.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    name.push('\'');
                    chars.next();
                    continue;
                }
                let tail = &rest[i + 1..];
                return tail.strip_prefix('!').map(|body| (Some(name), body));
            }
            name.push(c);
        }
        return None;
    }
    match text.rsplit_once('!') {
        Some((sheet, body)) if !sheet.is_empty() => Some((Some(sheet.to_string()), body)),
        Some(_) => None,
        None => Some((None, text)),
    }
}

/// Whether a sheet name must be quoted when written in a formula. Bare
/// names follow the tokenizer's `[A-Za-z_][A-Za-z0-9_.]*`.
pub fn sheet_name_needs_quotes(name: &str) -> bool {
    match name.chars().next() {
        None => true,
        Some(first) if !(first.is_ascii_alphabetic() || first == '_') => true,
        Some(_) => !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    }
}

/// Quote a sheet name for use in a formula (`My sheet` -> `'My sheet'`).
pub fn quote_sheet_name(name: &str) -> String {
    if sheet_name_needs_quotes(name) {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

/// Reverse of [`quote_sheet_name`].
pub fn unquote_sheet_name(name: &str) -> String {
    match name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => name.to_string(),
    }
}
