//! Cell addressing and zone arithmetic.
//!
//! Provides bidirectional conversion between spreadsheet-style column letters
//! and cell addresses (e.g., "A1", "B2", "AA100") and zero-indexed
//! column/row coordinates, plus the [`Zone`] rectangle used everywhere a
//! region of a sheet is addressed.
//!
//! # Examples
//!
//! ```
//! use tabula_engine::engine::{to_cartesian, to_xc, Zone};
//!
//! assert_eq!(to_cartesian("B3").unwrap(), (1, 2));
//! assert_eq!(to_xc(26, 0), "AA1");
//! assert_eq!(Zone::parse("B2:C3").unwrap().area(), 4);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use super::error::EngineError;

/// A (col, row) pair, both 0-indexed.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    pub col: usize,
    pub row: usize,
}

impl Position {
    pub fn new(col: usize, row: usize) -> Position {
        Position { col, row }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_xc(self.col, self.row))
    }
}

/// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
pub fn number_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col as u128 + 1;
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}

/// Convert column letters to a 0-indexed column ("A" -> 0, "AA" -> 26).
/// Letters are case-insensitive.
pub fn letters_to_number(letters: &str) -> Result<usize, EngineError> {
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(EngineError::InvalidAddress(letters.to_string()));
    }
    let mut acc = 0usize;
    for c in letters.to_ascii_uppercase().bytes() {
        let digit = (c - b'A') as usize + 1;
        acc = acc
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| EngineError::InvalidAddress(letters.to_string()))?;
    }
    Ok(acc - 1)
}

fn xc_re() -> &'static Regex {
    static XC_RE: OnceLock<Regex> = OnceLock::new();
    XC_RE.get_or_init(|| {
        Regex::new(r"^(?<letters>[A-Za-z]+)(?<numbers>[0-9]+)$").expect("xc regex must compile")
    })
}

/// Convert an "XC" address to cartesian coordinates: "A1" -> (0, 0), "B3" -> (1, 2).
///
/// Lowercase input is accepted, fixed (`$`) markers are not.
pub fn to_cartesian(xc: &str) -> Result<(usize, usize), EngineError> {
    let invalid = || EngineError::InvalidAddress(xc.to_string());
    let caps = xc_re().captures(xc).ok_or_else(invalid)?;
    let col = letters_to_number(&caps["letters"])?;
    let row = caps["numbers"]
        .parse::<usize>()
        .ok()
        .and_then(|r| r.checked_sub(1))
        .ok_or_else(invalid)?;
    Ok((col, row))
}

/// Convert cartesian coordinates to an "XC" address: (1, 2) -> "B3".
pub fn to_xc(col: usize, row: usize) -> String {
    format!("{}{}", number_to_letters(col), row + 1)
}

/// A rectangular region of a sheet. Bounds are inclusive.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Zone {
    /// Build a zone from two corners in any order.
    pub fn new(left: usize, top: usize, right: usize, bottom: usize) -> Zone {
        Zone {
            top: top.min(bottom),
            left: left.min(right),
            bottom: top.max(bottom),
            right: left.max(right),
        }
    }

    pub fn single(col: usize, row: usize) -> Zone {
        Zone {
            top: row,
            left: col,
            bottom: row,
            right: col,
        }
    }

    /// Parse "B2" or "B2:C3". Corners may be given in any order.
    pub fn parse(text: &str) -> Result<Zone, EngineError> {
        let text = text.trim();
        match text.split_once(':') {
            Some((a, b)) => {
                let (c1, r1) = to_cartesian(a.trim())?;
                let (c2, r2) = to_cartesian(b.trim())?;
                Ok(Zone::new(c1, r1, c2, r2))
            }
            None => {
                let (c, r) = to_cartesian(text)?;
                Ok(Zone::single(c, r))
            }
        }
    }

    pub fn top_left(&self) -> Position {
        Position::new(self.left, self.top)
    }

    pub fn is_single_cell(&self) -> bool {
        self.top == self.bottom && self.left == self.right
    }

    pub fn width(&self) -> usize {
        self.right - self.left + 1
    }

    pub fn height(&self) -> usize {
        self.bottom - self.top + 1
    }

    /// Number of cells; saturates instead of overflowing on huge zones.
    pub fn area(&self) -> usize {
        self.width().saturating_mul(self.height())
    }

    pub fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.left && col <= self.right && row >= self.top && row <= self.bottom
    }

    pub fn contains_zone(&self, other: &Zone) -> bool {
        self.left <= other.left
            && self.right >= other.right
            && self.top <= other.top
            && self.bottom >= other.bottom
    }

    pub fn intersects(&self, other: &Zone) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Smallest zone containing both.
    pub fn union(&self, other: &Zone) -> Zone {
        Zone {
            top: self.top.min(other.top),
            left: self.left.min(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.max(other.right),
        }
    }

    /// Row-major iteration over every position of the zone.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (self.top..=self.bottom)
            .flat_map(move |row| (self.left..=self.right).map(move |col| Position::new(col, row)))
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", to_xc(self.left, self.top))
        } else {
            write!(
                f,
                "{}:{}",
                to_xc(self.left, self.top),
                to_xc(self.right, self.bottom)
            )
        }
    }
}

impl std::str::FromStr for Zone {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_letters_single_and_multi() {
        assert_eq!(number_to_letters(0), "A");
        assert_eq!(number_to_letters(25), "Z");
        assert_eq!(number_to_letters(26), "AA");
        assert_eq!(number_to_letters(27), "AB");
        assert_eq!(number_to_letters(51), "AZ");
        assert_eq!(number_to_letters(52), "BA");
        assert_eq!(letters_to_number("A").unwrap(), 0);
        assert_eq!(letters_to_number("z").unwrap(), 25);
        assert_eq!(letters_to_number("AA").unwrap(), 26);
    }

    #[test]
    fn test_to_cartesian() {
        assert_eq!(to_cartesian("A1").unwrap(), (0, 0));
        assert_eq!(to_cartesian("B3").unwrap(), (1, 2));
        assert_eq!(to_cartesian("aA10").unwrap(), (26, 9));
    }

    #[test]
    fn test_to_cartesian_invalid_inputs() {
        for bad in ["", "123", "ABC", "A0", "1A", "A 1", "$A$1"] {
            assert!(
                matches!(to_cartesian(bad), Err(EngineError::InvalidAddress(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_letters_overflow_is_rejected() {
        let huge = format!("{}1", "Z".repeat(40));
        assert!(to_cartesian(&huge).is_err());
    }

    #[test]
    fn test_zone_parse_normalizes_corners() {
        let zone = Zone::parse("C3:B2").unwrap();
        assert_eq!(zone, Zone::new(1, 1, 2, 2));
        assert_eq!(zone.to_string(), "B2:C3");
        assert_eq!(Zone::parse("B2").unwrap().to_string(), "B2");
    }

    #[test]
    fn test_zone_arithmetic() {
        let a = Zone::parse("A1:B2").unwrap();
        let b = Zone::parse("B2:C3").unwrap();
        let c = Zone::parse("D4").unwrap();
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.union(&c).to_string(), "A1:D4");
        assert!(a.union(&b).contains_zone(&b));
        let cells: Vec<String> = a.positions().map(|p| p.to_string()).collect();
        assert_eq!(cells, vec!["A1", "B1", "A2", "B2"]);
    }

    proptest! {
        #[test]
        fn letters_round_trip(col in 0usize..100_000) {
            prop_assert_eq!(letters_to_number(&number_to_letters(col)).unwrap(), col);
        }

        #[test]
        fn xc_round_trip(col in 0usize..10_000, row in 0usize..1_000_000) {
            prop_assert_eq!(to_cartesian(&to_xc(col, row)).unwrap(), (col, row));
        }
    }
}
