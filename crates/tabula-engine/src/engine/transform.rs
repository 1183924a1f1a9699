//! Reference rewriting under structural edits.
//!
//! A [`StructuralEdit`] inserts or removes a contiguous run of columns or
//! rows. In `(base, step)` terms an insertion of `count` elements at `at`
//! is `base = at - 1, step = +count`, a removal is
//! `base = at + count - 1, step = -count`: indices strictly after `base`
//! move by `step`, removed indices are gone.
//!
//! Rules for references:
//! - a removed row/column turns a single reference into `#REF`, absolute or not;
//! - absolute (`$`) axes are left in place unless the caller forces them;
//! - range bounds move independently: a low bound inside the removed run
//!   moves just past it, a high bound just before it; a range whose low
//!   bound ends up past its high bound is `#REF`; a range whose corners
//!   meet becomes a single reference.

use serde::{Deserialize, Serialize};

use super::coords::Zone;
use super::reference::{CellAddress, Reference};
use super::tokenizer::{TokenKind, tokenize};

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Axis {
    Column,
    Row,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EditKind {
    Insert,
    Remove,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StructuralEdit {
    pub axis: Axis,
    pub kind: EditKind,
    /// First inserted / removed index.
    pub at: usize,
    pub count: usize,
}

impl StructuralEdit {
    pub fn insert_columns(at: usize, count: usize) -> Self {
        StructuralEdit {
            axis: Axis::Column,
            kind: EditKind::Insert,
            at,
            count,
        }
    }

    pub fn remove_columns(at: usize, count: usize) -> Self {
        StructuralEdit {
            axis: Axis::Column,
            kind: EditKind::Remove,
            at,
            count,
        }
    }

    pub fn insert_rows(at: usize, count: usize) -> Self {
        StructuralEdit {
            axis: Axis::Row,
            kind: EditKind::Insert,
            at,
            count,
        }
    }

    pub fn remove_rows(at: usize, count: usize) -> Self {
        StructuralEdit {
            axis: Axis::Row,
            kind: EditKind::Remove,
            at,
            count,
        }
    }

    /// Last index left untouched (`-1` when inserting at 0).
    pub fn base(&self) -> isize {
        match self.kind {
            EditKind::Insert => self.at as isize - 1,
            EditKind::Remove => (self.at + self.count) as isize - 1,
        }
    }

    pub fn step(&self) -> isize {
        match self.kind {
            EditKind::Insert => self.count as isize,
            EditKind::Remove => -(self.count as isize),
        }
    }

    pub fn removes(&self, index: usize) -> bool {
        self.kind == EditKind::Remove && index >= self.at && index < self.at + self.count
    }

    /// Where `index` ends up, `None` if it is removed.
    pub fn map_index(&self, index: usize) -> Option<usize> {
        if self.removes(index) {
            return None;
        }
        if index as isize > self.base() {
            Some((index as isize + self.step()) as usize)
        } else {
            Some(index)
        }
    }
}

fn axis_value(address: &CellAddress, axis: Axis) -> (usize, bool) {
    match axis {
        Axis::Column => (address.col, address.col_fixed),
        Axis::Row => (address.row, address.row_fixed),
    }
}

fn with_axis_value(address: &CellAddress, axis: Axis, value: usize) -> CellAddress {
    let mut moved = *address;
    match axis {
        Axis::Column => moved.col = value,
        Axis::Row => moved.row = value,
    }
    moved
}

fn transform_index(index: usize, fixed: bool, edit: &StructuralEdit, force: bool) -> Option<usize> {
    if edit.removes(index) {
        return None;
    }
    if fixed && !force {
        return Some(index);
    }
    edit.map_index(index)
}

#[derive(Clone, Copy, PartialEq)]
enum Bound {
    Low,
    High,
}

fn transform_bound(
    index: usize,
    fixed: bool,
    bound: Bound,
    edit: &StructuralEdit,
    force: bool,
) -> Option<usize> {
    if edit.removes(index) {
        return match bound {
            Bound::Low => Some(edit.at),
            Bound::High => edit.at.checked_sub(1),
        };
    }
    transform_index(index, fixed, edit, force)
}

/// Rewrite one reference. `None` stands for `#REF`.
pub fn transform_reference(
    reference: &Reference,
    edit: &StructuralEdit,
    force_fixed: bool,
) -> Option<Reference> {
    let axis = edit.axis;
    let Some(end) = reference.end else {
        let (value, fixed) = axis_value(&reference.start, axis);
        let moved = transform_index(value, fixed, edit, force_fixed)?;
        return Some(Reference::cell(
            reference.sheet.clone(),
            with_axis_value(&reference.start, axis, moved),
        ));
    };

    let (start_value, start_fixed) = axis_value(&reference.start, axis);
    let (end_value, end_fixed) = axis_value(&end, axis);
    let (start_bound, end_bound) = if start_value <= end_value {
        (Bound::Low, Bound::High)
    } else {
        (Bound::High, Bound::Low)
    };
    let new_start = transform_bound(start_value, start_fixed, start_bound, edit, force_fixed)?;
    let new_end = transform_bound(end_value, end_fixed, end_bound, edit, force_fixed)?;
    let (low, high) = if start_bound == Bound::Low {
        (new_start, new_end)
    } else {
        (new_end, new_start)
    };
    if low > high {
        return None;
    }

    let start = with_axis_value(&reference.start, axis, new_start);
    let end = with_axis_value(&end, axis, new_end);
    if start.col == end.col && start.row == end.row {
        return Some(Reference::cell(reference.sheet.clone(), start));
    }
    Some(Reference::range(reference.sheet.clone(), start, end))
}

/// Rewrite a zone (merges, selections, style targets). `None` when the
/// zone disappears entirely.
pub fn transform_zone(zone: &Zone, edit: &StructuralEdit) -> Option<Zone> {
    let (low, high) = match edit.axis {
        Axis::Column => (zone.left, zone.right),
        Axis::Row => (zone.top, zone.bottom),
    };
    let low = transform_bound(low, false, Bound::Low, edit, false)?;
    let high = transform_bound(high, false, Bound::High, edit, false)?;
    if low > high {
        return None;
    }
    Some(match edit.axis {
        Axis::Column => Zone {
            left: low,
            right: high,
            ..*zone
        },
        Axis::Row => Zone {
            top: low,
            bottom: high,
            ..*zone
        },
    })
}

/// Replace every reference token of `formula` by what `rewrite` returns
/// for it (`None` keeps the token). Everything else is kept verbatim.
pub fn rewrite_references(
    formula: &str,
    mut rewrite: impl FnMut(&Reference) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;
    for token in tokenize(formula) {
        if token.kind != TokenKind::Reference {
            continue;
        }
        let Ok(reference) = Reference::parse(&token.value) else {
            continue;
        };
        if let Some(replacement) = rewrite(&reference) {
            out.push_str(&formula[last..token.start]);
            out.push_str(&replacement);
            last = token.end;
        }
    }
    out.push_str(&formula[last..]);
    out
}

/// Rewrite every reference of a formula hosted on `host_sheet` that points
/// at `edited_sheet`.
pub fn transform_formula(
    formula: &str,
    host_sheet: &str,
    edited_sheet: &str,
    edit: &StructuralEdit,
) -> String {
    rewrite_references(formula, |reference| {
        if !reference.targets_sheet(host_sheet, edited_sheet) {
            return None;
        }
        Some(match transform_reference(reference, edit, false) {
            Some(moved) => moved.to_string(),
            None => "#REF".to_string(),
        })
    })
}

/// Point references at `old_name` to `new_name`, re-quoting as needed.
pub fn rename_sheet_in_formula(formula: &str, old_name: &str, new_name: &str) -> String {
    rewrite_references(formula, |reference| {
        let sheet = reference.sheet.as_deref()?;
        if !sheet.eq_ignore_ascii_case(old_name) {
            return None;
        }
        let mut renamed = reference.clone();
        renamed.sheet = Some(new_name.to_string());
        Some(renamed.to_string())
    })
}

/// Turn references to a deleted sheet into `#REF`.
pub fn invalidate_sheet_in_formula(formula: &str, sheet_name: &str) -> String {
    rewrite_references(formula, |reference| {
        reference
            .sheet
            .as_deref()
            .filter(|s| s.eq_ignore_ascii_case(sheet_name))
            .map(|_| "#REF".to_string())
    })
}

fn offset_address(address: &CellAddress, dx: isize, dy: isize) -> Option<CellAddress> {
    let col = if address.col_fixed {
        address.col
    } else {
        address.col.checked_add_signed(dx)?
    };
    let row = if address.row_fixed {
        address.row
    } else {
        address.row.checked_add_signed(dy)?
    };
    Some(CellAddress { col, row, ..*address })
}

/// Shift the relative parts of every reference, as when copying a formula
/// `dx` columns and `dy` rows away. References pushed off the grid become
/// `#REF`.
pub fn offset_formula(formula: &str, dx: isize, dy: isize) -> String {
    if dx == 0 && dy == 0 {
        return formula.to_string();
    }
    rewrite_references(formula, |reference| {
        let start = offset_address(&reference.start, dx, dy);
        let end = reference.end.map(|e| offset_address(&e, dx, dy));
        Some(match (start, end) {
            (Some(start), None) => Reference::cell(reference.sheet.clone(), start).to_string(),
            (Some(start), Some(Some(end))) => {
                Reference::range(reference.sheet.clone(), start, end).to_string()
            }
            _ => "#REF".to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn t(reference: &str, edit: StructuralEdit) -> String {
        let r = Reference::parse(reference).unwrap();
        transform_reference(&r, &edit, false)
            .map(|r| r.to_string())
            .unwrap_or_else(|| "#REF".to_string())
    }

    #[test]
    fn test_base_and_step() {
        let insert = StructuralEdit::insert_columns(2, 3);
        assert_eq!((insert.base(), insert.step()), (1, 3));
        let remove = StructuralEdit::remove_rows(2, 3);
        assert_eq!((remove.base(), remove.step()), (4, -3));
        assert_eq!(StructuralEdit::insert_rows(0, 1).base(), -1);
    }

    #[test]
    fn test_single_references() {
        assert_eq!(t("C1", StructuralEdit::insert_columns(1, 2)), "E1");
        assert_eq!(t("A1", StructuralEdit::insert_columns(1, 2)), "A1");
        assert_eq!(t("B1", StructuralEdit::insert_columns(1, 1)), "C1");
        assert_eq!(t("A5", StructuralEdit::remove_rows(1, 2)), "A3");
        assert_eq!(t("A2", StructuralEdit::remove_rows(1, 2)), "#REF");
        assert_eq!(t("A3", StructuralEdit::remove_rows(1, 2)), "#REF");
        assert_eq!(t("Sheet2!D4", StructuralEdit::remove_columns(0, 1)), "Sheet2!C4");
    }

    #[test]
    fn test_fixed_axes() {
        assert_eq!(t("$C$1", StructuralEdit::insert_columns(0, 1)), "$C$1");
        assert_eq!(t("$C1", StructuralEdit::insert_rows(0, 1)), "$C2");
        assert_eq!(t("$C$1", StructuralEdit::remove_columns(2, 1)), "#REF");
        let r = Reference::parse("$C$1").unwrap();
        let forced = transform_reference(&r, &StructuralEdit::insert_columns(0, 1), true).unwrap();
        assert_eq!(forced.to_string(), "$D$1");
    }

    #[test]
    fn test_ranges() {
        assert_eq!(t("B1:D1", StructuralEdit::remove_columns(1, 1)), "B1:C1");
        assert_eq!(t("A1:D1", StructuralEdit::remove_columns(3, 1)), "A1:C1");
        assert_eq!(t("A1:A10", StructuralEdit::insert_rows(3, 2)), "A1:A12");
        assert_eq!(t("B1:C1", StructuralEdit::remove_columns(1, 2)), "#REF");
        assert_eq!(t("A1:B1", StructuralEdit::remove_columns(1, 1)), "A1");
        assert_eq!(t("A3:A10", StructuralEdit::remove_rows(1, 3)), "A2:A7");
        assert_eq!(t("A1:A1", StructuralEdit::remove_rows(0, 1)), "#REF");
        assert_eq!(t("'My sheet'!A1:C1", StructuralEdit::remove_columns(0, 1)), "'My sheet'!A1:B1");
    }

    #[test]
    fn test_zones() {
        let zone = Zone::parse("B2:C3").unwrap();
        assert_eq!(
            transform_zone(&zone, &StructuralEdit::insert_rows(0, 1)),
            Some(Zone::parse("B3:C4").unwrap())
        );
        assert_eq!(
            transform_zone(&zone, &StructuralEdit::remove_columns(1, 1)),
            Some(Zone::parse("B2:B3").unwrap())
        );
        assert_eq!(transform_zone(&zone, &StructuralEdit::remove_rows(0, 5)), None);
    }

    #[test]
    fn test_transform_formula_respects_sheets() {
        let edit = StructuralEdit::insert_columns(0, 1);
        assert_eq!(
            transform_formula("=A1+Sheet2!A1 + SUM(A1:B2)", "Sheet1", "Sheet1", &edit),
            "=B1+Sheet2!A1 + SUM(B1:C2)"
        );
        assert_eq!(
            transform_formula("=A1+sheet1!A1", "Sheet2", "Sheet1", &edit),
            "=A1+sheet1!B1"
        );
        assert_eq!(
            transform_formula("=A2*2", "Sheet1", "Sheet1", &StructuralEdit::remove_rows(1, 1)),
            "=#REF*2"
        );
    }

    #[test]
    fn test_sheet_rename_and_deletion() {
        assert_eq!(
            rename_sheet_in_formula("=Sheet2!A1+A1+'sheet2'!$B$2", "Sheet2", "My data"),
            "='My data'!A1+A1+'My data'!$B$2"
        );
        assert_eq!(
            invalidate_sheet_in_formula("=Sheet2!A1+A1", "Sheet2"),
            "=#REF+A1"
        );
    }

    #[test]
    fn test_offset_formula() {
        assert_eq!(offset_formula("=A1+$B$2+C$3", 1, 1), "=B2+$B$2+D$3");
        assert_eq!(offset_formula("=A1:B2", 0, 2), "=A3:B4");
        assert_eq!(offset_formula("=A1", -1, 0), "=#REF");
        assert_eq!(offset_formula("=\"A1\"&A1", 1, 0), "=\"A1\"&B1");
    }

    proptest! {
        #[test]
        fn insert_then_remove_is_identity(col in 0usize..200, row in 0usize..200, at in 0usize..100, count in 1usize..10) {
            let r = Reference::cell(None, CellAddress::new(col, row));
            for (ins, rem) in [
                (StructuralEdit::insert_columns(at, count), StructuralEdit::remove_columns(at, count)),
                (StructuralEdit::insert_rows(at, count), StructuralEdit::remove_rows(at, count)),
            ] {
                let moved = transform_reference(&r, &ins, false).unwrap();
                let back = transform_reference(&moved, &rem, false).unwrap();
                prop_assert_eq!(back, r.clone());
            }
        }

        #[test]
        fn transformed_ranges_stay_ordered(a in 0usize..50, b in 0usize..50, at in 0usize..60, count in 1usize..8) {
            let r = Reference::range(None, CellAddress::new(a.min(b), 0), CellAddress::new(a.max(b), 0));
            if let Some(moved) = transform_reference(&r, &StructuralEdit::remove_columns(at, count), false) {
                let zone = moved.zone();
                prop_assert!(zone.left <= zone.right);
                prop_assert!(zone.width() <= r.zone().width());
            }
        }
    }
}
