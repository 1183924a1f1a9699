//! Reconciling concurrent structural edits.
//!
//! Every writer's structural edit is stamped by a central sequencer with a
//! sequence number; `(seq, writer)` gives a total order that every replica
//! applies. Each edit was expressed against the state its writer saw, so
//! before it is applied it is rebased over every edit ordered before it.
//! Applying the same edits in a different order is not supported.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::reference::Reference;
use super::transform::{EditKind, StructuralEdit, rewrite_references, transform_reference};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SequencedEdit {
    pub seq: u64,
    pub writer: String,
    /// Name of the edited sheet.
    pub sheet: String,
    pub edit: StructuralEdit,
}

impl SequencedEdit {
    pub fn new(seq: u64, writer: &str, sheet: &str, edit: StructuralEdit) -> Self {
        SequencedEdit {
            seq,
            writer: writer.to_string(),
            sheet: sheet.to_string(),
            edit,
        }
    }

    fn order(&self, other: &Self) -> Ordering {
        (self.seq, &self.writer).cmp(&(other.seq, &other.writer))
    }
}

/// Rebase `edit` so it can be applied after `against`, both having been
/// expressed against the same state. A removal split by an insertion comes
/// back as two removals, to be applied in order; a removal swallowed by
/// an earlier one comes back empty.
pub fn rebase_edit(edit: &StructuralEdit, against: &StructuralEdit) -> Vec<StructuralEdit> {
    if edit.axis != against.axis || edit.count == 0 {
        return vec![*edit];
    }
    let (at, count) = (edit.at, edit.count);
    let moved = |at: usize, count: usize| StructuralEdit { at, count, ..*edit };

    match (against.kind, edit.kind) {
        (EditKind::Insert, EditKind::Insert) => {
            if at >= against.at {
                vec![moved(at + against.count, count)]
            } else {
                vec![*edit]
            }
        }
        (EditKind::Insert, EditKind::Remove) => {
            if against.at <= at {
                vec![moved(at + against.count, count)]
            } else if against.at < at + count {
                let head = against.at - at;
                vec![moved(at, head), moved(at + against.count, count - head)]
            } else {
                vec![*edit]
            }
        }
        (EditKind::Remove, EditKind::Insert) => {
            let removed_end = against.at + against.count;
            if at >= removed_end {
                vec![moved(at - against.count, count)]
            } else if at > against.at {
                vec![moved(against.at, count)]
            } else {
                vec![*edit]
            }
        }
        (EditKind::Remove, EditKind::Remove) => {
            let (lo, hi) = (at, at + count);
            let (rlo, rhi) = (against.at, against.at + against.count);
            let overlap = hi.min(rhi).saturating_sub(lo.max(rlo));
            let remaining = count - overlap;
            if remaining == 0 {
                return Vec::new();
            }
            let new_at = if lo < rlo {
                lo
            } else if lo >= rhi {
                lo - against.count
            } else {
                rlo
            };
            vec![moved(new_at, remaining)]
        }
    }
}

/// Order `edits` by `(seq, writer)` and rebase each over the ones before
/// it. The result is the list of edits to apply, in order.
pub fn linearize(edits: &[SequencedEdit]) -> Vec<SequencedEdit> {
    let mut ordered: Vec<&SequencedEdit> = edits.iter().collect();
    ordered.sort_by(|a, b| a.order(b));

    let mut applied: Vec<SequencedEdit> = Vec::new();
    for incoming in ordered {
        let mut pieces = vec![incoming.edit];
        for prior in &applied {
            if !prior.sheet.eq_ignore_ascii_case(&incoming.sheet) {
                continue;
            }
            pieces = pieces
                .iter()
                .flat_map(|piece| rebase_edit(piece, &prior.edit))
                .collect();
        }
        applied.extend(pieces.into_iter().map(|edit| SequencedEdit {
            edit,
            ..incoming.clone()
        }));
    }
    applied
}

/// Rewrite a reference held by a formula on `host_sheet` under a set of
/// concurrent edits. `None` stands for `#REF`.
pub fn rebase_reference(
    reference: &Reference,
    host_sheet: &str,
    edits: &[SequencedEdit],
) -> Option<Reference> {
    apply_linearized(reference, host_sheet, &linearize(edits))
}

fn apply_linearized(
    reference: &Reference,
    host_sheet: &str,
    linearized: &[SequencedEdit],
) -> Option<Reference> {
    let mut current = reference.clone();
    for step in linearized {
        if current.targets_sheet(host_sheet, &step.sheet) {
            current = transform_reference(&current, &step.edit, false)?;
        }
    }
    Some(current)
}

/// [`rebase_reference`] over every reference of a formula.
pub fn rebase_formula(formula: &str, host_sheet: &str, edits: &[SequencedEdit]) -> String {
    let linearized = linearize(edits);
    rewrite_references(formula, |reference| {
        Some(match apply_linearized(reference, host_sheet, &linearized) {
            Some(moved) => moved.to_string(),
            None => "#REF".to_string(),
        })
    })
}
