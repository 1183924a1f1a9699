//! Undo/redo as replay of recorded patches.

use std::collections::VecDeque;
use tabula_engine::engine::Changes;

use super::state::{Patch, Path, WorkbookState};

/// The patches written by one top-level dispatch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryEntry {
    pub patches: Vec<Patch>,
}

impl HistoryEntry {
    /// Restore every `old` field, most recent write first.
    pub(crate) fn revert(&self, state: &mut WorkbookState) {
        for patch in self.patches.iter().rev() {
            state.write(&patch.path, patch.old.clone());
        }
    }

    /// Write every `new` field again, in recorded order.
    pub(crate) fn replay(&self, state: &mut WorkbookState) {
        for patch in &self.patches {
            state.write(&patch.path, patch.new.clone());
        }
    }
}

/// What a list of patches means for the evaluator.
pub(crate) fn changes_of(patches: &[Patch]) -> Changes {
    let mut changes = Changes::default();
    for patch in patches {
        match &patch.path {
            Path::Cell(cell) => {
                changes.cells.insert(*cell);
            }
            Path::Position(sheet, position) => {
                changes.positions.insert((sheet.clone(), *position));
            }
            Path::Sheet(_) | Path::SheetName(_) | Path::VisibleSheets => changes.sheets = true,
            _ => {}
        }
    }
    changes
}

#[derive(Debug, Default)]
pub struct History {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    limit: Option<usize>,
}

impl History {
    pub fn new(limit: Option<usize>) -> Self {
        History {
            limit,
            ..History::default()
        }
    }

    /// Record a new entry. Clears the redo stack and evicts the oldest
    /// entry once the limit is exceeded.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.redo.clear();
        self.undo.push_back(entry);
        if let Some(limit) = self.limit {
            while self.undo.len() > limit {
                self.undo.pop_front();
            }
        }
    }

    pub(crate) fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop_back()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    /// Re-stack an entry that was just undone.
    pub(crate) fn undone(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    /// Re-stack an entry that was just redone, keeping the redo stack.
    pub(crate) fn redone(&mut self, entry: HistoryEntry) {
        self.undo.push_back(entry);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::state::Field;
    use tabula_engine::engine::CellId;

    fn entry(counter: u64) -> HistoryEntry {
        HistoryEntry {
            patches: vec![Patch {
                path: Path::NextCellId,
                old: Field::Counter(counter),
                new: Field::Counter(counter + 1),
            }],
        }
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let mut history = History::new(Some(2));
        for i in 0..3 {
            history.push(entry(i));
        }
        assert_eq!(history.undo_len(), 2);
        assert_eq!(history.pop_undo(), Some(entry(2)));
        assert_eq!(history.pop_undo(), Some(entry(1)));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = History::new(None);
        history.push(entry(0));
        let undone = history.pop_undo().unwrap();
        history.undone(undone);
        assert!(history.can_redo());
        history.push(entry(1));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_revert_and_replay() {
        let mut state = WorkbookState::default();
        let e = entry(0);
        e.replay(&mut state);
        assert_eq!(state.next_cell_id, 1);
        e.revert(&mut state);
        assert_eq!(state.next_cell_id, 0);
    }

    #[test]
    fn test_changes_of_patches() {
        let patches = vec![Patch {
            path: Path::Cell(CellId(3)),
            old: Field::None,
            new: Field::None,
        }];
        let changes = changes_of(&patches);
        assert!(changes.cells.contains(&CellId(3)));
        assert!(!changes.sheets);
    }
}
