//! Dependency graph between formula cells and the regions they read.
//!
//! Forward edges map a formula cell to the `(sheet, zone)` regions its
//! references cover. The reverse index answers "which formulas read this
//! position": single cells through a hash map, ranges through a list that
//! is scanned.

use std::collections::{HashMap, HashSet};

use super::cell::{CellId, SheetId};
use super::coords::{Position, Zone};

/// A region read by a formula.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Target {
    pub sheet: SheetId,
    pub zone: Zone,
}

#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    edges: HashMap<CellId, Vec<Target>>,
    single: HashMap<(SheetId, Position), HashSet<CellId>>,
    ranges: Vec<(Target, CellId)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.edges.clear();
        self.single.clear();
        self.ranges.clear();
    }

    /// Replace every edge of `cell` at once.
    pub fn set_edges(&mut self, cell: CellId, targets: Vec<Target>) {
        self.remove(cell);
        for target in &targets {
            if target.zone.is_single_cell() {
                self.single
                    .entry((target.sheet.clone(), target.zone.top_left()))
                    .or_default()
                    .insert(cell);
            } else {
                self.ranges.push((target.clone(), cell));
            }
        }
        self.edges.insert(cell, targets);
    }

    pub fn remove(&mut self, cell: CellId) {
        let Some(old) = self.edges.remove(&cell) else {
            return;
        };
        for target in &old {
            if target.zone.is_single_cell() {
                let key = (target.sheet.clone(), target.zone.top_left());
                if let Some(set) = self.single.get_mut(&key) {
                    set.remove(&cell);
                    if set.is_empty() {
                        self.single.remove(&key);
                    }
                }
            }
        }
        if old.iter().any(|t| !t.zone.is_single_cell()) {
            self.ranges.retain(|(_, c)| *c != cell);
        }
    }

    pub fn targets(&self, cell: CellId) -> &[Target] {
        self.edges.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Formula cells reading `position` of `sheet`.
    pub fn dependents_of(&self, sheet: &SheetId, position: Position) -> HashSet<CellId> {
        let mut found: HashSet<CellId> = self
            .single
            .get(&(sheet.clone(), position))
            .cloned()
            .unwrap_or_default();
        found.extend(
            self.ranges
                .iter()
                .filter(|(t, _)| &t.sheet == sheet && t.zone.contains(position.col, position.row))
                .map(|(_, c)| *c),
        );
        found
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(sheet: &str, zone: &str) -> Target {
        Target {
            sheet: SheetId::from(sheet),
            zone: Zone::parse(zone).unwrap(),
        }
    }

    #[test]
    fn test_dependents_through_cells_and_ranges() {
        let mut graph = DependencyGraph::new();
        graph.set_edges(CellId(1), vec![target("s1", "A1")]);
        graph.set_edges(CellId(2), vec![target("s1", "A1:A10")]);
        graph.set_edges(CellId(3), vec![target("s2", "A1")]);

        let s1 = SheetId::from("s1");
        let found = graph.dependents_of(&s1, Position::new(0, 0));
        assert_eq!(found, HashSet::from([CellId(1), CellId(2)]));
        let found = graph.dependents_of(&s1, Position::new(0, 5));
        assert_eq!(found, HashSet::from([CellId(2)]));
    }

    #[test]
    fn test_set_edges_replaces_atomically() {
        let mut graph = DependencyGraph::new();
        let s1 = SheetId::from("s1");
        graph.set_edges(CellId(1), vec![target("s1", "A1"), target("s1", "B1:B3")]);
        graph.set_edges(CellId(1), vec![target("s1", "C1")]);
        assert!(graph.dependents_of(&s1, Position::new(0, 0)).is_empty());
        assert!(graph.dependents_of(&s1, Position::new(1, 1)).is_empty());
        assert_eq!(graph.targets(CellId(1)), &[target("s1", "C1")]);

        graph.remove(CellId(1));
        assert!(graph.is_empty());
        assert!(graph.dependents_of(&s1, Position::new(2, 0)).is_empty());
    }
}
