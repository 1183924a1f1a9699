use tabula_engine::engine::Evaluator;

use super::command::Command;
use super::getters::Getters;
use super::history::History;
use super::state::{Field, Patch, Path, WorkbookState};
use crate::config::ModelConfig;
use crate::plugins::Plugin;

/// The write side of one dispatch. Every change goes through
/// [`Transaction::update`], which records it for the history.
pub struct Transaction<'a> {
    state: &'a mut WorkbookState,
    patches: Vec<Patch>,
    plugins: &'a [Box<dyn Plugin>],
    evaluator: &'a Evaluator,
    history: &'a History,
    config: &'a ModelConfig,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        state: &'a mut WorkbookState,
        plugins: &'a [Box<dyn Plugin>],
        evaluator: &'a Evaluator,
        history: &'a History,
        config: &'a ModelConfig,
    ) -> Self {
        Transaction {
            state,
            patches: Vec::new(),
            plugins,
            evaluator,
            history,
            config,
        }
    }

    /// Write `value` at `path`. Writes that change nothing are not recorded.
    pub fn update(&mut self, path: Path, value: Field) {
        let old = self.state.read(&path);
        if old == value {
            return;
        }
        self.state.write(&path, value.clone());
        self.patches.push(Patch {
            path,
            old,
            new: value,
        });
    }

    /// Run a trusted sub-command through every plugin's `handle`, inside
    /// this transaction. No `allow_dispatch` checks are made.
    pub fn dispatch(&mut self, command: &Command) {
        let plugins = self.plugins;
        for plugin in plugins {
            plugin.handle(command, self);
        }
    }

    pub fn getters(&self) -> Getters<'_> {
        Getters {
            state: &*self.state,
            evaluator: self.evaluator,
            history: self.history,
            config: self.config,
        }
    }

    pub fn config(&self) -> &'a ModelConfig {
        self.config
    }

    /// Take a fresh id from a counter path.
    pub fn next_id(&mut self, counter: Path) -> u64 {
        let current = match self.state.read(&counter) {
            Field::Counter(n) => n,
            _ => 0,
        };
        self.update(counter, Field::Counter(current + 1));
        current
    }

    pub(crate) fn into_patches(self) -> Vec<Patch> {
        self.patches
    }
}
