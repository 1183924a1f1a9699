//! Incremental formula evaluation.
//!
//! The [`Evaluator`] keeps, for every formula cell, its compiled formula,
//! its evaluation state and its cached value. Changes reported through
//! [`Evaluator::apply_changes`] recompile what changed and mark the changed
//! cells and everything depending on them dirty; [`Evaluator::evaluate`]
//! then recomputes only the dirty cells, in dependency order.
//!
//! Asynchronous functions run on a single-threaded local executor. A call
//! with no result yet suspends its cell (`PendingAsync`); cells reading it
//! stay dirty until the result lands.

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::RemoteHandle;
use futures::task::LocalSpawnExt;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::cell::{CellId, SheetId, Workbook, is_formula};
use super::compiler::{Formula, Resolver, Suspended, compile, compile_error_value};
use super::coords::Position;
use super::cycle::{is_cycle, tarjan_scc};
use super::deps::{DependencyGraph, Target};
use super::error::EngineError;
use super::functions::{Compute, FunctionDescriptor, FunctionRegistry};
use super::reference::Reference;
use super::value::{CellError, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EvalState {
    Clean,
    Dirty,
    /// Transient, while the cell's own program runs.
    Evaluating,
    Error,
    PendingAsync,
}

/// What changed in the workbook since the last sync.
#[derive(Clone, Debug, Default)]
pub struct Changes {
    /// Cells whose content changed, or that were created or deleted.
    pub cells: HashSet<CellId>,
    /// Positions whose occupant changed.
    pub positions: HashSet<(SheetId, Position)>,
    /// Sheets were added, removed or renamed.
    pub sheets: bool,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.positions.is_empty() && !self.sheets
    }
}

#[derive(Clone, Debug)]
struct ResolvedCall {
    site: usize,
    args: Vec<Value>,
    value: Value,
}

#[derive(Debug)]
struct Node {
    text: String,
    formula: Result<Formula, EngineError>,
    state: EvalState,
    value: Value,
    generation: u64,
    resolved: Vec<ResolvedCall>,
    issued: Vec<IssuedCall>,
}

/// An outstanding async call. Dropping it cancels the task.
#[derive(Debug)]
struct IssuedCall {
    site: usize,
    args: Vec<Value>,
    _task: RemoteHandle<()>,
}

struct Completion {
    cell: CellId,
    generation: u64,
    site: usize,
    args: Vec<Value>,
    value: Value,
}

struct AsyncRuntime {
    pool: LocalPool,
    spawner: LocalSpawner,
    outbox: UnboundedSender<Completion>,
    inbox: UnboundedReceiver<Completion>,
}

impl AsyncRuntime {
    fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let (outbox, inbox) = unbounded();
        AsyncRuntime {
            pool,
            spawner,
            outbox,
            inbox,
        }
    }
}

pub struct Evaluator {
    registry: Rc<FunctionRegistry>,
    nodes: HashMap<CellId, Node>,
    graph: DependencyGraph,
    dirty: HashSet<CellId>,
    next_generation: u64,
    executions: u64,
    runtime: AsyncRuntime,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("formulas", &self.nodes.len())
            .field("dirty", &self.dirty.len())
            .field("executions", &self.executions)
            .field("pending_async", &self.pending_async())
            .finish()
    }
}

impl Evaluator {
    pub fn new(registry: Rc<FunctionRegistry>) -> Self {
        Evaluator {
            registry,
            nodes: HashMap::new(),
            graph: DependencyGraph::new(),
            dirty: HashSet::new(),
            next_generation: 0,
            executions: 0,
            runtime: AsyncRuntime::new(),
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Drop everything and recompile every formula of `book`.
    pub fn rebuild(&mut self, book: &dyn Workbook) {
        self.nodes.clear();
        self.graph.clear();
        self.dirty.clear();
        let cells = book.cell_ids();
        for &cell in &cells {
            if let Some(content) = book.cell_content(cell).filter(|c| is_formula(c)) {
                self.install(book, cell, content);
            }
        }
        tracing::debug!(formulas = self.nodes.len(), "rebuilt dependency graph");
        let all: Vec<CellId> = self.nodes.keys().copied().collect();
        self.mark_dirty(book, all);
        self.evaluate(book);
    }

    /// Recompile changed formulas and mark dirty everything the changes
    /// can reach. Does not evaluate.
    pub fn apply_changes(&mut self, book: &dyn Workbook, changes: &Changes) {
        if changes.is_empty() {
            return;
        }
        let mut seeds: Vec<CellId> = Vec::new();
        let mut positions: Vec<(SheetId, Position)> = changes.positions.iter().cloned().collect();

        for &cell in &changes.cells {
            match book.cell_content(cell).filter(|c| is_formula(c)) {
                Some(content) => {
                    let unchanged = self.nodes.get(&cell).is_some_and(|n| n.text == content);
                    if !unchanged {
                        self.install(book, cell, content);
                    }
                    seeds.push(cell);
                }
                None => self.remove_node(cell),
            }
            if let Some(position) = book.cell_position(cell) {
                positions.push(position);
            }
        }

        if changes.sheets {
            let cells: Vec<CellId> = self.nodes.keys().copied().collect();
            for cell in cells {
                if book.cell_position(cell).is_none() {
                    self.remove_node(cell);
                    continue;
                }
                let targets = self.targets_for(book, cell);
                if targets.as_slice() != self.graph.targets(cell) {
                    self.graph.set_edges(cell, targets);
                    seeds.push(cell);
                }
            }
        }

        for (sheet, position) in &positions {
            seeds.extend(self.graph.dependents_of(sheet, *position));
        }
        self.mark_dirty(book, seeds);
    }

    /// Recompute every dirty cell whose inputs are available.
    pub fn evaluate(&mut self, book: &dyn Workbook) {
        if self.dirty.is_empty() {
            return;
        }
        let mut order: Vec<CellId> = self.dirty.iter().copied().collect();
        order.sort_unstable();
        let index: HashMap<CellId, usize> =
            order.iter().enumerate().map(|(i, c)| (*c, i)).collect();

        let adjacency: Vec<Vec<usize>> = order
            .iter()
            .map(|cell| {
                self.graph
                    .targets(*cell)
                    .iter()
                    .flat_map(|t| book.cells_in_zone(&t.sheet, &t.zone))
                    .filter_map(|(_, id)| index.get(&id).copied())
                    .collect()
            })
            .collect();

        for component in tarjan_scc(&adjacency) {
            if is_cycle(&component, &adjacency) {
                for &i in &component {
                    let cell = order[i];
                    tracing::trace!(%cell, "circular reference");
                    if let Some(node) = self.nodes.get_mut(&cell) {
                        node.value = Value::Error(CellError::Cycle);
                        node.state = EvalState::Error;
                    }
                    self.dirty.remove(&cell);
                }
                continue;
            }
            self.evaluate_cell(book, order[component[0]]);
        }
    }

    /// Run the executor without blocking and land finished async results.
    /// Returns how many results were applied.
    pub fn process_async(&mut self, book: &dyn Workbook) -> usize {
        if self.pending_async() == 0 {
            return 0;
        }
        self.runtime.pool.run_until_stalled();
        self.drain(book, None)
    }

    /// Block until at least one outstanding async result lands. Returns 0
    /// only when nothing is outstanding.
    pub fn wait_for_async(&mut self, book: &dyn Workbook) -> usize {
        while self.pending_async() > 0 {
            let AsyncRuntime { pool, inbox, .. } = &mut self.runtime;
            let first = pool.run_until(inbox.next());
            pool.run_until_stalled();
            let landed = self.drain(book, first);
            if landed > 0 {
                return landed;
            }
        }
        0
    }

    /// Async calls issued by current formulas and not landed yet.
    pub fn pending_async(&self) -> usize {
        self.nodes.values().map(|n| n.issued.len()).sum()
    }

    /// Number of formula executions since creation.
    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub fn state(&self, cell: CellId) -> Option<EvalState> {
        self.nodes.get(&cell).map(|n| n.state)
    }

    pub fn formula(&self, cell: CellId) -> Option<&Formula> {
        self.nodes.get(&cell).and_then(|n| n.formula.as_ref().ok())
    }

    pub fn compile_error(&self, cell: CellId) -> Option<&EngineError> {
        self.nodes.get(&cell).and_then(|n| n.formula.as_ref().err())
    }

    pub fn is_dirty(&self, cell: CellId) -> bool {
        self.dirty.contains(&cell)
    }

    /// Cached value of a cell. Never evaluates.
    pub fn value(&self, book: &dyn Workbook, cell: CellId) -> Value {
        if let Some(node) = self.nodes.get(&cell) {
            return node.value.clone();
        }
        match book.cell_content(cell) {
            Some(content) if !is_formula(content) => Value::from_literal(content),
            _ => Value::Empty,
        }
    }

    pub fn value_at(&self, book: &dyn Workbook, sheet: &SheetId, position: Position) -> Value {
        book.cell_at(sheet, position)
            .map(|cell| self.value(book, cell))
            .unwrap_or_default()
    }

    fn install(&mut self, book: &dyn Workbook, cell: CellId, content: &str) {
        self.next_generation += 1;
        let formula = compile(content, &self.registry);
        if let Err(e) = &formula {
            tracing::trace!(%cell, error = %e, "formula does not compile");
        }
        self.nodes.insert(
            cell,
            Node {
                text: content.to_string(),
                formula,
                state: EvalState::Dirty,
                value: Value::Empty,
                generation: self.next_generation,
                resolved: Vec::new(),
                issued: Vec::new(),
            },
        );
        let targets = self.targets_for(book, cell);
        self.graph.set_edges(cell, targets);
    }

    fn remove_node(&mut self, cell: CellId) {
        self.nodes.remove(&cell);
        self.graph.remove(cell);
        self.dirty.remove(&cell);
    }

    fn targets_for(&self, book: &dyn Workbook, cell: CellId) -> Vec<Target> {
        let Some(formula) = self.formula(cell) else {
            return Vec::new();
        };
        let Some((host, _)) = book.cell_position(cell) else {
            return Vec::new();
        };
        formula
            .references
            .iter()
            .filter_map(|r| {
                let sheet = match &r.sheet {
                    Some(name) => book.sheet_by_name(name)?,
                    None => host.clone(),
                };
                Some(Target {
                    sheet,
                    zone: r.zone(),
                })
            })
            .collect()
    }

    /// Mark `seeds` and, through reverse edges, everything depending on them.
    fn mark_dirty(&mut self, book: &dyn Workbook, seeds: Vec<CellId>) {
        let mut queue: VecDeque<CellId> = seeds.into();
        while let Some(cell) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&cell) else {
                continue;
            };
            if !self.dirty.insert(cell) {
                continue;
            }
            node.state = EvalState::Dirty;
            if let Some((sheet, position)) = book.cell_position(cell) {
                queue.extend(self.graph.dependents_of(&sheet, position));
            }
        }
    }

    fn blocked(&self, book: &dyn Workbook, cell: CellId) -> bool {
        self.graph.targets(cell).iter().any(|t| {
            book.cells_in_zone(&t.sheet, &t.zone).iter().any(|(_, id)| {
                *id != cell
                    && self.nodes.get(id).is_some_and(|n| {
                        matches!(n.state, EvalState::Dirty | EvalState::PendingAsync)
                    })
            })
        })
    }

    fn evaluate_cell(&mut self, book: &dyn Workbook, cell: CellId) {
        if self.blocked(book, cell) {
            tracing::trace!(%cell, "waiting on dependencies");
            return;
        }
        let Some(mut node) = self.nodes.remove(&cell) else {
            self.dirty.remove(&cell);
            return;
        };
        node.state = EvalState::Evaluating;

        let (value, state) = match &node.formula {
            Err(e) => (compile_error_value(e), EvalState::Error),
            Ok(formula) => {
                self.executions += 1;
                let mut context = EvalContext {
                    book,
                    nodes: &self.nodes,
                    host: book.cell_position(cell).map(|(sheet, _)| sheet),
                    cell,
                    generation: node.generation,
                    resolved: &node.resolved,
                    issued: &mut node.issued,
                    runtime: &mut self.runtime,
                    calls: Vec::new(),
                };
                let outcome = formula.execute(&mut context);
                let calls = context.calls;
                forget_unused_calls(&mut node.resolved, &mut node.issued, &calls);
                match outcome {
                    Ok(value) => {
                        let state = if value.is_error() {
                            EvalState::Error
                        } else {
                            EvalState::Clean
                        };
                        (value, state)
                    }
                    Err(Suspended) => (node.value.clone(), EvalState::PendingAsync),
                }
            }
        };
        tracing::trace!(%cell, ?state, %value, "evaluated");
        node.value = value;
        node.state = state;
        self.nodes.insert(cell, node);
        self.dirty.remove(&cell);
    }

    fn drain(&mut self, book: &dyn Workbook, first: Option<Completion>) -> usize {
        let mut completions: Vec<Completion> = first.into_iter().collect();
        while let Some(Some(completion)) = self.runtime.inbox.next().now_or_never() {
            completions.push(completion);
        }

        let mut landed = Vec::new();
        for completion in completions {
            let cell = completion.cell;
            let issued = self.nodes.get_mut(&cell).and_then(|node| {
                if node.generation != completion.generation {
                    return None;
                }
                let index = node
                    .issued
                    .iter()
                    .position(|c| c.site == completion.site && c.args == completion.args)?;
                node.issued.swap_remove(index);
                Some(node)
            });
            match issued {
                Some(node) => {
                    node.resolved.push(ResolvedCall {
                        site: completion.site,
                        args: completion.args,
                        value: completion.value,
                    });
                    landed.push(cell);
                }
                _ => tracing::debug!(%cell, "discarding stale async result"),
            }
        }

        let count = landed.len();
        if count > 0 {
            self.mark_dirty(book, landed);
            self.evaluate(book);
        }
        count
    }
}

struct EvalContext<'a> {
    book: &'a dyn Workbook,
    nodes: &'a HashMap<CellId, Node>,
    host: Option<SheetId>,
    cell: CellId,
    generation: u64,
    resolved: &'a [ResolvedCall],
    issued: &'a mut Vec<IssuedCall>,
    runtime: &'a mut AsyncRuntime,
    /// Async calls reached by this execution, as (site, args).
    calls: Vec<(usize, Vec<Value>)>,
}

/// Drop memoized results and cancel outstanding calls that the latest
/// execution no longer asks for. Sites it did not reach are kept.
fn forget_unused_calls(
    resolved: &mut Vec<ResolvedCall>,
    issued: &mut Vec<IssuedCall>,
    calls: &[(usize, Vec<Value>)],
) {
    let keep = |site: usize, args: &[Value]| {
        calls.iter().any(|(s, a)| *s == site && a.as_slice() == args)
            || !calls.iter().any(|(s, _)| *s == site)
    };
    resolved.retain(|r| keep(r.site, &r.args));
    issued.retain(|c| keep(c.site, &c.args));
}

impl EvalContext<'_> {
    fn sheet_for(&self, reference: &Reference) -> Option<SheetId> {
        match &reference.sheet {
            Some(name) => self.book.sheet_by_name(name),
            None => self.host.clone(),
        }
    }

    fn value_of(&self, id: CellId) -> Value {
        if id == self.cell {
            return Value::Error(CellError::Cycle);
        }
        if let Some(node) = self.nodes.get(&id) {
            return node.value.clone();
        }
        match self.book.cell_content(id) {
            Some(content) if !is_formula(content) => Value::from_literal(content),
            _ => Value::Empty,
        }
    }
}

impl Resolver for EvalContext<'_> {
    fn resolve_cell(&mut self, reference: &Reference) -> Value {
        let Some(sheet) = self.sheet_for(reference) else {
            return Value::Error(CellError::Ref);
        };
        let position = Position::new(reference.start.col, reference.start.row);
        match self.book.cell_at(&sheet, position) {
            Some(id) => self.value_of(id),
            None => Value::Empty,
        }
    }

    fn resolve_range(&mut self, reference: &Reference) -> Vec<Value> {
        let Some(sheet) = self.sheet_for(reference) else {
            return vec![Value::Error(CellError::Ref)];
        };
        let mut cells = self.book.cells_in_zone(&sheet, &reference.zone());
        cells.sort_unstable_by_key(|(p, _)| (p.row, p.col));
        cells.into_iter().map(|(_, id)| self.value_of(id)).collect()
    }

    fn call_async(
        &mut self,
        site: usize,
        descriptor: &Rc<FunctionDescriptor>,
        args: &[Value],
    ) -> Option<Value> {
        self.calls.push((site, args.to_vec()));
        if let Some(done) = self
            .resolved
            .iter()
            .find(|r| r.site == site && r.args.as_slice() == args)
        {
            return Some(done.value.clone());
        }
        if self
            .issued
            .iter()
            .any(|c| c.site == site && c.args.as_slice() == args)
        {
            return None;
        }
        let Compute::Async(body) = &descriptor.compute else {
            return Some(Value::Error(CellError::Error));
        };

        let future = body(args);
        let outbox = self.runtime.outbox.clone();
        let completion_args = args.to_vec();
        let (cell, generation) = (self.cell, self.generation);
        let task = async move {
            let value = future.await;
            let _ = outbox.unbounded_send(Completion {
                cell,
                generation,
                site,
                args: completion_args,
                value,
            });
        };
        match self.runtime.spawner.spawn_local_with_handle(task) {
            Ok(handle) => {
                tracing::trace!(%cell, function = %descriptor.name, "issued async call");
                self.issued.push(IssuedCall {
                    site,
                    args: args.to_vec(),
                    _task: handle,
                });
                None
            }
            Err(e) => {
                tracing::warn!(%cell, error = %e, "could not spawn async call");
                Some(Value::Error(CellError::Error))
            }
        }
    }
}
