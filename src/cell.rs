//! Binding cells, scopes and the heap that owns them.
//!
//! Every logical variable is a cell in one arena, addressed by `CellId`.
//! Cells are grouped into scopes that map names to cells; a clause
//! activation gets a fresh scope, which is what lets one clause body serve
//! many calls. A bound cell stores the value term *together with* the scope
//! that value's names resolve in, so values are shared, never copied.
//!
//! Every binding made through the heap is recorded on the trail and undone
//! by `unbind_to`. Scopes are reference counted (owning frame, bindings that
//! point into them); a scope and its cells go back to the pool only when the
//! count reaches zero.

use std::hash::BuildHasherDefault;

use hashbrown::{HashMap, HashSet};
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::metrics::SolveStats;
use crate::pool::{Pool, PoolCounts, PoolStats};
use crate::symbol::{Sym, Symbols};
use crate::term::{ArrayTerm, Term, Value};
use crate::trail::{Trail, TrailEntry, TrailMark};
use crate::unify::Worklist;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Handle of one logical variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a name-to-cell mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The scope that is never freed. Terms with no scope of their own
    /// resolve here.
    pub const GLOBAL: ScopeId = ScopeId(0);

    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Current state of a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Unbound,
    /// Reads through to another cell.
    Alias(CellId),
    /// A concrete value and the scope its names resolve in.
    Bound(Term, ScopeId),
}

/// A cell after following its alias chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Walked {
    Unbound(CellId),
    Bound(Term, ScopeId),
}

/// A term after following names, cells and aliases.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    Var(CellId),
    Wild,
    Value(Term, ScopeId),
}

type NameMap = HashMap<Sym, CellId, BuildHasherDefault<FxHasher>>;

#[derive(Debug)]
struct CellSlot {
    binding: Binding,
    owner: Option<ScopeId>,
    name: Option<Sym>,
}

#[derive(Debug, Default)]
struct ScopeSlot {
    names: NameMap,
    sealed: bool,
    refs: u32,
    live: bool,
}

/// The binding store: cells, scopes, the trail and their pools.
#[derive(Debug)]
pub struct Heap {
    cells: Vec<CellSlot>,
    scopes: Vec<ScopeSlot>,
    trail: Trail,
    symbols: Symbols,
    cell_pool: Pool<CellId>,
    scope_pool: Pool<ScopeId>,
    pub(crate) worklists: Pool<Worklist>,
    pub(crate) stats: SolveStats,
}

impl Heap {
    pub fn new(pooling: bool, cell_capacity: usize, trail_capacity: usize) -> Self {
        let global = ScopeSlot {
            names: NameMap::default(),
            sealed: false,
            refs: 1,
            live: true,
        };
        Self {
            cells: Vec::with_capacity(cell_capacity),
            scopes: vec![global],
            trail: Trail::with_capacity(trail_capacity),
            symbols: Symbols::new(),
            cell_pool: Pool::new(pooling),
            scope_pool: Pool::new(pooling),
            worklists: Pool::new(pooling),
            stats: SolveStats::default(),
        }
    }

    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    pub fn intern(&self, name: &str) -> Sym {
        self.symbols.intern(name)
    }

    pub fn stats(&self) -> &SolveStats {
        &self.stats
    }

    pub fn trail(&self) -> &Trail {
        &self.trail
    }

    /// Reuse counters of the heap's pools. Frames are counted by the engine.
    pub(crate) fn pool_stats(&self) -> PoolStats {
        PoolStats {
            cells: self.cell_pool.counts(),
            scopes: self.scope_pool.counts(),
            frames: PoolCounts::default(),
            worklists: self.worklists.counts(),
        }
    }

    // ========== CELLS ==========

    fn alloc_cell(&mut self, owner: Option<ScopeId>, name: Option<Sym>) -> CellId {
        if let Some(id) = self.cell_pool.take() {
            let slot = &mut self.cells[id.index()];
            debug_assert!(matches!(slot.binding, Binding::Unbound));
            slot.owner = owner;
            slot.name = name;
            return id;
        }
        let id = CellId(self.cells.len() as u32);
        self.cells.push(CellSlot {
            binding: Binding::Unbound,
            owner,
            name,
        });
        id
    }

    /// A new unbound cell that belongs to no scope. It lives as long as the
    /// heap.
    pub fn fresh(&mut self) -> CellId {
        self.alloc_cell(None, None)
    }

    pub fn binding(&self, cell: CellId) -> &Binding {
        &self.cells[cell.index()].binding
    }

    /// Scope that owns `cell`, if any.
    pub fn owner(&self, cell: CellId) -> Option<ScopeId> {
        self.cells[cell.index()].owner
    }

    pub fn cell_name(&self, cell: CellId) -> Option<Sym> {
        self.cells[cell.index()].name
    }

    /// Follow aliases from `cell` to an unbound cell or a value.
    pub fn walk(&self, cell: CellId) -> Walked {
        let mut current = cell;
        loop {
            match &self.cells[current.index()].binding {
                Binding::Unbound => return Walked::Unbound(current),
                Binding::Alias(next) => current = *next,
                Binding::Bound(term, scope) => return Walked::Bound(term.clone(), *scope),
            }
        }
    }

    pub fn is_bound(&self, cell: CellId) -> bool {
        matches!(self.walk(cell), Walked::Bound(..))
    }

    // ========== SCOPES ==========

    /// A new empty, unsealed scope holding one reference for the caller.
    pub fn new_scope(&mut self) -> ScopeId {
        let id = match self.scope_pool.take() {
            Some(id) => id,
            None => {
                self.scopes.push(ScopeSlot::default());
                ScopeId((self.scopes.len() - 1) as u32)
            }
        };
        let slot = &mut self.scopes[id.index()];
        debug_assert!(slot.names.is_empty());
        slot.sealed = false;
        slot.refs = 1;
        slot.live = true;
        id
    }

    /// The cell for `name` in `scope`, created if absent. Ignores sealing.
    pub fn declare(&mut self, scope: ScopeId, name: Sym) -> CellId {
        if let Some(&cell) = self.scopes[scope.index()].names.get(&name) {
            return cell;
        }
        let cell = self.alloc_cell(Some(scope), Some(name));
        self.scopes[scope.index()].names.insert(name, cell);
        cell
    }

    /// Make `name` in `scope` refer to an existing cell.
    pub fn link(&mut self, scope: ScopeId, name: Sym, cell: CellId) {
        self.scopes[scope.index()].names.insert(name, cell);
    }

    /// After sealing, looking up an absent name is an error instead of
    /// creating a cell.
    pub fn seal(&mut self, scope: ScopeId) {
        self.scopes[scope.index()].sealed = true;
    }

    pub fn is_sealed(&self, scope: ScopeId) -> bool {
        self.scopes[scope.index()].sealed
    }

    /// Resolve `name` in `scope` for execution.
    pub fn lookup(&mut self, scope: ScopeId, name: Sym) -> Result<CellId, EngineError> {
        let slot = &self.scopes[scope.index()];
        if let Some(&cell) = slot.names.get(&name) {
            return Ok(cell);
        }
        if slot.sealed {
            return Err(EngineError::UnknownName {
                name: self.symbols.describe(name),
            });
        }
        Ok(self.declare(scope, name))
    }

    /// Resolve `name` in `scope` without creating anything.
    pub fn find(&self, scope: ScopeId, name: Sym) -> Option<CellId> {
        self.scopes[scope.index()].names.get(&name).copied()
    }

    pub fn scope_refs(&self, scope: ScopeId) -> u32 {
        self.scopes[scope.index()].refs
    }

    pub fn is_live(&self, scope: ScopeId) -> bool {
        self.scopes[scope.index()].live
    }

    pub fn retain_scope(&mut self, scope: ScopeId) {
        self.scopes[scope.index()].refs += 1;
    }

    /// Drop one reference. At zero the scope's own cells are reset and
    /// pooled together with the scope.
    pub fn release_scope(&mut self, scope: ScopeId) {
        let mut pending: SmallVec<[ScopeId; 4]> = SmallVec::new();
        pending.push(scope);
        while let Some(s) = pending.pop() {
            if s == ScopeId::GLOBAL {
                continue;
            }
            let slot = &mut self.scopes[s.index()];
            if !slot.live {
                continue;
            }
            debug_assert!(slot.refs > 0, "scope released more often than retained");
            slot.refs = slot.refs.saturating_sub(1);
            if slot.refs > 0 {
                continue;
            }
            slot.live = false;
            slot.sealed = false;
            let mut names = std::mem::take(&mut slot.names);
            for (_, &cell) in names.iter() {
                let cell_slot = &mut self.cells[cell.index()];
                if cell_slot.owner != Some(s) {
                    continue;
                }
                match std::mem::replace(&mut cell_slot.binding, Binding::Unbound) {
                    Binding::Bound(_, target) => pending.push(target),
                    Binding::Alias(target) => {
                        if let Some(owner) = self.cells[target.index()].owner {
                            pending.push(owner);
                        }
                    }
                    Binding::Unbound => {}
                }
                let cell_slot = &mut self.cells[cell.index()];
                cell_slot.owner = None;
                cell_slot.name = None;
                self.cell_pool.give(cell);
            }
            names.clear();
            self.scopes[s.index()].names = names;
            self.scope_pool.give(s);

            #[cfg(feature = "tracing")]
            trace!(scope = s.raw(), "scope_freed");
        }
    }

    /// Bind `name` in `scope` permanently, outside the trail. Names inside
    /// `term` resolve in the global scope.
    pub fn define(&mut self, scope: ScopeId, name: Sym, term: Term) {
        let cell = self.declare(scope, name);
        self.retain_scope(ScopeId::GLOBAL);
        let old = std::mem::replace(
            &mut self.cells[cell.index()].binding,
            Binding::Bound(term, ScopeId::GLOBAL),
        );
        self.drop_binding(old);
    }

    fn drop_binding(&mut self, old: Binding) {
        match old {
            Binding::Bound(_, scope) => self.release_scope(scope),
            Binding::Alias(target) => {
                if let Some(owner) = self.owner(target) {
                    self.release_scope(owner);
                }
            }
            Binding::Unbound => {}
        }
    }

    // ========== BINDING & TRAIL ==========

    pub fn mark(&self) -> TrailMark {
        self.trail.mark()
    }

    /// Bind an unbound cell to a resolved value and trail it.
    pub(crate) fn bind_unbound(&mut self, cell: CellId, term: Term, scope: ScopeId) {
        debug_assert!(matches!(self.binding(cell), Binding::Unbound));
        debug_assert!(!matches!(term, Term::Name(_) | Term::Cell(_) | Term::Wild));
        self.retain_scope(scope);
        self.cells[cell.index()].binding = Binding::Bound(term, scope);
        self.trail.push(TrailEntry::Bind(cell));
        self.stats.bindings += 1;
    }

    /// Point an unbound cell at another unbound cell and trail it.
    pub(crate) fn alias_unbound(&mut self, from: CellId, to: CellId) {
        debug_assert!(from != to);
        debug_assert!(matches!(self.binding(from), Binding::Unbound));
        if let Some(owner) = self.owner(to) {
            self.retain_scope(owner);
        }
        self.cells[from.index()].binding = Binding::Alias(to);
        self.trail.push(TrailEntry::Alias(from));
        self.stats.bindings += 1;
    }

    /// Undo every trail entry newer than `mark`, newest first.
    pub fn unbind_to(&mut self, mark: TrailMark) {
        while let Some(entry) = self.trail.pop_above(mark) {
            let cell = entry.cell();
            let old = std::mem::replace(&mut self.cells[cell.index()].binding, Binding::Unbound);
            debug_assert!(
                match (entry, &old) {
                    (TrailEntry::Bind(_), Binding::Bound(..)) => true,
                    (TrailEntry::Alias(_), Binding::Alias(_)) => true,
                    _ => false,
                },
                "trail entry does not match the cell it reverts"
            );
            self.drop_binding(old);
            self.stats.undos += 1;
        }
    }

    // ========== READING ==========

    /// Follow names, cells and aliases.
    pub(crate) fn resolve(&mut self, term: &Term, scope: ScopeId) -> Result<Resolved, EngineError> {
        let cell = match term {
            Term::Name(name) => self.lookup(scope, *name)?,
            Term::Cell(cell) => *cell,
            Term::Wild => return Ok(Resolved::Wild),
            _ => return Ok(Resolved::Value(term.clone(), scope)),
        };
        Ok(match self.walk(cell) {
            Walked::Unbound(var) => Resolved::Var(var),
            Walked::Bound(value, value_scope) => Resolved::Value(value, value_scope),
        })
    }

    /// An owned snapshot of `term` read in `scope`. Unbound variables and
    /// unknown names become `Value::Null`. Never mutates the heap.
    ///
    /// Runs on an explicit task stack, and a chain of array rests is read as
    /// one array, so long lists neither recurse nor get copied per element.
    pub fn materialize(&self, term: &Term, scope: ScopeId) -> Result<Value, EngineError> {
        let mut visiting = CellSet::default();
        let mut tasks = vec![Task::Visit(term.clone(), scope)];
        let mut values: Vec<Value> = Vec::new();
        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(term, scope) => {
                    self.visit(term, scope, &mut visiting, &mut tasks, &mut values)?
                }
                Task::Leave(cell) => {
                    visiting.remove(&cell);
                }
                Task::Array { len, end } => {
                    let tail = match end {
                        ArrayEnd::Improper => values.pop(),
                        _ => None,
                    };
                    let items = values.split_off(values.len().saturating_sub(len));
                    values.push(match (end, tail) {
                        (ArrayEnd::Closed, _) => Value::Array(items),
                        (_, Some(tail)) => Value::Tail(items, Box::new(tail)),
                        (_, None) => Value::Partial(items),
                    });
                }
                Task::Record(keys) => {
                    let fields = values.split_off(values.len().saturating_sub(keys.len()));
                    values.push(Value::Record(keys.into_iter().zip(fields).collect()));
                }
            }
        }
        Ok(values.pop().unwrap_or(Value::Null))
    }

    fn visit(
        &self,
        term: Term,
        scope: ScopeId,
        visiting: &mut CellSet,
        tasks: &mut Vec<Task>,
        values: &mut Vec<Value>,
    ) -> Result<(), EngineError> {
        let leaf = match &term {
            Term::Bool(b) => Value::Bool(*b),
            Term::Int(n) => Value::Int(*n),
            Term::Float(x) => Value::Float(*x),
            Term::Str(s) => Value::Str(s.to_string()),
            Term::Atom(sym) => Value::Atom(self.symbols.describe(*sym)),
            Term::Wild => Value::Null,
            Term::Name(name) => match self.find(scope, *name) {
                Some(cell) => return self.enter(cell, visiting, tasks, values),
                None => Value::Null,
            },
            Term::Cell(cell) => return self.enter(*cell, visiting, tasks, values),
            Term::Array(array) => return self.push_array(array, scope, visiting, tasks),
            Term::Record(record) => {
                let keys = record
                    .fields
                    .iter()
                    .map(|(key, _)| self.symbols.describe(*key))
                    .collect();
                tasks.push(Task::Record(keys));
                for (_, value) in record.fields.iter().rev() {
                    tasks.push(Task::Visit(value.clone(), scope));
                }
                return Ok(());
            }
        };
        values.push(leaf);
        Ok(())
    }

    fn enter(
        &self,
        cell: CellId,
        visiting: &mut CellSet,
        tasks: &mut Vec<Task>,
        values: &mut Vec<Value>,
    ) -> Result<(), EngineError> {
        match self.walk(cell) {
            Walked::Unbound(_) => values.push(Value::Null),
            Walked::Bound(value, value_scope) => {
                if !visiting.insert(cell) {
                    return Err(EngineError::CyclicValue);
                }
                tasks.push(Task::Leave(cell));
                tasks.push(Task::Visit(value, value_scope));
            }
        }
        Ok(())
    }

    /// Queue one array, following its rest through bound cells and nested
    /// arrays until the chain ends.
    fn push_array(
        &self,
        array: &ArrayTerm,
        scope: ScopeId,
        visiting: &CellSet,
        tasks: &mut Vec<Task>,
    ) -> Result<(), EngineError> {
        let mut items: Vec<(Term, ScopeId)> =
            array.items().iter().map(|item| (item.clone(), scope)).collect();
        let mut chain = CellSet::default();
        let mut rest = array.rest().map(|rest| (rest.clone(), scope));
        let mut tail = None;
        let end = loop {
            let Some((term, term_scope)) = rest.take() else {
                break ArrayEnd::Closed;
            };
            let cell = match &term {
                Term::Wild => break ArrayEnd::Open,
                Term::Name(name) => match self.find(term_scope, *name) {
                    Some(cell) => Some(cell),
                    None => break ArrayEnd::Open,
                },
                Term::Cell(cell) => Some(*cell),
                _ => None,
            };
            let (value, value_scope) = match cell {
                None => (term, term_scope),
                Some(cell) => {
                    if visiting.contains(&cell) || !chain.insert(cell) {
                        return Err(EngineError::CyclicValue);
                    }
                    match self.walk(cell) {
                        Walked::Unbound(_) => break ArrayEnd::Open,
                        Walked::Bound(value, value_scope) => (value, value_scope),
                    }
                }
            };
            if let Term::Array(next) = &value {
                items.extend(next.items().iter().map(|item| (item.clone(), value_scope)));
                rest = next.rest().map(|rest| (rest.clone(), value_scope));
                continue;
            }
            tail = Some((value, value_scope));
            break ArrayEnd::Improper;
        };
        tasks.push(Task::Array {
            len: items.len(),
            end,
        });
        if let Some((value, value_scope)) = tail {
            tasks.push(Task::Visit(value, value_scope));
        }
        tasks.extend(items.into_iter().rev().map(|(item, scope)| Task::Visit(item, scope)));
        Ok(())
    }
}

type CellSet = HashSet<CellId, BuildHasherDefault<FxHasher>>;

/// Pending work while materializing.
enum Task {
    Visit(Term, ScopeId),
    /// Collect `len` item values (plus a tail when improper) into one array.
    Array { len: usize, end: ArrayEnd },
    Record(Vec<String>),
    Leave(CellId),
}

/// How a chain of array rests ended.
#[derive(Clone, Copy)]
enum ArrayEnd {
    Closed,
    Open,
    Improper,
}

#[cfg(test)]
#[path = "tests/cell.rs"]
mod tests;
