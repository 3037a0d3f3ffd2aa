//! Engine - the top-level driver for queries.
//!
//! A query is run by a trampoline: the cursor names one frame and the signal
//! it is about to receive, and a flat loop advances that frame and moves the
//! cursor according to its answer. The loop returns to the caller when the
//! root frame succeeds (a solution), when the root frame fails (exhausted),
//! or when a host leaf is waiting on a future (pending).

use std::task::{Context, Poll};

use futures_util::future::poll_fn;
use futures_util::task::noop_waker_ref;

use crate::cell::{CellId, Heap, ScopeId};
use crate::error::EngineError;
use crate::frame::{Action, FrameId, Frames, Machine, Signal};
use crate::goal::{GoalId, GoalStore};
use crate::metrics::SolveStats;
use crate::pool::PoolStats;
use crate::symbol::Sym;
use crate::term::{Term, Value};
use crate::trace::report_stats;

#[cfg(feature = "tracing")]
use crate::trace::{debug, debug_span, trace};

/// Runtime knobs for an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reuse freed cells, scopes, frames and work-lists.
    pub pooling: bool,
    pub cell_capacity: usize,
    pub frame_capacity: usize,
    pub trail_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling: cfg!(feature = "pool"),
            cell_capacity: 1024,
            frame_capacity: 256,
            trail_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Defaults with pooling switched off.
    pub fn unpooled() -> Self {
        Self {
            pooling: false,
            ..Self::default()
        }
    }
}

/// Result of one non-blocking resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The root goal succeeded; bindings are readable.
    Solution,
    /// No more solutions; every binding has been undone.
    Exhausted,
    /// A host leaf is waiting on a future.
    Pending,
}

/// What `Query::cancel` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Every frame is gone and every binding undone.
    Complete,
    /// A leaf is pending; the teardown happens once it resolves.
    Deferred,
}

/// Owns the heap, the goal store and the frame arena.
///
/// One engine runs one query at a time: a `Query` borrows it mutably.
pub struct Engine {
    heap: Heap,
    goals: GoalStore,
    frames: Frames,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            heap: Heap::new(config.pooling, config.cell_capacity, config.trail_capacity),
            goals: GoalStore::new(),
            frames: Frames::new(config.pooling, config.frame_capacity),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn goals(&self) -> &GoalStore {
        &self.goals
    }

    pub fn goals_mut(&mut self) -> &mut GoalStore {
        &mut self.goals
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Direct access to binding, unification and the trail.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    // ========== TERMS & SCOPES ==========

    pub fn sym(&self, name: &str) -> Sym {
        self.heap.intern(name)
    }

    /// A variable term resolved against the active scope.
    pub fn name(&self, name: &str) -> Term {
        Term::Name(self.heap.intern(name))
    }

    pub fn atom(&self, name: &str) -> Term {
        Term::Atom(self.heap.intern(name))
    }

    /// A new unbound cell outside any scope.
    pub fn fresh(&mut self) -> CellId {
        self.heap.fresh()
    }

    /// A new unsealed root scope. The caller holds one reference.
    pub fn scope(&mut self) -> ScopeId {
        self.heap.new_scope()
    }

    pub fn declare(&mut self, scope: ScopeId, name: &str) -> CellId {
        let sym = self.heap.intern(name);
        self.heap.declare(scope, sym)
    }

    /// Bind `name` in `scope` to `term` for as long as the scope lives.
    /// Names inside `term` resolve in the global scope.
    pub fn define(&mut self, scope: ScopeId, name: &str, term: Term) {
        let sym = self.heap.intern(name);
        self.heap.define(scope, sym, term);
    }

    pub fn link(&mut self, scope: ScopeId, name: &str, cell: CellId) {
        let sym = self.heap.intern(name);
        self.heap.link(scope, sym, cell);
    }

    pub fn release_scope(&mut self, scope: ScopeId) {
        self.heap.release_scope(scope);
    }

    /// Materialize `term` read in `scope`, outside any query.
    pub fn read(&self, term: &Term, scope: ScopeId) -> Result<Value, EngineError> {
        self.heap.materialize(term, scope)
    }

    // ========== STATS ==========

    pub fn stats(&self) -> SolveStats {
        *self.heap.stats()
    }

    /// Log the current counters, then zero them.
    pub fn reset_stats(&mut self) {
        report_stats("reset", self.heap.stats());
        self.heap.stats.reset();
    }

    pub fn pool_stats(&self) -> PoolStats {
        let mut stats = self.heap.pool_stats();
        stats.frames = self.frames.pool_counts();
        stats
    }

    /// Frames currently allocated. Zero whenever no query is live.
    pub fn live_frames(&self) -> usize {
        self.frames.live()
    }

    // ========== QUERIES ==========

    /// Open a query without running it.
    pub fn query(&mut self, goal: GoalId, scope: ScopeId) -> Query<'_> {
        Query::new(self, goal, scope)
    }

    /// Open a query and run it to its first solution. A query that meets a
    /// pending leaf is returned suspended.
    pub fn ask(&mut self, goal: GoalId, scope: ScopeId) -> Result<Query<'_>, EngineError> {
        let mut query = self.query(goal, scope);
        query.resume()?;
        Ok(query)
    }

    /// Every solution, as the values of `names` in each.
    pub fn solutions(
        &mut self,
        goal: GoalId,
        scope: ScopeId,
        names: &[&str],
    ) -> Result<Vec<Vec<Value>>, EngineError> {
        let mut query = self.query(goal, scope);
        query.collect(|q| names.iter().map(|name| q.value(name)).collect())
    }

    /// The first solution's values of `names`, all of which must be bound.
    /// The query is torn down before returning either way.
    pub fn demand(
        &mut self,
        goal: GoalId,
        scope: ScopeId,
        names: &[&str],
    ) -> Result<Vec<Value>, EngineError> {
        let mut query = self.query(goal, scope);
        if !query.next()? {
            return Err(EngineError::NoSolution);
        }
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if !query.is_bound(name) {
                query.teardown();
                return Err(EngineError::CouldNotAnswer {
                    name: name.to_string(),
                });
            }
            out.push(query.value(name)?);
        }
        query.teardown();
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Solved,
    Suspended,
    Done,
}

/// A running query. Dropping it undoes every binding it made.
pub struct Query<'e> {
    engine: &'e mut Engine,
    goal: GoalId,
    scope: ScopeId,
    root: Option<FrameId>,
    cursor: Option<(FrameId, Signal)>,
    phase: Phase,
    cancel_requested: bool,
}

impl<'e> Query<'e> {
    fn new(engine: &'e mut Engine, goal: GoalId, scope: ScopeId) -> Self {
        engine.heap.retain_scope(scope);
        Self {
            engine,
            goal,
            scope,
            root: None,
            cursor: None,
            phase: Phase::Fresh,
            cancel_requested: false,
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Whether the query currently stands on a solution.
    pub fn found(&self) -> bool {
        self.phase == Phase::Solved
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn is_suspended(&self) -> bool {
        self.phase == Phase::Suspended
    }

    // ========== READING ==========

    pub fn read(&self, term: &Term) -> Result<Value, EngineError> {
        self.engine.heap.materialize(term, self.scope)
    }

    /// The value of `name` in the query's scope; `Null` if unbound.
    pub fn value(&self, name: &str) -> Result<Value, EngineError> {
        match self.engine.heap.symbols().get(name) {
            Some(sym) => self.read(&Term::Name(sym)),
            None => Ok(Value::Null),
        }
    }

    pub fn read_cell(&self, cell: CellId) -> Result<Value, EngineError> {
        self.read(&Term::Cell(cell))
    }

    /// `term` rendered for display.
    pub fn format(&self, term: &Term) -> Result<String, EngineError> {
        Ok(self.read(term)?.to_string())
    }

    /// Whether `name` holds a value, possibly a partial one.
    pub fn is_bound(&self, name: &str) -> bool {
        let heap = &self.engine.heap;
        heap.symbols()
            .get(name)
            .and_then(|sym| heap.find(self.scope, sym))
            .map_or(false, |cell| heap.is_bound(cell))
    }

    // ========== ENUMERATION ==========

    /// Advance to the next solution, blocking on nothing. A pending leaf is
    /// reported as `EngineError::Suspended`; the query stays resumable.
    pub fn next(&mut self) -> Result<bool, EngineError> {
        match self.resume()? {
            Step::Solution => Ok(true),
            Step::Exhausted => Ok(false),
            Step::Pending => Err(EngineError::Suspended),
        }
    }

    /// Advance without blocking, polling pending leaves with a no-op waker.
    pub fn resume(&mut self) -> Result<Step, EngineError> {
        let mut cx = Context::from_waker(noop_waker_ref());
        match self.poll_resume(&mut cx) {
            Poll::Ready(Ok(true)) => Ok(Step::Solution),
            Poll::Ready(Ok(false)) => Ok(Step::Exhausted),
            Poll::Ready(Err(err)) => Err(err),
            Poll::Pending => Ok(Step::Pending),
        }
    }

    /// Next solution, awaiting any pending leaf.
    pub async fn next_solution(&mut self) -> Result<bool, EngineError> {
        poll_fn(|cx| self.poll_resume(cx)).await
    }

    /// Drive the query until it has a solution, is exhausted, or waits on a
    /// leaf. `Ready(Ok(true))` is a solution.
    pub fn poll_resume(&mut self, cx: &mut Context<'_>) -> Poll<Result<bool, EngineError>> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("resume", goal = self.goal, phase = ?self.phase).entered();

        match self.phase {
            Phase::Done => return Poll::Ready(Ok(false)),
            Phase::Fresh => {
                let engine = &mut *self.engine;
                let mark = engine.heap.mark();
                let root = engine.frames.spawn(None, self.goal, self.scope, mark);
                engine.heap.stats.frames += 1;
                self.root = Some(root);
                self.cursor = Some((root, Signal::Call));
            }
            Phase::Solved => {
                self.cursor = self.root.map(|root| (root, Signal::Redo));
            }
            Phase::Suspended => {
                if self.cancel_requested {
                    return self.poll_cancel(cx);
                }
            }
        }
        self.drive(cx)
    }

    fn drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<bool, EngineError>> {
        let (mut frame, mut signal) = match self.cursor.take() {
            Some(cursor) => cursor,
            None => {
                self.phase = Phase::Done;
                return Poll::Ready(Ok(false));
            }
        };
        loop {
            let engine = &mut *self.engine;
            engine.heap.stats.steps += 1;
            let mut machine = Machine {
                heap: &mut engine.heap,
                frames: &mut engine.frames,
                goals: &engine.goals,
            };
            let action = match machine.advance(frame, signal, cx) {
                Ok(action) => action,
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    debug!(%err, "query_aborted");
                    self.teardown();
                    return Poll::Ready(Err(err));
                }
            };
            match action {
                Action::Descend { goal, scope } => {
                    let mark = machine.heap.mark();
                    let child = machine.frames.spawn(Some(frame), goal, scope, mark);
                    machine.frames.attach(frame, child);
                    machine.heap.stats.frames += 1;
                    frame = child;
                    signal = Signal::Call;
                }
                Action::Redo(child) => {
                    frame = child;
                    signal = Signal::Redo;
                }
                Action::Exit => match machine.frames.parent(frame) {
                    Some(parent) => {
                        signal = Signal::Exit(frame);
                        frame = parent;
                    }
                    None => {
                        machine.heap.stats.solutions += 1;
                        #[cfg(feature = "tracing")]
                        trace!("solution");
                        self.phase = Phase::Solved;
                        return Poll::Ready(Ok(true));
                    }
                },
                Action::Fail | Action::Cut => {
                    let parent = machine.frames.parent(frame);
                    machine.dispose(frame);
                    let next = if action == Action::Fail {
                        machine.heap.stats.backtracks += 1;
                        Signal::Fail
                    } else {
                        Signal::Cut
                    };
                    match parent {
                        Some(parent) => {
                            frame = parent;
                            signal = next;
                        }
                        None => {
                            #[cfg(feature = "tracing")]
                            trace!("exhausted");
                            self.root = None;
                            self.phase = Phase::Done;
                            return Poll::Ready(Ok(false));
                        }
                    }
                }
                Action::Pending => {
                    self.cursor = Some((frame, Signal::Resume));
                    self.phase = Phase::Suspended;
                    return Poll::Pending;
                }
            }
        }
    }

    /// Finish a cancel queued while a leaf was pending: wait for the leaf,
    /// then tear everything down.
    fn poll_cancel(&mut self, cx: &mut Context<'_>) -> Poll<Result<bool, EngineError>> {
        if let Some((frame, _)) = self.cursor {
            let engine = &mut *self.engine;
            let mut machine = Machine {
                heap: &mut engine.heap,
                frames: &mut engine.frames,
                goals: &engine.goals,
            };
            if let Ok(Action::Pending) = machine.advance(frame, Signal::Resume, cx) {
                return Poll::Pending;
            }
        }
        self.teardown();
        Poll::Ready(Ok(false))
    }

    /// Gather `f` of the current solution (if any) and every later one.
    pub fn collect<T>(
        &mut self,
        mut f: impl FnMut(&Self) -> Result<T, EngineError>,
    ) -> Result<Vec<T>, EngineError> {
        let mut out = Vec::new();
        if self.found() {
            out.push(f(self)?);
        }
        while self.next()? {
            out.push(f(self)?);
        }
        Ok(out)
    }

    /// Stop the query. While a leaf is pending the teardown is queued and
    /// runs on the next resume once the leaf resolves.
    pub fn cancel(&mut self) -> Teardown {
        if self.phase == Phase::Suspended {
            self.cancel_requested = true;
            return Teardown::Deferred;
        }
        self.teardown();
        Teardown::Complete
    }

    /// Dispose every live frame and undo every binding the query made.
    pub fn teardown(&mut self) {
        self.cursor = None;
        self.cancel_requested = false;
        if let Some(root) = self.root.take() {
            #[cfg(feature = "tracing")]
            debug!(frames = self.engine.frames.live(), "teardown");
            let engine = &mut *self.engine;
            let mut machine = Machine {
                heap: &mut engine.heap,
                frames: &mut engine.frames,
                goals: &engine.goals,
            };
            machine.dispose(root);
        }
        self.phase = Phase::Done;
    }
}

impl Drop for Query<'_> {
    fn drop(&mut self) {
        self.teardown();
        self.engine.heap.release_scope(self.scope);
    }
}

#[cfg(test)]
#[path = "tests/engine.rs"]
mod tests;
