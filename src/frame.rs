//! Frames and the per-kind state machines that drive them.
//!
//! A frame is one live instance of a goal. It receives a `Signal` from the
//! executor and answers with an `Action`; the executor in `engine` owns the
//! cursor and does the moving between frames. Frames never recurse into each
//! other, so search depth is bounded only by the arena.

use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use smallvec::SmallVec;

use crate::cell::{Heap, ScopeId};
use crate::error::EngineError;
use crate::goal::{FactSetId, Goal, GoalId, GoalStore, LeafCall, LeafPoll, Outcome, Primitive};
use crate::pool::{Pool, PoolCounts};
use crate::term::Term;
use crate::trail::TrailMark;
use crate::unify::UnifyFailure;

#[cfg(feature = "tracing")]
use crate::trace::{debug, trace};

/// Index of a frame in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u32);

impl FrameId {
    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Message delivered to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// First entry.
    Call,
    /// Produce the next solution.
    Redo,
    /// The given child succeeded.
    Exit(FrameId),
    /// The live child failed and has been torn down.
    Fail,
    /// The live child was cut and has been torn down.
    Cut,
    /// A pending leaf should poll its future again.
    Resume,
}

/// A frame's answer to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Descend { goal: GoalId, scope: ScopeId },
    Redo(FrameId),
    Exit,
    Fail,
    Cut,
    Pending,
}

enum FrameState {
    /// Created, not yet called.
    Fresh,
    /// `Yes` and `Unify`: succeeded once already.
    Spent,
    /// `Cut` after its single success.
    Armed,
    Seq {
        index: usize,
        children: SmallVec<[Option<FrameId>; 4]>,
    },
    Choice {
        index: usize,
        child: Option<FrameId>,
    },
    Facts {
        clause: usize,
        active: Option<ClauseActivation>,
    },
    Leaf {
        attempt: u32,
        pending: Option<BoxFuture<'static, Outcome>>,
    },
}

/// The clause a fact-set frame is currently inside.
#[derive(Debug, Clone, Copy)]
struct ClauseActivation {
    scope: ScopeId,
    mark: TrailMark,
    child: Option<FrameId>,
}

struct Frame {
    parent: Option<FrameId>,
    scope: ScopeId,
    goal: GoalId,
    mark: TrailMark,
    state: FrameState,
}

/// Arena of frames with a free list.
pub(crate) struct Frames {
    slots: Vec<Option<Frame>>,
    pool: Pool<FrameId>,
    live: usize,
}

impl Frames {
    pub(crate) fn new(pooling: bool, capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            pool: Pool::new(pooling),
            live: 0,
        }
    }

    pub(crate) fn spawn(
        &mut self,
        parent: Option<FrameId>,
        goal: GoalId,
        scope: ScopeId,
        mark: TrailMark,
    ) -> FrameId {
        let frame = Frame {
            parent,
            scope,
            goal,
            mark,
            state: FrameState::Fresh,
        };
        self.live += 1;
        if let Some(id) = self.pool.take() {
            self.slots[id.index()] = Some(frame);
            return id;
        }
        let id = FrameId(self.slots.len() as u32);
        self.slots.push(Some(frame));
        id
    }

    fn free(&mut self, id: FrameId) {
        if self.slots[id.index()].take().is_some() {
            self.live -= 1;
            self.pool.give(id);
        }
    }

    fn frame(&self, id: FrameId) -> &Frame {
        match &self.slots[id.index()] {
            Some(frame) => frame,
            None => panic!("frame {} used after it was freed", id.0),
        }
    }

    fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        match &mut self.slots[id.index()] {
            Some(frame) => frame,
            None => panic!("frame {} used after it was freed", id.0),
        }
    }

    pub(crate) fn parent(&self, id: FrameId) -> Option<FrameId> {
        self.frame(id).parent
    }

    /// Number of frames currently allocated.
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn pool_counts(&self) -> PoolCounts {
        self.pool.counts()
    }

    /// Record `child` as the live child for the parent's current position.
    pub(crate) fn attach(&mut self, parent: FrameId, child: FrameId) {
        match &mut self.frame_mut(parent).state {
            FrameState::Seq { index, children } => children[*index] = Some(child),
            FrameState::Choice { child: slot, .. } => *slot = Some(child),
            FrameState::Facts {
                active: Some(active),
                ..
            } => active.child = Some(child),
            _ => debug_assert!(false, "frame has no child slot"),
        }
    }

    fn detach(&mut self, parent: FrameId, child: FrameId) {
        match &mut self.frame_mut(parent).state {
            FrameState::Seq { children, .. } => {
                for slot in children.iter_mut() {
                    if *slot == Some(child) {
                        *slot = None;
                    }
                }
            }
            FrameState::Choice { child: slot, .. } => {
                if *slot == Some(child) {
                    *slot = None;
                }
            }
            FrameState::Facts {
                active: Some(active),
                ..
            } => {
                if active.child == Some(child) {
                    active.child = None;
                }
            }
            _ => {}
        }
    }

    /// Live children in creation order.
    fn children(&self, id: FrameId) -> SmallVec<[FrameId; 4]> {
        let mut out = SmallVec::new();
        match &self.frame(id).state {
            FrameState::Seq { children, .. } => out.extend(children.iter().flatten().copied()),
            FrameState::Choice {
                child: Some(child), ..
            } => out.push(*child),
            FrameState::Facts {
                active: Some(ClauseActivation {
                    child: Some(child), ..
                }),
                ..
            } => out.push(*child),
            _ => {}
        }
        out
    }
}

/// Everything a frame needs to advance.
pub(crate) struct Machine<'a> {
    pub heap: &'a mut Heap,
    pub frames: &'a mut Frames,
    pub goals: &'a GoalStore,
}

impl<'a> Machine<'a> {
    /// Deliver `signal` to frame `id`.
    pub(crate) fn advance(
        &mut self,
        id: FrameId,
        signal: Signal,
        cx: &mut Context<'_>,
    ) -> Result<Action, EngineError> {
        let goals: &'a GoalStore = self.goals;
        let goal_id = self.frames.frame(id).goal;
        let goal = goals.get(goal_id).ok_or(EngineError::UnknownGoal(goal_id))?;

        #[cfg(feature = "tracing")]
        trace!(frame = id.0, goal = goal_id, ?signal, "advance");

        let mut state = std::mem::replace(&mut self.frames.frame_mut(id).state, FrameState::Fresh);
        let action = match goal {
            Goal::Yes => Ok(handle_yes(&mut state, signal)),
            Goal::No => Ok(Action::Fail),
            Goal::Cut => Ok(self.handle_cut(&mut state, signal)),
            Goal::Unify(left, right) => self.handle_unify(id, &mut state, signal, left, right),
            Goal::Seq(steps) => Ok(self.handle_seq(id, &mut state, signal, steps)),
            Goal::Choice(alternatives) => {
                self.handle_choice(id, goal_id, &mut state, signal, alternatives)
            }
            Goal::Facts(facts, args) => self.handle_facts(id, &mut state, signal, *facts, args),
            Goal::Leaf(primitive, args) => {
                self.handle_leaf(id, &mut state, signal, primitive.as_ref(), args, cx)
            }
        };
        self.frames.frame_mut(id).state = state;
        action
    }

    fn handle_cut(&mut self, state: &mut FrameState, signal: Signal) -> Action {
        match signal {
            Signal::Call => {
                *state = FrameState::Armed;
                Action::Exit
            }
            _ => {
                self.heap.stats.cuts += 1;
                #[cfg(feature = "tracing")]
                trace!("cut_fired");
                Action::Cut
            }
        }
    }

    fn handle_unify(
        &mut self,
        id: FrameId,
        state: &mut FrameState,
        signal: Signal,
        left: &Term,
        right: &Term,
    ) -> Result<Action, EngineError> {
        if !matches!(signal, Signal::Call) {
            return Ok(Action::Fail);
        }
        let scope = self.frames.frame(id).scope;
        match self.heap.unify(left, scope, right, scope) {
            Ok(_) => {
                *state = FrameState::Spent;
                Ok(Action::Exit)
            }
            Err(UnifyFailure::Mismatch) => Ok(Action::Fail),
            Err(UnifyFailure::Malformed(err)) => Err(err),
        }
    }

    fn handle_seq(
        &mut self,
        id: FrameId,
        state: &mut FrameState,
        signal: Signal,
        steps: &[GoalId],
    ) -> Action {
        let scope = self.frames.frame(id).scope;
        match signal {
            Signal::Call => {
                if steps.is_empty() {
                    *state = FrameState::Spent;
                    return Action::Exit;
                }
                *state = FrameState::Seq {
                    index: 0,
                    children: std::iter::repeat(None).take(steps.len()).collect(),
                };
                Action::Descend {
                    goal: steps[0],
                    scope,
                }
            }
            Signal::Exit(_) => match state {
                FrameState::Seq { index, .. } => {
                    if *index + 1 >= steps.len() {
                        Action::Exit
                    } else {
                        *index += 1;
                        Action::Descend {
                            goal: steps[*index],
                            scope,
                        }
                    }
                }
                _ => Action::Fail,
            },
            Signal::Fail => match state {
                FrameState::Seq { index, children } => {
                    if *index == 0 {
                        return Action::Fail;
                    }
                    *index -= 1;
                    match children[*index] {
                        Some(child) => Action::Redo(child),
                        None => Action::Fail,
                    }
                }
                _ => Action::Fail,
            },
            Signal::Redo => match state {
                FrameState::Seq { index, children } => match children[*index] {
                    Some(child) => Action::Redo(child),
                    None => Action::Fail,
                },
                // An empty sequence has succeeded its one time.
                _ => Action::Fail,
            },
            Signal::Cut => Action::Cut,
            Signal::Resume => Action::Fail,
        }
    }

    fn handle_choice(
        &mut self,
        id: FrameId,
        goal_id: GoalId,
        state: &mut FrameState,
        signal: Signal,
        alternatives: &[GoalId],
    ) -> Result<Action, EngineError> {
        let scope = self.frames.frame(id).scope;
        Ok(match signal {
            Signal::Call => {
                if alternatives.is_empty() {
                    return Err(EngineError::EmptyChoice(goal_id));
                }
                *state = FrameState::Choice {
                    index: 0,
                    child: None,
                };
                Action::Descend {
                    goal: alternatives[0],
                    scope,
                }
            }
            Signal::Exit(_) => Action::Exit,
            Signal::Redo => match state {
                FrameState::Choice {
                    child: Some(child), ..
                } => Action::Redo(*child),
                _ => Action::Fail,
            },
            Signal::Fail => match state {
                FrameState::Choice { index, .. } => {
                    *index += 1;
                    match alternatives.get(*index) {
                        Some(&goal) => Action::Descend { goal, scope },
                        None => Action::Fail,
                    }
                }
                _ => Action::Fail,
            },
            Signal::Cut => Action::Cut,
            Signal::Resume => Action::Fail,
        })
    }

    fn handle_facts(
        &mut self,
        id: FrameId,
        state: &mut FrameState,
        signal: Signal,
        facts: FactSetId,
        args: &[Term],
    ) -> Result<Action, EngineError> {
        match signal {
            Signal::Call => {
                *state = FrameState::Facts {
                    clause: 0,
                    active: None,
                };
                self.try_clauses(id, state, facts, args)
            }
            Signal::Exit(_) => Ok(Action::Exit),
            Signal::Redo => {
                let child = match &*state {
                    FrameState::Facts {
                        active: Some(active),
                        ..
                    } => active.child,
                    _ => None,
                };
                match child {
                    Some(child) => Ok(Action::Redo(child)),
                    None => {
                        // A fact with no body answers once per clause.
                        self.retire_clause(state, true);
                        self.try_clauses(id, state, facts, args)
                    }
                }
            }
            Signal::Fail => {
                self.retire_clause(state, true);
                self.try_clauses(id, state, facts, args)
            }
            Signal::Cut => {
                #[cfg(feature = "tracing")]
                trace!(facts, "cut_reached_facts");
                self.retire_clause(state, false);
                Ok(Action::Fail)
            }
            Signal::Resume => Ok(Action::Fail),
        }
    }

    /// Undo the active clause and free its scope. With `advance`, the next
    /// attempt starts at the following clause.
    fn retire_clause(&mut self, state: &mut FrameState, advance: bool) {
        if let FrameState::Facts { clause, active } = state {
            if let Some(activation) = active.take() {
                self.heap.unbind_to(activation.mark);
                self.heap.release_scope(activation.scope);
            }
            if advance {
                *clause += 1;
            } else {
                *clause = usize::MAX;
            }
        }
    }

    /// Activate clauses from the current index until one head matches.
    fn try_clauses(
        &mut self,
        id: FrameId,
        state: &mut FrameState,
        facts: FactSetId,
        args: &[Term],
    ) -> Result<Action, EngineError> {
        let goals: &'a GoalStore = self.goals;
        let clauses = goals.clauses(facts)?;
        let caller_scope = self.frames.frame(id).scope;
        let (clause, active) = match state {
            FrameState::Facts { clause, active } => (clause, active),
            _ => return Ok(Action::Fail),
        };
        while *clause < clauses.len() {
            let candidate = &clauses[*clause];
            let scope = self.heap.new_scope();
            for &name in candidate.names() {
                self.heap.declare(scope, name);
            }
            self.heap.seal(scope);
            self.heap.stats.clauses += 1;
            let mark = self.heap.mark();

            #[cfg(feature = "tracing")]
            trace!(facts, clause = *clause, scope = scope.raw(), "clause_activated");

            match self
                .heap
                .unify_args(args, caller_scope, candidate.head(), scope)
            {
                Ok(_) => {
                    *active = Some(ClauseActivation {
                        scope,
                        mark,
                        child: None,
                    });
                    return Ok(match candidate.body() {
                        Some(body) => Action::Descend { goal: body, scope },
                        None => Action::Exit,
                    });
                }
                Err(UnifyFailure::Mismatch) => {
                    self.heap.release_scope(scope);
                    *clause += 1;
                }
                Err(UnifyFailure::Malformed(err)) => {
                    self.heap.release_scope(scope);
                    return Err(err);
                }
            }
        }
        Ok(Action::Fail)
    }

    fn handle_leaf(
        &mut self,
        id: FrameId,
        state: &mut FrameState,
        signal: Signal,
        primitive: &dyn Primitive,
        args: &[Term],
        cx: &mut Context<'_>,
    ) -> Result<Action, EngineError> {
        let (scope, mark) = {
            let frame = self.frames.frame(id);
            (frame.scope, frame.mark)
        };
        let mut future = match signal {
            Signal::Resume => match &mut *state {
                FrameState::Leaf { pending, .. } => match pending.take() {
                    Some(future) => future,
                    None => return Ok(Action::Fail),
                },
                _ => return Ok(Action::Fail),
            },
            Signal::Call | Signal::Redo => {
                let attempt = match (signal, &*state) {
                    (Signal::Call, _) => 0,
                    (_, FrameState::Leaf { attempt, .. }) => {
                        let next = attempt + 1;
                        self.heap.unbind_to(mark);
                        next
                    }
                    _ => return Ok(Action::Fail),
                };
                *state = FrameState::Leaf {
                    attempt,
                    pending: None,
                };
                let call = LeafCall::new(&*self.heap, scope, args, attempt);
                match primitive.call(&call) {
                    LeafPoll::Ready(outcome) => return self.apply_outcome(scope, mark, outcome),
                    LeafPoll::Pending(future) => future,
                }
            }
            _ => return Ok(Action::Fail),
        };

        match future.poll_unpin(cx) {
            Poll::Ready(outcome) => self.apply_outcome(scope, mark, outcome),
            Poll::Pending => {
                #[cfg(feature = "tracing")]
                debug!(frame = id.0, leaf = primitive.name(), "leaf_pending");
                if let FrameState::Leaf { pending, .. } = &mut *state {
                    *pending = Some(future);
                }
                Ok(Action::Pending)
            }
        }
    }

    fn apply_outcome(
        &mut self,
        scope: ScopeId,
        mark: TrailMark,
        outcome: Outcome,
    ) -> Result<Action, EngineError> {
        match outcome {
            Outcome::Fail => Ok(Action::Fail),
            Outcome::Succeed => Ok(Action::Exit),
            Outcome::Unify(pairs) => {
                for (left, right) in pairs.iter() {
                    match self.heap.unify(left, scope, right, scope) {
                        Ok(_) => {}
                        Err(UnifyFailure::Mismatch) => {
                            self.heap.unbind_to(mark);
                            return Ok(Action::Fail);
                        }
                        Err(UnifyFailure::Malformed(err)) => return Err(err),
                    }
                }
                Ok(Action::Exit)
            }
        }
    }

    /// Tear down `root` and everything below it: undo its trail range, then
    /// free frames bottom-up, later children first, releasing clause scopes
    /// as their frames go. A pending leaf future is dropped with its frame.
    pub(crate) fn dispose(&mut self, root: FrameId) {
        let (mark, parent) = {
            let frame = self.frames.frame(root);
            (frame.mark, frame.parent)
        };
        self.heap.unbind_to(mark);

        let mut stack: SmallVec<[(FrameId, bool); 16]> = SmallVec::new();
        stack.push((root, false));
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                if let FrameState::Facts {
                    active: Some(activation),
                    ..
                } = &self.frames.frame(id).state
                {
                    let scope = activation.scope;
                    self.heap.release_scope(scope);
                }
                self.frames.free(id);
                continue;
            }
            stack.push((id, true));
            for child in self.frames.children(id) {
                stack.push((child, false));
            }
        }

        if let Some(parent) = parent {
            self.frames.detach(parent, root);
        }
    }
}

fn handle_yes(state: &mut FrameState, signal: Signal) -> Action {
    match signal {
        Signal::Call => {
            *state = FrameState::Spent;
            Action::Exit
        }
        _ => Action::Fail,
    }
}

#[cfg(test)]
#[path = "tests/frame.rs"]
mod tests;
