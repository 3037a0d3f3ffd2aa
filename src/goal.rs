use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use smallvec::SmallVec;

use crate::cell::{Heap, ScopeId};
use crate::error::EngineError;
use crate::symbol::Sym;
use crate::term::{Term, Value};

/// Unique identifier for a goal in the GoalStore.
pub type GoalId = u32;

/// Unique identifier for a declared fact-set.
pub type FactSetId = u32;

/// An immutable goal description.
///
/// Goals are stored in a GoalStore and referenced by GoalId. Names inside
/// their terms are resolved against whichever scope is active when the goal
/// runs, so one goal tree serves every activation.
#[derive(Debug, Clone)]
pub enum Goal {
    /// Succeeds once.
    Yes,

    /// Always fails.
    No,

    /// Succeeds once; backtracking into it abandons the enclosing fact-set
    /// call.
    Cut,

    /// Succeeds once if the two terms unify.
    Unify(Term, Term),

    /// Conjunction: every goal in order, backtracking right to left.
    Seq(SmallVec<[GoalId; 4]>),

    /// Disjunction: alternatives in order.
    Choice(SmallVec<[GoalId; 2]>),

    /// Call a fact-set with argument terms.
    Facts(FactSetId, SmallVec<[Term; 4]>),

    /// A host-provided step.
    Leaf(Arc<dyn Primitive>, SmallVec<[Term; 4]>),
}

// ========== HOST LEAVES ==========

/// What a leaf decided for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fail,
    Succeed,
    /// Succeed after unifying each pair, read in the leaf's scope.
    Unify(SmallVec<[(Term, Term); 2]>),
}

impl Outcome {
    /// Succeed by unifying a single pair.
    pub fn unify(left: Term, right: Term) -> Self {
        let mut pairs = SmallVec::new();
        pairs.push((left, right));
        Outcome::Unify(pairs)
    }
}

/// A leaf's answer: now, or once a future resolves.
pub enum LeafPoll {
    Ready(Outcome),
    Pending(BoxFuture<'static, Outcome>),
}

impl fmt::Debug for LeafPoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafPoll::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            LeafPoll::Pending(_) => write!(f, "Pending(..)"),
        }
    }
}

impl From<Outcome> for LeafPoll {
    fn from(outcome: Outcome) -> Self {
        LeafPoll::Ready(outcome)
    }
}

/// What a leaf sees when it is asked for an outcome.
///
/// `attempt` is 0 on the first call and grows by one every time the search
/// backtracks into the leaf. Its own bindings are undone before each retry.
/// A leaf with a single answer returns `Fail` once `attempt > 0`; see
/// [`LeafCall::once`].
pub struct LeafCall<'a> {
    heap: &'a Heap,
    scope: ScopeId,
    args: &'a [Term],
    attempt: u32,
}

impl<'a> LeafCall<'a> {
    pub(crate) fn new(heap: &'a Heap, scope: ScopeId, args: &'a [Term], attempt: u32) -> Self {
        Self {
            heap,
            scope,
            args,
            attempt,
        }
    }

    pub fn args(&self) -> &'a [Term] {
        self.args
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Current value of argument `index`; `Null` if unbound or absent.
    pub fn arg(&self, index: usize) -> Result<Value, EngineError> {
        match self.args.get(index) {
            Some(term) => self.read(term),
            None => Ok(Value::Null),
        }
    }

    /// Materialize any term in the leaf's scope.
    pub fn read(&self, term: &Term) -> Result<Value, EngineError> {
        self.heap.materialize(term, self.scope)
    }

    /// `outcome` on the first attempt, `Fail` on every retry.
    pub fn once(&self, outcome: Outcome) -> LeafPoll {
        if self.attempt == 0 {
            LeafPoll::Ready(outcome)
        } else {
            LeafPoll::Ready(Outcome::Fail)
        }
    }
}

/// A host-provided goal step.
pub trait Primitive: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, call: &LeafCall<'_>) -> LeafPoll;
}

impl fmt::Debug for dyn Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Primitive({})", self.name())
    }
}

/// A `Primitive` made from a closure.
pub struct FnPrimitive<F> {
    name: String,
    f: F,
}

impl<F> FnPrimitive<F>
where
    F: Fn(&LeafCall<'_>) -> LeafPoll + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
        }
    }
}

impl<F> Primitive for FnPrimitive<F>
where
    F: Fn(&LeafCall<'_>) -> LeafPoll + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, call: &LeafCall<'_>) -> LeafPoll {
        (self.f)(call)
    }
}

// ========== CLAUSES ==========

/// One alternative of a fact-set: a head, an optional body, and the
/// body-local names. A clause may only use its head names and locals.
#[derive(Debug, Clone)]
pub struct Clause {
    head: SmallVec<[Term; 4]>,
    body: Option<GoalId>,
    locals: SmallVec<[Sym; 4]>,
    names: SmallVec<[Sym; 8]>,
}

impl Clause {
    /// A clause with no body: matching the head is the whole answer.
    pub fn fact(head: impl IntoIterator<Item = Term>) -> Self {
        Self::build(head.into_iter().collect(), None, SmallVec::new())
    }

    /// A clause whose body runs after the head matches.
    pub fn rule(head: impl IntoIterator<Item = Term>, body: GoalId) -> Self {
        Self::build(head.into_iter().collect(), Some(body), SmallVec::new())
    }

    /// Declare names used by the body but absent from the head.
    pub fn with_locals(self, locals: impl IntoIterator<Item = Sym>) -> Self {
        let mut all = self.locals;
        for sym in locals {
            if !all.contains(&sym) {
                all.push(sym);
            }
        }
        Self::build(self.head, self.body, all)
    }

    fn build(head: SmallVec<[Term; 4]>, body: Option<GoalId>, locals: SmallVec<[Sym; 4]>) -> Self {
        let mut names: SmallVec<[Sym; 8]> = SmallVec::new();
        for term in head.iter() {
            term.names(&mut names);
        }
        for sym in locals.iter() {
            if !names.contains(sym) {
                names.push(*sym);
            }
        }
        Self {
            head,
            body,
            locals,
            names,
        }
    }

    pub fn head(&self) -> &[Term] {
        &self.head
    }

    pub fn body(&self) -> Option<GoalId> {
        self.body
    }

    pub fn locals(&self) -> &[Sym] {
        &self.locals
    }

    /// Every name the clause scope holds: head names, then locals.
    pub fn names(&self) -> &[Sym] {
        &self.names
    }
}

/// A named set of clauses. `clauses` is `None` until defined.
#[derive(Debug, Clone)]
pub struct FactSet {
    name: String,
    clauses: Option<Vec<Clause>>,
}

impl FactSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_defined(&self) -> bool {
        self.clauses.is_some()
    }
}

// ========== STORE ==========

/// Storage for goals and fact-sets.
#[derive(Debug, Default)]
pub struct GoalStore {
    goals: Vec<Goal>,
    facts: Vec<FactSet>,
}

impl GoalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a goal and return its GoalId.
    pub fn add(&mut self, goal: Goal) -> GoalId {
        let id = self.goals.len() as GoalId;
        self.goals.push(goal);
        id
    }

    pub fn get(&self, id: GoalId) -> Option<&Goal> {
        self.goals.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn yes(&mut self) -> GoalId {
        self.add(Goal::Yes)
    }

    pub fn no(&mut self) -> GoalId {
        self.add(Goal::No)
    }

    pub fn cut(&mut self) -> GoalId {
        self.add(Goal::Cut)
    }

    pub fn unify(&mut self, left: Term, right: Term) -> GoalId {
        self.add(Goal::Unify(left, right))
    }

    /// Add a Seq goal. One step is that step; no steps is `Yes`.
    pub fn seq(&mut self, steps: impl IntoIterator<Item = GoalId>) -> GoalId {
        let steps: SmallVec<[GoalId; 4]> = steps.into_iter().collect();
        match steps.len() {
            0 => self.yes(),
            1 => steps[0],
            _ => self.add(Goal::Seq(steps)),
        }
    }

    /// Add a Choice goal. A choice with no alternatives is kept as is and
    /// rejected when it runs.
    pub fn choice(&mut self, alternatives: impl IntoIterator<Item = GoalId>) -> GoalId {
        let alternatives: SmallVec<[GoalId; 2]> = alternatives.into_iter().collect();
        if alternatives.len() == 1 {
            return alternatives[0];
        }
        self.add(Goal::Choice(alternatives))
    }

    /// Call fact-set `facts` with `args` read in the caller's scope.
    pub fn call(&mut self, facts: FactSetId, args: impl IntoIterator<Item = Term>) -> GoalId {
        self.add(Goal::Facts(facts, args.into_iter().collect()))
    }

    pub fn leaf(
        &mut self,
        primitive: Arc<dyn Primitive>,
        args: impl IntoIterator<Item = Term>,
    ) -> GoalId {
        self.add(Goal::Leaf(primitive, args.into_iter().collect()))
    }

    /// Register a fact-set name. Its clauses come later, so clause bodies
    /// can call it recursively.
    pub fn declare_facts(&mut self, name: &str) -> FactSetId {
        let id = self.facts.len() as FactSetId;
        self.facts.push(FactSet {
            name: name.to_string(),
            clauses: None,
        });
        id
    }

    pub fn define_facts(&mut self, id: FactSetId, clauses: Vec<Clause>) -> Result<(), EngineError> {
        let set = self
            .facts
            .get_mut(id as usize)
            .ok_or(EngineError::UnknownFacts(id))?;
        if set.clauses.is_some() {
            return Err(EngineError::FactsAlreadyDefined {
                name: set.name.clone(),
            });
        }
        set.clauses = Some(clauses);
        Ok(())
    }

    /// Declare and define in one go.
    pub fn facts(&mut self, name: &str, clauses: Vec<Clause>) -> FactSetId {
        let id = self.declare_facts(name);
        self.facts[id as usize].clauses = Some(clauses);
        id
    }

    pub fn fact_set(&self, id: FactSetId) -> Option<&FactSet> {
        self.facts.get(id as usize)
    }

    /// Clauses of a defined fact-set.
    pub fn clauses(&self, id: FactSetId) -> Result<&[Clause], EngineError> {
        let set = self
            .facts
            .get(id as usize)
            .ok_or(EngineError::UnknownFacts(id))?;
        set.clauses
            .as_deref()
            .ok_or_else(|| EngineError::UndefinedFacts {
                name: set.name.clone(),
            })
    }

    /// Iterator over all goals.
    pub fn iter(&self) -> impl Iterator<Item = (GoalId, &Goal)> {
        self.goals.iter().enumerate().map(|(i, g)| (i as GoalId, g))
    }
}

#[cfg(test)]
#[path = "tests/goal.rs"]
mod tests;
