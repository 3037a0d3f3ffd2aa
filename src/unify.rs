use std::fmt;

use crate::cell::{CellId, Heap, Resolved, ScopeId};
use crate::error::EngineError;
use crate::term::{same_container, same_primitive, Term};
use crate::trail::{TrailEntry, TrailMark};

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// One pending equation: a term and its scope on each side.
pub(crate) type Pair = (Term, ScopeId, Term, ScopeId);

/// Work-list of pending equations. Pooled by the heap.
pub(crate) type Worklist = Vec<Pair>;

/// Why a unification did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnifyFailure {
    /// The terms do not match. Ordinary failure; the caller backtracks.
    Mismatch,
    /// The terms could not be read, e.g. a name missing from a sealed scope.
    Malformed(EngineError),
}

impl From<EngineError> for UnifyFailure {
    fn from(err: EngineError) -> Self {
        UnifyFailure::Malformed(err)
    }
}

impl fmt::Display for UnifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnifyFailure::Mismatch => write!(f, "terms do not unify"),
            UnifyFailure::Malformed(err) => write!(f, "{}", err),
        }
    }
}

impl Heap {
    /// Unify `left` (read in `left_scope`) with `right` (read in
    /// `right_scope`).
    ///
    /// On success returns the trail mark taken before the first binding, so
    /// the caller can undo exactly this unification. On failure every binding
    /// made along the way has already been undone.
    ///
    /// Uses an explicit work-list; nested containers never recurse. There is
    /// no occurs check.
    pub fn unify(
        &mut self,
        left: &Term,
        left_scope: ScopeId,
        right: &Term,
        right_scope: ScopeId,
    ) -> Result<TrailMark, UnifyFailure> {
        let mut work = self.worklists.take_or(Vec::new);
        work.push((left.clone(), left_scope, right.clone(), right_scope));
        self.run_unify(work)
    }

    /// Unify two argument lists position by position. Different lengths are
    /// a mismatch.
    pub fn unify_args(
        &mut self,
        left: &[Term],
        left_scope: ScopeId,
        right: &[Term],
        right_scope: ScopeId,
    ) -> Result<TrailMark, UnifyFailure> {
        if left.len() != right.len() {
            self.stats.unifications += 1;
            self.stats.unify_failures += 1;
            return Err(UnifyFailure::Mismatch);
        }
        let mut work = self.worklists.take_or(Vec::new);
        for (l, r) in left.iter().zip(right.iter()).rev() {
            work.push((l.clone(), left_scope, r.clone(), right_scope));
        }
        self.run_unify(work)
    }

    /// Bind `cell` to `term` read in `scope`. Fails only if the cell already
    /// holds a value that does not unify with `term`.
    pub fn bind(
        &mut self,
        cell: CellId,
        term: &Term,
        scope: ScopeId,
    ) -> Result<TrailMark, UnifyFailure> {
        self.unify(&Term::Cell(cell), scope, term, scope)
    }

    /// Make `a` an alias of `b`. A no-op when both already share a cell.
    pub fn alias(&mut self, a: CellId, b: CellId) -> Result<TrailMark, UnifyFailure> {
        self.unify(&Term::Cell(a), ScopeId::GLOBAL, &Term::Cell(b), ScopeId::GLOBAL)
    }

    /// Trail entries recorded after `mark`, oldest first.
    pub fn entries_since(&self, mark: TrailMark) -> &[TrailEntry] {
        self.trail().entries_since(mark)
    }

    fn run_unify(&mut self, mut work: Worklist) -> Result<TrailMark, UnifyFailure> {
        let start = self.mark();
        self.stats.unifications += 1;
        let outcome = self.drain(&mut work);
        work.clear();
        self.worklists.give(work);
        match outcome {
            Ok(()) => Ok(start),
            Err(failure) => {
                #[cfg(feature = "tracing")]
                trace!(?failure, "unify_failed");
                self.stats.unify_failures += 1;
                self.unbind_to(start);
                Err(failure)
            }
        }
    }

    fn drain(&mut self, work: &mut Worklist) -> Result<(), UnifyFailure> {
        while let Some((l, ls, r, rs)) = work.pop() {
            let left = self.resolve(&l, ls)?;
            let right = self.resolve(&r, rs)?;
            match (left, right) {
                (Resolved::Wild, _) | (_, Resolved::Wild) => {}
                (Resolved::Var(a), Resolved::Var(b)) => {
                    if a != b {
                        self.alias_unbound(a, b);
                    }
                }
                (Resolved::Var(a), Resolved::Value(term, scope)) => {
                    self.bind_unbound(a, term, scope);
                }
                (Resolved::Value(term, scope), Resolved::Var(b)) => {
                    self.bind_unbound(b, term, scope);
                }
                (Resolved::Value(lt, ls), Resolved::Value(rt, rs)) => {
                    match_values(&lt, ls, &rt, rs, work)?;
                }
            }
        }
        Ok(())
    }
}

/// Compare two dereferenced values, queueing the sub-equations of
/// containers. Work is pushed in reverse so it pops left to right.
fn match_values(
    left: &Term,
    ls: ScopeId,
    right: &Term,
    rs: ScopeId,
    work: &mut Worklist,
) -> Result<(), UnifyFailure> {
    if left.is_primitive() || right.is_primitive() {
        return if same_primitive(left, right) {
            Ok(())
        } else {
            Err(UnifyFailure::Mismatch)
        };
    }
    if ls == rs && same_container(left, right) {
        return Ok(());
    }
    match (left, right) {
        (Term::Array(a), Term::Array(b)) => {
            let (n, m) = (a.len(), b.len());
            // The rest equation is pushed first so it is solved last.
            match (a.rest(), b.rest()) {
                (None, None) => {
                    if n != m {
                        return Err(UnifyFailure::Mismatch);
                    }
                }
                (Some(rl), None) => {
                    if m < n {
                        return Err(UnifyFailure::Mismatch);
                    }
                    work.push((rl.clone(), ls, b.suffix(n), rs));
                }
                (None, Some(rr)) => {
                    if n < m {
                        return Err(UnifyFailure::Mismatch);
                    }
                    work.push((a.suffix(m), ls, rr.clone(), rs));
                }
                (Some(rl), Some(rr)) => {
                    if n <= m {
                        work.push((rl.clone(), ls, b.suffix(n), rs));
                    } else {
                        work.push((a.suffix(m), ls, rr.clone(), rs));
                    }
                }
            }
            let (left_items, right_items) = (a.items(), b.items());
            for (l, r) in left_items.iter().zip(right_items.iter()).rev() {
                work.push((l.clone(), ls, r.clone(), rs));
            }
            Ok(())
        }
        (Term::Record(a), Term::Record(b)) => {
            if a.fields.len() != b.fields.len() {
                return Err(UnifyFailure::Mismatch);
            }
            let start = work.len();
            for (key, lv) in a.fields.iter() {
                match b.get(*key) {
                    Some(rv) => work.push((lv.clone(), ls, rv.clone(), rs)),
                    None => return Err(UnifyFailure::Mismatch),
                }
            }
            work[start..].reverse();
            Ok(())
        }
        _ => Err(UnifyFailure::Mismatch),
    }
}

#[cfg(test)]
#[path = "tests/unify.rs"]
mod tests;
