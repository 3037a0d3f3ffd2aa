use std::fmt;

use crate::goal::{FactSetId, GoalId};

/// Errors surfaced by the engine.
///
/// Unification failure is never an error: it is the ordinary way a branch
/// fails. These are conditions backtracking cannot recover from, plus the
/// two `demand` outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A goal id that the goal store never issued.
    UnknownGoal(GoalId),
    /// A fact-set id that the goal store never issued.
    UnknownFacts(FactSetId),
    /// A fact-set that was declared but never given clauses.
    UndefinedFacts { name: String },
    /// A fact-set defined twice.
    FactsAlreadyDefined { name: String },
    /// A name looked up in a sealed scope that does not hold it.
    UnknownName { name: String },
    /// A choice goal with no alternatives.
    EmptyChoice(GoalId),
    /// The synchronous API reached a leaf whose result is still pending.
    Suspended,
    /// The query has no solution.
    NoSolution,
    /// The query succeeded but left a requested output unbound.
    CouldNotAnswer { name: String },
    /// A value refers back to itself through a cell.
    CyclicValue,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnknownGoal(id) => write!(f, "unknown goal id {}", id),
            EngineError::UnknownFacts(id) => write!(f, "unknown fact-set id {}", id),
            EngineError::UndefinedFacts { name } => {
                write!(f, "fact-set '{}' was declared but never defined", name)
            }
            EngineError::FactsAlreadyDefined { name } => {
                write!(f, "fact-set '{}' is already defined", name)
            }
            EngineError::UnknownName { name } => {
                write!(f, "name '{}' is not in scope", name)
            }
            EngineError::EmptyChoice(id) => {
                write!(f, "choice goal {} has no alternatives", id)
            }
            EngineError::Suspended => write!(f, "query is waiting on an asynchronous leaf"),
            EngineError::NoSolution => write!(f, "could not answer: the query has no solution"),
            EngineError::CouldNotAnswer { name } => {
                write!(f, "could not answer: output '{}' is unbound", name)
            }
            EngineError::CyclicValue => write!(f, "value refers to itself"),
        }
    }
}

impl std::error::Error for EngineError {}
