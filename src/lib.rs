pub mod builtins;
pub mod cell;
pub mod engine;
pub mod error;
mod frame;
pub mod goal;
pub mod metrics;
pub mod pool;
pub mod symbol;
pub mod term;
pub mod trace;
pub mod trail;
pub mod unify;

pub use builtins::{between, log, Between, Log, LogSink};
pub use cell::{Binding, CellId, Heap, ScopeId, Walked};
pub use engine::{Engine, EngineConfig, Query, Step, Teardown};
pub use error::EngineError;
pub use frame::FrameId;
pub use goal::{
    Clause, FactSetId, FnPrimitive, Goal, GoalId, GoalStore, LeafCall, LeafPoll, Outcome,
    Primitive,
};
pub use metrics::SolveStats;
pub use pool::{PoolCounts, PoolStats};
pub use symbol::{Sym, Symbols};
pub use term::{ArrayTerm, Term, Value};
pub use trail::{TrailEntry, TrailMark};
pub use unify::UnifyFailure;

#[cfg(test)]
pub(crate) mod test_utils;
