//! Solve counters for profiling and analysis.
//!
//! The heap and the executor bump these as they work. A query borrows its
//! engine exclusively, so plain integers are enough.
//!
//! ```rust,ignore
//! let stats = engine.stats();
//! println!("{}", stats);
//! engine.reset_stats();
//! ```

use std::fmt;

use serde::Serialize;

/// Aggregate counters for one engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolveStats {
    /// Frame advances taken by the executor
    pub steps: u64,
    /// Unification attempts, successful or not
    pub unifications: u64,
    pub unify_failures: u64,
    /// Cells bound or aliased
    pub bindings: u64,
    /// Trail entries reverted
    pub undos: u64,
    /// Frames abandoned because they failed
    pub backtracks: u64,
    /// Cuts that reached a fact-set or the root
    pub cuts: u64,
    pub solutions: u64,
    /// Frames created
    pub frames: u64,
    /// Clause activations
    pub clauses: u64,
}

impl SolveStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Counters as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for SolveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Solve Stats ===")?;
        writeln!(f, "Steps:          {}", self.steps)?;
        writeln!(f, "Frames:         {}", self.frames)?;
        writeln!(f, "Clauses:        {}", self.clauses)?;
        writeln!(
            f,
            "Unifications:   {} ({} failed)",
            self.unifications, self.unify_failures
        )?;
        writeln!(f, "Bindings:       {}", self.bindings)?;
        writeln!(f, "Undos:          {}", self.undos)?;
        writeln!(f, "Backtracks:     {}", self.backtracks)?;
        writeln!(f, "Cuts:           {}", self.cuts)?;
        write!(f, "Solutions:      {}", self.solutions)
    }
}
