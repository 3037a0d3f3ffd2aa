//! Structured logging behind the `tracing` cargo feature.
//!
//! With the feature on, the engine's log macros are the `tracing` ones. With
//! it off, the same names expand to nothing and spans become a unit guard,
//! so instrumented call sites compile either way.
//!
//! ```rust,ignore
//! #[cfg(feature = "tracing")]
//! use crate::trace::{debug_span, trace};
//!
//! #[cfg(feature = "tracing")]
//! let _span = debug_span!("resume", goal = id).entered();
//! #[cfg(feature = "tracing")]
//! trace!(facts, clause = i, "clause_activated");
//! ```

use crate::metrics::SolveStats;

#[cfg(feature = "tracing")]
pub use tracing::{debug, debug_span, info, trace, trace_span, Span};

#[cfg(not(feature = "tracing"))]
mod noop {
    /// Span stand-in when logging is compiled out.
    pub struct Span;

    impl Span {
        pub fn none() -> Self {
            Span
        }

        pub fn entered(self) -> SpanGuard {
            SpanGuard
        }
    }

    pub struct SpanGuard;

    #[macro_export]
    macro_rules! trace {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! debug {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! info {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! debug_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    #[macro_export]
    macro_rules! trace_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    pub use crate::{debug, debug_span, info, trace, trace_span};
}

#[cfg(not(feature = "tracing"))]
pub use noop::*;

/// Emit one `info` event carrying every solve counter.
#[cfg(feature = "tracing")]
pub fn report_stats(label: &str, stats: &SolveStats) {
    info!(
        label,
        steps = stats.steps,
        frames = stats.frames,
        clauses = stats.clauses,
        unifications = stats.unifications,
        unify_failures = stats.unify_failures,
        bindings = stats.bindings,
        undos = stats.undos,
        backtracks = stats.backtracks,
        cuts = stats.cuts,
        solutions = stats.solutions,
        "solve_stats"
    );
}

#[cfg(not(feature = "tracing"))]
pub fn report_stats(_label: &str, _stats: &SolveStats) {}

/// Install a stderr subscriber filtered by `RUST_LOG` (default `info`).
/// Later calls are ignored.
#[cfg(feature = "tracing")]
pub fn init_subscriber() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(false),
        )
        .with(filter)
        .try_init()
        .ok();
}

#[cfg(not(feature = "tracing"))]
pub fn init_subscriber() {}

#[cfg(test)]
#[path = "tests/trace.rs"]
mod tests;
