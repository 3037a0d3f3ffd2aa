//! Built-in leaves: `between` enumerates integers, `log` prints the current
//! values of its arguments.

use std::sync::{Arc, Mutex};

use crate::goal::{LeafCall, LeafPoll, Outcome, Primitive};
use crate::term::{Term, Value};

#[cfg(feature = "tracing")]
use crate::trace::info;

/// `between(low, high, x)`: `x` takes every integer from `low` to `high`
/// inclusive, one per attempt. A bound `x` is checked against the range
/// instead. Non-integer bounds fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct Between;

impl Primitive for Between {
    fn name(&self) -> &str {
        "between"
    }

    fn call(&self, call: &LeafCall<'_>) -> LeafPoll {
        let (low, high) = match (call.arg(0), call.arg(1)) {
            (Ok(Value::Int(low)), Ok(Value::Int(high))) => (low, high),
            _ => return LeafPoll::Ready(Outcome::Fail),
        };
        let target = match call.args().get(2) {
            Some(target) => target,
            None => return LeafPoll::Ready(Outcome::Fail),
        };
        match call.read(target) {
            Ok(Value::Null) => {}
            Ok(Value::Int(n)) => return call.once(in_range(n, low, high)),
            _ => return LeafPoll::Ready(Outcome::Fail),
        }
        let next = low.checked_add(i64::from(call.attempt()));
        match next {
            Some(n) if n <= high => LeafPoll::Ready(Outcome::unify(target.clone(), Term::Int(n))),
            _ => LeafPoll::Ready(Outcome::Fail),
        }
    }
}

fn in_range(n: i64, low: i64, high: i64) -> Outcome {
    if (low..=high).contains(&n) {
        Outcome::Succeed
    } else {
        Outcome::Fail
    }
}

/// Shared buffer of rendered log lines.
pub type LogSink = Arc<Mutex<Vec<String>>>;

/// `log(args..)`: renders every argument's current value on one line,
/// emits it as an `info` event and succeeds once. Unbound variables render
/// as `_`.
#[derive(Debug, Clone)]
pub struct Log {
    label: String,
    sink: Option<LogSink>,
}

impl Log {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            sink: None,
        }
    }

    /// Also append every rendered line to `sink`.
    pub fn with_sink(label: &str, sink: LogSink) -> Self {
        Self {
            label: label.to_string(),
            sink: Some(sink),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The line `log` would print for `call`.
    pub fn render(call: &LeafCall<'_>) -> String {
        call.args()
            .iter()
            .map(|arg| match call.read(arg) {
                Ok(value) => value.to_string(),
                Err(err) => format!("<{}>", err),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Primitive for Log {
    fn name(&self) -> &str {
        "log"
    }

    fn call(&self, call: &LeafCall<'_>) -> LeafPoll {
        if call.attempt() > 0 {
            return LeafPoll::Ready(Outcome::Fail);
        }
        let line = Self::render(call);

        #[cfg(feature = "tracing")]
        info!(label = %self.label, "{}", line);

        if let Some(sink) = &self.sink {
            if let Ok(mut lines) = sink.lock() {
                lines.push(line);
            }
        }
        LeafPoll::Ready(Outcome::Succeed)
    }
}

/// A shared `between` leaf.
pub fn between() -> Arc<dyn Primitive> {
    Arc::new(Between)
}

/// A shared `log` leaf that only emits through `tracing`.
pub fn log(label: &str) -> Arc<dyn Primitive> {
    Arc::new(Log::new(label))
}

#[cfg(test)]
#[path = "tests/builtins.rs"]
mod tests;
