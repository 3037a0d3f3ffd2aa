//! Free lists for the resources the engine churns through on every step.
//!
//! Binding, clause activation and frame pushes happen once per candidate,
//! which can mean millions of times per query. Each arena keeps a `Pool` of
//! released slots and draws from it before growing. A disabled pool accepts
//! releases and forgets them, so an engine with pooling off behaves the same
//! and only uses more memory.

use serde::Serialize;

/// A stack of released objects available for reuse.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
    enabled: bool,
    hits: u64,
    misses: u64,
}

impl<T> Pool<T> {
    pub fn new(enabled: bool) -> Self {
        Self {
            free: Vec::new(),
            enabled,
            hits: 0,
            misses: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take a released object, if any. A `None` counts as a miss: the caller
    /// is about to allocate.
    pub fn take(&mut self) -> Option<T> {
        match self.free.pop() {
            Some(item) => {
                self.hits += 1;
                Some(item)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Take a released object or build a fresh one.
    pub fn take_or(&mut self, make: impl FnOnce() -> T) -> T {
        self.take().unwrap_or_else(make)
    }

    /// Return an object for reuse. The caller guarantees nothing still refers
    /// to it.
    pub fn give(&mut self, item: T) {
        if self.enabled {
            self.free.push(item);
        }
    }

    /// Number of objects waiting for reuse.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn counts(&self) -> PoolCounts {
        PoolCounts {
            hits: self.hits,
            misses: self.misses,
            available: self.free.len(),
        }
    }
}

/// Reuse counters for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolCounts {
    pub hits: u64,
    pub misses: u64,
    pub available: usize,
}

/// Reuse counters for every pool in an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub cells: PoolCounts,
    pub scopes: PoolCounts,
    pub frames: PoolCounts,
    pub worklists: PoolCounts,
}

#[cfg(test)]
#[path = "tests/pool.rs"]
mod tests;
