use crate::cell::CellId;

/// A position in the trail. Everything recorded after a mark can be undone
/// by rolling back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrailMark(u32);

impl TrailMark {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// One reversible mutation of a cell. Both kinds are reverted by making the
/// cell unbound again; the kind tells the heap which reference to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailEntry {
    Bind(CellId),
    Alias(CellId),
}

impl TrailEntry {
    pub fn cell(self) -> CellId {
        match self {
            TrailEntry::Bind(cell) | TrailEntry::Alias(cell) => cell,
        }
    }
}

/// The undo log. Entries are only ever removed from the top, so any range
/// is reverted strictly newest first.
#[derive(Debug, Default)]
pub struct Trail {
    entries: Vec<TrailEntry>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    pub fn mark(&self) -> TrailMark {
        TrailMark(self.entries.len() as u32)
    }

    pub fn push(&mut self, entry: TrailEntry) {
        self.entries.push(entry);
    }

    /// Pop the newest entry if it was recorded after `mark`.
    pub fn pop_above(&mut self, mark: TrailMark) -> Option<TrailEntry> {
        if self.entries.len() > mark.0 as usize {
            self.entries.pop()
        } else {
            None
        }
    }

    /// Entries recorded after `mark`, oldest first.
    pub fn entries_since(&self, mark: TrailMark) -> &[TrailEntry] {
        self.entries.get(mark.0 as usize..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
