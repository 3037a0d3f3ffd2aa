use lasso::{Spur, ThreadedRodeo};

/// An interned name: scope variables, record keys and atoms all use it.
pub type Sym = Spur;

/// Interner for every name the engine sees.
///
/// Interning is by `&self`, so goal builders can intern while holding
/// other borrows of the engine.
pub struct Symbols {
    rodeo: ThreadedRodeo,
}

impl Symbols {
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Intern `name`, returning the existing symbol if already known.
    pub fn intern(&self, name: &str) -> Sym {
        self.rodeo.get_or_intern(name)
    }

    /// The text of a symbol, or `None` for a symbol from another interner.
    pub fn resolve(&self, sym: Sym) -> Option<&str> {
        self.rodeo.try_resolve(&sym)
    }

    /// Symbol for `name` if it was interned before.
    pub fn get(&self, name: &str) -> Option<Sym> {
        self.rodeo.get(name)
    }

    /// Text of a symbol for diagnostics; unknown symbols render as `?`.
    pub(crate) fn describe(&self, sym: Sym) -> String {
        self.resolve(sym).unwrap_or("?").to_string()
    }
}

impl Default for Symbols {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Symbols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Symbols")
            .field("len", &self.rodeo.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/symbol.rs"]
mod tests;
