use std::fmt;
use std::sync::Arc;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use smallvec::SmallVec;

use crate::cell::CellId;
use crate::symbol::Sym;

/// A term in a goal description.
///
/// Terms never hold values directly for variables: a `Name` is resolved
/// against whichever scope is active when the term is read, and a `Cell`
/// refers to a specific cell in the heap. Containers are reference counted
/// so cloning a term is cheap and never copies structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// An interned atom; this is how function references are represented.
    Atom(Sym),
    /// A variable named relative to the active scope.
    Name(Sym),
    /// A specific cell, independent of scope.
    Cell(CellId),
    /// The anonymous variable `_`: matches anything and binds nothing.
    Wild,
    Array(Arc<ArrayTerm>),
    Record(Arc<RecordTerm>),
}

/// Array elements plus an optional rest slot capturing the remainder.
///
/// The element storage is shared: a suffix of an array is a new view onto
/// the same elements starting further in, so matching a rest never copies.
#[derive(Debug, Clone)]
pub struct ArrayTerm {
    elements: Arc<[Term]>,
    start: usize,
    rest: Option<Term>,
}

impl ArrayTerm {
    fn new(items: impl IntoIterator<Item = Term>, rest: Option<Term>) -> Self {
        Self {
            elements: items.into_iter().collect(),
            start: 0,
            rest,
        }
    }

    /// The elements before the rest.
    pub fn items(&self) -> &[Term] {
        self.elements.get(self.start..).unwrap_or(&[])
    }

    pub fn rest(&self) -> Option<&Term> {
        self.rest.as_ref()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// The elements from `from` on, followed by this array's rest.
    ///
    /// Constant time: the result shares this array's elements. Past the
    /// last element the rest itself is returned.
    pub fn suffix(self: &Arc<Self>, from: usize) -> Term {
        if from >= self.len() {
            if let Some(rest) = &self.rest {
                return rest.clone();
            }
        }
        if from == 0 {
            return Term::Array(Arc::clone(self));
        }
        Term::Array(Arc::new(ArrayTerm {
            elements: Arc::clone(&self.elements),
            start: (self.start + from).min(self.elements.len()),
            rest: self.rest.clone(),
        }))
    }
}

impl PartialEq for ArrayTerm {
    fn eq(&self, other: &Self) -> bool {
        self.items() == other.items() && self.rest == other.rest
    }
}

/// Keyed fields; keys are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTerm {
    pub fields: SmallVec<[(Sym, Term); 4]>,
}

impl RecordTerm {
    pub fn get(&self, key: Sym) -> Option<&Term> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, t)| t)
    }
}

impl Term {
    pub fn int(n: i64) -> Self {
        Term::Int(n)
    }

    pub fn float(x: f64) -> Self {
        Term::Float(x)
    }

    pub fn str(s: &str) -> Self {
        Term::Str(Arc::from(s))
    }

    /// A closed array.
    pub fn array(items: impl IntoIterator<Item = Term>) -> Self {
        Term::Array(Arc::new(ArrayTerm::new(items, None)))
    }

    /// An array whose `rest` captures every element after `items`.
    pub fn array_rest(items: impl IntoIterator<Item = Term>, rest: Term) -> Self {
        Term::Array(Arc::new(ArrayTerm::new(items, Some(rest))))
    }

    /// A record; a repeated key keeps its last value.
    pub fn record(fields: impl IntoIterator<Item = (Sym, Term)>) -> Self {
        let mut out: SmallVec<[(Sym, Term); 4]> = SmallVec::new();
        for (key, value) in fields {
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => out.push((key, value)),
            }
        }
        Term::Record(Arc::new(RecordTerm { fields: out }))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Term::Bool(_) | Term::Int(_) | Term::Float(_) | Term::Str(_) | Term::Atom(_)
        )
    }

    /// Names mentioned anywhere inside this term, in first-seen order.
    pub fn names(&self, out: &mut SmallVec<[Sym; 8]>) {
        let mut stack: SmallVec<[&Term; 16]> = SmallVec::new();
        stack.push(self);
        while let Some(term) = stack.pop() {
            match term {
                Term::Name(sym) => {
                    if !out.contains(sym) {
                        out.push(*sym);
                    }
                }
                Term::Array(array) => {
                    if let Some(rest) = array.rest() {
                        stack.push(rest);
                    }
                    for item in array.items().iter().rev() {
                        stack.push(item);
                    }
                }
                Term::Record(record) => {
                    for (_, value) in record.fields.iter().rev() {
                        stack.push(value);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Equality of two primitive terms. Integers and floats compare numerically.
pub(crate) fn same_primitive(a: &Term, b: &Term) -> bool {
    match (a, b) {
        (Term::Bool(x), Term::Bool(y)) => x == y,
        (Term::Int(x), Term::Int(y)) => x == y,
        (Term::Float(x), Term::Float(y)) => x == y,
        (Term::Int(x), Term::Float(y)) | (Term::Float(y), Term::Int(x)) => int_equals_float(*x, *y),
        (Term::Str(x), Term::Str(y)) => x == y,
        (Term::Atom(x), Term::Atom(y)) => x == y,
        _ => false,
    }
}

/// Exact comparison: the float must be integral and inside the `i64` range,
/// and then the two are compared as integers.
fn int_equals_float(x: i64, y: f64) -> bool {
    const LOW: f64 = -9_223_372_036_854_775_808.0;
    const HIGH: f64 = 9_223_372_036_854_775_808.0;
    y.fract() == 0.0 && (LOW..HIGH).contains(&y) && y as i64 == x
}

/// Same container instance, compared by pointer.
pub(crate) fn same_container(a: &Term, b: &Term) -> bool {
    match (a, b) {
        (Term::Array(x), Term::Array(y)) => Arc::ptr_eq(x, y),
        (Term::Record(x), Term::Record(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// An owned snapshot of a term with every variable resolved.
///
/// Serialized as JSON-shaped data: records are maps, closed arrays are
/// sequences, and open arrays are `{"items": [..], "rest": ..}` with a null
/// rest while it is unbound.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An unbound variable or a wildcard.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Atom(String),
    Array(Vec<Value>),
    /// The known prefix of an array whose rest is still unbound.
    Partial(Vec<Value>),
    /// An array prefix whose rest is bound to something other than an array.
    Tail(Vec<Value>, Box<Value>),
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// JSON form of the value, identical to its `Serialize` output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) | Value::Atom(s) => serializer.serialize_str(s),
            Value::Array(items) => items.serialize(serializer),
            Value::Partial(items) => serialize_open(serializer, items, &Value::Null),
            Value::Tail(items, tail) => serialize_open(serializer, items, tail),
            Value::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

fn serialize_open<S: Serializer>(
    serializer: S,
    items: &[Value],
    rest: &Value,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(2))?;
    map.serialize_entry("items", items)?;
    map.serialize_entry("rest", rest)?;
    map.end()
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "_"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Atom(s) => write!(f, "{}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Partial(items) => {
                write!(f, "[")?;
                for item in items {
                    write!(f, "{}, ", item)?;
                }
                write!(f, "..._]")
            }
            Value::Tail(items, tail) => {
                write!(f, "[")?;
                for item in items {
                    write!(f, "{}, ", item)?;
                }
                write!(f, "...{}]", tail)
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/term.rs"]
mod tests;
