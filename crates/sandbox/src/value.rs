//! Values produced by evaluation.

use std::fmt;

/// The result of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Unit,
    Atom(String),
    Int(i64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn atom(name: impl Into<String>) -> Self {
        Value::Atom(name.into())
    }

    /// Approximate live heap footprint in bytes, used for memory accounting.
    pub fn heap_size(&self) -> usize {
        let base = std::mem::size_of::<Value>();
        match self {
            Value::Unit | Value::Int(_) => base,
            Value::Atom(s) | Value::Str(s) => base + s.len(),
            Value::List(items) => base + items.iter().map(Value::heap_size).sum::<usize>(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Atom(name) => write!(f, "{name}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
