use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::kernel::term::Term;

/// Raised when a pattern fails to bind against a candidate term.
/// This is an expected, frequent outcome during search: the caller treats it
/// as a negative result and moves on to the next candidate site.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("binding failed: {reason}")]
pub struct BindingError {
    reason: String,
}

impl BindingError {
    pub fn new(reason: impl Into<String>) -> BindingError {
        BindingError {
            reason: reason.into(),
        }
    }
}

/// Accumulated bindings from pattern matching.
/// Maps the name of a universally quantified pattern variable to the term it
/// was bound to. A variable bound once must match consistently everywhere
/// else in the same search, so lookups happen before every new binding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    map: HashMap<String, Term>,
}

impl Bindings {
    pub fn new() -> Bindings {
        Bindings {
            map: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Term> {
        self.map.get(name)
    }

    pub fn insert(&mut self, name: String, term: Term) {
        self.map.insert(name, term);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Substitutes every bound variable into the given term.
    /// Unbound variables are left as they are.
    pub fn apply(&self, term: &Term) -> Term {
        if self.map.is_empty() {
            return term.clone();
        }
        term.substitute_universals(&self.map)
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut pairs: Vec<(&str, &Term)> = self.iter().collect();
        pairs.sort_by_key(|(name, _)| *name);
        write!(f, "{{")?;
        for (i, (name, term)) in pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} -> {}", name, term)?;
        }
        write!(f, "}}")
    }
}
