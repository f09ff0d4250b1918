use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kernel::term::ops;
use crate::kernel::type_graph::TypeOracle;

/// Dense integer handle for a registered symbol. Handles are plain integers
/// into an arena, so union-find parent rewriting is a local loop with no
/// aliasing concerns.
pub type SymbolIndex = u32;

/// How a symbol is used. When two symbols merge, the surviving entry adopts
/// the most restrictive classification: Literal > Created > Free > Universal.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum SymbolUsage {
    /// A literal constant: true, false, a numeral.
    Literal,
    /// A symbol invented during normalization or proof steps.
    Created,
    /// A free singular variable.
    Free,
    /// A universally quantified variable.
    Universal,
    LiteralWithArgs,
    CreatedWithArgs,
    FreeWithArgs,
    UniversalWithArgs,
}

impl SymbolUsage {
    pub fn has_args(self) -> bool {
        matches!(
            self,
            SymbolUsage::LiteralWithArgs
                | SymbolUsage::CreatedWithArgs
                | SymbolUsage::FreeWithArgs
                | SymbolUsage::UniversalWithArgs
        )
    }

    pub fn is_universal(self) -> bool {
        matches!(self, SymbolUsage::Universal | SymbolUsage::UniversalWithArgs)
    }

    fn rank(self) -> u8 {
        match self {
            SymbolUsage::Literal | SymbolUsage::LiteralWithArgs => 3,
            SymbolUsage::Created | SymbolUsage::CreatedWithArgs => 2,
            SymbolUsage::Free | SymbolUsage::FreeWithArgs => 1,
            SymbolUsage::Universal | SymbolUsage::UniversalWithArgs => 0,
        }
    }

    /// The same classification kind, with the given args-ness.
    fn kind_with_args(self, has_args: bool) -> SymbolUsage {
        match (self.rank(), has_args) {
            (3, false) => SymbolUsage::Literal,
            (3, true) => SymbolUsage::LiteralWithArgs,
            (2, false) => SymbolUsage::Created,
            (2, true) => SymbolUsage::CreatedWithArgs,
            (1, false) => SymbolUsage::Free,
            (1, true) => SymbolUsage::FreeWithArgs,
            (_, false) => SymbolUsage::Universal,
            (_, true) => SymbolUsage::UniversalWithArgs,
        }
    }
}

/// Two literal constants that are defined unequal cannot be merged; doing so
/// makes the surrounding conjunction unsatisfiable.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("cannot merge distinct literals {left} and {right}")]
pub struct MergeConflict {
    pub left: String,
    pub right: String,
}

/// True for names whose denotation is fixed: merging two distinct ones is a
/// contradiction.
pub fn is_literal_name(name: &str) -> bool {
    name == ops::TRUE || name == ops::FALSE || name.chars().all(|c| c.is_ascii_digit())
}

#[derive(Clone, Debug)]
pub struct SymbolEntry {
    pub name: String,
    pub type_name: String,
    pub usage: SymbolUsage,
    /// The literal constant this equivalence class is pinned to, if any.
    /// Set at registration for literal names and propagated by merges; two
    /// classes pinned to different literals can never merge.
    literal: Option<String>,
    /// Union-find parent. An entry is a root when it is its own parent.
    parent: SymbolIndex,
}

impl SymbolEntry {
    pub fn pinned_literal(&self) -> Option<&str> {
        self.literal.as_deref()
    }
}

/// Interns names into dense integer identities and tracks which symbols have
/// been proved equal, as a union-find forest over the entry arena. Owned
/// exclusively by one proof state; never shared.
pub struct SymbolRegistry {
    entries: Vec<SymbolEntry>,
    by_name: HashMap<String, SymbolIndex>,
    /// Memoized subtype answers, keyed on the ordered (sub, super) pair.
    subtype_cache: HashMap<(String, String), bool>,
    /// Indices retired by merges. Bookkeeping only: slots are never
    /// reallocated within the registry's lifetime.
    retired: Vec<SymbolIndex>,
    types: Arc<dyn TypeOracle>,
}

impl SymbolRegistry {
    pub fn new(types: Arc<dyn TypeOracle>) -> SymbolRegistry {
        SymbolRegistry {
            entries: vec![],
            by_name: HashMap::new(),
            subtype_cache: HashMap::new(),
            retired: vec![],
            types,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers a symbol, returning the existing index if the exact name is
    /// already present. Duplicate insertion is idempotent, not an error.
    pub fn add_symbol(&mut self, name: &str, type_name: &str, usage: SymbolUsage) -> SymbolIndex {
        if let Some(&index) = self.by_name.get(name) {
            return index;
        }
        let index = self.entries.len() as SymbolIndex;
        self.entries.push(SymbolEntry {
            name: name.to_string(),
            type_name: type_name.to_string(),
            usage,
            literal: if is_literal_name(name) {
                Some(name.to_string())
            } else {
                None
            },
            parent: index,
        });
        self.by_name.insert(name.to_string(), index);
        index
    }

    /// The raw entry at an index, without canonicalization.
    /// Panics on an out-of-range index; that is a caller bug.
    pub fn entry(&self, index: SymbolIndex) -> &SymbolEntry {
        match self.entries.get(index as usize) {
            Some(entry) => entry,
            None => panic!("symbol index {} out of range", index),
        }
    }

    /// Union-find find with path compression: walks parent pointers to the
    /// root, then rewrites every visited node's parent to point at the root.
    pub fn find_and_compress(&mut self, index: SymbolIndex) -> SymbolIndex {
        if index as usize >= self.entries.len() {
            panic!("symbol index {} out of range", index);
        }
        let mut root = index;
        while self.entries[root as usize].parent != root {
            root = self.entries[root as usize].parent;
        }
        let mut current = index;
        while current != root {
            let next = self.entries[current as usize].parent;
            self.entries[current as usize].parent = root;
            current = next;
        }
        root
    }

    /// The canonical name for an index: the name of its union-find root.
    pub fn canonical_name(&mut self, index: SymbolIndex) -> &str {
        let root = self.find_and_compress(index);
        &self.entries[root as usize].name
    }

    /// The canonical entry for an index.
    pub fn canonical_entry(&mut self, index: SymbolIndex) -> &SymbolEntry {
        let root = self.find_and_compress(index);
        &self.entries[root as usize]
    }

    /// The canonical index for an exact name, if registered.
    pub fn index_for_name(&mut self, name: &str) -> Option<SymbolIndex> {
        let index = *self.by_name.get(name)?;
        Some(self.find_and_compress(index))
    }

    /// Merges symbol b into a: a's root becomes the canonical representative
    /// for both. The surviving entry narrows to b's type when that is a
    /// proper subtype (and a is not universally quantified), and adopts the
    /// most restrictive usage of the two. Irreversible for the registry's
    /// lifetime.
    pub fn substitute(&mut self, a: SymbolIndex, b: SymbolIndex) -> Result<(), MergeConflict> {
        let root_a = self.find_and_compress(a);
        let root_b = self.find_and_compress(b);
        if root_a == root_b {
            return Ok(());
        }

        let literal_a = self.entries[root_a as usize].literal.clone();
        let literal_b = self.entries[root_b as usize].literal.clone();
        if let (Some(left), Some(right)) = (&literal_a, &literal_b) {
            if left != right {
                return Err(MergeConflict {
                    left: left.clone(),
                    right: right.clone(),
                });
            }
        }
        if literal_a.is_none() {
            self.entries[root_a as usize].literal = literal_b;
        }

        let type_a = self.entries[root_a as usize].type_name.clone();
        let type_b = self.entries[root_b as usize].type_name.clone();
        let usage_a = self.entries[root_a as usize].usage;
        let usage_b = self.entries[root_b as usize].usage;

        if !usage_a.is_universal() && type_a != type_b && self.is_subtype(&type_b, &type_a) {
            self.entries[root_a as usize].type_name = type_b;
        }
        if usage_b.rank() > usage_a.rank() {
            self.entries[root_a as usize].usage = usage_b.kind_with_args(usage_a.has_args());
        }

        self.entries[root_b as usize].parent = root_a;
        self.retired.push(root_b);
        Ok(())
    }

    /// Memoized subtype query, fronting the external type oracle.
    pub fn is_subtype(&mut self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        let key = (sub.to_string(), sup.to_string());
        if let Some(&answer) = self.subtype_cache.get(&key) {
            return answer;
        }
        let answer = self.types.is_subtype(sub, sup);
        self.subtype_cache.insert(key, answer);
        answer
    }

    /// All canonical entries whose type is exactly the queried type.
    pub fn symbols_of_type(&mut self, type_name: &str) -> Vec<SymbolIndex> {
        self.roots()
            .into_iter()
            .filter(|&i| self.entries[i as usize].type_name == type_name)
            .collect()
    }

    /// All canonical entries whose type is, or is a subtype of, the queried
    /// type. Used to seed search.
    pub fn symbols_matching_type(&mut self, type_name: &str) -> Vec<SymbolIndex> {
        let roots = self.roots();
        let mut out = vec![];
        for index in roots {
            let entry_type = self.entries[index as usize].type_name.clone();
            if self.is_subtype(&entry_type, type_name) {
                out.push(index);
            }
        }
        out
    }

    fn roots(&self) -> Vec<SymbolIndex> {
        (0..self.entries.len() as SymbolIndex)
            .filter(|&i| self.entries[i as usize].parent == i)
            .collect()
    }

    /// The indices retired by merges, oldest first.
    pub fn retired(&self) -> &[SymbolIndex] {
        &self.retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::type_graph::{BasicTypeGraph, BOOLEAN, ENTITY, INTEGER, NATURAL};

    fn registry() -> SymbolRegistry {
        SymbolRegistry::new(Arc::new(BasicTypeGraph::new()))
    }

    #[test]
    fn test_first_registration_gets_index_zero() {
        let mut reg = registry();
        let eq = reg.add_symbol("=B", BOOLEAN, SymbolUsage::LiteralWithArgs);
        let t = reg.add_symbol("true", BOOLEAN, SymbolUsage::Literal);
        let f = reg.add_symbol("false", BOOLEAN, SymbolUsage::Literal);
        assert_eq!(eq, 0);
        assert_eq!(t, 1);
        assert_eq!(f, 2);
    }

    #[test]
    fn test_add_symbol_idempotent() {
        let mut reg = registry();
        let a = reg.add_symbol("a", ENTITY, SymbolUsage::Created);
        let b = reg.add_symbol("a", ENTITY, SymbolUsage::Created);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_union_find_root_stability() {
        let mut reg = registry();
        let a = reg.add_symbol("a", ENTITY, SymbolUsage::Created);
        let b = reg.add_symbol("b", ENTITY, SymbolUsage::Created);
        let c = reg.add_symbol("c", ENTITY, SymbolUsage::Created);
        reg.substitute(a, b).unwrap();
        reg.substitute(b, c).unwrap();
        let root = reg.find_and_compress(c);
        assert_eq!(root, reg.find_and_compress(a));
        assert_eq!(root, reg.find_and_compress(b));
        // Path compression does not change the answer.
        assert_eq!(root, reg.find_and_compress(c));
        assert_eq!(reg.canonical_name(c), "a");
        assert_eq!(reg.retired(), &[b, c]);
    }

    #[test]
    fn test_usage_merges_toward_most_restrictive() {
        let mut reg = registry();
        let x = reg.add_symbol("x", ENTITY, SymbolUsage::Created);
        let y = reg.add_symbol("7", NATURAL, SymbolUsage::Literal);
        reg.substitute(x, y).unwrap();
        assert_eq!(reg.canonical_entry(x).usage, SymbolUsage::Literal);
        // The surviving name is still x's.
        assert_eq!(reg.canonical_name(y), "x");
    }

    #[test]
    fn test_type_narrows_to_subtype() {
        let mut reg = registry();
        let a = reg.add_symbol("a", INTEGER, SymbolUsage::Created);
        let b = reg.add_symbol("b", NATURAL, SymbolUsage::Created);
        reg.substitute(a, b).unwrap();
        assert_eq!(reg.canonical_entry(a).type_name, NATURAL);
    }

    #[test]
    fn test_universal_type_does_not_narrow() {
        let mut reg = registry();
        let a = reg.add_symbol("a", INTEGER, SymbolUsage::Universal);
        let b = reg.add_symbol("b", NATURAL, SymbolUsage::Created);
        reg.substitute(a, b).unwrap();
        assert_eq!(reg.canonical_entry(a).type_name, INTEGER);
    }

    #[test]
    fn test_distinct_literals_conflict() {
        let mut reg = registry();
        let t = reg.add_symbol("true", BOOLEAN, SymbolUsage::Literal);
        let f = reg.add_symbol("false", BOOLEAN, SymbolUsage::Literal);
        assert!(reg.substitute(t, f).is_err());
        // Non-literal names merge fine even when literal-ranked.
        let x = reg.add_symbol("x", BOOLEAN, SymbolUsage::Literal);
        let y = reg.add_symbol("y", BOOLEAN, SymbolUsage::Literal);
        assert!(reg.substitute(x, y).is_ok());
    }

    #[test]
    fn test_type_queries() {
        let mut reg = registry();
        let zero = reg.add_symbol("zero", NATURAL, SymbolUsage::Created);
        let neg = reg.add_symbol("minus_one", INTEGER, SymbolUsage::Created);
        reg.add_symbol("flag", BOOLEAN, SymbolUsage::Created);
        assert_eq!(reg.symbols_of_type(NATURAL), vec![zero]);
        let ints = reg.symbols_matching_type(INTEGER);
        assert!(ints.contains(&zero));
        assert!(ints.contains(&neg));
        assert_eq!(ints.len(), 2);
    }
}
