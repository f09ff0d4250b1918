use std::collections::HashMap;

use tracing::trace;

use crate::kernel::registry::{is_literal_name, SymbolRegistry, SymbolUsage};
use crate::kernel::term::{ops, Quantifier, Term};

/// A dynamic, duplicate-counting collection of atomic formulas, representing
/// everything currently known. Adding a formula interns its symbols into the
/// registry and merges any symbols the formula asserts equal.
///
/// Once any formula evaluates to the primitive `false`, or a merge forces two
/// distinct literals equal, the whole conjunction is permanently flagged
/// unsatisfiable and further additions are short-circuited.
pub struct NormalizedConjunction {
    /// Distinct formulas, in first-insertion order.
    formulas: Vec<Term>,
    /// How many times each distinct formula was added.
    counts: HashMap<Term, u32>,
    evaluates_to_false: bool,
}

impl NormalizedConjunction {
    pub fn new() -> NormalizedConjunction {
        NormalizedConjunction {
            formulas: vec![],
            counts: HashMap::new(),
            evaluates_to_false: false,
        }
    }

    /// The number of distinct formulas.
    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    pub fn evaluates_to_false(&self) -> bool {
        self.evaluates_to_false
    }

    /// The stable conflict-detection contract. The rules behind it are
    /// deliberately minimal: a formula that is the literal `false`, an
    /// equation between distinct literal constants, or a merge that forces
    /// two distinct literals together.
    pub fn is_unsatisfiable(&self) -> bool {
        self.evaluates_to_false
    }

    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.formulas.iter()
    }

    pub fn count_of(&self, formula: &Term) -> u32 {
        self.counts.get(formula).copied().unwrap_or(0)
    }

    pub fn contains(&self, formula: &Term) -> bool {
        self.counts.contains_key(formula)
    }

    /// Adds an atomic formula. A no-op once the conjunction is unsatisfiable.
    pub fn add_formula(&mut self, formula: Term, registry: &mut SymbolRegistry) {
        if self.evaluates_to_false {
            return;
        }
        if Self::reduces_to_false(&formula) {
            trace!("conjunction evaluates to false on {}", formula);
            self.evaluates_to_false = true;
            return;
        }

        self.intern(&formula, registry);
        self.merge_asserted_equality(&formula, registry);

        let count = self.counts.entry(formula.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.formulas.push(formula);
        }
    }

    /// A formula that is, or trivially reduces to, the primitive `false`.
    fn reduces_to_false(formula: &Term) -> bool {
        if formula.is_false() {
            return true;
        }
        // An equation between distinct literal constants.
        if formula.is_apply()
            && (formula.name() == ops::EQ || formula.name() == ops::EQ_BOOL)
            && formula.args().len() == 2
        {
            let left = &formula.args()[0];
            let right = &formula.args()[1];
            if left.is_leaf()
                && right.is_leaf()
                && is_literal_name(left.name())
                && is_literal_name(right.name())
                && left.name() != right.name()
            {
                return true;
            }
        }
        false
    }

    /// Registers every symbol occurring in the formula.
    fn intern(&mut self, term: &Term, registry: &mut SymbolRegistry) {
        if let Some((pairs, otherwise)) = term.alternatives_parts() {
            for (cond, result) in pairs {
                self.intern(cond, registry);
                self.intern(result, registry);
            }
            self.intern(otherwise, registry);
            return;
        }
        registry.add_symbol(term.name(), term.type_name(), Self::usage_for(term));
        for arg in term.args() {
            self.intern(arg, registry);
        }
    }

    fn usage_for(term: &Term) -> SymbolUsage {
        let has_args = !term.args().is_empty();
        match term.quantifier() {
            Quantifier::ForAll => {
                if has_args {
                    SymbolUsage::UniversalWithArgs
                } else {
                    SymbolUsage::Universal
                }
            }
            Quantifier::Exists => {
                if has_args {
                    SymbolUsage::FreeWithArgs
                } else {
                    SymbolUsage::Free
                }
            }
            Quantifier::None => {
                if is_literal_name(term.name()) {
                    if has_args {
                        SymbolUsage::LiteralWithArgs
                    } else {
                        SymbolUsage::Literal
                    }
                } else if has_args {
                    SymbolUsage::CreatedWithArgs
                } else {
                    SymbolUsage::Created
                }
            }
        }
    }

    /// An equation between two bare symbols merges their registry entries.
    fn merge_asserted_equality(&mut self, formula: &Term, registry: &mut SymbolRegistry) {
        if !formula.is_apply()
            || (formula.name() != ops::EQ && formula.name() != ops::EQ_BOOL)
            || formula.args().len() != 2
        {
            return;
        }
        let left = &formula.args()[0];
        let right = &formula.args()[1];
        if !left.is_leaf() || !right.is_leaf() {
            return;
        }
        let left_index = match registry.index_for_name(left.name()) {
            Some(i) => i,
            None => return,
        };
        let right_index = match registry.index_for_name(right.name()) {
            Some(i) => i,
            None => return,
        };
        if let Err(conflict) = registry.substitute(left_index, right_index) {
            trace!("merge conflict: {}", conflict);
            self.evaluates_to_false = true;
        }
    }
}

impl Default for NormalizedConjunction {
    fn default() -> Self {
        NormalizedConjunction::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::kernel::type_graph::BasicTypeGraph;

    fn registry() -> SymbolRegistry {
        SymbolRegistry::new(Arc::new(BasicTypeGraph::new()))
    }

    #[test]
    fn test_duplicate_counting() {
        let mut reg = registry();
        let mut conj = NormalizedConjunction::new();
        let f = Term::parse("p(a)");
        conj.add_formula(f.clone(), &mut reg);
        conj.add_formula(f.clone(), &mut reg);
        conj.add_formula(Term::parse("q(b)"), &mut reg);
        assert_eq!(conj.len(), 2);
        assert_eq!(conj.count_of(&f), 2);
    }

    #[test]
    fn test_false_is_permanent() {
        let mut reg = registry();
        let mut conj = NormalizedConjunction::new();
        conj.add_formula(Term::falsity(), &mut reg);
        assert!(conj.evaluates_to_false());
        conj.add_formula(Term::parse("p(a)"), &mut reg);
        assert!(conj.evaluates_to_false());
        // The later addition was short-circuited.
        assert_eq!(conj.len(), 0);
    }

    #[test]
    fn test_literal_equation_is_false() {
        let mut reg = registry();
        let mut conj = NormalizedConjunction::new();
        let eq = Term::infix(ops::EQ_BOOL, "Boolean", Term::truth(), Term::falsity());
        conj.add_formula(eq, &mut reg);
        assert!(conj.is_unsatisfiable());
    }

    #[test]
    fn test_equality_merges_symbols() {
        let mut reg = registry();
        let mut conj = NormalizedConjunction::new();
        let eq = Term::infix(ops::EQ, "Entity", Term::parse("a"), Term::parse("b"));
        conj.add_formula(eq, &mut reg);
        let a = reg.index_for_name("a").unwrap();
        let b = reg.index_for_name("b").unwrap();
        assert_eq!(a, b);
        assert_eq!(conj.len(), 1);
        assert!(!conj.is_unsatisfiable());
    }

    #[test]
    fn test_forced_literal_merge_is_false() {
        let mut reg = registry();
        let mut conj = NormalizedConjunction::new();
        conj.add_formula(
            Term::infix(ops::EQ, "Entity", Term::parse("a"), Term::truth()),
            &mut reg,
        );
        assert!(!conj.is_unsatisfiable());
        conj.add_formula(
            Term::infix(ops::EQ, "Entity", Term::parse("a"), Term::falsity()),
            &mut reg,
        );
        assert!(conj.is_unsatisfiable());
    }

    #[test]
    fn test_monotonic_once_false() {
        let mut reg = registry();
        let mut conj = NormalizedConjunction::new();
        conj.add_formula(Term::falsity(), &mut reg);
        for i in 0..10 {
            conj.add_formula(Term::parse(&format!("p{}", i)), &mut reg);
            assert!(conj.evaluates_to_false());
        }
    }
}
