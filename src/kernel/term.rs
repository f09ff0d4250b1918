use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::kernel::binding::{BindingError, Bindings};
use crate::kernel::type_graph::TypeOracle;

/// The canonical operator vocabulary shared by the normalization pipeline and
/// the conjunction. Everything else the sequent mentions is an uninterpreted
/// symbol.
pub mod ops {
    pub const TRUE: &str = "true";
    pub const FALSE: &str = "false";
    /// Polymorphic equality.
    pub const EQ: &str = "=";
    /// Boolean equality, kept distinct so the boolean axioms stay first-order.
    pub const EQ_BOOL: &str = "=B";
    pub const NEQ: &str = "/=";
    pub const NOT: &str = "not";
    pub const AND: &str = "and";
    pub const OR: &str = "or";
    pub const IMPLIES: &str = "implies";
    pub const LE: &str = "<=";
    pub const LT: &str = "<";
    pub const GE: &str = ">=";
    pub const GT: &str = ">";
    pub const PLUS: &str = "+";
    pub const MINUS: &str = "-";
    pub const NEG: &str = "neg";
    pub const LAMBDA: &str = "lambda";
}

/// The quantification tag carried by every symbol application.
/// A `ForAll` leaf is a pattern variable: it binds freely during matching.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Quantifier {
    None,
    ForAll,
    Exists,
}

impl Quantifier {
    pub fn flipped(self) -> Quantifier {
        match self {
            Quantifier::None => Quantifier::None,
            Quantifier::ForAll => Quantifier::Exists,
            Quantifier::Exists => Quantifier::ForAll,
        }
    }
}

/// Display convention for an operator. Ignored by equality and hashing.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Convention {
    Prefix,
    Infix,
}

#[derive(Debug, Serialize, Deserialize)]
enum TermShape {
    /// A symbol application: a named operator or variable with ordered
    /// arguments. A leaf is an application with no arguments.
    Apply {
        name: String,
        type_name: String,
        quantifier: Quantifier,
        convention: Convention,
        args: Vec<Term>,
    },

    /// A conditional-alternatives node: ordered (condition, result) pairs
    /// plus a mandatory otherwise-result.
    Alternatives {
        pairs: Vec<(Term, Term)>,
        otherwise: Term,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct TermNode {
    shape: TermShape,
    /// Shape-based hash: ignores leaf names. Used for bucketing.
    structure_hash: u64,
    /// Name-inclusive hash. Equal terms always share it; a match is only a
    /// short-circuit hint, never a substitute for structural comparison.
    value_hash: u64,
}

/// An immutable expression tree. Sub-terms are shared, never mutated; every
/// transformation returns a new term. Both hashes are computed bottom-up at
/// construction from the already-cached child hashes and cached for the
/// term's lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Term {
    node: Arc<TermNode>,
}

const APPLY_TAG: u64 = 0x7c93;
const ALTERNATIVES_TAG: u64 = 0x51b5;

fn hash_str(s: &str) -> u64 {
    // FNV-1a
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn mix(h: u64, x: u64) -> u64 {
    (h.rotate_left(7) ^ x).wrapping_mul(0x9e3779b97f4a7c15)
}

fn compute_hashes(shape: &TermShape) -> (u64, u64) {
    match shape {
        TermShape::Apply {
            name,
            type_name,
            quantifier,
            args,
            ..
        } => {
            let q = *quantifier as u64;
            let mut structure = mix(mix(APPLY_TAG, args.len() as u64), q);
            let mut value = mix(mix(mix(APPLY_TAG, hash_str(name)), hash_str(type_name)), q);
            for arg in args {
                structure = mix(structure, arg.node.structure_hash);
                value = mix(value, arg.node.value_hash);
            }
            (structure, value)
        }
        TermShape::Alternatives { pairs, otherwise } => {
            let mut structure = mix(ALTERNATIVES_TAG, pairs.len() as u64);
            let mut value = mix(ALTERNATIVES_TAG, pairs.len() as u64);
            for (cond, result) in pairs {
                structure = mix(
                    mix(structure, cond.node.structure_hash),
                    result.node.structure_hash,
                );
                value = mix(mix(value, cond.node.value_hash), result.node.value_hash);
            }
            structure = mix(structure, otherwise.node.structure_hash);
            value = mix(value, otherwise.node.value_hash);
            (structure, value)
        }
    }
}

impl Term {
    fn from_shape(shape: TermShape) -> Term {
        let (structure_hash, value_hash) = compute_hashes(&shape);
        Term {
            node: Arc::new(TermNode {
                shape,
                structure_hash,
                value_hash,
            }),
        }
    }

    /// The general constructor for symbol applications.
    pub fn apply(
        name: impl Into<String>,
        type_name: impl Into<String>,
        args: Vec<Term>,
        quantifier: Quantifier,
        convention: Convention,
    ) -> Term {
        Term::from_shape(TermShape::Apply {
            name: name.into(),
            type_name: type_name.into(),
            quantifier,
            convention,
            args,
        })
    }

    /// An unquantified leaf symbol.
    pub fn symbol(name: impl Into<String>, type_name: impl Into<String>) -> Term {
        Term::apply(name, type_name, vec![], Quantifier::None, Convention::Prefix)
    }

    /// A universally quantified leaf, i.e. a pattern variable.
    pub fn variable(name: impl Into<String>, type_name: impl Into<String>) -> Term {
        Term::apply(
            name,
            type_name,
            vec![],
            Quantifier::ForAll,
            Convention::Prefix,
        )
    }

    /// An existentially quantified leaf.
    pub fn existential(name: impl Into<String>, type_name: impl Into<String>) -> Term {
        Term::apply(
            name,
            type_name,
            vec![],
            Quantifier::Exists,
            Convention::Prefix,
        )
    }

    /// A binary infix application.
    pub fn infix(
        name: impl Into<String>,
        type_name: impl Into<String>,
        left: Term,
        right: Term,
    ) -> Term {
        Term::apply(
            name,
            type_name,
            vec![left, right],
            Quantifier::None,
            Convention::Infix,
        )
    }

    pub fn alternatives(pairs: Vec<(Term, Term)>, otherwise: Term) -> Term {
        Term::from_shape(TermShape::Alternatives { pairs, otherwise })
    }

    pub fn truth() -> Term {
        Term::symbol(ops::TRUE, crate::kernel::type_graph::BOOLEAN)
    }

    pub fn falsity() -> Term {
        Term::symbol(ops::FALSE, crate::kernel::type_graph::BOOLEAN)
    }

    // ========== Accessors ==========

    pub fn is_apply(&self) -> bool {
        matches!(self.node.shape, TermShape::Apply { .. })
    }

    pub fn is_alternatives(&self) -> bool {
        matches!(self.node.shape, TermShape::Alternatives { .. })
    }

    /// The symbol name. Panics on an alternatives node.
    pub fn name(&self) -> &str {
        match &self.node.shape {
            TermShape::Apply { name, .. } => name,
            TermShape::Alternatives { .. } => panic!("alternatives terms have no name"),
        }
    }

    /// The semantic type of this term. For an alternatives node this is the
    /// type of the otherwise-result.
    pub fn type_name(&self) -> &str {
        match &self.node.shape {
            TermShape::Apply { type_name, .. } => type_name,
            TermShape::Alternatives { otherwise, .. } => otherwise.type_name(),
        }
    }

    pub fn quantifier(&self) -> Quantifier {
        match &self.node.shape {
            TermShape::Apply { quantifier, .. } => *quantifier,
            TermShape::Alternatives { .. } => Quantifier::None,
        }
    }

    pub fn convention(&self) -> Convention {
        match &self.node.shape {
            TermShape::Apply { convention, .. } => *convention,
            TermShape::Alternatives { .. } => Convention::Prefix,
        }
    }

    /// The arguments of a symbol application. Empty for leaves and for
    /// alternatives nodes (use `alternatives_parts` for those).
    pub fn args(&self) -> &[Term] {
        match &self.node.shape {
            TermShape::Apply { args, .. } => args,
            TermShape::Alternatives { .. } => &[],
        }
    }

    /// The (condition, result) pairs and the otherwise-result.
    pub fn alternatives_parts(&self) -> Option<(&[(Term, Term)], &Term)> {
        match &self.node.shape {
            TermShape::Alternatives { pairs, otherwise } => Some((pairs, otherwise)),
            TermShape::Apply { .. } => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(&self.node.shape, TermShape::Apply { args, .. } if args.is_empty())
    }

    pub fn is_true(&self) -> bool {
        self.is_leaf() && self.name() == ops::TRUE
    }

    pub fn is_false(&self) -> bool {
        self.is_leaf() && self.name() == ops::FALSE
    }

    pub fn structure_hash(&self) -> u64 {
        self.node.structure_hash
    }

    pub fn value_hash(&self) -> u64 {
        self.node.value_hash
    }

    // ========== Child addressing ==========
    // Children are indexed uniformly so that Site paths work for both term
    // shapes: an application's children are its arguments; an alternatives
    // node interleaves (condition, result) pairs and puts the
    // otherwise-result last.

    pub fn child_count(&self) -> usize {
        match &self.node.shape {
            TermShape::Apply { args, .. } => args.len(),
            TermShape::Alternatives { pairs, .. } => 2 * pairs.len() + 1,
        }
    }

    pub fn child(&self, index: usize) -> Option<&Term> {
        match &self.node.shape {
            TermShape::Apply { args, .. } => args.get(index),
            TermShape::Alternatives { pairs, otherwise } => {
                if index == 2 * pairs.len() {
                    Some(otherwise)
                } else {
                    let pair = pairs.get(index / 2)?;
                    Some(if index % 2 == 0 { &pair.0 } else { &pair.1 })
                }
            }
        }
    }

    /// Walks a path of child indices down from this term.
    pub fn subterm_at(&self, path: &[usize]) -> Option<&Term> {
        let mut current = self;
        for &index in path {
            current = current.child(index)?;
        }
        Some(current)
    }

    /// Returns a new term with the sub-term at `path` replaced.
    /// Panics on a path that does not address a sub-term; passing one is a
    /// caller bug, not a recoverable condition.
    pub fn replace_at(&self, path: &[usize], replacement: Term) -> Term {
        if path.is_empty() {
            return replacement;
        }
        let index = path[0];
        match &self.node.shape {
            TermShape::Apply {
                name,
                type_name,
                quantifier,
                convention,
                args,
            } => {
                if index >= args.len() {
                    panic!("replace_at: child index {} out of range", index);
                }
                let mut new_args = args.clone();
                new_args[index] = args[index].replace_at(&path[1..], replacement);
                Term::apply(
                    name.clone(),
                    type_name.clone(),
                    new_args,
                    *quantifier,
                    *convention,
                )
            }
            TermShape::Alternatives { pairs, otherwise } => {
                let mut new_pairs = pairs.clone();
                let mut new_otherwise = otherwise.clone();
                if index == 2 * pairs.len() {
                    new_otherwise = otherwise.replace_at(&path[1..], replacement);
                } else if index / 2 < pairs.len() {
                    let pair = &mut new_pairs[index / 2];
                    if index % 2 == 0 {
                        pair.0 = pair.0.replace_at(&path[1..], replacement);
                    } else {
                        pair.1 = pair.1.replace_at(&path[1..], replacement);
                    }
                } else {
                    panic!("replace_at: child index {} out of range", index);
                }
                Term::alternatives(new_pairs, new_otherwise)
            }
        }
    }

    fn children(&self) -> impl Iterator<Item = &Term> {
        (0..self.child_count()).map(move |i| self.child(i).unwrap())
    }

    // ========== Structural queries ==========

    fn structurally_equal(&self, other: &Term) -> bool {
        match (&self.node.shape, &other.node.shape) {
            (
                TermShape::Apply {
                    name: n1,
                    type_name: t1,
                    quantifier: q1,
                    args: a1,
                    ..
                },
                TermShape::Apply {
                    name: n2,
                    type_name: t2,
                    quantifier: q2,
                    args: a2,
                    ..
                },
            ) => {
                n1 == n2
                    && t1 == t2
                    && q1 == q2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| x == y)
            }
            (
                TermShape::Alternatives {
                    pairs: p1,
                    otherwise: o1,
                },
                TermShape::Alternatives {
                    pairs: p2,
                    otherwise: o2,
                },
            ) => {
                p1.len() == p2.len()
                    && p1
                        .iter()
                        .zip(p2)
                        .all(|((c1, r1), (c2, r2))| c1 == c2 && r1 == r2)
                    && o1 == o2
            }
            _ => false,
        }
    }

    /// True if `other` occurs as a sub-term of this term (including self).
    pub fn contains(&self, other: &Term) -> bool {
        if self == other {
            return true;
        }
        self.children().any(|c| c.contains(other))
    }

    /// True if any universally quantified node remains in the term.
    pub fn has_universal(&self) -> bool {
        if self.quantifier() == Quantifier::ForAll {
            return true;
        }
        self.children().any(|c| c.has_universal())
    }

    /// The distinct universally quantified leaves, in first-occurrence order.
    pub fn universal_leaves(&self) -> Vec<Term> {
        let mut out = vec![];
        self.collect_universal_leaves(&mut out);
        out
    }

    fn collect_universal_leaves(&self, out: &mut Vec<Term>) {
        if self.is_leaf() && self.quantifier() == Quantifier::ForAll {
            if !out.contains(self) {
                out.push(self.clone());
            }
            return;
        }
        for child in self.children() {
            child.collect_universal_leaves(out);
        }
    }

    /// The distinct names of quantified leaves (for-all or exists), in
    /// first-occurrence order.
    pub fn quantified_leaf_names(&self) -> Vec<String> {
        let mut out = vec![];
        self.collect_quantified_names(&mut out);
        out
    }

    fn collect_quantified_names(&self, out: &mut Vec<String>) {
        if self.is_leaf() && self.quantifier() != Quantifier::None {
            if !out.iter().any(|n| n == self.name()) {
                out.push(self.name().to_string());
            }
            return;
        }
        for child in self.children() {
            child.collect_quantified_names(out);
        }
    }

    // ========== Transformations ==========

    /// Replaces every sub-term that matches a mapping key.
    /// When no key occurs anywhere in the term, this returns the same shared
    /// node untouched, so callers can substitute speculatively without paying
    /// for allocation.
    pub fn substitute(&self, mapping: &HashMap<Term, Term>) -> Term {
        if mapping.is_empty() || !self.contains_key_of(mapping) {
            return self.clone();
        }
        self.substitute_inner(mapping)
    }

    fn contains_key_of(&self, mapping: &HashMap<Term, Term>) -> bool {
        if mapping.contains_key(self) {
            return true;
        }
        self.children().any(|c| c.contains_key_of(mapping))
    }

    fn substitute_inner(&self, mapping: &HashMap<Term, Term>) -> Term {
        if let Some(replacement) = mapping.get(self) {
            return replacement.clone();
        }
        match &self.node.shape {
            TermShape::Apply {
                name,
                type_name,
                quantifier,
                convention,
                args,
            } => {
                if args.is_empty() {
                    return self.clone();
                }
                let new_args = args.iter().map(|a| a.substitute(mapping)).collect();
                Term::apply(
                    name.clone(),
                    type_name.clone(),
                    new_args,
                    *quantifier,
                    *convention,
                )
            }
            TermShape::Alternatives { pairs, otherwise } => {
                let new_pairs = pairs
                    .iter()
                    .map(|(c, r)| (c.substitute(mapping), r.substitute(mapping)))
                    .collect();
                Term::alternatives(new_pairs, otherwise.substitute(mapping))
            }
        }
    }

    /// Substitutes bound pattern variables by name. A bound variable with
    /// arguments is a function-variable: its binding must be a leaf symbol,
    /// which replaces the head while the arguments are substituted in place.
    pub fn substitute_universals(&self, mapping: &HashMap<String, Term>) -> Term {
        match &self.node.shape {
            TermShape::Apply {
                name,
                type_name,
                quantifier,
                convention,
                args,
            } => {
                if *quantifier == Quantifier::ForAll {
                    if let Some(bound) = mapping.get(name) {
                        if args.is_empty() {
                            return bound.clone();
                        }
                        let new_args = args
                            .iter()
                            .map(|a| a.substitute_universals(mapping))
                            .collect();
                        return Term::apply(
                            bound.name(),
                            bound.type_name(),
                            new_args,
                            Quantifier::None,
                            bound.convention(),
                        );
                    }
                }
                if args.is_empty() {
                    return self.clone();
                }
                let new_args = args
                    .iter()
                    .map(|a| a.substitute_universals(mapping))
                    .collect();
                Term::apply(
                    name.clone(),
                    type_name.clone(),
                    new_args,
                    *quantifier,
                    *convention,
                )
            }
            TermShape::Alternatives { pairs, otherwise } => {
                let new_pairs = pairs
                    .iter()
                    .map(|(c, r)| {
                        (
                            c.substitute_universals(mapping),
                            r.substitute_universals(mapping),
                        )
                    })
                    .collect();
                Term::alternatives(new_pairs, otherwise.substitute_universals(mapping))
            }
        }
    }

    /// Renames quantified leaves according to the mapping.
    pub fn rename_quantified(&self, mapping: &HashMap<String, String>) -> Term {
        match &self.node.shape {
            TermShape::Apply {
                name,
                type_name,
                quantifier,
                convention,
                args,
            } => {
                let new_name = if *quantifier != Quantifier::None {
                    mapping.get(name).cloned().unwrap_or_else(|| name.clone())
                } else {
                    name.clone()
                };
                let new_args = args.iter().map(|a| a.rename_quantified(mapping)).collect();
                Term::apply(
                    new_name,
                    type_name.clone(),
                    new_args,
                    *quantifier,
                    *convention,
                )
            }
            TermShape::Alternatives { pairs, otherwise } => {
                let new_pairs = pairs
                    .iter()
                    .map(|(c, r)| (c.rename_quantified(mapping), r.rename_quantified(mapping)))
                    .collect();
                Term::alternatives(new_pairs, otherwise.rename_quantified(mapping))
            }
        }
    }

    /// Swaps for-all and there-exists on every node. Used when a sub-formula
    /// moves across the turnstile.
    pub fn flip_quantifiers(&self) -> Term {
        match &self.node.shape {
            TermShape::Apply {
                name,
                type_name,
                quantifier,
                convention,
                args,
            } => {
                let new_args = args.iter().map(|a| a.flip_quantifiers()).collect();
                Term::apply(
                    name.clone(),
                    type_name.clone(),
                    new_args,
                    quantifier.flipped(),
                    *convention,
                )
            }
            TermShape::Alternatives { pairs, otherwise } => {
                let new_pairs = pairs
                    .iter()
                    .map(|(c, r)| (c.flip_quantifiers(), r.flip_quantifiers()))
                    .collect();
                Term::alternatives(new_pairs, otherwise.flip_quantifiers())
            }
        }
    }

    // ========== Pattern matching ==========

    /// One-directional matching of this pattern against a target term.
    /// A for-all-quantified node binds freely, subject to the subtype
    /// relation; everything else requires an exact name and arity match and
    /// recurses structurally. Bindings accumulated earlier in the same search
    /// constrain later occurrences of the same variable.
    pub fn bind_to(
        &self,
        target: &Term,
        bindings: &mut Bindings,
        types: &dyn TypeOracle,
    ) -> Result<(), BindingError> {
        match &self.node.shape {
            TermShape::Apply {
                name,
                type_name,
                quantifier: Quantifier::ForAll,
                args,
                ..
            } => {
                if args.is_empty() {
                    return self.bind_variable(name, type_name, target, bindings, types);
                }
                // A function-variable: bind the head, match the arguments.
                if !target.is_apply() || target.args().len() != args.len() {
                    return Err(BindingError::new(format!(
                        "function variable {} needs {} arguments",
                        name,
                        args.len()
                    )));
                }
                if let Some(bound) = bindings.get(name) {
                    if bound.name() != target.name() {
                        return Err(BindingError::new(format!(
                            "{} already bound to {}, cannot rebind to {}",
                            name,
                            bound.name(),
                            target.name()
                        )));
                    }
                } else {
                    if !types.is_subtype(target.type_name(), type_name) {
                        return Err(BindingError::new(format!(
                            "{} : {} does not accept a {}",
                            name,
                            type_name,
                            target.type_name()
                        )));
                    }
                    let head = Term::symbol(target.name(), target.type_name());
                    bindings.insert(name.clone(), head);
                }
                for (pattern_arg, target_arg) in args.iter().zip(target.args()) {
                    pattern_arg.bind_to(target_arg, bindings, types)?;
                }
                Ok(())
            }
            TermShape::Apply { name, args, .. } => {
                if !target.is_apply() {
                    return Err(BindingError::new(format!(
                        "{} cannot match an alternatives term",
                        name
                    )));
                }
                if name != target.name() {
                    return Err(BindingError::new(format!(
                        "{} does not match {}",
                        name,
                        target.name()
                    )));
                }
                if args.len() != target.args().len() {
                    return Err(BindingError::new(format!(
                        "{} arity mismatch: {} vs {}",
                        name,
                        args.len(),
                        target.args().len()
                    )));
                }
                for (pattern_arg, target_arg) in args.iter().zip(target.args()) {
                    pattern_arg.bind_to(target_arg, bindings, types)?;
                }
                Ok(())
            }
            TermShape::Alternatives { pairs, otherwise } => {
                let (target_pairs, target_otherwise) = match target.alternatives_parts() {
                    Some(parts) => parts,
                    None => {
                        return Err(BindingError::new(
                            "alternatives pattern cannot match an application",
                        ))
                    }
                };
                if pairs.len() != target_pairs.len() {
                    return Err(BindingError::new("alternative count mismatch"));
                }
                for ((c1, r1), (c2, r2)) in pairs.iter().zip(target_pairs) {
                    c1.bind_to(c2, bindings, types)?;
                    r1.bind_to(r2, bindings, types)?;
                }
                otherwise.bind_to(target_otherwise, bindings, types)
            }
        }
    }

    fn bind_variable(
        &self,
        name: &str,
        type_name: &str,
        target: &Term,
        bindings: &mut Bindings,
        types: &dyn TypeOracle,
    ) -> Result<(), BindingError> {
        // A variable bound earlier must match consistently here.
        if let Some(bound) = bindings.get(name) {
            if bound == target {
                return Ok(());
            }
            return Err(BindingError::new(format!(
                "{} already bound to {}, which differs from {}",
                name, bound, target
            )));
        }
        if !types.is_subtype(target.type_name(), type_name) {
            return Err(BindingError::new(format!(
                "{} : {} does not accept a {}",
                name,
                type_name,
                target.type_name()
            )));
        }
        bindings.insert(name.to_string(), target.clone());
        Ok(())
    }

    // ========== Parsing (for tests and tools) ==========

    /// Parses a term from a compact string form: `f(a, g(b))`.
    /// A leading `*` marks a for-all variable, a leading `?` an existential.
    /// `true` and `false` are Boolean, digit strings are Natural, everything
    /// else is typed Entity. Panics on malformed input.
    pub fn parse(s: &str) -> Term {
        let s = s.trim();
        let first_paren = match s.find('(') {
            Some(i) => i,
            None => return Term::parse_leaf(s),
        };

        // Find the commas that sit at exactly one level of parentheses.
        let mut terminator_indices = vec![];
        let mut num_parens = 0;
        for (i, c) in s.chars().enumerate() {
            match c {
                '(' => num_parens += 1,
                ')' => {
                    num_parens -= 1;
                    if num_parens == 0 {
                        terminator_indices.push(i);
                    }
                }
                ',' => {
                    if num_parens == 1 {
                        terminator_indices.push(i);
                    }
                }
                _ => (),
            }
        }
        if num_parens != 0 {
            panic!("unbalanced parentheses in term: '{}'", s);
        }

        let head = &s[0..first_paren];
        let mut args = vec![];
        for (i, terminator_index) in terminator_indices.iter().enumerate() {
            let start = if i == 0 {
                first_paren + 1
            } else {
                terminator_indices[i - 1] + 1
            };
            args.push(Term::parse(&s[start..*terminator_index]));
        }

        let leaf = Term::parse_leaf(head);
        Term::apply(
            leaf.name(),
            crate::kernel::type_graph::ENTITY,
            args,
            leaf.quantifier(),
            Convention::Prefix,
        )
    }

    fn parse_leaf(s: &str) -> Term {
        let s = s.trim();
        if s.is_empty() {
            panic!("cannot parse an empty term");
        }
        if let Some(rest) = s.strip_prefix('*') {
            return Term::variable(rest, crate::kernel::type_graph::ENTITY);
        }
        if let Some(rest) = s.strip_prefix('?') {
            return Term::existential(rest, crate::kernel::type_graph::ENTITY);
        }
        if s == ops::TRUE {
            return Term::truth();
        }
        if s == ops::FALSE {
            return Term::falsity();
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            return Term::symbol(s, crate::kernel::type_graph::NATURAL);
        }
        Term::symbol(s, crate::kernel::type_graph::ENTITY)
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.node, &other.node) {
            return true;
        }
        // The value hash is a short-circuit only; a collision must still
        // compare structurally unequal.
        if self.node.value_hash != other.node.value_hash {
            return false;
        }
        self.structurally_equal(other)
    }
}

impl Eq for Term {}

impl std::hash::Hash for Term {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.node.value_hash);
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", crate::kernel::display::render_string(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::type_graph::{BasicTypeGraph, BOOLEAN, ENTITY, INTEGER, NATURAL};

    #[test]
    fn test_hash_stability_and_equality() {
        let t1 = Term::parse("f(a, g(b))");
        let t2 = Term::parse("f(a, g(b))");
        assert_eq!(t1.value_hash(), t1.value_hash());
        assert_eq!(t1, t2);
        assert_eq!(t1.value_hash(), t2.value_hash());
        assert_eq!(t1.structure_hash(), t2.structure_hash());

        let t3 = Term::parse("f(a, g(c))");
        assert_ne!(t1, t3);
        // Same shape, different leaves: structure hashes agree.
        assert_eq!(t1.structure_hash(), t3.structure_hash());
    }

    #[test]
    fn test_type_distinguishes_terms() {
        let a = Term::symbol("x", NATURAL);
        let b = Term::symbol("x", INTEGER);
        assert_ne!(a, b);
    }

    #[test]
    fn test_substitute_no_occurrence_is_free() {
        let t = Term::parse("f(a, b)");
        let mut mapping = HashMap::new();
        mapping.insert(Term::parse("zzz"), Term::parse("c"));
        let out = t.substitute(&mapping);
        assert!(Arc::ptr_eq(&t.node, &out.node));
    }

    #[test]
    fn test_substitute_idempotence() {
        let t = Term::parse("f(x, g(x))");
        let mut mapping = HashMap::new();
        mapping.insert(Term::parse("x"), Term::parse("h(y)"));
        let once = t.substitute(&mapping);
        let twice = once.substitute(&mapping);
        assert_eq!(once, twice);
        assert_eq!(once, Term::parse("f(h(y), g(h(y)))"));
    }

    #[test]
    fn test_bind_variable_records_binding() {
        let types = BasicTypeGraph::new();
        let pattern = Term::parse("f(*x, b)");
        let target = Term::parse("f(a, b)");
        let mut bindings = Bindings::new();
        pattern.bind_to(&target, &mut bindings, &types).unwrap();
        assert_eq!(bindings.get("x"), Some(&Term::parse("a")));
    }

    #[test]
    fn test_bind_requires_consistency() {
        let types = BasicTypeGraph::new();
        let pattern = Term::parse("f(*x, *x)");
        assert!(pattern
            .bind_to(&Term::parse("f(a, a)"), &mut Bindings::new(), &types)
            .is_ok());
        assert!(pattern
            .bind_to(&Term::parse("f(a, b)"), &mut Bindings::new(), &types)
            .is_err());
    }

    #[test]
    fn test_bind_name_mismatch_fails() {
        let types = BasicTypeGraph::new();
        let pattern = Term::parse("f(a)");
        let result = pattern.bind_to(&Term::parse("g(a)"), &mut Bindings::new(), &types);
        assert!(result.is_err());
    }

    #[test]
    fn test_bind_checks_subtype() {
        let types = BasicTypeGraph::new();
        let pattern = Term::variable("n", INTEGER);
        let nat = Term::symbol("zero", NATURAL);
        let flag = Term::symbol("flag", BOOLEAN);
        assert!(pattern.bind_to(&nat, &mut Bindings::new(), &types).is_ok());
        assert!(pattern.bind_to(&flag, &mut Bindings::new(), &types).is_err());
    }

    #[test]
    fn test_bind_function_variable() {
        let types = BasicTypeGraph::new();
        let pattern = Term::apply(
            "F",
            ENTITY,
            vec![Term::parse("*x")],
            Quantifier::ForAll,
            Convention::Prefix,
        );
        let target = Term::parse("suc(zero)");
        let mut bindings = Bindings::new();
        pattern.bind_to(&target, &mut bindings, &types).unwrap();
        assert_eq!(bindings.get("F").unwrap().name(), "suc");
        assert_eq!(bindings.get("x"), Some(&Term::parse("zero")));
    }

    #[test]
    fn test_flip_quantifiers() {
        let t = Term::parse("f(*x, ?y)");
        let flipped = t.flip_quantifiers();
        assert_eq!(flipped.args()[0].quantifier(), Quantifier::Exists);
        assert_eq!(flipped.args()[1].quantifier(), Quantifier::ForAll);
        assert_eq!(flipped.flip_quantifiers(), t);
    }

    #[test]
    fn test_paths() {
        let t = Term::parse("f(a, g(b))");
        assert_eq!(t.subterm_at(&[]), Some(&t));
        assert_eq!(t.subterm_at(&[1, 0]), Some(&Term::parse("b")));
        assert_eq!(t.subterm_at(&[2]), None);

        let replaced = t.replace_at(&[1, 0], Term::parse("c"));
        assert_eq!(replaced, Term::parse("f(a, g(c))"));
        // The original is untouched.
        assert_eq!(t, Term::parse("f(a, g(b))"));
    }

    #[test]
    fn test_alternatives_paths() {
        let alt = Term::alternatives(
            vec![(Term::parse("c"), Term::parse("r"))],
            Term::parse("o"),
        );
        assert_eq!(alt.child(0), Some(&Term::parse("c")));
        assert_eq!(alt.child(1), Some(&Term::parse("r")));
        assert_eq!(alt.child(2), Some(&Term::parse("o")));
        assert_eq!(alt.child(3), None);
    }

    #[test]
    fn test_universal_leaves() {
        let t = Term::parse("f(*x, g(*y, *x))");
        let leaves = t.universal_leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].name(), "x");
        assert_eq!(leaves[1].name(), "y");
        assert!(t.has_universal());
        assert!(!Term::parse("f(a)").has_universal());
    }

    #[test]
    fn test_substitute_universals_function_head() {
        let pattern = Term::apply(
            "F",
            ENTITY,
            vec![Term::parse("a")],
            Quantifier::ForAll,
            Convention::Prefix,
        );
        let mut mapping = HashMap::new();
        mapping.insert("F".to_string(), Term::parse("suc"));
        let out = pattern.substitute_universals(&mapping);
        assert_eq!(out, Term::parse("suc(a)"));
    }
}
