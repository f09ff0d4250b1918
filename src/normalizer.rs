use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::error::ModelError;
use crate::kernel::term::{ops, Convention, Quantifier, Term};
use crate::kernel::type_graph::{TypeOracle, BOOLEAN, INTEGER, NATURAL};
use crate::vc::Sequent;

/// The result of running the pipeline over a raw sequent: canonicalized
/// antecedents and consequents, plus the side predicates collected by lambda
/// lifting and conditional elimination.
pub struct NormalizationOutput {
    pub antecedents: Vec<Term>,
    pub consequents: Vec<Term>,
    pub side_predicates: Vec<Term>,
}

/// Runs the fixed normalization pipeline, once per VC:
/// canonicalize the connectives, lift lambdas, eliminate
/// conditional-alternatives, merge equalities between lifted names, and
/// uniquely rename pipeline-introduced quantified variables.
pub struct Normalizer {
    types: Arc<dyn TypeOracle>,
    /// Fresh-name counter shared by every stage, so no two introduced
    /// symbols can collide.
    counter: u32,
    /// Deduplication of lifted lambda bodies, keyed on (arity, body with
    /// parameter names normalized).
    lifted_bodies: HashMap<(usize, Term), String>,
    /// Names introduced by lifting; used to recognize definitional
    /// equalities that can be merged away.
    lifted_names: HashSet<String>,
}

impl Normalizer {
    pub fn new(types: Arc<dyn TypeOracle>) -> Normalizer {
        Normalizer {
            types,
            counter: 0,
            lifted_bodies: HashMap::new(),
            lifted_names: HashSet::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.counter;
        self.counter += 1;
        id
    }

    pub fn normalize(&mut self, sequent: &Sequent) -> Result<NormalizationOutput, ModelError> {
        let mut side = vec![];

        let mut antecedents = vec![];
        for term in &sequent.antecedents {
            let canonical = self.canonicalize(term);
            trace!("canonicalized antecedent: {}", canonical);
            antecedents.push(self.lift_lambdas(&canonical, &mut side));
        }

        let mut consequents = vec![];
        for term in &sequent.consequents {
            let canonical = self.canonicalize(term);
            trace!("canonicalized consequent: {}", canonical);
            consequents.push(self.lift_lambdas(&canonical, &mut side));
        }

        let side = self.eliminate_alternatives(side)?;
        let mut output = NormalizationOutput {
            antecedents,
            consequents,
            side_predicates: side,
        };
        self.merge_lifted_equalities(&mut output);
        self.uniquify_quantifiers(&mut output.side_predicates);
        trace!(
            "normalized: {} antecedents, {} consequents, {} side predicates",
            output.antecedents.len(),
            output.consequents.len(),
            output.side_predicates.len()
        );
        Ok(output)
    }

    // ========== Connective canonicalization ==========

    /// Rewrites derived connectives into the canonical primitive set:
    /// `/=` into `=` composed with `false`, `not` into `=B false`, `>=` and
    /// `>` into `<=` with swapped operands, integer-typed `<` into `+1 <=`,
    /// and binary `-` into `+` of a negation.
    pub fn canonicalize(&self, term: &Term) -> Term {
        if let Some((pairs, otherwise)) = term.alternatives_parts() {
            let new_pairs = pairs
                .iter()
                .map(|(c, r)| (self.canonicalize(c), self.canonicalize(r)))
                .collect();
            return Term::alternatives(new_pairs, self.canonicalize(otherwise));
        }

        let args: Vec<Term> = term.args().iter().map(|a| self.canonicalize(a)).collect();
        match (term.name(), args.len()) {
            (ops::NEQ, 2) => {
                let equality = Term::infix(ops::EQ, BOOLEAN, args[0].clone(), args[1].clone());
                Term::infix(ops::EQ_BOOL, BOOLEAN, equality, Term::falsity())
            }
            (ops::NOT, 1) => Term::infix(ops::EQ_BOOL, BOOLEAN, args[0].clone(), Term::falsity()),
            (ops::GE, 2) => Term::infix(ops::LE, BOOLEAN, args[1].clone(), args[0].clone()),
            (ops::GT, 2) => self.rewrite_less_than(args[1].clone(), args[0].clone()),
            (ops::LT, 2) => self.rewrite_less_than(args[0].clone(), args[1].clone()),
            (ops::MINUS, 2) => {
                let negated = Term::apply(
                    ops::NEG,
                    args[1].type_name(),
                    vec![args[1].clone()],
                    Quantifier::None,
                    Convention::Prefix,
                );
                Term::infix(ops::PLUS, term.type_name(), args[0].clone(), negated)
            }
            _ => Term::apply(
                term.name(),
                term.type_name(),
                args,
                term.quantifier(),
                term.convention(),
            ),
        }
    }

    /// Integer-typed `a < b` becomes `a + 1 <= b`; over other types the
    /// strict comparison is left alone.
    fn rewrite_less_than(&self, left: Term, right: Term) -> Term {
        if !self.types.is_subtype(left.type_name(), INTEGER) {
            return Term::infix(ops::LT, BOOLEAN, left, right);
        }
        let operand_type = left.type_name().to_string();
        let one = Term::symbol("1", NATURAL);
        let incremented = Term::infix(ops::PLUS, operand_type, left, one);
        Term::infix(ops::LE, BOOLEAN, incremented, right)
    }

    // ========== Lambda lifting ==========

    /// Replaces each distinct lambda body with a fresh named function symbol,
    /// recording `name(params) = body` as a side obligation. Bodies are
    /// deduplicated after parameter-name normalization, and the trivial
    /// `lambda(x, F(x))` collapses to the bare symbol `F`.
    fn lift_lambdas(&mut self, term: &Term, side: &mut Vec<Term>) -> Term {
        let rebuilt = if let Some((pairs, otherwise)) = term.alternatives_parts() {
            let new_pairs = pairs
                .iter()
                .map(|(c, r)| (self.lift_lambdas(c, side), self.lift_lambdas(r, side)))
                .collect();
            Term::alternatives(new_pairs, self.lift_lambdas(otherwise, side))
        } else {
            let args = term
                .args()
                .iter()
                .map(|a| self.lift_lambdas(a, side))
                .collect();
            Term::apply(
                term.name(),
                term.type_name(),
                args,
                term.quantifier(),
                term.convention(),
            )
        };

        if !rebuilt.is_apply() || rebuilt.name() != ops::LAMBDA || rebuilt.args().len() < 2 {
            return rebuilt;
        }

        let args = rebuilt.args();
        let (params, body) = args.split_at(args.len() - 1);
        let body = &body[0];
        if !params
            .iter()
            .all(|p| p.is_leaf() && p.quantifier() == Quantifier::ForAll)
        {
            return rebuilt;
        }

        // lambda(x, F(x)) is already a name for F.
        if body.is_apply() && body.quantifier() == Quantifier::None && body.args() == params {
            trace!("trivial lambda collapses to {}", body.name());
            return Term::symbol(body.name(), body.type_name());
        }

        // Normalize parameter names so alpha-equivalent bodies share a lift.
        let renaming: HashMap<String, String> = params
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name().to_string(), format!("p{}", i)))
            .collect();
        let key = (params.len(), body.rename_quantified(&renaming));
        if let Some(existing) = self.lifted_bodies.get(&key) {
            return Term::symbol(existing.clone(), body.type_name());
        }

        let name = format!("lift{}", self.next_id());
        trace!("lifting lambda body {} as {}", body, name);
        self.lifted_bodies.insert(key, name.clone());
        self.lifted_names.insert(name.clone());

        let applied = Term::apply(
            name.clone(),
            body.type_name(),
            params.to_vec(),
            Quantifier::None,
            Convention::Prefix,
        );
        side.push(Term::infix(ops::EQ, BOOLEAN, applied, body.clone()));
        Term::symbol(name, body.type_name())
    }

    // ========== Conditional elimination ==========

    /// Converts each side predicate of the shape `lhs = if c then r else o`
    /// into a fresh choice-function symbol over the predicate's quantified
    /// variables, an equality tying it to `lhs`, and guarded equations for
    /// the one alternative and the otherwise-result. More than one
    /// alternative is an explicit unsupported-input error, never silently
    /// approximated.
    fn eliminate_alternatives(&mut self, side: Vec<Term>) -> Result<Vec<Term>, ModelError> {
        let mut out = vec![];
        for predicate in side {
            let is_definition = predicate.is_apply()
                && predicate.name() == ops::EQ
                && predicate.args().len() == 2
                && predicate.args()[1].is_alternatives();
            if !is_definition {
                out.push(predicate);
                continue;
            }

            let lhs = predicate.args()[0].clone();
            let (pairs, otherwise) = predicate.args()[1].alternatives_parts().unwrap();
            if pairs.len() > 1 {
                return Err(ModelError::MultipleAlternatives(pairs.len()));
            }

            let name = format!("choice{}", self.next_id());
            trace!("converting conditional into choice function {}", name);
            let variables = lhs.universal_leaves();
            let choice = if variables.is_empty() {
                Term::symbol(name, otherwise.type_name())
            } else {
                Term::apply(
                    name,
                    otherwise.type_name(),
                    variables,
                    Quantifier::None,
                    Convention::Prefix,
                )
            };

            out.push(Term::infix(ops::EQ, BOOLEAN, choice.clone(), lhs));
            if let Some((condition, result)) = pairs.first() {
                // When the condition holds the choice is the alternative;
                // otherwise it is the otherwise-result.
                let negated =
                    Term::infix(ops::EQ_BOOL, BOOLEAN, condition.clone(), Term::falsity());
                out.push(Term::infix(
                    ops::OR,
                    BOOLEAN,
                    negated,
                    Term::infix(ops::EQ, BOOLEAN, choice.clone(), result.clone()),
                ));
                out.push(Term::infix(
                    ops::OR,
                    BOOLEAN,
                    condition.clone(),
                    Term::infix(ops::EQ, BOOLEAN, choice.clone(), otherwise.clone()),
                ));
            } else {
                out.push(Term::infix(ops::EQ, BOOLEAN, choice, otherwise.clone()));
            }
        }
        Ok(out)
    }

    // ========== Lifted-name merging ==========

    /// A definitional equality between two lifted names means one of them is
    /// redundant: substitute one for the other everywhere and drop the
    /// equality.
    fn merge_lifted_equalities(&mut self, output: &mut NormalizationOutput) {
        loop {
            let position = output.side_predicates.iter().position(|predicate| {
                predicate.is_apply()
                    && (predicate.name() == ops::EQ || predicate.name() == ops::EQ_BOOL)
                    && predicate.args().len() == 2
                    && predicate.args().iter().all(|arg| {
                        arg.is_leaf() && self.lifted_names.contains(arg.name())
                    })
                    && predicate.args()[0] != predicate.args()[1]
            });
            let position = match position {
                Some(p) => p,
                None => return,
            };
            let predicate = output.side_predicates.remove(position);
            let keep = predicate.args()[0].clone();
            let drop = predicate.args()[1].clone();
            trace!("merging lifted name {} into {}", drop, keep);
            let mut mapping = HashMap::new();
            mapping.insert(drop, keep);
            for term in output
                .antecedents
                .iter_mut()
                .chain(output.consequents.iter_mut())
                .chain(output.side_predicates.iter_mut())
            {
                *term = term.substitute(&mapping);
            }
        }
    }

    // ========== Quantifier uniquification ==========

    /// Renames the quantified variables of each side predicate to globally
    /// fresh names, so side conditions collected from unrelated sub-terms
    /// can never capture each other's variables.
    fn uniquify_quantifiers(&mut self, predicates: &mut [Term]) {
        for predicate in predicates.iter_mut() {
            let names = predicate.quantified_leaf_names();
            if names.is_empty() {
                continue;
            }
            let mapping: HashMap<String, String> = names
                .into_iter()
                .map(|name| {
                    let fresh = format!("q{}", self.next_id());
                    (name, fresh)
                })
                .collect();
            *predicate = predicate.rename_quantified(&mapping);
        }
    }
}

/// The boolean-algebra facts seeded into every conjunction, which make the
/// boolean simplification steps total.
pub fn boolean_axioms() -> Vec<Term> {
    let truth = Term::truth;
    let falsity = Term::falsity;
    let conj = |l, r| Term::infix(ops::AND, BOOLEAN, l, r);
    let eq_bool = |l, r| Term::infix(ops::EQ_BOOL, BOOLEAN, l, r);
    vec![
        eq_bool(eq_bool(truth(), falsity()), falsity()),
        eq_bool(conj(truth(), truth()), truth()),
        eq_bool(conj(truth(), falsity()), falsity()),
        eq_bool(conj(falsity(), falsity()), falsity()),
    ]
}
