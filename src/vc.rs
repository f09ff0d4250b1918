use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ModelError;
use crate::kernel::conjunction::NormalizedConjunction;
use crate::kernel::registry::SymbolRegistry;
use crate::kernel::term::{ops, Term};
use crate::kernel::type_graph::TypeOracle;
use crate::model::{Fact, ProofModel, Theorem};
use crate::normalizer::{boolean_axioms, Normalizer};

/// The raw antecedent/consequent pair as produced by the VC generator,
/// before normalization. In-process object handoff; there is no wire format.
#[derive(Clone, Debug)]
pub struct Sequent {
    pub antecedents: Vec<Term>,
    pub consequents: Vec<Term>,
}

impl Sequent {
    pub fn new(antecedents: Vec<Term>, consequents: Vec<Term>) -> Sequent {
        Sequent {
            antecedents,
            consequents,
        }
    }
}

/// Where a proof stands. Transitions are monotonic: a discovered antecedent
/// inconsistency is never retracted, and a terminal state never changes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ProofStatus {
    /// The initial state: the proof is in progress.
    StillEvaluating,
    /// The antecedent conjunction is unsatisfiable, so the VC holds
    /// trivially.
    FalseAssumption,
    /// The goal set was discharged.
    Proved,
    /// An external decision that search is exhausted.
    Unprovable,
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProofStatus::StillEvaluating => write!(f, "still evaluating"),
            ProofStatus::FalseAssumption => write!(f, "false assumption"),
            ProofStatus::Proved => write!(f, "proved"),
            ProofStatus::Unprovable => write!(f, "unprovable"),
        }
    }
}

/// A normalized verification condition: the flattened antecedent conjunction,
/// the goal set, and the registry that owns every symbol either mentions.
/// The registry is owned exclusively by this VC and never shared across
/// proof states.
pub struct Vc {
    name: String,
    registry: SymbolRegistry,
    conjunction: NormalizedConjunction,
    /// The antecedent atoms, in the order they were fed to the conjunction.
    antecedent_atoms: Vec<Term>,
    goals: Vec<Term>,
    status: ProofStatus,
}

impl Vc {
    /// Runs the normalization pipeline over a raw sequent and assembles the
    /// proof state inputs: boolean axioms are seeded unconditionally, the
    /// antecedent atoms feed the conjunction (stopping early once it goes
    /// false), and the consequent atoms become goals, with a top-level
    /// disjunction split into independently-trackable goals.
    pub fn build(
        name: impl Into<String>,
        sequent: &Sequent,
        types: Arc<dyn TypeOracle>,
    ) -> Result<Vc, ModelError> {
        let name = name.into();
        let mut normalizer = Normalizer::new(types.clone());
        let output = normalizer.normalize(sequent)?;

        let mut registry = SymbolRegistry::new(types);
        let mut conjunction = NormalizedConjunction::new();
        for axiom in boolean_axioms() {
            conjunction.add_formula(axiom, &mut registry);
        }

        let mut antecedent_atoms = vec![];
        for term in output
            .antecedents
            .iter()
            .chain(output.side_predicates.iter())
        {
            flatten_conjuncts(term, &mut antecedent_atoms);
        }
        for atom in &antecedent_atoms {
            if conjunction.is_unsatisfiable() {
                trace!("antecedent went false, remaining atoms skipped");
                break;
            }
            conjunction.add_formula(atom.clone(), &mut registry);
        }

        let mut goals = vec![];
        for term in &output.consequents {
            let mut conjuncts = vec![];
            flatten_conjuncts(term, &mut conjuncts);
            for conjunct in conjuncts {
                if conjunct.is_apply()
                    && conjunct.name() == ops::OR
                    && conjunct.args().len() == 2
                {
                    goals.push(conjunct.args()[0].clone());
                    goals.push(conjunct.args()[1].clone());
                } else {
                    goals.push(conjunct);
                }
            }
        }
        // A goal that is already the literal `true` is satisfied on arrival.
        goals.retain(|goal| !goal.is_true());

        let status = if conjunction.is_unsatisfiable() {
            ProofStatus::FalseAssumption
        } else if goals.is_empty() {
            ProofStatus::Proved
        } else {
            ProofStatus::StillEvaluating
        };
        trace!("built VC {}: {}", name, status);

        Ok(Vc {
            name,
            registry,
            conjunction,
            antecedent_atoms,
            goals,
            status,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProofStatus {
        self.status
    }

    /// Moves to a new status. Terminal states are sticky: once proved, false,
    /// or abandoned, the status never changes again.
    pub fn set_status(&mut self, status: ProofStatus) {
        if self.status == ProofStatus::StillEvaluating {
            self.status = status;
        }
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SymbolRegistry {
        &mut self.registry
    }

    pub fn conjunction(&self) -> &NormalizedConjunction {
        &self.conjunction
    }

    pub fn antecedent_atoms(&self) -> &[Term] {
        &self.antecedent_atoms
    }

    pub fn goals(&self) -> &[Term] {
        &self.goals
    }

    /// Builds the live proof state: the antecedent atoms become local facts
    /// and the goal set carries over, with the given library shared
    /// read-only.
    pub fn make_model(&self, theorems: Arc<Vec<Theorem>>) -> ProofModel {
        let mut model = ProofModel::new(self.name.clone(), theorems);
        // Initial population is not a proof step: nothing is logged and no
        // notifications fire, so the step log starts empty.
        for (i, atom) in self.antecedent_atoms.iter().enumerate() {
            model.raw_insert_fact(i, Fact::given(atom.clone()));
        }
        for (i, goal) in self.goals.iter().enumerate() {
            model.raw_insert_goal(i, goal.clone());
        }
        model
    }
}

/// Splits a term into its top-level conjuncts, in order.
pub fn flatten_conjuncts(term: &Term, out: &mut Vec<Term>) {
    if term.is_apply() && term.name() == ops::AND && term.args().len() == 2 {
        flatten_conjuncts(&term.args()[0], out);
        flatten_conjuncts(&term.args()[1], out);
    } else {
        out.push(term.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::type_graph::{BasicTypeGraph, BOOLEAN};

    fn types() -> Arc<BasicTypeGraph> {
        Arc::new(BasicTypeGraph::new())
    }

    #[test]
    fn test_false_antecedent_wins_regardless_of_consequent() {
        let sequent = Sequent::new(vec![Term::falsity()], vec![Term::parse("p(a)")]);
        let vc = Vc::build("vc", &sequent, types()).unwrap();
        assert_eq!(vc.status(), ProofStatus::FalseAssumption);
    }

    #[test]
    fn test_true_consequent_is_proved_on_arrival() {
        let sequent = Sequent::new(vec![], vec![Term::truth()]);
        let vc = Vc::build("vc", &sequent, types()).unwrap();
        assert_eq!(vc.status(), ProofStatus::Proved);
        assert!(vc.goals().is_empty());
    }

    #[test]
    fn test_conjunctive_antecedent_is_flattened() {
        let both = Term::infix(
            ops::AND,
            BOOLEAN,
            Term::parse("p(a)"),
            Term::infix(ops::AND, BOOLEAN, Term::parse("q(b)"), Term::parse("r(c)")),
        );
        let sequent = Sequent::new(vec![both], vec![Term::parse("s(d)")]);
        let vc = Vc::build("vc", &sequent, types()).unwrap();
        assert_eq!(
            vc.antecedent_atoms(),
            &[Term::parse("p(a)"), Term::parse("q(b)"), Term::parse("r(c)")]
        );
        assert_eq!(vc.status(), ProofStatus::StillEvaluating);
    }

    #[test]
    fn test_disjunctive_goal_splits() {
        let either = Term::infix(ops::OR, BOOLEAN, Term::parse("p(a)"), Term::parse("q(b)"));
        let sequent = Sequent::new(vec![], vec![either]);
        let vc = Vc::build("vc", &sequent, types()).unwrap();
        assert_eq!(vc.goals(), &[Term::parse("p(a)"), Term::parse("q(b)")]);
    }

    #[test]
    fn test_boolean_axioms_are_seeded() {
        let sequent = Sequent::new(vec![], vec![Term::parse("p(a)")]);
        let vc = Vc::build("vc", &sequent, types()).unwrap();
        // The four axioms are present even with an empty antecedent.
        assert_eq!(vc.conjunction().len(), 4);
    }

    #[test]
    fn test_status_is_monotonic() {
        let sequent = Sequent::new(vec![], vec![Term::truth()]);
        let mut vc = Vc::build("vc", &sequent, types()).unwrap();
        assert_eq!(vc.status(), ProofStatus::Proved);
        vc.set_status(ProofStatus::Unprovable);
        assert_eq!(vc.status(), ProofStatus::Proved);
    }

    #[test]
    fn test_unprovable_from_still_evaluating() {
        let sequent = Sequent::new(vec![], vec![Term::parse("p(a)")]);
        let mut vc = Vc::build("vc", &sequent, types()).unwrap();
        vc.set_status(ProofStatus::Unprovable);
        assert_eq!(vc.status(), ProofStatus::Unprovable);
    }

    #[test]
    fn test_canonicalization_feeds_through() {
        // not(p) arrives as p =B false in the antecedent atoms.
        let p = Term::symbol("p", BOOLEAN);
        let not_p = Term::apply(
            ops::NOT,
            BOOLEAN,
            vec![p.clone()],
            crate::kernel::term::Quantifier::None,
            crate::kernel::term::Convention::Prefix,
        );
        let sequent = Sequent::new(vec![not_p], vec![Term::parse("q(a)")]);
        let vc = Vc::build("vc", &sequent, types()).unwrap();
        let expected = Term::infix(ops::EQ_BOOL, BOOLEAN, p, Term::falsity());
        assert_eq!(vc.antecedent_atoms(), &[expected]);
    }

    #[test]
    fn test_make_model_carries_state() {
        let sequent = Sequent::new(
            vec![Term::parse("p(a)")],
            vec![Term::parse("q(b)")],
        );
        let vc = Vc::build("vc", &sequent, types()).unwrap();
        let model = vc.make_model(Arc::new(vec![Theorem::new(
            "refl",
            Term::parse("=(*x, *x)"),
        )]));
        assert_eq!(model.fact_count(), 1);
        assert_eq!(model.goal_count(), 1);
        assert_eq!(model.theorem_count(), 1);
        assert!(model.log().is_empty());
        assert_eq!(
            model.get_local_theorem(0).unwrap().term,
            Term::parse("p(a)")
        );
    }
}
