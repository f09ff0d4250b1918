use std::fmt;

use crate::kernel::term::Term;
use crate::model::{Fact, ProofModel};
use crate::site::Site;

/// Why a fact is believed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Justification {
    /// Part of the antecedent as given.
    Given,
    /// A goal moved above the line.
    MovedGoal,
    /// An instance of a named library theorem.
    Theorem(String),
    /// Derived by a named transformation.
    Derived(String),
}

impl fmt::Display for Justification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Justification::Given => write!(f, "given"),
            Justification::MovedGoal => write!(f, "moved goal"),
            Justification::Theorem(name) => write!(f, "theorem {}", name),
            Justification::Derived(name) => write!(f, "by {}", name),
        }
    }
}

/// One applied proof step, recorded with enough information for exact undo.
/// The log of these is externally inspectable, so a driver can replay or
/// backtrack a proof attempt step by step.
#[derive(Clone, Debug)]
pub enum StepRecord {
    InsertFact { index: usize },
    RemoveFact { index: usize, fact: Fact },
    InsertGoal { index: usize },
    RemoveGoal { index: usize, goal: Term },
    AlterSite { site: Site, previous: Term },
}

impl StepRecord {
    /// Reverses this step against the model, restoring exact positions.
    pub fn undo(self, model: &mut ProofModel) {
        match self {
            StepRecord::InsertFact { index } => {
                model.raw_remove_fact(index);
            }
            StepRecord::RemoveFact { index, fact } => {
                model.raw_insert_fact(index, fact);
            }
            StepRecord::InsertGoal { index } => {
                model.raw_remove_goal(index);
            }
            StepRecord::RemoveGoal { index, goal } => {
                model.raw_insert_goal(index, goal);
            }
            StepRecord::AlterSite { site, previous } => {
                model.raw_set_term(&site, previous);
            }
        }
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StepRecord::InsertFact { index } => write!(f, "insert fact at {}", index),
            StepRecord::RemoveFact { index, fact } => {
                write!(f, "remove fact {} at {}", fact.term, index)
            }
            StepRecord::InsertGoal { index } => write!(f, "insert goal at {}", index),
            StepRecord::RemoveGoal { index, goal } => write!(f, "remove goal {} at {}", goal, index),
            StepRecord::AlterSite { site, previous } => {
                write!(f, "alter {} (was {})", site, previous)
            }
        }
    }
}
