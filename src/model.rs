use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::ModelError;
use crate::kernel::term::Term;
use crate::proof_step::{Justification, StepRecord};
use crate::site::{Site, SiteRoot};

/// A local fact: everything currently known above the line.
#[derive(Clone, Debug)]
pub struct Fact {
    pub term: Term,
    pub justification: Justification,
    /// True when this fact originated as a goal moved above the line.
    pub from_goal: bool,
}

impl Fact {
    pub fn given(term: Term) -> Fact {
        Fact {
            term,
            justification: Justification::Given,
            from_goal: false,
        }
    }
}

/// A library theorem: a term whose only justification is "known theorem".
#[derive(Clone, Debug)]
pub struct Theorem {
    pub name: String,
    pub term: Term,
}

impl Theorem {
    pub fn new(name: impl Into<String>, term: Term) -> Theorem {
        Theorem {
            name: name.into(),
            term,
        }
    }
}

/// Observers of the proof state. The single event is "state changed"; the
/// important flag marks transitions that change the binary proved/unproved
/// status, which always fire regardless of throttling.
pub trait ChangeListener {
    fn state_changed(&self, important: bool);
}

/// How eagerly to report unimportant changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyMode {
    /// Report every change.
    Always,
    /// Report every nth unimportant change; important ones always go through.
    Throttled(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The live, mutable proof state: an ordered list of local facts, an ordered
/// list of remaining goals, and a shared read-only theorem library. All
/// mutation goes through methods that record a step for exact undo and fire
/// a change notification.
///
/// Single-threaded cooperative: there is no internal locking, and the only
/// handoff protocol is the quiet section an automated driver acquires to
/// defer notifications while it works.
pub struct ProofModel {
    name: String,
    facts: Vec<Fact>,
    goals: Vec<Term>,
    theorems: Arc<Vec<Theorem>>,
    log: Vec<StepRecord>,
    listeners: Vec<(ListenerId, Box<dyn ChangeListener>)>,
    next_listener_id: u64,
    mode: NotifyMode,
    /// Unimportant changes skipped since the last report.
    skipped: u32,
    quiet_depth: u32,
    pending: bool,
    pending_important: bool,
}

impl ProofModel {
    pub fn new(name: impl Into<String>, theorems: Arc<Vec<Theorem>>) -> ProofModel {
        ProofModel {
            name: name.into(),
            facts: vec![],
            goals: vec![],
            theorems,
            log: vec![],
            listeners: vec![],
            next_listener_id: 0,
            mode: NotifyMode::Always,
            skipped: 0,
            quiet_depth: 0,
            pending: false,
            pending_important: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Proved means the goal set is empty.
    pub fn is_proved(&self) -> bool {
        self.goals.is_empty()
    }

    // ========== Accessors ==========

    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    pub fn goal_count(&self) -> usize {
        self.goals.len()
    }

    pub fn theorem_count(&self) -> usize {
        self.theorems.len()
    }

    /// A local fact, by position. "Local theorem" is the external name for a
    /// fact available to proof-step UIs.
    pub fn get_local_theorem(&self, index: usize) -> Option<&Fact> {
        self.facts.get(index)
    }

    pub fn get_consequent(&self, index: usize) -> Option<&Term> {
        self.goals.get(index)
    }

    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    pub fn goals(&self) -> impl Iterator<Item = &Term> {
        self.goals.iter()
    }

    pub fn theorems(&self) -> impl Iterator<Item = &Theorem> {
        self.theorems.iter()
    }

    pub fn log(&self) -> &[StepRecord] {
        &self.log
    }

    /// The term a site addresses. Panics when the site does not belong to
    /// this proof state; that is a caller bug, not a recoverable condition.
    pub fn term_at(&self, site: &Site) -> &Term {
        let root = match site.root() {
            SiteRoot::Fact(i) => match self.facts.get(i) {
                Some(fact) => &fact.term,
                None => panic!("site {} does not belong to this proof state", site),
            },
            SiteRoot::Goal(i) => match self.goals.get(i) {
                Some(goal) => goal,
                None => panic!("site {} does not belong to this proof state", site),
            },
            SiteRoot::Theorem(i) => match self.theorems.get(i) {
                Some(theorem) => &theorem.term,
                None => panic!("site {} does not belong to this proof state", site),
            },
        };
        match root.subterm_at(site.path()) {
            Some(term) => term,
            None => panic!("site {} does not address a sub-term", site),
        }
    }

    // ========== Mutation ==========

    pub fn insert_fact(&mut self, index: usize, fact: Fact) {
        let was_proved = self.is_proved();
        self.facts.insert(index, fact);
        self.log.push(StepRecord::InsertFact { index });
        self.note_change(was_proved);
    }

    pub fn push_fact(&mut self, fact: Fact) {
        self.insert_fact(self.facts.len(), fact);
    }

    pub fn remove_fact(&mut self, index: usize) -> Fact {
        let was_proved = self.is_proved();
        let fact = self.facts.remove(index);
        self.log.push(StepRecord::RemoveFact {
            index,
            fact: fact.clone(),
        });
        self.note_change(was_proved);
        fact
    }

    pub fn insert_goal(&mut self, index: usize, goal: Term) {
        let was_proved = self.is_proved();
        self.goals.insert(index, goal);
        self.log.push(StepRecord::InsertGoal { index });
        self.note_change(was_proved);
    }

    pub fn push_goal(&mut self, goal: Term) {
        self.insert_goal(self.goals.len(), goal);
    }

    pub fn remove_goal(&mut self, index: usize) -> Term {
        let was_proved = self.is_proved();
        let goal = self.goals.remove(index);
        self.log.push(StepRecord::RemoveGoal {
            index,
            goal: goal.clone(),
        });
        self.note_change(was_proved);
        goal
    }

    /// Moves a goal above the line, flipping its quantifiers as it crosses
    /// the turnstile. Recorded as two steps (remove + insert) so undo
    /// restores both sides exactly.
    pub fn move_goal_above_line(&mut self, goal_index: usize) {
        let goal = self.remove_goal(goal_index);
        let fact = Fact {
            term: goal.flip_quantifiers(),
            justification: Justification::MovedGoal,
            from_goal: true,
        };
        self.push_fact(fact);
    }

    /// Replaces the sub-term at a site, returning the prior value.
    /// Theorem-library sites are always rejected.
    pub fn alter_site(&mut self, site: &Site, replacement: Term) -> Result<Term, ModelError> {
        if site.is_theorem() {
            return Err(ModelError::TheoremImmutable);
        }
        let was_proved = self.is_proved();
        let previous = self.term_at(site).clone();
        self.raw_set_term(site, replacement);
        self.log.push(StepRecord::AlterSite {
            site: site.clone(),
            previous: previous.clone(),
        });
        self.note_change(was_proved);
        Ok(previous)
    }

    /// Undoes the most recent step. Returns false when the log is empty.
    pub fn undo_last(&mut self) -> bool {
        let record = match self.log.pop() {
            Some(record) => record,
            None => return false,
        };
        let was_proved = self.is_proved();
        record.undo(self);
        self.note_change(was_proved);
        true
    }

    // Raw mutators used by undo: no logging, no notification.

    pub(crate) fn raw_insert_fact(&mut self, index: usize, fact: Fact) {
        self.facts.insert(index, fact);
    }

    pub(crate) fn raw_remove_fact(&mut self, index: usize) -> Fact {
        self.facts.remove(index)
    }

    pub(crate) fn raw_insert_goal(&mut self, index: usize, goal: Term) {
        self.goals.insert(index, goal);
    }

    pub(crate) fn raw_remove_goal(&mut self, index: usize) -> Term {
        self.goals.remove(index)
    }

    pub(crate) fn raw_set_term(&mut self, site: &Site, term: Term) {
        match site.root() {
            SiteRoot::Fact(i) => {
                let replaced = self.facts[i].term.replace_at(site.path(), term);
                self.facts[i].term = replaced;
            }
            SiteRoot::Goal(i) => {
                let replaced = self.goals[i].replace_at(site.path(), term);
                self.goals[i] = replaced;
            }
            SiteRoot::Theorem(_) => {
                panic!("theorem library sites are never written");
            }
        }
    }

    // ========== Notifications ==========

    pub fn subscribe(&mut self, listener: Box<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn set_notify_mode(&mut self, mode: NotifyMode) {
        self.mode = mode;
        self.skipped = 0;
    }

    fn note_change(&mut self, was_proved: bool) {
        let important = was_proved != self.is_proved();
        self.notify(important);
    }

    fn notify(&mut self, important: bool) {
        if self.quiet_depth > 0 {
            self.pending = true;
            self.pending_important |= important;
            return;
        }
        match self.mode {
            NotifyMode::Always => self.fire(important),
            NotifyMode::Throttled(n) => {
                if important {
                    self.skipped = 0;
                    self.fire(true);
                } else {
                    self.skipped += 1;
                    if self.skipped >= n {
                        self.skipped = 0;
                        self.fire(false);
                    }
                }
            }
        }
    }

    fn fire(&self, important: bool) {
        for (_, listener) in &self.listeners {
            listener.state_changed(important);
        }
    }

    /// Begins a quiet section: an automated driver takes priority over
    /// notification timing, deferring all reports until the returned token
    /// is dropped. On release, one coalesced notification fires if anything
    /// changed. Cooperative, not preemptive: both sides must honor it.
    pub fn quiet(&mut self) -> QuietSection<'_> {
        self.quiet_depth += 1;
        QuietSection { model: self }
    }

    fn release_quiet(&mut self) {
        self.quiet_depth -= 1;
        if self.quiet_depth == 0 && self.pending {
            self.pending = false;
            let important = self.pending_important;
            self.pending_important = false;
            self.fire(important);
        }
    }
}

impl fmt::Display for ProofModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for (i, fact) in self.facts.iter().enumerate() {
            writeln!(f, "  fact {}: {} ({})", i, fact.term, fact.justification)?;
        }
        for (i, goal) in self.goals.iter().enumerate() {
            writeln!(f, "  goal {}: {}", i, goal)?;
        }
        Ok(())
    }
}

/// Scoped token for a driver's exclusive quiet mutation. Mutate through it
/// as if it were the model; notifications resume (coalesced into one) when
/// it is dropped.
pub struct QuietSection<'a> {
    model: &'a mut ProofModel,
}

impl Deref for QuietSection<'_> {
    type Target = ProofModel;

    fn deref(&self) -> &ProofModel {
        self.model
    }
}

impl DerefMut for QuietSection<'_> {
    fn deref_mut(&mut self) -> &mut ProofModel {
        self.model
    }
}

impl Drop for QuietSection<'_> {
    fn drop(&mut self) {
        self.model.release_quiet();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::kernel::term::Term;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<bool>>>,
    }

    impl ChangeListener for Recorder {
        fn state_changed(&self, important: bool) {
            self.events.borrow_mut().push(important);
        }
    }

    fn model_with_goal() -> ProofModel {
        let mut model = ProofModel::new("test", Arc::new(vec![]));
        model.push_goal(Term::parse("p(a)"));
        model
    }

    #[test]
    fn test_site_survives_edits() {
        let mut model = ProofModel::new("test", Arc::new(vec![]));
        model.push_fact(Fact::given(Term::parse("f(a, g(b))")));
        let site = Site::fact(0).descend(&[1, 0]);
        assert_eq!(model.term_at(&site), &Term::parse("b"));

        let previous = model.alter_site(&site, Term::parse("c")).unwrap();
        assert_eq!(previous, Term::parse("b"));
        // The same site now denotes the new term at that position.
        assert_eq!(model.term_at(&site), &Term::parse("c"));
        assert_eq!(
            model.get_local_theorem(0).unwrap().term,
            Term::parse("f(a, g(c))")
        );
    }

    #[test]
    fn test_theorem_sites_are_immutable() {
        let theorems = Arc::new(vec![Theorem::new("refl", Term::parse("=(*x, *x)"))]);
        let mut model = ProofModel::new("test", theorems);
        let result = model.alter_site(&Site::theorem(0), Term::parse("q"));
        assert_eq!(result, Err(crate::error::ModelError::TheoremImmutable));
    }

    #[test]
    fn test_undo_restores_exact_positions() {
        let mut model = ProofModel::new("test", Arc::new(vec![]));
        model.push_fact(Fact::given(Term::parse("p0")));
        model.push_fact(Fact::given(Term::parse("p2")));
        model.insert_fact(1, Fact::given(Term::parse("p1")));
        model.remove_fact(0);
        assert_eq!(model.get_local_theorem(0).unwrap().term, Term::parse("p1"));

        // Undo the removal: p0 comes back at position 0.
        assert!(model.undo_last());
        assert_eq!(model.get_local_theorem(0).unwrap().term, Term::parse("p0"));
        // Undo the insertion: p1 disappears from position 1.
        assert!(model.undo_last());
        assert_eq!(model.get_local_theorem(1).unwrap().term, Term::parse("p2"));
        assert_eq!(model.fact_count(), 2);
    }

    #[test]
    fn test_undo_alter_site() {
        let mut model = ProofModel::new("test", Arc::new(vec![]));
        model.push_goal(Term::parse("f(a)"));
        let site = Site::goal(0).child(0);
        model.alter_site(&site, Term::parse("b")).unwrap();
        assert_eq!(model.get_consequent(0), Some(&Term::parse("f(b)")));
        assert!(model.undo_last());
        assert_eq!(model.get_consequent(0), Some(&Term::parse("f(a)")));
    }

    #[test]
    fn test_move_goal_above_line_flips_quantifiers() {
        let mut model = ProofModel::new("test", Arc::new(vec![]));
        model.push_goal(Term::parse("p(?y)"));
        model.move_goal_above_line(0);
        assert_eq!(model.goal_count(), 0);
        let fact = model.get_local_theorem(0).unwrap();
        assert!(fact.from_goal);
        assert_eq!(fact.justification, Justification::MovedGoal);
        assert_eq!(fact.term, Term::parse("p(*y)"));
    }

    #[test]
    fn test_notifications_always_mode() {
        let mut model = model_with_goal();
        let recorder = Recorder::default();
        let events = recorder.events.clone();
        model.subscribe(Box::new(recorder));

        model.push_fact(Fact::given(Term::parse("q")));
        // Clearing the last goal flips proved status: important.
        model.remove_goal(0);
        assert_eq!(*events.borrow(), vec![false, true]);
    }

    #[test]
    fn test_notifications_throttled() {
        let mut model = model_with_goal();
        let recorder = Recorder::default();
        let events = recorder.events.clone();
        model.subscribe(Box::new(recorder));
        model.set_notify_mode(NotifyMode::Throttled(3));

        model.push_fact(Fact::given(Term::parse("q1")));
        model.push_fact(Fact::given(Term::parse("q2")));
        assert!(events.borrow().is_empty());
        model.push_fact(Fact::given(Term::parse("q3")));
        assert_eq!(*events.borrow(), vec![false]);

        // Important changes cut through the throttle.
        model.remove_goal(0);
        assert_eq!(*events.borrow(), vec![false, true]);
    }

    #[test]
    fn test_quiet_section_defers_and_coalesces() {
        let mut model = model_with_goal();
        let recorder = Recorder::default();
        let events = recorder.events.clone();
        model.subscribe(Box::new(recorder));

        {
            let mut quiet = model.quiet();
            quiet.push_fact(Fact::given(Term::parse("q1")));
            quiet.push_fact(Fact::given(Term::parse("q2")));
            quiet.remove_goal(0);
            assert!(events.borrow().is_empty());
        }
        // One coalesced notification, important because proved flipped.
        assert_eq!(*events.borrow(), vec![true]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut model = model_with_goal();
        let recorder = Recorder::default();
        let events = recorder.events.clone();
        let id = model.subscribe(Box::new(recorder));
        model.push_fact(Fact::given(Term::parse("q")));
        assert!(model.unsubscribe(id));
        assert!(!model.unsubscribe(id));
        model.push_fact(Fact::given(Term::parse("r")));
        assert_eq!(events.borrow().len(), 1);
    }
}
