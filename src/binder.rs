use tracing::debug;

use crate::kernel::binding::{BindingError, Bindings};
use crate::kernel::term::Term;
use crate::kernel::type_graph::TypeOracle;
use crate::model::ProofModel;
use crate::site::Site;

/// Which sites a binder is willing to consider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinderScope {
    /// Top-level local facts only.
    Facts,
    /// Top-level goals only.
    Goals,
    /// Both facts and goals, facts first.
    FactsAndGoals,
    /// The global theorem library.
    Theorems,
    /// Facts, descending into their compound sub-terms as well.
    Inductive,
}

/// A pattern term paired with a scope-selection policy. The search engine
/// asks each binder which sites are candidates and whether its pattern binds
/// at a given site under the bindings fixed so far.
#[derive(Clone, Debug)]
pub struct Binder {
    pattern: Term,
    scope: BinderScope,
}

impl Binder {
    pub fn new(pattern: Term, scope: BinderScope) -> Binder {
        Binder { pattern, scope }
    }

    pub fn pattern(&self) -> &Term {
        &self.pattern
    }

    pub fn scope(&self) -> BinderScope {
        self.scope
    }

    /// The candidate sites for this binder, in iteration order.
    pub fn candidate_sites(&self, model: &ProofModel) -> Vec<Site> {
        match self.scope {
            BinderScope::Facts => (0..model.fact_count()).map(Site::fact).collect(),
            BinderScope::Goals => (0..model.goal_count()).map(Site::goal).collect(),
            BinderScope::FactsAndGoals => (0..model.fact_count())
                .map(Site::fact)
                .chain((0..model.goal_count()).map(Site::goal))
                .collect(),
            BinderScope::Theorems => (0..model.theorem_count()).map(Site::theorem).collect(),
            BinderScope::Inductive => {
                let mut out = vec![];
                for i in 0..model.fact_count() {
                    let root = Site::fact(i);
                    let term = model.term_at(&root).clone();
                    push_with_descendants(&term, root, &mut out);
                }
                out
            }
        }
    }

    /// Attempts to bind this binder's pattern, pre-substituted with the
    /// bindings fixed by already-resolved binders, against the site's term.
    /// Success yields the enlarged binding set; failure is an expected
    /// negative search result, not an error.
    pub fn consider_site(
        &self,
        model: &ProofModel,
        site: &Site,
        assumed: &Bindings,
        types: &dyn TypeOracle,
    ) -> Result<Bindings, BindingError> {
        let target = model.term_at(site);
        let pattern = assumed.apply(&self.pattern);
        let mut bindings = assumed.clone();
        pattern.bind_to(target, &mut bindings, types)?;
        Ok(bindings)
    }
}

fn push_with_descendants(term: &Term, site: Site, out: &mut Vec<Site>) {
    out.push(site.clone());
    for i in 0..term.child_count() {
        push_with_descendants(term.child(i).unwrap(), site.child(i), out);
    }
}

/// One simultaneous solution: the site each binder resolved against, in
/// binder order, plus the consistent bindings across all of them.
#[derive(Clone, Debug)]
pub struct Match {
    pub sites: Vec<Site>,
    pub bindings: Bindings,
}

struct Frame {
    /// The next candidate position to try for this binder.
    next: usize,
    /// The site this binder is currently resolved against.
    site: Option<Site>,
    /// Bindings accumulated before this binder.
    bindings: Bindings,
}

/// Nested backtracking search over every way to simultaneously bind a set of
/// binders against the proof state. Pull-based: solutions are produced one
/// `next()` at a time, so an external driver can stop the enumeration at any
/// candidate boundary simply by dropping the iterator.
pub struct BinderSearch<'a> {
    model: &'a ProofModel,
    types: &'a dyn TypeOracle,
    binders: &'a [Binder],
    /// When set, a solution where every binder resolved against the theorem
    /// library is suppressed: something local must participate.
    require_local_site: bool,
    candidates: Vec<Vec<Site>>,
    frames: Vec<Frame>,
    done: bool,
}

impl<'a> BinderSearch<'a> {
    pub fn new(
        model: &'a ProofModel,
        binders: &'a [Binder],
        types: &'a dyn TypeOracle,
    ) -> BinderSearch<'a> {
        Self::with_local_requirement(model, binders, types, false)
    }

    /// The search used for theorem application: forbids the degenerate
    /// solution in which every binder resolves only against the global
    /// theorem library and none against a local fact or goal, preventing
    /// vacuous "this theorem proves itself" matches.
    pub fn at_least_one_local(
        model: &'a ProofModel,
        binders: &'a [Binder],
        types: &'a dyn TypeOracle,
    ) -> BinderSearch<'a> {
        Self::with_local_requirement(model, binders, types, true)
    }

    fn with_local_requirement(
        model: &'a ProofModel,
        binders: &'a [Binder],
        types: &'a dyn TypeOracle,
        require_local_site: bool,
    ) -> BinderSearch<'a> {
        let candidates = binders
            .iter()
            .map(|binder| binder.candidate_sites(model))
            .collect();
        BinderSearch {
            model,
            types,
            binders,
            require_local_site,
            candidates,
            frames: vec![Frame {
                next: 0,
                site: None,
                bindings: Bindings::new(),
            }],
            done: binders.is_empty(),
        }
    }

    /// A completed assignment is only a solution if every pattern came out
    /// fully resolved: no binder's pattern may still contain an unresolved
    /// quantified variable after the bindings are applied.
    fn accept(&self, sites: &[Site], bindings: &Bindings) -> bool {
        if self.require_local_site && sites.iter().all(|site| site.is_theorem()) {
            debug!("suppressing all-theorem solution");
            return false;
        }
        self.binders
            .iter()
            .all(|binder| !bindings.apply(binder.pattern()).has_universal())
    }
}

impl Iterator for BinderSearch<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        if self.done {
            return None;
        }
        loop {
            let depth = self.frames.len() - 1;
            let mut descended = false;
            while self.frames[depth].next < self.candidates[depth].len() {
                let position = self.frames[depth].next;
                self.frames[depth].next += 1;
                let site = self.candidates[depth][position].clone();
                let assumed = self.frames[depth].bindings.clone();
                match self.binders[depth].consider_site(self.model, &site, &assumed, self.types) {
                    Ok(bindings) => {
                        if depth + 1 == self.binders.len() {
                            let mut sites: Vec<Site> = self.frames[..depth]
                                .iter()
                                .map(|frame| frame.site.clone().unwrap())
                                .collect();
                            sites.push(site);
                            if self.accept(&sites, &bindings) {
                                return Some(Match { sites, bindings });
                            }
                        } else {
                            self.frames[depth].site = Some(site);
                            self.frames.push(Frame {
                                next: 0,
                                site: None,
                                bindings,
                            });
                            descended = true;
                            break;
                        }
                    }
                    Err(reason) => {
                        // Expected branch-and-backtrack outcome.
                        debug!("candidate rejected: {}", reason);
                    }
                }
            }
            if descended {
                continue;
            }
            if depth == 0 {
                self.done = true;
                return None;
            }
            self.frames.pop();
        }
    }
}
