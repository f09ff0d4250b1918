use std::fmt;

use serde::{Deserialize, Serialize};

/// Which top-level conjunct a site hangs off: a local fact, a remaining
/// goal, or a theorem-library entry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum SiteRoot {
    Fact(usize),
    Goal(usize),
    Theorem(usize),
}

/// A stable locator for a sub-term within the proof state: a root conjunct
/// plus a path of child indices. Equality is (root, path) only. The term at
/// that position can change as the proof evolves while the site continues to
/// denote the same position, which is what external highlighting and
/// transformation bookkeeping rely on.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Site {
    root: SiteRoot,
    path: Vec<usize>,
}

impl Site {
    pub fn fact(index: usize) -> Site {
        Site {
            root: SiteRoot::Fact(index),
            path: vec![],
        }
    }

    pub fn goal(index: usize) -> Site {
        Site {
            root: SiteRoot::Goal(index),
            path: vec![],
        }
    }

    pub fn theorem(index: usize) -> Site {
        Site {
            root: SiteRoot::Theorem(index),
            path: vec![],
        }
    }

    /// The site one child step further down.
    pub fn child(&self, index: usize) -> Site {
        let mut path = self.path.clone();
        path.push(index);
        Site {
            root: self.root,
            path,
        }
    }

    /// The site a whole path further down.
    pub fn descend(&self, path: &[usize]) -> Site {
        let mut full = self.path.clone();
        full.extend_from_slice(path);
        Site {
            root: self.root,
            path: full,
        }
    }

    pub fn root(&self) -> SiteRoot {
        self.root
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// True when the site addresses a whole conjunct rather than a sub-term.
    pub fn is_top_level(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_theorem(&self) -> bool {
        matches!(self.root, SiteRoot::Theorem(_))
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.root {
            SiteRoot::Fact(i) => write!(f, "fact {}", i)?,
            SiteRoot::Goal(i) => write!(f, "goal {}", i)?,
            SiteRoot::Theorem(i) => write!(f, "theorem {}", i)?,
        }
        if !self.path.is_empty() {
            write!(f, " @ ")?;
            for (i, step) in self.path.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                write!(f, "{}", step)?;
            }
        }
        Ok(())
    }
}
