use std::collections::HashMap;

/// The primitive type names the upstream VC generator is required to supply.
pub const BOOLEAN: &str = "Boolean";
pub const NATURAL: &str = "Natural";
pub const INTEGER: &str = "Integer";
pub const ENTITY: &str = "Entity";

/// The subtyping oracle. The type lattice itself lives outside the core; the
/// registry only ever asks this one question, and memoizes the answers.
///
/// The relation is reflexive: `is_subtype(t, t)` is always true.
pub trait TypeOracle {
    fn is_subtype(&self, sub: &str, sup: &str) -> bool;
}

/// A minimal type graph with the primitive types pre-wired:
/// Natural <= Integer, and everything <= Entity.
/// The VC generator normally supplies a richer lattice; this one is enough
/// for the core's own needs and for tests.
pub struct BasicTypeGraph {
    /// Direct supertypes, keyed by subtype name.
    parents: HashMap<String, Vec<String>>,
}

impl BasicTypeGraph {
    pub fn new() -> BasicTypeGraph {
        let mut graph = BasicTypeGraph {
            parents: HashMap::new(),
        };
        graph.add_subtype(NATURAL, INTEGER);
        graph.add_subtype(INTEGER, ENTITY);
        graph.add_subtype(BOOLEAN, ENTITY);
        graph
    }

    pub fn add_subtype(&mut self, sub: &str, sup: &str) {
        self.parents
            .entry(sub.to_string())
            .or_default()
            .push(sup.to_string());
    }
}

impl Default for BasicTypeGraph {
    fn default() -> Self {
        BasicTypeGraph::new()
    }
}

impl TypeOracle for BasicTypeGraph {
    fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        // Walk upward through declared supertypes.
        let mut stack = vec![sub];
        let mut seen = vec![];
        while let Some(current) = stack.pop() {
            if current == sup {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            if let Some(parents) = self.parents.get(current) {
                stack.extend(parents.iter().map(|s| s.as_str()));
            }
        }
        false
    }
}
