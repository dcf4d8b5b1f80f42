//! Dependency graph between cell names.
//!
//! Tracks dependees (cells a formula references) and dependents (cells whose
//! formulas reference a given cell). The graph knows nothing about contents
//! and performs no cycle checks; see [`crate::recalc`] for that.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a dependee of B)
//! ```
//!
//! This makes "what must be recomputed if I change X?" trivial: follow
//! outgoing edges.

use rustc_hash::{FxHashMap, FxHashSet};

/// Read access to `dependents` edges.
///
/// Implemented by the committed [`DepGraph`] and by [`StagedEdges`], which
/// answers as if a pending change had already been applied. Results are
/// sorted so traversals are deterministic.
pub trait DependentsView {
    fn dependents_of(&self, name: &str) -> Vec<&str>;
}

/// Persistent dependency graph keyed by normalized cell name.
///
/// Maintains bidirectional adjacency:
/// - `dependees[B]` = cells that B's formula references
/// - `dependents[A]` = cells whose formulas reference A
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** A ∈ dependees[B] iff B ∈ dependents[A].
/// 2. **No dangling entries:** empty sets are removed, not stored.
/// 3. **No duplicate edges:** set semantics.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// B -> {A1, A2, ...}
    dependees: FxHashMap<String, FxHashSet<String>>,

    /// A -> {B1, B2, ...}
    dependents: FxHashMap<String, FxHashSet<String>>,

    edge_count: usize,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct edges.
    pub fn len(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count == 0
    }

    /// Cells whose formulas reference `name`.
    pub fn dependents(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.dependents
            .get(name)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    /// Cells that `name`'s formula references.
    pub fn dependees(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.dependees
            .get(name)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    pub fn has_dependents(&self, name: &str) -> bool {
        self.dependents.contains_key(name)
    }

    pub fn has_dependees(&self, name: &str) -> bool {
        self.dependees.contains_key(name)
    }

    pub fn contains(&self, dependee: &str, dependent: &str) -> bool {
        self.dependents
            .get(dependee)
            .is_some_and(|s| s.contains(dependent))
    }

    /// All edges as `(dependee, dependent)` pairs, in no particular order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.dependents.iter().flat_map(|(dependee, deps)| {
            deps.iter().map(move |d| (dependee.as_str(), d.as_str()))
        })
    }

    /// Record that `dependent` depends on `dependee`. Idempotent.
    pub fn add_dependency(&mut self, dependee: &str, dependent: &str) {
        let inserted = self
            .dependents
            .entry(dependee.to_string())
            .or_default()
            .insert(dependent.to_string());
        if inserted {
            self.dependees
                .entry(dependent.to_string())
                .or_default()
                .insert(dependee.to_string());
            self.edge_count += 1;
        }
    }

    /// Remove the edge if present; otherwise a no-op.
    pub fn remove_dependency(&mut self, dependee: &str, dependent: &str) {
        let Some(deps) = self.dependents.get_mut(dependee) else {
            return;
        };
        if !deps.remove(dependent) {
            return;
        }
        if deps.is_empty() {
            self.dependents.remove(dependee);
        }

        if let Some(preds) = self.dependees.get_mut(dependent) {
            preds.remove(dependee);
            if preds.is_empty() {
                self.dependees.remove(dependent);
            }
        }
        self.edge_count -= 1;
    }

    /// Replace every dependee of `dependent` with `new_dependees`.
    ///
    /// Pass an empty set to clear the cell's references.
    pub fn replace_dependees(&mut self, dependent: &str, new_dependees: FxHashSet<String>) {
        let change = EdgeChange::between(dependent, self.dependee_set(dependent), new_dependees);
        self.apply(change);
    }

    /// Stage a change of `cell`'s dependees without touching the graph.
    pub fn stage(&self, cell: &str, new_dependees: FxHashSet<String>) -> StagedEdges<'_> {
        StagedEdges {
            graph: self,
            change: EdgeChange::between(cell, self.dependee_set(cell), new_dependees),
        }
    }

    /// Commit a staged change.
    pub fn apply(&mut self, change: EdgeChange) {
        for dependee in &change.removed {
            self.remove_dependency(dependee, &change.cell);
        }
        for dependee in &change.added {
            self.add_dependency(dependee, &change.cell);
        }
    }

    fn dependee_set(&self, name: &str) -> FxHashSet<String> {
        self.dependees.get(name).cloned().unwrap_or_default()
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        let mut counted = 0;
        for (dependee, deps) in &self.dependents {
            assert!(!deps.is_empty(), "Empty dependents set stored for {:?}", dependee);
            for dep in deps {
                assert!(
                    self.dependees.get(dep).is_some_and(|s| s.contains(dependee)),
                    "Missing dependee edge: {:?} should list {:?}",
                    dep,
                    dependee
                );
                counted += 1;
            }
        }
        for (dependent, preds) in &self.dependees {
            assert!(!preds.is_empty(), "Empty dependees set stored for {:?}", dependent);
            for pred in preds {
                assert!(
                    self.dependents.get(pred).is_some_and(|s| s.contains(dependent)),
                    "Missing dependent edge: {:?} should list {:?}",
                    pred,
                    dependent
                );
            }
        }
        assert_eq!(counted, self.edge_count, "edge count out of sync");
    }
}

impl DependentsView for DepGraph {
    fn dependents_of(&self, name: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = self.dependents(name).collect();
        deps.sort_unstable();
        deps
    }
}

/// A pending rewire of one cell's dependees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeChange {
    pub cell: String,
    /// Dependees that lose `cell` as a dependent.
    pub removed: FxHashSet<String>,
    /// Dependees that gain `cell` as a dependent.
    pub added: FxHashSet<String>,
}

impl EdgeChange {
    fn between(cell: &str, old: FxHashSet<String>, new: FxHashSet<String>) -> Self {
        let removed = old.difference(&new).cloned().collect();
        let added = new.difference(&old).cloned().collect();
        Self {
            cell: cell.to_string(),
            removed,
            added,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// The committed graph seen through a pending [`EdgeChange`].
#[derive(Debug)]
pub struct StagedEdges<'g> {
    graph: &'g DepGraph,
    change: EdgeChange,
}

impl StagedEdges<'_> {
    /// Release the graph borrow, keeping the change for [`DepGraph::apply`].
    pub fn into_change(self) -> EdgeChange {
        self.change
    }
}

impl DependentsView for StagedEdges<'_> {
    fn dependents_of(&self, name: &str) -> Vec<&str> {
        let cell = self.change.cell.as_str();
        let mut deps: Vec<&str> = self.graph.dependents(name).collect();
        if self.change.removed.contains(name) {
            deps.retain(|d| *d != cell);
        }
        if self.change.added.contains(name) && !deps.contains(&cell) {
            deps.push(cell);
        }
        deps.sort_unstable();
        deps
    }
}
