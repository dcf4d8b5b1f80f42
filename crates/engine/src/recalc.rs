//! Recalculation order and cycle detection.
//!
//! Given a changed cell, walks `dependents` edges depth-first and returns the
//! changed cell followed by everything that transitively depends on it, in an
//! order where every dependee comes before its dependents. The same walk
//! detects cycles, so a spreadsheet can validate a change and learn what to
//! recompute in a single pass.

use rustc_hash::FxHashSet;

use crate::dep_graph::DependentsView;

/// Report when cycle detection finds a circular reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Cells on the cycle, in dependency order, ending where it started.
    pub cells: Vec<String>,

    /// Human-readable description of the cycle.
    pub message: String,
}

impl CycleReport {
    /// Create a cycle report for a self-referencing cell.
    pub fn self_reference(cell: &str) -> Self {
        Self {
            cells: vec![cell.to_string()],
            message: format!("Cell {} references itself", cell),
        }
    }

    /// Create a cycle report for a multi-cell cycle.
    pub fn cycle(cells: Vec<String>) -> Self {
        let message = match cells.as_slice() {
            [] => "Circular reference".to_string(),
            [first, .., last] if cells.len() > 5 => format!(
                "Circular reference involving {} cells: {} → ... → {}",
                cells.len(),
                first,
                last
            ),
            _ => format!("Circular reference: {}", cells.join(" → ")),
        };
        Self { cells, message }
    }

    /// Returns true if `cell` lies on the reported cycle.
    pub fn involves(&self, cell: &str) -> bool {
        self.cells.iter().any(|c| c == cell)
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleReport {}

/// Cells to recompute after `start` changes, `start` first.
///
/// For every edge `dependee → dependent` reachable from `start`, the dependee
/// appears before the dependent. The view is only read; on a cycle nothing
/// is produced.
pub fn cells_to_recalculate<V>(view: &V, start: &str) -> Result<Vec<String>, CycleReport>
where
    V: DependentsView + ?Sized,
{
    cells_to_recalculate_all(view, std::iter::once(start))
}

/// Like [`cells_to_recalculate`] for several changed cells at once.
///
/// Cells shared between the starts' dependents are listed once.
pub fn cells_to_recalculate_all<'a, V, I>(view: &V, starts: I) -> Result<Vec<String>, CycleReport>
where
    V: DependentsView + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    let mut walk = Walk::default();
    for start in starts {
        if !walk.done.contains(start) {
            walk.visit(view, start)?;
        }
    }
    // Post-order reversed: each name ends up ahead of everything it feeds.
    walk.finished.reverse();
    Ok(walk.finished)
}

#[derive(Default)]
struct Walk {
    visiting: FxHashSet<String>,
    done: FxHashSet<String>,
    /// Cells in the order they finished.
    finished: Vec<String>,
}

// Iterative DFS to avoid stack overflow on long dependency chains.
struct Frame {
    name: String,
    dependents: Vec<String>,
    next: usize,
}

impl Walk {
    fn visit<V: DependentsView + ?Sized>(&mut self, view: &V, start: &str) -> Result<(), CycleReport> {
        let mut stack = vec![self.enter(view, start)];

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.dependents.len() {
                let dep = frame.dependents[frame.next].clone();
                frame.next += 1;

                if self.visiting.contains(&dep) {
                    return Err(cycle_through(&stack, &dep));
                }
                if self.done.contains(&dep) {
                    continue;
                }
                let child = self.enter(view, &dep);
                stack.push(child);
            } else if let Some(finished) = stack.pop() {
                self.visiting.remove(&finished.name);
                self.done.insert(finished.name.clone());
                self.finished.push(finished.name);
            }
        }

        Ok(())
    }

    fn enter<V: DependentsView + ?Sized>(&mut self, view: &V, name: &str) -> Frame {
        self.visiting.insert(name.to_string());
        Frame {
            name: name.to_string(),
            dependents: view.dependents_of(name).into_iter().map(str::to_string).collect(),
            next: 0,
        }
    }
}

/// Build the report for a back edge to `target` from the top of `stack`.
fn cycle_through(stack: &[Frame], target: &str) -> CycleReport {
    let from = stack.iter().position(|f| f.name == target).unwrap_or(0);
    let mut cells: Vec<String> = stack[from..].iter().map(|f| f.name.clone()).collect();
    if cells.len() == 1 {
        return CycleReport::self_reference(target);
    }
    cells.push(target.to_string());
    CycleReport::cycle(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dep_graph::DepGraph;
    use rustc_hash::FxHashSet;

    fn graph(edges: &[(&str, &str)]) -> DepGraph {
        let mut g = DepGraph::new();
        for (dependee, dependent) in edges {
            g.add_dependency(dependee, dependent);
        }
        g
    }

    fn position(order: &[String], name: &str) -> usize {
        order
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{name} missing from {order:?}"))
    }

    fn assert_respects_edges(g: &DepGraph, order: &[String]) {
        for (dependee, dependent) in g.edges() {
            if order.iter().any(|n| n == dependee) {
                assert!(
                    position(order, dependee) < position(order, dependent),
                    "{dependee} should precede {dependent} in {order:?}"
                );
            }
        }
    }

    #[test]
    fn test_isolated_cell() {
        let g = DepGraph::new();
        assert_eq!(cells_to_recalculate(&g, "a").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_chain() {
        // a → b → c
        let g = graph(&[("a", "b"), ("b", "c")]);
        assert_eq!(cells_to_recalculate(&g, "a").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(cells_to_recalculate(&g, "b").unwrap(), vec!["b", "c"]);
        assert_eq!(cells_to_recalculate(&g, "c").unwrap(), vec!["c"]);
    }

    #[test]
    fn test_shared_dependent_listed_once() {
        // a1 feeds b1 and c1; b1 feeds c1
        let g = graph(&[("a1", "b1"), ("a1", "c1"), ("b1", "c1")]);
        let order = cells_to_recalculate(&g, "a1").unwrap();

        assert_eq!(order, vec!["a1", "b1", "c1"]);
        let unique: FxHashSet<_> = order.iter().collect();
        assert_eq!(unique.len(), order.len());
    }

    #[test]
    fn test_diamond() {
        let g = graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("d", "e")]);
        let order = cells_to_recalculate(&g, "a").unwrap();

        assert_eq!(order.len(), 5);
        assert_eq!(order[0], "a");
        assert_respects_edges(&g, &order);
    }

    #[test]
    fn test_unreachable_cells_excluded() {
        let g = graph(&[("a", "b"), ("x", "y")]);
        assert_eq!(cells_to_recalculate(&g, "a").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_deterministic_order() {
        let g = graph(&[("a", "z"), ("a", "m"), ("a", "b")]);
        let first = cells_to_recalculate(&g, "a").unwrap();
        for _ in 0..10 {
            assert_eq!(cells_to_recalculate(&g, "a").unwrap(), first);
        }
    }

    #[test]
    fn test_self_loop() {
        let g = graph(&[("a", "a")]);
        let err = cells_to_recalculate(&g, "a").unwrap_err();
        assert_eq!(err.cells, vec!["a"]);
        assert!(err.message.contains("references itself"));
    }

    #[test]
    fn test_two_cell_cycle() {
        let g = graph(&[("a", "b"), ("b", "a")]);
        let err = cells_to_recalculate(&g, "a").unwrap_err();
        assert_eq!(err.cells, vec!["a", "b", "a"]);
        assert!(err.involves("b"));
    }

    #[test]
    fn test_cycle_downstream_of_start() {
        // start → x → y → x
        let g = graph(&[("start", "x"), ("x", "y"), ("y", "x")]);
        let err = cells_to_recalculate(&g, "start").unwrap_err();
        assert_eq!(err.cells, vec!["x", "y", "x"]);
        assert!(!err.involves("start"));
    }

    #[test]
    fn test_cycle_not_reachable_is_ignored() {
        let g = graph(&[("a", "b"), ("x", "y"), ("y", "x")]);
        assert_eq!(cells_to_recalculate(&g, "a").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_staged_view_detects_cycle_before_commit() {
        // b = a; proposing a = b closes the loop
        let g = graph(&[("a", "b")]);
        let proposed: FxHashSet<String> = ["b".to_string()].into_iter().collect();
        let staged = g.stage("a", proposed);

        assert!(cells_to_recalculate(&staged, "a").is_err());
        // Committed graph still orders cleanly
        assert_eq!(cells_to_recalculate(&g, "a").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_multiple_starts() {
        let g = graph(&[("a", "c"), ("b", "c"), ("c", "d")]);
        let order = cells_to_recalculate_all(&g, ["a", "b"]).unwrap();

        assert_eq!(order.len(), 4);
        assert_respects_edges(&g, &order);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let names: Vec<String> = (0..50_000).map(|i| format!("c{i}")).collect();
        let mut g = DepGraph::new();
        for pair in names.windows(2) {
            g.add_dependency(&pair[0], &pair[1]);
        }
        let order = cells_to_recalculate(&g, "c0").unwrap();
        assert_eq!(order.len(), names.len());
        assert_eq!(order.last().map(String::as_str), Some("c49999"));
    }

    #[test]
    fn test_cycle_report_messages() {
        let small = CycleReport::cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(small.message, "Circular reference: a → b → a");

        let large: Vec<String> = (0..10).map(|i| format!("c{i}")).collect();
        let report = CycleReport::cycle(large);
        assert!(report.message.contains("..."));
        assert!(report.message.contains("10 cells"));
        assert_eq!(format!("{}", report), report.message);
    }
}
