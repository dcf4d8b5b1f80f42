//! The spreadsheet: cell contents, their dependency graph, and the mutation
//! protocol that keeps both consistent.
//!
//! A content change is validated before anything is touched. The new formula's
//! references are staged over the committed graph, and the recalculation walk
//! runs on that staged view. A cycle aborts the change; otherwise the edges
//! and contents are committed together and the walk's order is returned.

use rustc_hash::FxHashMap;

use crate::cell::{CellContents, CellValue};
use crate::cell_name::NamePolicy;
use crate::dep_graph::{DepGraph, DependentsView};
use crate::error::{Result, SheetError};
use crate::formula::{Formula, FormulaError};
use crate::recalc;
use crate::store::CellStore;

/// Version string used when none is configured.
pub const DEFAULT_VERSION: &str = "default";

/// Construction settings for a [`Spreadsheet`].
#[derive(Debug, Clone)]
pub struct SheetConfig {
    pub policy: NamePolicy,
    /// Written to and required from saved documents.
    pub version: String,
}

impl SheetConfig {
    pub fn new(policy: NamePolicy, version: impl Into<String>) -> Self {
        Self {
            policy,
            version: version.into(),
        }
    }
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self::new(NamePolicy::permissive(), DEFAULT_VERSION)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Spreadsheet {
    config: SheetConfig,
    cells: CellStore,
    graph: DepGraph,
    changed: bool,
}

impl Spreadsheet {
    /// Empty spreadsheet with the permissive name policy and version `"default"`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SheetConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// True if contents changed since creation or the last [`mark_saved`](Self::mark_saved).
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn mark_saved(&mut self) {
        self.changed = false;
    }

    pub fn dep_graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn normalize_name(&self, name: &str) -> String {
        self.config.policy.normalize(name)
    }

    pub fn is_valid_name(&self, name: &str) -> bool {
        self.config.policy.resolve(name).is_some()
    }

    fn resolve(&self, name: &str) -> Result<String> {
        self.config
            .policy
            .resolve(name)
            .ok_or_else(|| SheetError::InvalidName(name.to_string()))
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Contents of a cell; empty text if it was never set.
    pub fn contents(&self, name: &str) -> Result<CellContents> {
        let name = self.resolve(name)?;
        Ok(self.cells.get(&name))
    }

    /// Literal text that recreates the cell's contents when assigned.
    pub fn save_text(&self, name: &str) -> Result<String> {
        Ok(self.contents(name)?.to_input())
    }

    /// Names of all non-empty cells, in the order they were first set.
    pub fn names_of_nonempty_cells(&self) -> Vec<String> {
        self.cells.names_of_nonempty()
    }

    /// Non-empty cells and their contents, in the order they were first set.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &CellContents)> + '_ {
        self.cells.iter()
    }

    /// Cells whose formulas reference `name` directly, sorted.
    pub fn direct_dependents(&self, name: &str) -> Result<Vec<String>> {
        let name = self.resolve(name)?;
        Ok(self
            .graph
            .dependents_of(&name)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Cells that `name`'s formula references directly, sorted.
    pub fn direct_dependees(&self, name: &str) -> Result<Vec<String>> {
        let name = self.resolve(name)?;
        let mut dependees: Vec<String> = self.graph.dependees(&name).map(str::to_string).collect();
        dependees.sort_unstable();
        Ok(dependees)
    }

    /// Value of a cell.
    ///
    /// Formula failures (undefined references, division by zero) come back as
    /// [`CellValue::Error`]; only an invalid name is an `Err`.
    pub fn value(&self, name: &str) -> Result<CellValue> {
        let name = self.resolve(name)?;
        Ok(match self.cells.get_ref(&name) {
            None => CellValue::Text(String::new()),
            Some(CellContents::Number(n)) => CellValue::Number(*n),
            Some(CellContents::Text(s)) => CellValue::Text(s.clone()),
            Some(CellContents::Formula(f)) => match self.evaluate(f) {
                Ok(n) => CellValue::Number(n),
                Err(e) => CellValue::Error(e),
            },
        })
    }

    /// Evaluate `formula` with every referenced cell's numeric value.
    ///
    /// Referenced formulas are resolved bottom-up on an explicit stack, each
    /// at most once. Committed state is acyclic, so this terminates.
    fn evaluate(&self, formula: &Formula) -> std::result::Result<f64, FormulaError> {
        let mut memo: FxHashMap<&str, Option<f64>> = FxHashMap::default();
        let mut stack: Vec<&str> = formula.variables().collect();

        while let Some(&name) = stack.last() {
            if memo.contains_key(name) {
                stack.pop();
                continue;
            }
            let numeric = match self.cells.get_ref(name) {
                Some(CellContents::Number(n)) => Some(*n),
                Some(CellContents::Formula(f)) => {
                    let pending: Vec<&str> = f.variables().filter(|v| !memo.contains_key(v)).collect();
                    if !pending.is_empty() {
                        stack.extend(pending);
                        continue;
                    }
                    f.evaluate(&|v: &str| memo.get(v).copied().flatten()).ok()
                }
                Some(CellContents::Text(_)) | None => None,
            };
            memo.insert(name, numeric);
            stack.pop();
        }

        formula.evaluate(&|v: &str| memo.get(v).copied().flatten())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Assign raw input to a cell.
    ///
    /// Input that parses as a finite number becomes a number, input starting
    /// with `=` is parsed as a formula, and anything else is stored as text.
    /// Empty text clears the cell.
    ///
    /// Returns the cell followed by every cell that transitively depends on
    /// it, ordered so each cell comes after everything it references. On error
    /// nothing changes.
    pub fn set_content(&mut self, name: &str, raw: &str) -> Result<Vec<String>> {
        let name = self.resolve(name)?;
        let contents = CellContents::from_input(raw, &self.config.policy)?;
        self.commit(name, contents)
    }

    /// Like [`set_content`](Self::set_content), rejecting absent input.
    pub fn set_content_opt(&mut self, name: &str, raw: Option<&str>) -> Result<Vec<String>> {
        let raw = raw.ok_or(SheetError::NullContent)?;
        self.set_content(name, raw)
    }

    fn commit(&mut self, name: String, contents: CellContents) -> Result<Vec<String>> {
        // Compared by input text so that 0 and -0 count as different contents
        let unchanged = self
            .cells
            .get_ref(&name)
            .map_or(contents.is_empty(), |c| c.to_input() == contents.to_input());
        if unchanged {
            return Ok(recalc::cells_to_recalculate(&self.graph, &name)?);
        }

        let dependees = contents.as_formula().map(Formula::variable_set).unwrap_or_default();
        let staged = self.graph.stage(&name, dependees);
        let order = match recalc::cells_to_recalculate(&staged, &name) {
            Ok(order) => order,
            Err(cycle) => {
                log::warn!("rejected {}: {}", name, cycle);
                return Err(cycle.into());
            }
        };

        let change = staged.into_change();
        if !change.is_noop() {
            self.graph.apply(change);
        }
        self.cells.set(&name, contents);
        self.changed = true;

        log::debug!("set {} ({} cells to recalculate)", name, order.len());
        Ok(order)
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    /// Verify the structural invariants, describing the first violation.
    ///
    /// - every stored name is normalized and valid, and no empty cell is stored
    /// - the graph's edges are exactly the formula cells' references
    /// - the graph has no cycle
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for (name, contents) in self.cells.iter() {
            if contents.is_empty() {
                return Err(format!("empty cell {} is stored", name));
            }
            if self.config.policy.resolve(name).as_deref() != Some(name) {
                return Err(format!("stored name {:?} is not normalized and valid", name));
            }
        }

        let mut expected = 0;
        for (cell, formula) in self.cells.formulas() {
            for var in formula.variables() {
                if !self.graph.contains(var, cell) {
                    return Err(format!("missing edge {} -> {}", var, cell));
                }
                expected += 1;
            }
        }
        if expected != self.graph.len() {
            return Err(format!(
                "graph has {} edges but formulas reference {}",
                self.graph.len(),
                expected
            ));
        }

        let roots: Vec<&str> = self.graph.edges().map(|(dependee, _)| dependee).collect();
        recalc::cells_to_recalculate_all(&self.graph, roots).map_err(|cycle| cycle.to_string())?;

        Ok(())
    }
}
