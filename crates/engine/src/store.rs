//! Cell storage.
//!
//! Only non-empty cells are materialized. Insertion order is kept so callers
//! listing cells (and the XML writer) see a stable sequence.

use rustc_hash::FxHashMap;

use crate::cell::CellContents;
use crate::formula::Formula;

/// Contents of every non-empty cell, keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct CellStore {
    cells: FxHashMap<String, CellContents>,
    /// Names in the order they were first materialized.
    order: Vec<String>,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored contents, or empty text for a cell that was never set.
    pub fn get(&self, name: &str) -> CellContents {
        self.cells.get(name).cloned().unwrap_or_default()
    }

    /// Borrow the stored contents without cloning.
    pub fn get_ref(&self, name: &str) -> Option<&CellContents> {
        self.cells.get(name)
    }

    /// Replace or create a cell. Empty text removes it.
    pub fn set(&mut self, name: &str, contents: CellContents) {
        if contents.is_empty() {
            if self.cells.remove(name).is_some() {
                self.order.retain(|n| n != name);
            }
            return;
        }

        if self.cells.insert(name.to_string(), contents).is_none() {
            self.order.push(name.to_string());
        }
    }

    /// Names of all non-empty cells, in insertion order.
    pub fn names_of_nonempty(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    /// `(name, contents)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellContents)> + '_ {
        self.order
            .iter()
            .filter_map(|name| self.cells.get(name).map(|c| (name.as_str(), c)))
    }

    /// Cells holding formulas, in insertion order.
    pub fn formulas(&self) -> impl Iterator<Item = (&str, &Formula)> + '_ {
        self.iter()
            .filter_map(|(name, contents)| contents.as_formula().map(|f| (name, f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellContents {
        CellContents::Text(s.to_string())
    }

    #[test]
    fn test_get_missing_is_empty() {
        let store = CellStore::new();
        assert!(store.get("A1").is_empty());
        assert!(store.get_ref("A1").is_none());
    }

    #[test]
    fn test_set_and_get() {
        let mut store = CellStore::new();
        store.set("A1", CellContents::Number(2.0));
        assert_eq!(store.get("A1"), CellContents::Number(2.0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_text_is_never_materialized() {
        let mut store = CellStore::new();
        store.set("A1", text(""));
        assert!(store.is_empty());
        assert!(store.names_of_nonempty().is_empty());
    }

    #[test]
    fn test_clearing_removes_entry() {
        let mut store = CellStore::new();
        store.set("A1", text("x"));
        store.set("A1", text(""));
        assert!(!store.contains("A1"));
        assert!(store.names_of_nonempty().is_empty());
    }

    #[test]
    fn test_insertion_order() {
        let mut store = CellStore::new();
        store.set("b", text("1"));
        store.set("a", text("2"));
        store.set("c", text("3"));
        // Overwrite keeps position
        store.set("b", CellContents::Number(9.0));
        assert_eq!(store.names_of_nonempty(), vec!["b", "a", "c"]);

        // Clear and re-add moves to the end
        store.set("b", text(""));
        store.set("b", text("back"));
        assert_eq!(store.names_of_nonempty(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_formulas_iterator() {
        let mut store = CellStore::new();
        store.set("a", CellContents::Number(1.0));
        store.set("b", CellContents::Formula(Formula::new("a + 1").unwrap()));
        store.set("c", text("note"));

        let formulas: Vec<_> = store.formulas().map(|(n, f)| (n, f.to_string())).collect();
        assert_eq!(formulas, vec![("b", "a+1".to_string())]);
        assert_eq!(store.iter().count(), 3);
    }
}
