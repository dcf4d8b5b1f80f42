//! Cell naming policy.
//!
//! Every cell name accepted by a spreadsheet passes through the same two steps:
//! the injected normalizer rewrites it, then the structural rule and the
//! injected validity predicate must both accept the normalized form. Names
//! that reach the cell store or the dependency graph are always normalized.

use std::fmt;
use std::sync::Arc;

/// Validity predicate applied to normalized names.
pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Normalization function applied before validation, storage and lookup.
pub type Normalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Returns true if `name` satisfies the canonical structural rule:
/// an ASCII letter or underscore, followed by any number of ASCII letters,
/// digits or underscores.
pub fn is_structurally_valid(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Returns true if `name` is one or more ASCII letters followed by one or more
/// ASCII digits (`A1`, `xy15`, `AA100`).
pub fn is_a1_style(name: &str) -> bool {
    let letters = name.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let rest = &name[letters..];
    letters > 0 && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Injected name validity test and normalizer.
///
/// Both functions are held behind `Arc` so a policy can be shared by a
/// spreadsheet and the formulas parsed for it.
#[derive(Clone)]
pub struct NamePolicy {
    is_valid: Validator,
    normalize: Normalizer,
}

impl NamePolicy {
    /// Create a policy from a validity predicate and a normalizer.
    pub fn new<V, N>(is_valid: V, normalize: N) -> Self
    where
        V: Fn(&str) -> bool + Send + Sync + 'static,
        N: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            is_valid: Arc::new(is_valid),
            normalize: Arc::new(normalize),
        }
    }

    /// Accept every structurally valid name; normalization is the identity.
    pub fn permissive() -> Self {
        Self::new(|_| true, |s| s.to_string())
    }

    /// Apply the normalizer only.
    pub fn normalize(&self, name: &str) -> String {
        (self.normalize)(name)
    }

    /// Returns true if an already-normalized name is acceptable.
    pub fn accepts(&self, normalized: &str) -> bool {
        is_structurally_valid(normalized) && (self.is_valid)(normalized)
    }

    /// Normalize `name` and validate the result.
    ///
    /// Returns the normalized name, or `None` if it is rejected.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let normalized = self.normalize(name);
        self.accepts(&normalized).then_some(normalized)
    }
}

impl Default for NamePolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl fmt::Debug for NamePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamePolicy").finish_non_exhaustive()
    }
}
