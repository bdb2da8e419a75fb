//! Per-evaluation shared state.
//!
//! One [`ExecutionState`] is created for each top-level evaluation and passed
//! by `&mut` into every function call, nested ones included.  There is no
//! scoping: a write is visible to every later call in the same evaluation.

use std::collections::HashMap;

/// Variables, arrays, split buffers, cached random draws and the timezone.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    variables: HashMap<String, String>,
    arrays: HashMap<String, Vec<String>>,
    /// Result of the most recent text split.
    pub splits: Vec<String>,
    randoms: HashMap<String, i64>,
    /// IANA-style zone name used by time-aware functions.
    pub timezone: String,
}

impl Default for ExecutionState {
    fn default() -> Self {
        ExecutionState {
            variables: HashMap::new(),
            arrays: HashMap::new(),
            splits: Vec::new(),
            randoms: HashMap::new(),
            timezone: "UTC".to_owned(),
        }
    }
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a specific timezone.
    pub fn with_timezone(timezone: impl Into<String>) -> Self {
        ExecutionState {
            timezone: timezone.into(),
            ..Self::default()
        }
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Set (or overwrite) a variable.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Remove a variable.  Returns `true` if it existed.
    pub fn unset_var(&mut self, name: &str) -> bool {
        self.variables.remove(name).is_some()
    }

    // ── Arrays ────────────────────────────────────────────────────────────────

    pub fn set_array(&mut self, name: impl Into<String>, items: Vec<String>) {
        self.arrays.insert(name.into(), items);
    }

    pub fn array(&self, name: &str) -> Option<&[String]> {
        self.arrays.get(name).map(Vec::as_slice)
    }

    // ── Random draws ──────────────────────────────────────────────────────────

    /// Return the cached draw for `name`, drawing it with `draw` on first use.
    pub fn random_or_insert_with(&mut self, name: &str, draw: impl FnOnce() -> i64) -> i64 {
        *self.randoms.entry(name.to_owned()).or_insert_with(draw)
    }

    pub fn cached_random(&self, name: &str) -> Option<i64> {
        self.randoms.get(name).copied()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
