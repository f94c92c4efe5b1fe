//! The per-workflow shared store: finished operations' results, plus a free-form
//! user key/value store.

use crate::result::OperationResult;
use std::collections::HashMap;
use std::sync::RwLock;

/// Shared state visible to every operation in a workflow.
///
/// All three logical maps (results, user values) live behind a single
/// [`RwLock`], matching the "single mutex scoped to the Context instance" rule:
/// reads take a shared lock, writes take an exclusive lock, and the lock is never
/// held across a user callback — callers get an owned clone or `Option` out, not a
/// guard.
#[derive(Debug, Default)]
pub struct Context {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    results: HashMap<String, OperationResult>,
    values: HashMap<String, serde_json::Value>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The result of the named operation, if it has finished.
    #[must_use]
    pub fn result_for(&self, name: &str) -> Option<OperationResult> {
        self.inner.read().expect("context lock poisoned").results.get(name).cloned()
    }

    /// A user-provided value previously stored under `key`.
    #[must_use]
    pub fn value_for(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().expect("context lock poisoned").values.get(key).cloned()
    }

    /// Stores a user-provided value under `key`, overwriting any previous value.
    pub fn set_value(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.write().expect("context lock poisoned").values.insert(key.into(), value);
    }

    /// Removes a user-provided value, returning it if one was present.
    pub fn remove_value(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.write().expect("context lock poisoned").values.remove(key)
    }

    /// Called by the scheduler when a named operation finishes. Not part of the
    /// public API: user code never writes a result directly, only the scheduler does,
    /// exactly once per named operation, as guaranteed by `start`-time validation
    /// rejecting duplicate names.
    pub(crate) fn set_result(&self, name: String, result: OperationResult) {
        let mut inner = self.inner.write().expect("context lock poisoned");
        let previous = inner.results.insert(name, result);
        debug_assert!(previous.is_none(), "operation names are validated unique at start");
    }

    /// All results recorded so far. Intended for tests and diagnostics; operations
    /// should prefer [`Context::result_for`].
    #[must_use]
    pub fn results_snapshot(&self) -> HashMap<String, OperationResult> {
        self.inner.read().expect("context lock poisoned").results.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_for_missing_name_is_none() {
        let ctx = Context::new();
        assert_eq!(ctx.result_for("missing"), None);
    }

    #[test]
    fn set_result_then_result_for_round_trips() {
        let ctx = Context::new();
        ctx.set_result("a".to_string(), OperationResult::success_empty());
        assert_eq!(ctx.result_for("a"), Some(OperationResult::success_empty()));
    }

    #[test]
    fn kv_store_set_get_remove() {
        let ctx = Context::new();
        assert_eq!(ctx.value_for("k"), None);
        ctx.set_value("k", serde_json::json!("v"));
        assert_eq!(ctx.value_for("k"), Some(serde_json::json!("v")));
        assert_eq!(ctx.remove_value("k"), Some(serde_json::json!("v")));
        assert_eq!(ctx.value_for("k"), None);
    }

    #[test]
    fn results_snapshot_reflects_all_writes() {
        let ctx = Context::new();
        ctx.set_result("a".to_string(), OperationResult::success_empty());
        ctx.set_result("b".to_string(), OperationResult::success_empty());
        let snapshot = ctx.results_snapshot();
        assert_eq!(snapshot.len(), 2);
    }
}
