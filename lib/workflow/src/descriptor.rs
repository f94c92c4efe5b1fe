//! Connection descriptors: the pure-data edges a caller adds to a workflow before
//! `start`, resolved once at `start` time into concrete operation indices.

use crate::operation::Operation;
use crate::result::OperationResult;
use std::sync::Arc;

/// One end of a connection: either a direct operation reference or a name to be
/// resolved against the workflow's operations at `start` time.
///
/// Both fields may be set simultaneously — the resolution rule is "object wins
/// silently" rather than "exactly one of the two" — so this is not a plain sum type,
/// even though in the common case only one field is populated.
#[derive(Clone, Default)]
pub struct Endpoint {
    pub operation: Option<Arc<dyn Operation>>,
    pub name: Option<String>,
}

impl Endpoint {
    #[must_use]
    pub fn by_object(operation: Arc<dyn Operation>) -> Self {
        Self { operation: Some(operation), name: None }
    }

    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { operation: None, name: Some(name.into()) }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("operation", &self.operation.as_ref().map(|_| "<operation>"))
            .field("name", &self.name)
            .finish()
    }
}

/// A directed edge between two endpoints, shared shape for both dependency and
/// segue descriptors.
#[derive(Clone, Debug, Default)]
pub struct ConnectionDescriptor {
    pub source: Endpoint,
    pub target: Endpoint,
}

impl ConnectionDescriptor {
    #[must_use]
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self { source, target }
    }
}

/// An unconditional ordering edge: the target may not start until the source has
/// finished, regardless of the source's result.
#[derive(Clone, Debug, Default)]
pub struct DependencyDescriptor {
    pub connection: ConnectionDescriptor,
}

impl DependencyDescriptor {
    #[must_use]
    pub fn between(source: Endpoint, target: Endpoint) -> Self {
        Self { connection: ConnectionDescriptor::new(source, target) }
    }

    #[must_use]
    pub fn between_objects(source: Arc<dyn Operation>, target: Arc<dyn Operation>) -> Self {
        Self::between(Endpoint::by_object(source), Endpoint::by_object(target))
    }

    #[must_use]
    pub fn between_names(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::between(Endpoint::by_name(source), Endpoint::by_name(target))
    }
}

/// A predicate evaluated against a segue's source result to decide whether the
/// target becomes reachable. Absent predicate is equivalent to always-true.
pub type SeguePredicate = Arc<dyn Fn(&OperationResult) -> bool + Send + Sync>;

/// A conditional ordering edge: the target becomes reachable only if `predicate`
/// evaluates true against the source's finished result.
#[derive(Clone)]
pub struct SegueDescriptor {
    pub connection: ConnectionDescriptor,
    pub predicate: Option<SeguePredicate>,
}

impl SegueDescriptor {
    #[must_use]
    pub fn between(source: Endpoint, target: Endpoint, predicate: Option<SeguePredicate>) -> Self {
        Self { connection: ConnectionDescriptor::new(source, target), predicate }
    }

    #[must_use]
    pub fn between_names(
        source: impl Into<String>,
        target: impl Into<String>,
        predicate: impl Fn(&OperationResult) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::between(Endpoint::by_name(source), Endpoint::by_name(target), Some(Arc::new(predicate)))
    }

    /// Evaluates the predicate against `result`, defaulting to `true` when absent.
    #[must_use]
    pub fn is_satisfied_by(&self, result: &OperationResult) -> bool {
        match &self.predicate {
            Some(p) => p(result),
            None => true,
        }
    }
}

impl std::fmt::Debug for SegueDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegueDescriptor")
            .field("connection", &self.connection)
            .field("predicate", &self.predicate.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_between_names_populates_name_endpoints() {
        let d = DependencyDescriptor::between_names("a", "b");
        assert_eq!(d.connection.source.name.as_deref(), Some("a"));
        assert_eq!(d.connection.target.name.as_deref(), Some("b"));
        assert!(d.connection.source.operation.is_none());
    }

    #[test]
    fn segue_without_predicate_is_always_satisfied() {
        let s = SegueDescriptor::between(Endpoint::by_name("a"), Endpoint::by_name("b"), None);
        assert!(s.is_satisfied_by(&OperationResult::success_empty()));
    }

    #[test]
    fn segue_predicate_inspects_payload() {
        let s = SegueDescriptor::between_names("a", "b", |r| r.payload() == Some(&serde_json::json!(1)));
        assert!(s.is_satisfied_by(&OperationResult::success(serde_json::json!(1))));
        assert!(!s.is_satisfied_by(&OperationResult::success(serde_json::json!(2))));
    }
}
