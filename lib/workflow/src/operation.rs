//! The polymorphic unit of work: [`Operation`], and the [`BlockOperation`] variant
//! that wraps a plain async closure.

use crate::context::Context;
use crate::result::OperationResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A unit of asynchronous work the scheduler can dispatch.
///
/// `start` is an async method rather than a callback-accepting one: its return value
/// *is* the completion. Because an async function returns exactly once, "completion
/// happens at most once" is enforced by the type system rather than by a runtime
/// check.
///
/// Implementors must not attempt to mutate the scheduler-owned state fields
/// (`active`/`finished`/`cancelled`) — those live on the scheduler's own bookkeeping,
/// never on the `Operation` itself, except for
/// `is_cancelled`, which an implementation may back with an externally-settable flag
/// the scheduler polls at dispatch time (see [`BlockOperation::cancellation_handle`]).
#[async_trait]
pub trait Operation: Send + Sync {
    /// Optional name, unique within a workflow when present. Used for named
    /// references in descriptors and as the key under which a finished result is
    /// recorded in [`Context`].
    fn name(&self) -> Option<&str>;

    /// Hint to the scheduler's dispatcher: run this operation on the main execution
    /// target rather than the background pool.
    fn requires_main_thread(&self) -> bool {
        false
    }

    /// Polled by the scheduler immediately before dispatch. Cancelling an operation
    /// that has not yet been dispatched causes the scheduler to skip it with a
    /// synthesized `Failure(cancelled)` result instead of calling `start`.
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Idempotent prologue, run with the context available but before the operation
    /// is counted against the concurrency ceiling.
    async fn prepare(&self, _context: &Context) {}

    /// Perform the work and produce a result. Called at most once per operation.
    async fn start(&self, context: Arc<Context>) -> OperationResult;
}

type BlockFn = dyn Fn(Arc<Context>) -> BoxFuture<'static, OperationResult> + Send + Sync;

/// An [`Operation`] backed by a plain async closure.
pub struct BlockOperation {
    name: Option<String>,
    requires_main_thread: bool,
    cancelled: Arc<AtomicBool>,
    block: Arc<BlockFn>,
}

impl BlockOperation {
    /// Creates a new block operation. `f` is invoked once, on dispatch, with the
    /// workflow's context; its returned future is awaited to completion and its
    /// output becomes this operation's result.
    pub fn new<F, Fut>(name: impl Into<Option<String>>, requires_main_thread: bool, f: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            requires_main_thread,
            cancelled: Arc::new(AtomicBool::new(false)),
            block: Arc::new(move |ctx| Box::pin(f(ctx))),
        }
    }

    /// A shareable flag the caller can set, from outside, to cancel this operation
    /// before it is dispatched. There is deliberately no `Workflow::cancel` entry
    /// point: cancellation is advisory and always originates with the operation.
    #[must_use]
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

impl fmt::Debug for BlockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockOperation")
            .field("name", &self.name)
            .field("requires_main_thread", &self.requires_main_thread)
            .field("cancelled", &self.cancelled.load(Ordering::Acquire))
            .finish()
    }
}

#[async_trait]
impl Operation for BlockOperation {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn requires_main_thread(&self) -> bool {
        self.requires_main_thread
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    async fn start(&self, context: Arc<Context>) -> OperationResult {
        (self.block)(context).await
    }
}
