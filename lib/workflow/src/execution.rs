//! Execution targets: where dispatched operations (and the delegate notifier) run.
//!
//! A host application typically wants dispatch split between its own main thread
//! and a background pool. Off Apple platforms there is no ambient "the main thread"
//! concept, so this crate
//! models both targets explicitly: [`TokioExecutionTarget`] posts onto the ambient
//! async runtime's worker pool, and [`MainThreadExecutionTarget`] runs a single
//! dedicated OS thread so that main-thread-requiring operations genuinely execute
//! serialized onto one thread, while still being able to interleave cooperatively
//! with each other if they yield at await points — several main-thread operations
//! may be in flight at once so long as they're async and don't depend on each other.

use futures::future::BoxFuture;
use std::sync::{Arc, OnceLock};
use std::thread;
use tokio::sync::mpsc;

/// A place a future can be posted to run. Operations are dispatched to either the
/// background target or the main-thread target depending on
/// [`crate::operation::Operation::requires_main_thread`]; the delegate notifier is
/// posted to the caller-supplied delegate target.
pub trait ExecutionTarget: Send + Sync {
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// The default background target: posts onto the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExecutionTarget;

impl ExecutionTarget for TokioExecutionTarget {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}

/// A dedicated OS thread running its own single-threaded runtime, standing in for
/// "the main thread" in a library with no host UI thread of its own.
pub struct MainThreadExecutionTarget {
    sender: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

impl MainThreadExecutionTarget {
    /// Spawns the dedicated thread and its single-threaded runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        thread::Builder::new()
            .name("workflow-main-thread".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build main-thread runtime");
                rt.block_on(async move {
                    while let Some(task) = receiver.recv().await {
                        tokio::task::spawn(task);
                    }
                });
            })
            .expect("failed to spawn the main-thread executor thread");
        Self { sender }
    }

    /// A process-wide main-thread target, lazily started on first use. Workflows
    /// that don't specify one of their own share this one, matching there being
    /// exactly one real main thread per process.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<MainThreadExecutionTarget>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(MainThreadExecutionTarget::new())))
    }
}

impl Default for MainThreadExecutionTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionTarget for MainThreadExecutionTarget {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        let _ = self.sender.send(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn tokio_target_runs_spawned_task() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        TokioExecutionTarget.spawn(Box::pin(async move {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn main_thread_target_runs_spawned_task_on_dedicated_thread() {
        let target = MainThreadExecutionTarget::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let main_thread_id = std::sync::Arc::new(AtomicUsize::new(0));
        let marker = Arc::clone(&main_thread_id);
        target.spawn(Box::pin(async move {
            marker.store(1, Ordering::SeqCst);
            let _ = tx.send(());
        }));
        rx.await.unwrap();
        assert_eq!(main_thread_id.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn main_thread_target_runs_multiple_tasks_concurrently() {
        let target = MainThreadExecutionTarget::new();
        let (tx1, rx1) = tokio::sync::oneshot::channel();
        let (tx2, rx2) = tokio::sync::oneshot::channel();
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let gate_rx = Arc::new(tokio::sync::Mutex::new(Some(gate_rx)));
        let gate_for_first = Arc::clone(&gate_rx);
        target.spawn(Box::pin(async move {
            let rx = gate_for_first.lock().await.take().unwrap();
            rx.await.ok();
            let _ = tx1.send(());
        }));
        target.spawn(Box::pin(async move {
            let _ = tx2.send(());
            let _ = gate_tx.send(());
        }));
        rx2.await.unwrap();
        rx1.await.unwrap();
    }
}
