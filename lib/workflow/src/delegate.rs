//! The delegate notifier: posts the workflow's single terminal event to a
//! user-supplied sink on a user-supplied execution target.

use crate::error::ValidationError;
use crate::execution::ExecutionTarget;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A sink for a workflow's terminal event. Exactly one of these two methods is
/// called, exactly once, for the lifetime of a workflow run.
pub trait WorkflowDelegate: Send + Sync {
    /// The workflow finished: every operation reached a terminal (finished or
    /// skipped) state with no deadlock.
    fn workflow_did_complete(&self);

    /// The workflow failed during validation or dispatch.
    fn workflow_did_fail(&self, error: ValidationError);
}

/// Wraps an optional delegate and its execution target, guaranteeing the delegate
/// is invoked at most once regardless of how many times the scheduler (incorrectly)
/// tried to notify it.
pub(crate) struct DelegateNotifier {
    delegate: Option<Arc<dyn WorkflowDelegate>>,
    target: Option<Arc<dyn ExecutionTarget>>,
    fired: AtomicBool,
}

impl DelegateNotifier {
    pub(crate) fn new(delegate: Option<Arc<dyn WorkflowDelegate>>, target: Option<Arc<dyn ExecutionTarget>>) -> Self {
        Self { delegate, target, fired: AtomicBool::new(false) }
    }

    pub(crate) fn notify_completed(&self) {
        self.notify(|d| d.workflow_did_complete());
    }

    pub(crate) fn notify_failed(&self, error: ValidationError) {
        self.notify(move |d| d.workflow_did_fail(error.clone()));
    }

    fn notify(&self, call: impl FnOnce(&dyn WorkflowDelegate) + Send + 'static) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        let (Some(delegate), Some(target)) = (self.delegate.clone(), self.target.clone()) else {
            return;
        };
        target.spawn(Box::pin(async move {
            call(delegate.as_ref());
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::TokioExecutionTarget;
    use std::sync::Mutex;

    struct RecordingDelegate {
        completed: Mutex<usize>,
        failed: Mutex<Vec<ValidationError>>,
    }

    impl RecordingDelegate {
        fn new() -> Arc<Self> {
            Arc::new(Self { completed: Mutex::new(0), failed: Mutex::new(Vec::new()) })
        }
    }

    impl WorkflowDelegate for RecordingDelegate {
        fn workflow_did_complete(&self) {
            *self.completed.lock().unwrap() += 1;
        }

        fn workflow_did_fail(&self, error: ValidationError) {
            self.failed.lock().unwrap().push(error);
        }
    }

    #[tokio::test]
    async fn notifies_completion_exactly_once() {
        let delegate = RecordingDelegate::new();
        let notifier = DelegateNotifier::new(Some(delegate.clone()), Some(Arc::new(TokioExecutionTarget)));
        notifier.notify_completed();
        notifier.notify_completed();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(*delegate.completed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn notifies_failure_with_error() {
        let delegate = RecordingDelegate::new();
        let notifier = DelegateNotifier::new(Some(delegate.clone()), Some(Arc::new(TokioExecutionTarget)));
        notifier.notify_failed(ValidationError::DependencyCycle);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(delegate.failed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_delegate_is_a_silent_no_op() {
        let notifier = DelegateNotifier::new(None, None);
        notifier.notify_completed();
    }
}
