//! The graph scheduler: the workflow's owned state, intake/validation, the dispatch
//! loop, completion handling, and terminal detection. This is the core of the crate.

use crate::context::Context;
use crate::delegate::{DelegateNotifier, WorkflowDelegate};
use crate::descriptor::{DependencyDescriptor, SegueDescriptor};
use crate::error::{ValidationError, WorkflowBuildError};
use crate::execution::{ExecutionTarget, MainThreadExecutionTarget, TokioExecutionTarget};
use crate::graph::OperationGraph;
use crate::operation::Operation;
use crate::result::{OperationError, OperationResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// The workflow's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Active,
    Completed,
    Failed,
}

struct RuntimeState {
    graph: OperationGraph,
    blocked_by: Vec<usize>,
    reached: Vec<bool>,
    finished: Vec<bool>,
    skipped: Vec<bool>,
    started: Vec<bool>,
    active: Vec<bool>,
    segue_seen: Vec<usize>,
    ready_queue: VecDeque<usize>,
    in_flight: usize,
}

struct Inner {
    state: WorkflowState,
    operations: Vec<Arc<dyn Operation>>,
    dependencies: Vec<DependencyDescriptor>,
    segues: Vec<SegueDescriptor>,
    error: Option<ValidationError>,
    runtime: Option<RuntimeState>,
}

/// The graph scheduler. Owns the operation list and edges while idle; once
/// [`Workflow::start`] runs, it owns the readiness bookkeeping and drives
/// execution to completion.
///
/// Always held behind an `Arc` (returned directly by [`Workflow::new`]) because
/// completion handling re-enters the scheduler from spawned tasks.
pub struct Workflow {
    max_concurrent: usize,
    context: Arc<Context>,
    background_target: Arc<dyn ExecutionTarget>,
    main_thread_target: Arc<dyn ExecutionTarget>,
    delegate_notifier: DelegateNotifier,
    inner: Mutex<Inner>,
}

impl Workflow {
    /// Constructs an idle workflow. Panics if `max_concurrent` is zero: a workflow
    /// that can never run anything concurrently is a construction-time misuse, not a
    /// runtime state to recover from. Panics if a `delegate` is supplied without a
    /// `delegate_target`.
    #[must_use]
    pub fn new(
        max_concurrent: usize,
        delegate: Option<Arc<dyn WorkflowDelegate>>,
        delegate_target: Option<Arc<dyn ExecutionTarget>>,
    ) -> Arc<Self> {
        assert!(max_concurrent > 0, "maximum_concurrent_operations must be at least 1");
        assert!(
            delegate.is_none() || delegate_target.is_some(),
            "delegate_target is required when a delegate is supplied"
        );
        Arc::new(Self {
            max_concurrent,
            context: Arc::new(Context::new()),
            background_target: Arc::new(TokioExecutionTarget),
            main_thread_target: MainThreadExecutionTarget::shared(),
            delegate_notifier: DelegateNotifier::new(delegate, delegate_target),
            inner: Mutex::new(Inner {
                state: WorkflowState::Idle,
                operations: Vec::new(),
                dependencies: Vec::new(),
                segues: Vec::new(),
                error: None,
                runtime: None,
            }),
        })
    }

    /// Adds an operation. Rejected once the workflow is no longer idle, or if the
    /// same operation (by identity) was already added.
    pub fn add_operation(&self, operation: Arc<dyn Operation>) -> Result<(), WorkflowBuildError> {
        let mut inner = self.inner.lock().expect("workflow lock poisoned");
        if inner.state != WorkflowState::Idle {
            return Err(WorkflowBuildError::NotIdle);
        }
        if inner.operations.iter().any(|existing| Arc::ptr_eq(existing, &operation)) {
            return Err(WorkflowBuildError::DuplicateOperation);
        }
        inner.operations.push(operation);
        Ok(())
    }

    /// Adds an unconditional ordering edge. The descriptor is copied; rejected once
    /// the workflow is no longer idle.
    pub fn add_dependency(&self, descriptor: DependencyDescriptor) -> Result<(), WorkflowBuildError> {
        let mut inner = self.inner.lock().expect("workflow lock poisoned");
        if inner.state != WorkflowState::Idle {
            return Err(WorkflowBuildError::NotIdle);
        }
        inner.dependencies.push(descriptor);
        Ok(())
    }

    /// Adds a conditional ordering edge. The descriptor is copied; rejected once the
    /// workflow is no longer idle.
    pub fn add_segue(&self, descriptor: SegueDescriptor) -> Result<(), WorkflowBuildError> {
        let mut inner = self.inner.lock().expect("workflow lock poisoned");
        if inner.state != WorkflowState::Idle {
            return Err(WorkflowBuildError::NotIdle);
        }
        inner.segues.push(descriptor);
        Ok(())
    }

    /// Validates the graph and, if valid, begins dispatch. Single-shot: a second
    /// call on an already-started workflow is rejected and has no effect.
    ///
    /// A validation failure (duplicate names, an unresolvable edge, a cycle, or a
    /// deadlocked initial topology) does not surface through this method's return
    /// value — it transitions the workflow straight to `Failed` and notifies the
    /// delegate. Only builder misuse (calling `start` twice) is a `Result::Err` here.
    pub fn start(self: &Arc<Self>) -> Result<(), WorkflowBuildError> {
        {
            let mut inner = self.inner.lock().expect("workflow lock poisoned");
            if inner.state != WorkflowState::Idle {
                return Err(WorkflowBuildError::NotIdle);
            }

            let mut name_index = HashMap::new();
            for (index, operation) in inner.operations.iter().enumerate() {
                if let Some(name) = operation.name() {
                    if name_index.insert(name.to_string(), index).is_some() {
                        self.fail_validation(&mut inner, ValidationError::DuplicateNames { name: name.to_string() });
                        return Ok(());
                    }
                }
            }

            let graph =
                match OperationGraph::build(&inner.operations, &name_index, &inner.dependencies, &inner.segues) {
                    Ok(graph) => graph,
                    Err(error) => {
                        self.fail_validation(&mut inner, error);
                        return Ok(());
                    }
                };

            let op_count = inner.operations.len();
            let mut blocked_by = vec![0usize; op_count];
            let mut reached = vec![true; op_count];
            for index in 0..op_count {
                blocked_by[index] += graph.incoming_dependency_count(index);
                let incoming_segues = graph.incoming_segue_indices(index).count();
                blocked_by[index] += incoming_segues;
                reached[index] = incoming_segues == 0;
            }

            let initial_ready: VecDeque<usize> =
                (0..op_count).filter(|&index| blocked_by[index] == 0 && reached[index]).collect();
            if op_count > 0 && initial_ready.is_empty() {
                let remaining = operation_labels(&inner.operations, 0..op_count);
                self.fail_validation(&mut inner, ValidationError::Deadlocked { remaining });
                return Ok(());
            }

            tracing::debug!(operation_count = op_count, max_concurrent = self.max_concurrent, "workflow starting");
            inner.state = WorkflowState::Active;
            inner.runtime = Some(RuntimeState {
                graph,
                blocked_by,
                reached,
                finished: vec![false; op_count],
                skipped: vec![false; op_count],
                started: vec![false; op_count],
                active: vec![false; op_count],
                segue_seen: vec![0; op_count],
                ready_queue: initial_ready,
                in_flight: 0,
            });
        }
        self.dispatch_tick();
        Ok(())
    }

    fn fail_validation(&self, inner: &mut Inner, error: ValidationError) {
        tracing::error!(error = %error, "workflow failed validation");
        inner.error = Some(error.clone());
        inner.state = WorkflowState::Failed;
        self.delegate_notifier.notify_failed(error);
    }

    /// Pops as many ready operations as the concurrency ceiling allows and dispatches
    /// them, then checks for terminal conditions if nothing was left to dispatch.
    fn dispatch_tick(self: &Arc<Self>) {
        let to_dispatch: Vec<usize> = {
            let mut inner = self.inner.lock().expect("workflow lock poisoned");
            let Some(runtime) = inner.runtime.as_mut() else { return };
            let mut popped = Vec::new();
            while runtime.in_flight < self.max_concurrent {
                let Some(op_index) = runtime.ready_queue.pop_front() else { break };
                runtime.started[op_index] = true;
                runtime.active[op_index] = true;
                runtime.in_flight += 1;
                popped.push(op_index);
            }
            popped
        };

        if to_dispatch.is_empty() {
            self.maybe_finish();
            return;
        }

        for op_index in to_dispatch {
            let operation = {
                let inner = self.inner.lock().expect("workflow lock poisoned");
                Arc::clone(&inner.operations[op_index])
            };

            if operation.is_cancelled() {
                tracing::debug!(operation = op_index, "operation cancelled before dispatch");
                self.apply_completion(op_index, OperationResult::failure(OperationError::cancelled()));
                continue;
            }

            let workflow = Arc::clone(self);
            let context = Arc::clone(&self.context);
            let target: Arc<dyn ExecutionTarget> = if operation.requires_main_thread() {
                Arc::clone(&self.main_thread_target)
            } else {
                Arc::clone(&self.background_target)
            };
            tracing::debug!(operation = op_index, "dispatching operation");
            target.spawn(Box::pin(async move {
                operation.prepare(&context).await;
                let result = operation.start(Arc::clone(&context)).await;
                workflow.apply_completion(op_index, result);
            }));
        }
    }

    /// Applies one operation's finish (real or synthesized-by-skip) and propagates
    /// its effect to downstream dependency/segue targets, including cascading any
    /// further skips that propagation produces, then re-enters the dispatch loop.
    fn apply_completion(self: &Arc<Self>, op_index: usize, result: OperationResult) {
        let mut pending: VecDeque<(usize, OperationResult)> = VecDeque::from([(op_index, result)]);

        while let Some((index, result)) = pending.pop_front() {
            let (dep_targets, segue_out, name, already_finished) = {
                let mut inner = self.inner.lock().expect("workflow lock poisoned");
                let name = inner.operations[index].name().map(str::to_string);
                let Some(runtime) = inner.runtime.as_mut() else { return };
                if runtime.finished[index] {
                    (Vec::new(), Vec::new(), None, true)
                } else {
                    let was_active = runtime.active[index];
                    runtime.finished[index] = true;
                    runtime.active[index] = false;
                    if was_active {
                        runtime.in_flight = runtime.in_flight.saturating_sub(1);
                    }
                    let dep_targets: Vec<usize> = runtime.graph.dependency_targets(index).collect();
                    let segue_out: Vec<usize> = runtime.graph.outgoing_segue_indices(index).collect();
                    (dep_targets, segue_out, name, false)
                }
            };
            if already_finished {
                continue;
            }

            if let Some(name) = name {
                self.context.set_result(name, result.clone());
            }

            // Evaluate segue predicates with no lock held.
            let segue_edges: Vec<(usize, Option<crate::descriptor::SeguePredicate>)> = {
                let inner = self.inner.lock().expect("workflow lock poisoned");
                let runtime = inner.runtime.as_ref().expect("runtime present while active");
                segue_out
                    .iter()
                    .map(|&segue_index| {
                        let edge = &runtime.graph.segues[segue_index];
                        (edge.target, edge.predicate.clone())
                    })
                    .collect()
            };
            let satisfied: Vec<(usize, bool)> = segue_edges
                .into_iter()
                .map(|(target, predicate)| {
                    let ok = match &predicate {
                        None => true,
                        Some(p) => {
                            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| p(&result))) {
                                Ok(ok) => ok,
                                Err(_) => {
                                    tracing::warn!(operation = target, "segue predicate panicked; treating as unsatisfied");
                                    false
                                }
                            }
                        }
                    };
                    (target, ok)
                })
                .collect();

            let (newly_ready, newly_skipped) = {
                let mut inner = self.inner.lock().expect("workflow lock poisoned");
                let runtime = inner.runtime.as_mut().expect("runtime present while active");

                for &target in &dep_targets {
                    runtime.blocked_by[target] = runtime.blocked_by[target].saturating_sub(1);
                }

                let mut skipped_now = Vec::new();
                for (target, ok) in &satisfied {
                    let target = *target;
                    runtime.segue_seen[target] += 1;
                    if *ok {
                        runtime.blocked_by[target] = runtime.blocked_by[target].saturating_sub(1);
                        runtime.reached[target] = true;
                    } else {
                        let incoming = runtime.graph.incoming_segue_indices(target).count();
                        if runtime.segue_seen[target] == incoming && !runtime.reached[target] && !runtime.skipped[target]
                        {
                            runtime.skipped[target] = true;
                            skipped_now.push(target);
                        }
                    }
                }

                let mut candidates: Vec<usize> = dep_targets.clone();
                candidates.extend(satisfied.iter().map(|(target, _)| *target));
                candidates.sort_unstable();
                candidates.dedup();
                let ready: Vec<usize> = candidates
                    .into_iter()
                    .filter(|&candidate| {
                        !runtime.started[candidate]
                            && !runtime.finished[candidate]
                            && !runtime.skipped[candidate]
                            && runtime.blocked_by[candidate] == 0
                            && runtime.reached[candidate]
                    })
                    .collect();
                for &r in &ready {
                    runtime.ready_queue.push_back(r);
                }
                (ready, skipped_now)
            };

            tracing::debug!(
                operation = index,
                newly_ready = newly_ready.len(),
                newly_skipped = newly_skipped.len(),
                "applied completion"
            );

            for skipped_index in newly_skipped {
                pending.push_back((skipped_index, OperationResult::failure(OperationError::skipped())));
            }
        }

        self.dispatch_tick();
    }

    /// Checks whether the workflow has drained (no in-flight operations, empty ready
    /// queue) and, if so, decides between `Completed` and `Deadlocked`.
    fn maybe_finish(self: &Arc<Self>) {
        enum Outcome {
            Completed,
            Failed(ValidationError),
        }
        let outcome = {
            let mut inner = self.inner.lock().expect("workflow lock poisoned");
            if inner.state != WorkflowState::Active {
                return;
            }
            let runtime = inner.runtime.as_ref().expect("runtime present while active");
            if runtime.in_flight != 0 || !runtime.ready_queue.is_empty() {
                return;
            }
            let op_count = inner.operations.len();
            let all_terminal = (0..op_count).all(|i| runtime.finished[i] || runtime.skipped[i]);
            if all_terminal {
                inner.state = WorkflowState::Completed;
                Outcome::Completed
            } else {
                let remaining =
                    operation_labels(&inner.operations, (0..op_count).filter(|&i| !(runtime.finished[i] || runtime.skipped[i])));
                let error = ValidationError::Deadlocked { remaining };
                inner.error = Some(error.clone());
                inner.state = WorkflowState::Failed;
                Outcome::Failed(error)
            }
        };
        match outcome {
            Outcome::Completed => {
                tracing::info!("workflow completed");
                self.delegate_notifier.notify_completed();
            }
            Outcome::Failed(error) => {
                tracing::error!(error = %error, "workflow deadlocked");
                self.delegate_notifier.notify_failed(error);
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.inner.lock().expect("workflow lock poisoned").state
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.state() == WorkflowState::Active
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.state() == WorkflowState::Completed
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.state() == WorkflowState::Failed
    }

    #[must_use]
    pub fn error(&self) -> Option<ValidationError> {
        self.inner.lock().expect("workflow lock poisoned").error.clone()
    }

    #[must_use]
    pub fn context(&self) -> Arc<Context> {
        Arc::clone(&self.context)
    }

    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.inner.lock().expect("workflow lock poisoned").operations.len()
    }

    /// The operations added so far, in insertion order.
    #[must_use]
    pub fn operations(&self) -> Vec<Arc<dyn Operation>> {
        self.inner.lock().expect("workflow lock poisoned").operations.clone()
    }
}

fn operation_labels(operations: &[Arc<dyn Operation>], indices: impl IntoIterator<Item = usize>) -> Vec<String> {
    indices
        .into_iter()
        .map(|i| operations[i].name().map(str::to_string).unwrap_or_else(|| format!("#{i}")))
        .collect()
}
