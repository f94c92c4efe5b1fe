//! Embeddable graph-scheduled workflow engine for the silver-telegram platform.
//!
//! A [`Workflow`] is a DAG of [`Operation`]s connected by unconditional
//! [`DependencyDescriptor`] edges and conditional [`SegueDescriptor`] edges. Once
//! built, `start` validates the graph, then the scheduler dispatches ready
//! operations up to a concurrency ceiling, feeds their results into a shared
//! [`Context`], and notifies an optional [`WorkflowDelegate`] exactly once when the
//! run reaches a terminal state.

pub mod context;
pub mod delegate;
pub mod descriptor;
pub mod error;
pub mod execution;
mod graph;
pub mod operation;
pub mod result;
pub mod workflow;

pub use context::Context;
pub use delegate::WorkflowDelegate;
pub use descriptor::{ConnectionDescriptor, DependencyDescriptor, Endpoint, SegueDescriptor, SeguePredicate};
pub use error::{ValidationError, WorkflowBuildError, VALIDATION_ERROR_DOMAIN};
pub use execution::{ExecutionTarget, MainThreadExecutionTarget, TokioExecutionTarget};
pub use operation::{BlockOperation, Operation};
pub use result::{OperationError, OperationResult};
pub use workflow::{Workflow, WorkflowState};
