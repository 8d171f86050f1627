// Workflow execution domain
//
// This crate provides the shared domain for the drover engine: a workflow is
// a DAG of named tasks, each running either a container or an outbound HTTP
// call, exchanging file artifacts through an object store.
//
// Key design decisions:
// - Executor variants are a tagged union discriminated by a `type` field; no inheritance
// - Upstream readiness is re-verified by the worker, so broker ordering is a hint only
// - Workflow status is never stored authoritatively by callers: it is derived from
//   child task statuses by a pure function (aggregate::derive_workflow_status)
// - Object names and local paths are computed here so the naming rule has one home

pub mod aggregate;
pub mod artifact;
pub mod config;
pub mod error;
pub mod executor;
pub mod task;
pub mod workflow;

// Re-exports for convenience
pub use aggregate::derive_workflow_status;
pub use artifact::Artifact;
pub use config::Settings;
pub use error::{InvalidWorkflow, TaskError};
pub use executor::{ContainerSpec, ExecutorSpec, HttpMethod, HttpSpec, Parameter};
pub use task::{Task, TaskOptions, TaskRecord, TaskResult, TaskStatus};
pub use workflow::{Workflow, WorkflowMetadata, WorkflowRecord, WorkflowStatus};
