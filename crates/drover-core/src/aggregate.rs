// Workflow status derivation
//
// The parent status is a pure function of the children's statuses, evaluated
// as a first-match rule table. Callers recompute after every task transition;
// concurrent writers are safe because the derivation only depends on what was
// read, and the persisted status is last-writer-wins.

use crate::task::TaskStatus;
use crate::workflow::WorkflowStatus;

/// Derive a workflow's status from its revocation flag and child statuses.
///
/// Rule table, first match wins:
/// revoked → all success → all pending → any failure → any pending →
/// any running → pending.
pub fn derive_workflow_status(is_revoked: bool, statuses: &[TaskStatus]) -> WorkflowStatus {
    let all = |status: TaskStatus| statuses.iter().all(|s| *s == status);
    let any = |status: TaskStatus| statuses.iter().any(|s| *s == status);

    if is_revoked {
        WorkflowStatus::Revoked
    } else if all(TaskStatus::Success) {
        WorkflowStatus::Success
    } else if all(TaskStatus::Pending) {
        WorkflowStatus::Pending
    } else if any(TaskStatus::Failure) {
        WorkflowStatus::Failure
    } else if any(TaskStatus::Pending) {
        WorkflowStatus::Pending
    } else if any(TaskStatus::Running) {
        WorkflowStatus::Running
    } else {
        WorkflowStatus::Pending
    }
}
