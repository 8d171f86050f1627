// Upstream readiness check
//
// Expressed as an outcome value the worker branches on; re-enqueueing is the
// caller's job. Failures dominate: a single failed dependency makes the task
// unrunnable no matter what the rest are doing.

use drover_core::{Task, TaskStatus};
use drover_storage::TaskRow;

/// What the worker should do with a consumed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome {
    /// Every dependency settled in `success`.
    Proceed,
    /// At least one dependency has not settled yet; re-enqueue and retry later.
    Deferred { pending: Vec<String> },
    /// A dependency ended in `failure`; this task must not run.
    UpstreamFailed { failed: String },
}

/// Examine the persisted record of every sibling listed in `depends_on`.
/// A dependency with no record yet counts as pending.
pub fn check_upstream(task: &Task, siblings: &[TaskRow]) -> UpstreamOutcome {
    if task.depends_on.is_empty() {
        return UpstreamOutcome::Proceed;
    }

    let mut pending = Vec::new();
    for dependency in &task.depends_on {
        let status = siblings
            .iter()
            .find(|row| &row.id == dependency)
            .map(|row| row.status());
        match status {
            Some(TaskStatus::Failure) => {
                return UpstreamOutcome::UpstreamFailed {
                    failed: dependency.clone(),
                };
            }
            Some(TaskStatus::Success) => {}
            Some(TaskStatus::Pending) | Some(TaskStatus::Running) | None => {
                pending.push(dependency.clone());
            }
        }
    }

    if pending.is_empty() {
        UpstreamOutcome::Proceed
    } else {
        UpstreamOutcome::Deferred { pending }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use drover_core::{ContainerSpec, ExecutorSpec, TaskOptions, WorkflowMetadata};

    fn task(id: &str, depends_on: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            name: format!("task_{id}"),
            executor: ExecutorSpec::Container(ContainerSpec {
                image: "busybox".to_string(),
                ..Default::default()
            }),
            inputs: vec![],
            outputs: vec![],
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            options: TaskOptions::default(),
            metadata: WorkflowMetadata::default(),
        }
    }

    fn row(id: &str, status: &str) -> TaskRow {
        let now = Utc::now();
        TaskRow {
            parent: "workflow-test".to_string(),
            id: id.to_string(),
            payload: serde_json::json!({}),
            status: status.to_string(),
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn no_dependencies_proceeds_immediately() {
        assert_eq!(check_upstream(&task("t1", &[]), &[]), UpstreamOutcome::Proceed);
    }

    #[test]
    fn settled_dependencies_proceed() {
        let siblings = vec![row("a", "success"), row("b", "success")];
        assert_eq!(
            check_upstream(&task("c", &["a", "b"]), &siblings),
            UpstreamOutcome::Proceed
        );
    }

    #[test]
    fn unsettled_dependency_defers() {
        let siblings = vec![row("a", "success"), row("b", "running")];
        assert_eq!(
            check_upstream(&task("c", &["a", "b"]), &siblings),
            UpstreamOutcome::Deferred {
                pending: vec!["b".to_string()]
            }
        );
    }

    #[test]
    fn failed_dependency_wins_over_pending() {
        let siblings = vec![row("a", "failure"), row("b", "pending")];
        assert_eq!(
            check_upstream(&task("c", &["a", "b"]), &siblings),
            UpstreamOutcome::UpstreamFailed {
                failed: "a".to_string()
            }
        );
    }

    #[test]
    fn missing_record_counts_as_pending() {
        assert_eq!(
            check_upstream(&task("c", &["ghost"]), &[]),
            UpstreamOutcome::Deferred {
                pending: vec!["ghost".to_string()]
            }
        );
    }

    #[test]
    fn unrelated_siblings_are_ignored() {
        let siblings = vec![row("a", "success"), row("x", "failure")];
        assert_eq!(
            check_upstream(&task("c", &["a"]), &siblings),
            UpstreamOutcome::Proceed
        );
    }
}
