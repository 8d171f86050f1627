// Workflow admission: validate, persist, topologically order, enqueue
//
// Topological submission gives the broker a usually-honoured ordering.
// Correctness never depends on it: the worker re-verifies upstream readiness
// on every delivery (see upstream.rs).

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use thiserror::Error;

use drover_core::{InvalidWorkflow, Settings, Task, Workflow};
use drover_storage::Database;

use crate::aggregate::set_workflow_run_state;
use crate::broker::{Broker, TaskMessage};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Invalid(#[from] InvalidWorkflow),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct Scheduler {
    db: Database,
    broker: Broker,
    settings: Settings,
}

impl Scheduler {
    pub fn new(db: Database, broker: Broker, settings: Settings) -> Self {
        Self {
            db,
            broker,
            settings,
        }
    }

    /// Persist the workflow in `pending` and enqueue every task as an
    /// independent broker message, in topological order. Returns the
    /// workflow id.
    pub async fn run(&self, mut workflow: Workflow) -> Result<String, ScheduleError> {
        workflow.validate()?;

        let metadata = serde_json::to_value(&workflow.metadata)
            .context("Failed to serialize workflow metadata")?;
        self.db
            .upsert_workflow(&workflow.id, &workflow.label, &metadata)
            .await?;

        // Propagate workflow metadata into every task before it is serialized
        // into its message and record.
        let Workflow {
            metadata, tasks, ..
        } = &mut workflow;
        for task in tasks.iter_mut() {
            metadata.propagate_into(&mut task.metadata);
        }

        let order = sorted_tasks(&workflow)?;
        let by_id: HashMap<&str, &Task> = workflow
            .tasks
            .iter()
            .map(|task| (task.id.as_str(), task))
            .collect();

        for task_id in &order {
            let task = by_id[task_id.as_str()];
            self.enqueue(task, &workflow.id).await?;
        }

        // Settles a zero-task workflow immediately; a no-op `pending` flip
        // for everything else.
        set_workflow_run_state(&self.db, &workflow.id).await?;

        tracing::info!(
            workflow_id = %workflow.id,
            tasks = order.len(),
            "Workflow scheduled"
        );
        Ok(workflow.id)
    }

    /// Write the pending task record, then publish its broker message.
    async fn enqueue(&self, task: &Task, workflow_id: &str) -> Result<(), ScheduleError> {
        let payload =
            serde_json::to_value(task).context("Failed to serialize task payload")?;
        self.db.upsert_task(workflow_id, &task.id, &payload).await?;

        let queue = task
            .options
            .queue_name
            .clone()
            .unwrap_or_else(|| self.settings.default_queue.clone());
        self.broker.declare_queue(&queue).await?;

        let message = TaskMessage {
            task: task.clone(),
            task_id: task.id.clone(),
            workflow_id: workflow_id.to_string(),
            queue: queue.clone(),
            retries: 0,
            deferrals: 0,
        };
        self.broker.publish(&queue, &message).await?;

        tracing::debug!(
            task_id = %task.id,
            workflow_id = %workflow_id,
            queue = %queue,
            "Task enqueued"
        );
        Ok(())
    }
}

/// Topological order of task ids.
///
/// Iterative DFS over the dependency graph (edge `u → v` when `u` appears in
/// `depends_on(v)`), emitting post-order and reversing. Roots and children
/// are visited so the output is stable on submission position. A result
/// shorter than the task list means the graph is cyclic or has no roots.
pub fn sorted_tasks(workflow: &Workflow) -> Result<Vec<String>, InvalidWorkflow> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut roots: Vec<&str> = Vec::new();

    for task in &workflow.tasks {
        children.entry(task.id.as_str()).or_default();
        if task.depends_on.is_empty() {
            roots.push(task.id.as_str());
        }
    }
    for task in &workflow.tasks {
        for dependency in &task.depends_on {
            children
                .entry(dependency.as_str())
                .or_default()
                .push(task.id.as_str());
        }
    }

    enum Frame<'a> {
        Enter(&'a str),
        Exit(&'a str),
    }

    // Pushing roots and children in submission order makes the last-submitted
    // sibling finish first in post-order, which lands it last after the
    // reversal: ties break on submission position.
    let mut post: Vec<String> = Vec::with_capacity(workflow.tasks.len());
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<Frame> = roots.iter().map(|id| Frame::Enter(*id)).collect();

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(id) => {
                if !seen.insert(id) {
                    continue;
                }
                stack.push(Frame::Exit(id));
                if let Some(dependents) = children.get(id) {
                    for dependent in dependents {
                        if !seen.contains(dependent) {
                            stack.push(Frame::Enter(*dependent));
                        }
                    }
                }
            }
            Frame::Exit(id) => post.push(id.to_string()),
        }
    }

    post.reverse();

    if post.len() != workflow.tasks.len() {
        return Err(InvalidWorkflow::MissingTasks {
            sorted: post.len(),
            total: workflow.tasks.len(),
        });
    }
    Ok(post)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::{
        ContainerSpec, ExecutorSpec, TaskOptions, WorkflowMetadata,
    };

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

    fn workflow(tasks: Vec<Task>) -> Workflow {
        Workflow {
            id: "workflow-test".to_string(),
            label: String::new(),
            metadata: WorkflowMetadata::default(),
            tasks,
        }
    }

    #[test]
    fn linear_chain_is_ordered() {
        let wf = workflow(vec![task("t1", &[]), task("t2", &["t1"]), task("t3", &["t2"])]);
        assert_eq!(sorted_tasks(&wf).unwrap(), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn submission_order_does_not_matter() {
        // b submitted before a, but b depends on a.
        let wf = workflow(vec![task("b", &["a"]), task("a", &[])]);
        assert_eq!(sorted_tasks(&wf).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn diamond_breaks_ties_on_submission_position() {
        let wf = workflow(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ]);
        assert_eq!(sorted_tasks(&wf).unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn independent_roots_keep_submission_order() {
        let wf = workflow(vec![task("x", &[]), task("y", &[]), task("z", &[])]);
        assert_eq!(sorted_tasks(&wf).unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn cycle_drops_tasks_and_fails() {
        let wf = workflow(vec![task("a", &["b"]), task("b", &["a"])]);
        assert!(matches!(
            sorted_tasks(&wf),
            Err(InvalidWorkflow::MissingTasks { sorted: 0, total: 2 })
        ));
    }

    #[test]
    fn cycle_hanging_off_valid_roots_fails() {
        let wf = workflow(vec![
            task("a", &[]),
            task("b", &["c"]),
            task("c", &["b"]),
        ]);
        assert!(matches!(
            sorted_tasks(&wf),
            Err(InvalidWorkflow::MissingTasks { sorted: 1, total: 3 })
        ));
    }

    #[test]
    fn empty_workflow_sorts_to_empty() {
        let wf = workflow(vec![]);
        assert_eq!(sorted_tasks(&wf).unwrap(), Vec::<String>::new());
    }
}
