// Workflow models: submission form, persisted form, status, metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InvalidWorkflow;
use crate::task::{Task, TaskRecord};

/// Workflow status, derived from child task statuses (see `aggregate`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Success,
    Failure,
    Revoked,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Success => write!(f, "success"),
            WorkflowStatus::Failure => write!(f, "failure"),
            WorkflowStatus::Revoked => write!(f, "revoked"),
        }
    }
}

impl From<&str> for WorkflowStatus {
    fn from(s: &str) -> Self {
        match s {
            "running" => WorkflowStatus::Running,
            "success" => WorkflowStatus::Success,
            "failure" => WorkflowStatus::Failure,
            "revoked" => WorkflowStatus::Revoked,
            _ => WorkflowStatus::Pending,
        }
    }
}

/// Submitter-supplied metadata. `author` is always present; extra fields are
/// kept verbatim and propagated into every task at scheduling time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkflowMetadata {
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_author() -> String {
    "anonymous".to_string()
}

impl Default for WorkflowMetadata {
    fn default() -> Self {
        Self {
            author: default_author(),
            extra: serde_json::Map::new(),
        }
    }
}

impl WorkflowMetadata {
    /// Propagate workflow metadata into a task's metadata. Workflow values win.
    pub fn propagate_into(&self, task_meta: &mut WorkflowMetadata) {
        task_meta.author = self.author.clone();
        for (key, value) in &self.extra {
            task_meta.extra.insert(key.clone(), value.clone());
        }
    }
}

/// A workflow submission: a named DAG of tasks executed as a single unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Workflow {
    #[serde(default = "generate_workflow_id")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

fn generate_workflow_id() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("workflow-{}", &token[..8])
}

impl Workflow {
    /// Validate the submission before anything is persisted or enqueued.
    ///
    /// Rejects duplicate task ids, names containing spaces or dots, and
    /// dependency or input-source references that do not name a sibling.
    pub fn validate(&self) -> Result<(), InvalidWorkflow> {
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(InvalidWorkflow::DuplicateTaskId(task.id.clone()));
            }
        }

        for task in &self.tasks {
            if task.name.is_empty() {
                return Err(InvalidWorkflow::InvalidTaskName {
                    task: task.id.clone(),
                    name: task.name.clone(),
                    reason: "name must not be empty",
                });
            }
            if task.name.contains(' ') {
                return Err(InvalidWorkflow::InvalidTaskName {
                    task: task.id.clone(),
                    name: task.name.clone(),
                    reason: "name must not contain spaces",
                });
            }
            if task.name.contains('.') {
                return Err(InvalidWorkflow::InvalidTaskName {
                    task: task.id.clone(),
                    name: task.name.clone(),
                    reason: "name must not contain dots",
                });
            }

            for dependency in &task.depends_on {
                if !seen.contains(dependency.as_str()) {
                    return Err(InvalidWorkflow::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }

            for input in &task.inputs {
                if let Some(source) = &input.source {
                    if !seen.contains(source.as_str()) {
                        return Err(InvalidWorkflow::UnknownInputSource {
                            task: task.id.clone(),
                            source_task: source.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// A workflow as persisted, with task children joined in for status reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkflowRecord {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    pub status: WorkflowStatus,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::executor::{ContainerSpec, ExecutorSpec};
    use crate::task::TaskOptions;

    fn container_task(id: &str, name: &str, depends_on: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            name: name.to_string(),
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

    fn workflow_with(tasks: Vec<Task>) -> Workflow {
        Workflow {
            id: "workflow-test".to_string(),
            label: String::new(),
            metadata: WorkflowMetadata::default(),
            tasks,
        }
    }

    #[test]
    fn generated_id_is_prefixed() {
        let workflow: Workflow = serde_json::from_str("{}").unwrap();
        assert!(workflow.id.starts_with("workflow-"));
        assert_eq!(workflow.id.len(), "workflow-".len() + 8);
    }

    #[test]
    fn duplicate_task_ids_fail_validation() {
        let workflow = workflow_with(vec![
            container_task("t1", "first", &[]),
            container_task("t1", "second", &[]),
        ]);
        assert!(matches!(
            workflow.validate(),
            Err(InvalidWorkflow::DuplicateTaskId(id)) if id == "t1"
        ));
    }

    #[test]
    fn task_name_with_space_fails_validation() {
        let workflow = workflow_with(vec![container_task("t1", "bad name", &[])]);
        assert!(matches!(
            workflow.validate(),
            Err(InvalidWorkflow::InvalidTaskName { .. })
        ));
    }

    #[test]
    fn task_name_with_dot_fails_validation() {
        let workflow = workflow_with(vec![container_task("t1", "bad.name", &[])]);
        assert!(matches!(
            workflow.validate(),
            Err(InvalidWorkflow::InvalidTaskName { .. })
        ));
    }

    #[test]
    fn unknown_dependency_fails_validation() {
        let workflow = workflow_with(vec![container_task("t1", "first", &["ghost"])]);
        assert!(matches!(
            workflow.validate(),
            Err(InvalidWorkflow::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn unknown_input_source_fails_validation() {
        let mut task = container_task("t1", "first", &[]);
        task.inputs.push(Artifact {
            name: None,
            source: Some("ghost".to_string()),
            source_path: Some("/mnt/shared/data.tsv".to_string()),
            path: "/mnt/shared/input.tsv".to_string(),
        });
        let workflow = workflow_with(vec![task]);
        assert!(matches!(
            workflow.validate(),
            Err(InvalidWorkflow::UnknownInputSource { source_task, .. }) if source_task == "ghost"
        ));
    }

    #[test]
    fn valid_workflow_passes_validation() {
        let workflow = workflow_with(vec![
            container_task("t1", "first_task", &[]),
            container_task("t2", "second_task", &["t1"]),
        ]);
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn metadata_propagation_overwrites_task_values() {
        let mut wf_meta = WorkflowMetadata {
            author: "ada".to_string(),
            extra: serde_json::Map::new(),
        };
        wf_meta
            .extra
            .insert("team".to_string(), serde_json::json!("research"));

        let mut task_meta = WorkflowMetadata::default();
        task_meta
            .extra
            .insert("team".to_string(), serde_json::json!("stale"));

        wf_meta.propagate_into(&mut task_meta);
        assert_eq!(task_meta.author, "ada");
        assert_eq!(task_meta.extra["team"], serde_json::json!("research"));
    }

    #[test]
    fn submitted_workflow_round_trips_through_json() {
        let workflow = workflow_with(vec![
            container_task("t1", "first_task", &[]),
            container_task("t2", "second_task", &["t1"]),
        ]);
        let json = serde_json::to_string(&workflow).unwrap();
        let parsed: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, workflow.id);
        assert_eq!(parsed.tasks.len(), 2);
        assert_eq!(parsed.tasks[1].depends_on, vec!["t1".to_string()]);
    }
}
