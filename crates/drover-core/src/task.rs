// Task models: request form, persisted form, options, result

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::executor::ExecutorSpec;
use crate::workflow::WorkflowMetadata;

/// Task status. `success` and `failure` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failure => write!(f, "failure"),
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s {
            "running" => TaskStatus::Running,
            "success" => TaskStatus::Success,
            "failure" => TaskStatus::Failure,
            _ => TaskStatus::Pending,
        }
    }
}

/// Outcome of a finished task: the executor log and/or an error message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl TaskResult {
    pub fn from_log(log: impl Into<String>) -> Self {
        Self {
            message: None,
            log: Some(log.into()),
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            log: None,
        }
    }
}

/// Per-task execution options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskOptions {
    #[serde(default = "default_true")]
    pub on_fail_force_interruption: bool,
    #[serde(default = "default_true")]
    pub on_fail_remove_local_dir: bool,
    #[serde(default)]
    pub on_finish_remove_local_dir: bool,
    /// Overrides the default queue for this task's broker message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            on_fail_force_interruption: true,
            on_fail_remove_local_dir: true,
            on_finish_remove_local_dir: false,
            queue_name: None,
        }
    }
}

/// A task request: one executable unit within a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Task {
    pub id: String,
    pub name: String,
    pub executor: ExecutorSpec,
    #[serde(default)]
    pub inputs: Vec<Artifact>,
    #[serde(default)]
    pub outputs: Vec<Artifact>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub options: TaskOptions,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl Task {
    /// Local working directory for one execution attempt:
    /// `<data_dir>/<author>/<workflow_id>/<task_id>`.
    pub fn workdir(&self, data_dir: &Path, workflow_id: &str) -> PathBuf {
        data_dir
            .join(&self.metadata.author)
            .join(workflow_id)
            .join(&self.id)
    }
}

/// A task as persisted, keyed by `(parent, id)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskRecord {
    #[serde(flatten)]
    pub task: Task,
    /// Parent workflow id.
    pub parent: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ContainerSpec, ExecutorSpec};

    #[test]
    fn workdir_uses_four_components() {
        let task = Task {
            id: "t1".to_string(),
            name: "first_task".to_string(),
            executor: ExecutorSpec::Container(ContainerSpec {
                image: "busybox".to_string(),
                ..Default::default()
            }),
            inputs: vec![],
            outputs: vec![],
            depends_on: vec![],
            options: TaskOptions::default(),
            metadata: WorkflowMetadata {
                author: "ada".to_string(),
                extra: serde_json::Map::new(),
            },
        };
        let workdir = task.workdir(Path::new("/tmp"), "workflow-abc");
        assert_eq!(workdir, PathBuf::from("/tmp/ada/workflow-abc/t1"));
    }

    #[test]
    fn options_default_from_empty_json() {
        let options: TaskOptions = serde_json::from_str("{}").unwrap();
        assert!(options.on_fail_force_interruption);
        assert!(options.on_fail_remove_local_dir);
        assert!(!options.on_finish_remove_local_dir);
        assert!(options.queue_name.is_none());
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Failure,
        ] {
            assert_eq!(TaskStatus::from(status.to_string().as_str()), status);
        }
    }
}
