// Database rows (internal, converted to core records at the edges)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use drover_core::{Task, TaskRecord, TaskResult, TaskStatus, WorkflowRecord, WorkflowStatus};
use sqlx::FromRow;

/// Workflow row from database
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: String,
    pub label: String,
    pub metadata: sqlx::types::JsonValue,
    pub status: String,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus::from(self.status.as_str())
    }

    /// Build the public record, joining in the given task children.
    pub fn into_record(self, tasks: Vec<TaskRecord>) -> Result<WorkflowRecord> {
        let metadata = serde_json::from_value(self.metadata)
            .with_context(|| format!("invalid metadata for workflow {}", self.id))?;
        Ok(WorkflowRecord {
            id: self.id,
            label: self.label,
            metadata,
            tasks,
            status: WorkflowStatus::from(self.status.as_str()),
            is_revoked: self.is_revoked,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Task row from database, keyed by (parent, id).
/// The full submitted task is kept as a jsonb payload so the worker re-parses
/// exactly what the scheduler enqueued.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub parent: String,
    pub id: String,
    pub payload: sqlx::types::JsonValue,
    pub status: String,
    pub result: Option<sqlx::types::JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from(self.status.as_str())
    }

    pub fn into_record(self) -> Result<TaskRecord> {
        let task: Task = serde_json::from_value(self.payload)
            .with_context(|| format!("invalid payload for task ({}, {})", self.parent, self.id))?;
        let result: Option<TaskResult> = self
            .result
            .map(serde_json::from_value)
            .transpose()
            .with_context(|| format!("invalid result for task ({}, {})", self.parent, self.id))?;
        Ok(TaskRecord {
            task,
            parent: self.parent,
            status: TaskStatus::from(self.status.as_str()),
            result,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
