// Persisting wrapper around the pure workflow-status derivation
//
// Called after every task transition. Safe under concurrent callers: the
// derivation only depends on what was read, and the write is an upsert with
// last-writer-wins on updated_at.

use anyhow::{bail, Result};

use drover_core::{derive_workflow_status, TaskStatus};
use drover_storage::Database;

pub async fn set_workflow_run_state(db: &Database, workflow_id: &str) -> Result<()> {
    let Some(workflow) = db.get_workflow(workflow_id).await? else {
        bail!("workflow `{workflow_id}` not found");
    };

    let statuses: Vec<TaskStatus> = db
        .find_tasks(workflow_id)
        .await?
        .iter()
        .map(|row| row.status())
        .collect();

    let status = derive_workflow_status(workflow.is_revoked, &statuses);
    db.set_workflow_status(workflow_id, status).await?;

    tracing::debug!(workflow_id = %workflow_id, status = %status, "Workflow status recomputed");
    Ok(())
}
