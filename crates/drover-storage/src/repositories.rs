// Repository layer for database operations
//
// Every write is an upsert on the record key ((id) for workflows,
// (parent, id) for tasks) so redelivered broker messages and concurrent
// workers can re-enter any transition harmlessly; last write wins on
// updated_at.

use anyhow::Result;
use sqlx::PgPool;

use drover_core::{TaskResult, TaskStatus, WorkflowStatus};

use crate::models::{TaskRow, WorkflowRow};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // ============================================
    // Workflows
    // ============================================

    /// Create the workflow record, or refresh label/metadata on resubmission.
    pub async fn upsert_workflow(
        &self,
        id: &str,
        label: &str,
        metadata: &serde_json::Value,
    ) -> Result<WorkflowRow> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            INSERT INTO workflows (id, label, metadata, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (id) DO UPDATE
            SET label = EXCLUDED.label,
                metadata = EXCLUDED.metadata,
                status = EXCLUDED.status,
                updated_at = NOW()
            RETURNING id, label, metadata, status, is_revoked, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(label)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_workflow(&self, id: &str) -> Result<Option<WorkflowRow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, label, metadata, status, is_revoked, created_at, updated_at
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Persist a derived workflow status. Upserts so a late aggregation for a
    /// record another writer has not created yet still lands.
    pub async fn set_workflow_status(&self, id: &str, status: WorkflowStatus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, status)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn revoke_workflow(&self, id: &str) -> Result<Option<WorkflowRow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            UPDATE workflows
            SET is_revoked = TRUE,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, label, metadata, status, is_revoked, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ============================================
    // Tasks
    // ============================================

    /// Create the pending task record with its full serialized payload.
    pub async fn upsert_task(
        &self,
        parent: &str,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<TaskRow> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO tasks (parent, id, payload, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (parent, id) DO UPDATE
            SET payload = EXCLUDED.payload,
                updated_at = NOW()
            RETURNING parent, id, payload, status, result, created_at, updated_at
            "#,
        )
        .bind(parent)
        .bind(id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Record a task transition. The result, when given, replaces the stored
    /// one; a bare status write keeps whatever result is already there.
    pub async fn set_task_status(
        &self,
        parent: &str,
        id: &str,
        status: TaskStatus,
        result: Option<&TaskResult>,
    ) -> Result<()> {
        let result_json = result.map(serde_json::to_value).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO tasks (parent, id, status, result)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (parent, id) DO UPDATE
            SET status = EXCLUDED.status,
                result = COALESCE(EXCLUDED.result, tasks.result),
                updated_at = NOW()
            "#,
        )
        .bind(parent)
        .bind(id)
        .bind(status.to_string())
        .bind(result_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_tasks(&self, parent: &str) -> Result<Vec<TaskRow>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT parent, id, payload, status, result, created_at, updated_at
            FROM tasks
            WHERE parent = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(parent)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn find_task(&self, parent: &str, id: &str) -> Result<Option<TaskRow>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT parent, id, payload, status, result, created_at, updated_at
            FROM tasks
            WHERE parent = $1 AND id = $2
            "#,
        )
        .bind(parent)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
