// Per-task pipeline: download inputs → execute → upload outputs → upload log
//
// Each phase maps its failure into the task error taxonomy so the failure
// sink records something a human can act on.

use std::path::Path;

use chrono::Utc;

use drover_core::{Settings, Task, TaskError};

use crate::artifacts::ArtifactStore;
use crate::executor;

pub struct TaskRunner<'a> {
    artifacts: &'a ArtifactStore,
    settings: &'a Settings,
}

impl<'a> TaskRunner<'a> {
    pub fn new(artifacts: &'a ArtifactStore, settings: &'a Settings) -> Self {
        Self {
            artifacts,
            settings,
        }
    }

    /// Run one task to completion inside `workdir`. Returns the executor's
    /// log text on success.
    pub async fn run(
        &self,
        task: &Task,
        workflow_id: &str,
        workdir: &Path,
    ) -> Result<String, TaskError> {
        self.download_inputs(task, workflow_id, workdir).await?;
        let log = executor::execute(task, workdir, self.settings).await?;
        self.upload_outputs(task, workflow_id, workdir).await?;
        self.upload_log(task, workflow_id, workdir, &log).await?;
        Ok(log)
    }

    async fn download_inputs(
        &self,
        task: &Task,
        workflow_id: &str,
        workdir: &Path,
    ) -> Result<(), TaskError> {
        let author = &task.metadata.author;
        for artifact in &task.inputs {
            let object_name = artifact.object_name(author, workflow_id, &task.id);
            let file_path = artifact.local_path(workdir);
            tracing::debug!(object = %object_name, file = %file_path.display(), "Fetching input");
            self.artifacts
                .download_file(&object_name, &file_path)
                .await
                .map_err(|e| TaskError::InputDownload {
                    object_name: object_name.clone(),
                    file_path: file_path.display().to_string(),
                    message: format!("{e:#}"),
                })?;
        }
        Ok(())
    }

    async fn upload_outputs(
        &self,
        task: &Task,
        workflow_id: &str,
        workdir: &Path,
    ) -> Result<(), TaskError> {
        let author = &task.metadata.author;
        for artifact in &task.outputs {
            let file_path = artifact.local_path(workdir);
            if !file_path.exists() {
                return Err(TaskError::FileNotFoundForUpload {
                    file_path: file_path.display().to_string(),
                });
            }
            let object_name = artifact.object_name(author, workflow_id, &task.id);
            self.artifacts
                .upload_file(&object_name, &file_path)
                .await
                .map_err(|e| TaskError::Upload {
                    object_name: object_name.clone(),
                    file_path: file_path.display().to_string(),
                    message: format!("{e:#}"),
                })?;
        }
        Ok(())
    }

    /// Write the executor log to a timestamped file and upload it next to the
    /// task's outputs.
    async fn upload_log(
        &self,
        task: &Task,
        workflow_id: &str,
        workdir: &Path,
        log: &str,
    ) -> Result<(), TaskError> {
        let stamp = Utc::now()
            .with_timezone(&self.settings.timezone)
            .format("%d-%m-%Y-%H:%M:%S");
        let file_name = format!("{stamp}-log.txt");

        let text = if log.trim().is_empty() {
            "(task produced no output)"
        } else {
            log
        };

        let file_path = workdir.join(&file_name);
        tokio::fs::create_dir_all(workdir)
            .await
            .map_err(|e| TaskError::io(workdir.display().to_string(), e))?;
        tokio::fs::write(&file_path, text)
            .await
            .map_err(|e| TaskError::io(file_path.display().to_string(), e))?;

        let object_name = format!(
            "{}/{}/{}/{}",
            task.metadata.author, workflow_id, task.id, file_name
        );
        self.artifacts
            .upload_file(&object_name, &file_path)
            .await
            .map_err(|e| TaskError::Upload {
                object_name: object_name.clone(),
                file_path: file_path.display().to_string(),
                message: format!("{e:#}"),
            })?;
        Ok(())
    }
}
