// Executor dispatch on the tagged union

pub mod container;
pub mod http;

use std::path::Path;

use drover_core::{ExecutorSpec, Settings, Task, TaskError};

/// Execute one task in its working directory, returning the log text.
pub async fn execute(
    task: &Task,
    workdir: &Path,
    settings: &Settings,
) -> Result<String, TaskError> {
    match &task.executor {
        ExecutorSpec::Container(spec) => {
            tracing::info!(image = %spec.image_ref(), "Container task");
            container::container_execute(spec, workdir, settings).await
        }
        ExecutorSpec::Http(spec) => {
            tracing::info!(url = %spec.url, method = ?spec.method, "HTTP task");
            http::http_execute(task, spec, workdir).await
        }
    }
}
