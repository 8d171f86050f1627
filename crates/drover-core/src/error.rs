// Error taxonomy for submission and task execution

use thiserror::Error;

/// Submission-time validation failures. Surfaced to the caller, never enqueued.
#[derive(Debug, Error)]
pub enum InvalidWorkflow {
    /// Two tasks share the same id
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// Task name fails the naming rules
    #[error("task '{task}' has invalid name '{name}': {reason}")]
    InvalidTaskName {
        task: String,
        name: String,
        reason: &'static str,
    },

    /// `depends_on` entry does not name a sibling task
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    /// Input `source` does not name a sibling task
    #[error("task '{task}' declares an input sourced from unknown task '{source_task}'")]
    UnknownInputSource { task: String, source_task: String },

    /// The topological sort dropped tasks (cyclic or unreachable dependencies)
    #[error("topological sort kept {sorted} of {total} tasks; the dependency graph is cyclic or disconnected")]
    MissingTasks { sorted: usize, total: usize },
}

/// Failures raised while executing a single task
#[derive(Debug, Error)]
pub enum TaskError {
    /// An upstream dependency ended in failure; this task will not run
    #[error("task '{task_id}' cannot proceed: upstream task '{failed_dependency}' failed")]
    UpstreamFailed {
        task_id: String,
        failed_dependency: String,
    },

    /// Input artifact could not be fetched from the object store
    #[error("failed to download input '{object_name}' to '{file_path}': {message}")]
    InputDownload {
        object_name: String,
        file_path: String,
        message: String,
    },

    /// Declared output missing on the local filesystem at upload time
    #[error("file not found for upload: {file_path}")]
    FileNotFoundForUpload { file_path: String },

    /// Output or log upload to the object store failed
    #[error("failed to upload '{file_path}' to '{object_name}': {message}")]
    Upload {
        object_name: String,
        file_path: String,
        message: String,
    },

    /// Container exited non-zero; `logs` carries the captured output
    #[error("container exited with status {status_code}")]
    ContainerExecution { status_code: i64, logs: String },

    /// Container runtime (daemon) error before or after execution
    #[error("container runtime error: {0}")]
    ContainerRuntime(String),

    /// HTTP executor transport or timeout error
    #[error("transport error calling '{url}': {message}")]
    Transport { url: String, message: String },

    /// Local filesystem error inside the task working directory
    #[error("filesystem error at '{path}': {message}")]
    Io { path: String, message: String },
}

impl TaskError {
    /// Create a transport error from any displayable cause
    pub fn transport(url: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        TaskError::Transport {
            url: url.into(),
            message: cause.to_string(),
        }
    }

    /// Create a filesystem error from any displayable cause
    pub fn io(path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        TaskError::Io {
            path: path.into(),
            message: cause.to_string(),
        }
    }
}
