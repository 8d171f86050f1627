// File artifacts and the remote object naming rule
//
// Object names are slash-joined `author/workflow_id/task_id/<path>` with
// leading slashes on the artifact path stripped. Inputs produced by a sibling
// substitute `(source, sourcePath)` for `(task_id, path)`, so a download
// resolves to the exact name the upstream task uploaded.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A file produced or consumed by a task, transferred via the object store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Sibling task id the artifact was produced by (inputs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// The producing task's local path for the artifact (inputs only).
    #[serde(default, rename = "sourcePath", skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Local path inside the task's working directory.
    pub path: String,
}

fn relative(path: &str) -> &str {
    path.trim_start_matches('/')
}

impl Artifact {
    /// Absolute local path for this artifact under `workdir`.
    pub fn local_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(relative(&self.path))
    }

    /// Remote object name within the `(author, workflow)` namespace.
    pub fn object_name(&self, author: &str, workflow_id: &str, task_id: &str) -> String {
        match (&self.source, &self.source_path) {
            (Some(source), Some(source_path)) => {
                format!("{author}/{workflow_id}/{source}/{}", relative(source_path))
            }
            _ => format!("{author}/{workflow_id}/{task_id}/{}", relative(&self.path)),
        }
    }
}
