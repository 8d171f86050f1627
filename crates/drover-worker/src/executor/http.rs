// HTTP executor
//
// GET downloads the response body into the task's declared outputs; POST
// uploads the task's inputs (multipart) or a JSON body, and persists the
// response into outputs when any are declared. Missing credentials are
// reported in the log string rather than failing the task.

use std::path::Path;
use std::time::Duration;

use reqwest::RequestBuilder;

use drover_core::{HttpMethod, HttpSpec, Task, TaskError};

pub async fn http_execute(
    task: &Task,
    spec: &HttpSpec,
    workdir: &Path,
) -> Result<String, TaskError> {
    match spec.method {
        HttpMethod::Get => get(task, spec, workdir).await,
        HttpMethod::Post => post(task, spec, workdir).await,
    }
}

fn client(spec: &HttpSpec) -> Result<reqwest::Client, TaskError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(spec.timeout_secs))
        .build()
        .map_err(|e| TaskError::transport(&spec.url, e))
}

fn apply_headers(
    mut request: RequestBuilder,
    spec: &HttpSpec,
    skip_content_type: bool,
) -> RequestBuilder {
    for (name, value) in &spec.headers {
        if skip_content_type && name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        request = request.header(name, value);
    }
    request
}

async fn get(task: &Task, spec: &HttpSpec, workdir: &Path) -> Result<String, TaskError> {
    let Some((user, password)) = &spec.auth else {
        return Ok(format!("GET {} skipped: no credentials configured", spec.url));
    };
    if task.outputs.is_empty() {
        return Ok(format!("GET {} skipped: no outputs declared", spec.url));
    }

    let request = apply_headers(client(spec)?.get(&spec.url), spec, false)
        .basic_auth(user, Some(password));
    let response = request
        .send()
        .await
        .map_err(|e| TaskError::transport(&spec.url, e))?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| TaskError::transport(&spec.url, e))?;

    write_outputs(task, workdir, &bytes).await?;
    Ok(format!(
        "GET {} -> {} ({} bytes written to {} output(s))",
        spec.url,
        status,
        bytes.len(),
        task.outputs.len()
    ))
}

async fn post(task: &Task, spec: &HttpSpec, workdir: &Path) -> Result<String, TaskError> {
    let Some((user, password)) = &spec.auth else {
        return Ok(format!("POST {} not sent: credentials are required", spec.url));
    };

    let response = if spec.is_multipart() {
        let mut form = reqwest::multipart::Form::new();
        for input in &task.inputs {
            let path = input.local_path(workdir);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| TaskError::io(path.display().to_string(), e))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("file")
                .to_string();
            form = form.part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        }
        // Body entries ride along as plain form fields.
        if let Some(serde_json::Value::Object(fields)) = &spec.body {
            for (name, value) in fields {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form = form.text(name.clone(), text);
            }
        }
        // reqwest sets the Content-Type with the form boundary.
        apply_headers(client(spec)?.post(&spec.url), spec, true)
            .basic_auth(user, Some(password))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TaskError::transport(&spec.url, e))?
    } else {
        let mut request = apply_headers(client(spec)?.post(&spec.url), spec, false)
            .basic_auth(user, Some(password));
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| TaskError::transport(&spec.url, e))?
    };

    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| TaskError::transport(&spec.url, e))?;

    if !task.outputs.is_empty() {
        write_outputs(task, workdir, &bytes).await?;
    }
    Ok(format!("POST {} -> {} ({} bytes)", spec.url, status, bytes.len()))
}

/// Persist the response body into every declared output, atomically per file.
async fn write_outputs(task: &Task, workdir: &Path, bytes: &[u8]) -> Result<(), TaskError> {
    for artifact in &task.outputs {
        let path = artifact.local_path(workdir);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskError::io(parent.display().to_string(), e))?;
        }
        let tmp = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => path.with_file_name(format!("{name}.part")),
            None => path.with_extension("part"),
        };
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| TaskError::io(tmp.display().to_string(), e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| TaskError::io(path.display().to_string(), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::{Artifact, ExecutorSpec, TaskOptions, WorkflowMetadata};
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_task(spec: HttpSpec, inputs: Vec<Artifact>, outputs: Vec<Artifact>) -> Task {
        Task {
            id: "t1".to_string(),
            name: "http_task".to_string(),
            executor: ExecutorSpec::Http(spec.clone()),
            inputs,
            outputs,
            depends_on: vec![],
            options: TaskOptions::default(),
            metadata: WorkflowMetadata::default(),
        }
    }

    fn artifact(path: &str) -> Artifact {
        Artifact {
            name: None,
            source: None,
            source_path: None,
            path: path.to_string(),
        }
    }

    fn get_spec(url: String) -> HttpSpec {
        HttpSpec {
            url,
            method: HttpMethod::Get,
            headers: HashMap::new(),
            auth: Some(("user-9753".to_string(), "secret".to_string())),
            body: None,
            timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn get_persists_response_body_to_outputs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download_csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("city,population\nmalaga,578460\n"))
            .expect(1)
            .mount(&server)
            .await;

        let workdir = tempfile::tempdir().unwrap();
        let spec = get_spec(format!("{}/download_csv", server.uri()));
        let task = http_task(spec.clone(), vec![], vec![artifact("/api/shared/data.csv")]);

        let log = http_execute(&task, &spec, workdir.path()).await.unwrap();
        assert!(log.contains("200"));

        let written = std::fs::read_to_string(workdir.path().join("api/shared/data.csv")).unwrap();
        assert_eq!(written, "city,population\nmalaga,578460\n");
    }

    #[tokio::test]
    async fn get_without_auth_returns_warning_not_failure() {
        let mut spec = get_spec("http://localhost:1/download_csv".to_string());
        spec.auth = None;
        let task = http_task(spec.clone(), vec![], vec![artifact("/api/shared/data.csv")]);

        let workdir = tempfile::tempdir().unwrap();
        let log = http_execute(&task, &spec, workdir.path()).await.unwrap();
        assert!(log.contains("no credentials"));
    }

    #[tokio::test]
    async fn get_without_outputs_returns_warning() {
        let spec = get_spec("http://localhost:1/download_csv".to_string());
        let task = http_task(spec.clone(), vec![], vec![]);

        let workdir = tempfile::tempdir().unwrap();
        let log = http_execute(&task, &spec, workdir.path()).await.unwrap();
        assert!(log.contains("no outputs"));
    }

    #[tokio::test]
    async fn post_without_auth_returns_error_message() {
        let spec = HttpSpec {
            url: "http://localhost:1/calculate".to_string(),
            method: HttpMethod::Post,
            headers: HashMap::new(),
            auth: None,
            body: None,
            timeout_secs: 10,
        };
        let task = http_task(spec.clone(), vec![], vec![]);

        let workdir = tempfile::tempdir().unwrap();
        let log = http_execute(&task, &spec, workdir.path()).await.unwrap();
        assert!(log.contains("credentials are required"));
    }

    #[tokio::test]
    async fn post_multipart_attaches_input_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calculate_spei"))
            .and(body_string_contains("city,population"))
            .respond_with(ResponseTemplate::new(200).set_body_string("spei,0.4"))
            .expect(1)
            .mount(&server)
            .await;

        let workdir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(workdir.path().join("api/shared")).unwrap();
        std::fs::write(
            workdir.path().join("api/shared/data.csv"),
            "city,population\nmalaga,578460\n",
        )
        .unwrap();

        let mut headers = HashMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "multipart/form-data".to_string(),
        );
        let spec = HttpSpec {
            url: format!("{}/calculate_spei", server.uri()),
            method: HttpMethod::Post,
            headers,
            auth: Some(("user-9753".to_string(), "secret".to_string())),
            body: None,
            timeout_secs: 10,
        };
        let task = http_task(
            spec.clone(),
            vec![artifact("/api/shared/data.csv")],
            vec![artifact("/api/shared/result.csv")],
        );

        let log = http_execute(&task, &spec, workdir.path()).await.unwrap();
        assert!(log.contains("200"));

        // Response body persisted into the declared output.
        let written = std::fs::read_to_string(workdir.path().join("api/shared/result.csv")).unwrap();
        assert_eq!(written, "spei,0.4");
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(wiremock::matchers::body_json(serde_json::json!({"threshold": 3})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let spec = HttpSpec {
            url: format!("{}/submit", server.uri()),
            method: HttpMethod::Post,
            headers: HashMap::new(),
            auth: Some(("user".to_string(), "pass".to_string())),
            body: Some(serde_json::json!({"threshold": 3})),
            timeout_secs: 10,
        };
        let task = http_task(spec.clone(), vec![], vec![]);

        let workdir = tempfile::tempdir().unwrap();
        let log = http_execute(&task, &spec, workdir.path()).await.unwrap();
        assert!(log.contains("200"));
    }
}
