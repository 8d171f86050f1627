// Executor specifications: tagged union dispatched on the `type` field

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a task runs: inside a container or as an outbound HTTP call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutorSpec {
    Container(ContainerSpec),
    Http(HttpSpec),
}

/// One `name value` pair of the container command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Parameter {
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub value: serde_json::Value,
}

impl Parameter {
    /// Render the value the way it appears on the command line.
    pub fn render(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Container task: image, environment and a parameter list assembled into a
/// command line at execution time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

fn default_tag() -> String {
    "latest".to_string()
}

impl ContainerSpec {
    /// Full image reference; the tag applies only when the image has none.
    pub fn image_ref(&self) -> String {
        if self.image.contains(':') || self.tag.is_empty() {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.tag)
        }
    }

    /// Command line assembled as `"{name} {value}"` pairs joined by spaces.
    pub fn command_string(&self) -> String {
        self.parameters
            .iter()
            .map(|p| format!("{} {}", p.name, p.render()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[default]
    #[serde(rename = "POST")]
    Post,
}

/// HTTP task: a single request whose response body may be persisted into the
/// task's declared outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HttpSpec {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Basic-auth pair `(username, password)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub auth: Option<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub body: Option<serde_json::Value>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl HttpSpec {
    /// True when the configured `Content-Type` asks for a multipart upload.
    pub fn is_multipart(&self) -> bool {
        self.headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case("content-type")
                && value.to_ascii_lowercase().contains("multipart/form-data")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_string_joins_name_value_pairs() {
        let spec = ContainerSpec {
            image: "busybox".to_string(),
            tag: default_tag(),
            environment: HashMap::new(),
            parameters: vec![
                Parameter {
                    name: "wget".to_string(),
                    value: serde_json::json!("-P /mnt/shared/ https://example.org/cities10.tsv"),
                },
            ],
        };
        assert_eq!(
            spec.command_string(),
            "wget -P /mnt/shared/ https://example.org/cities10.tsv"
        );
    }

    #[test]
    fn image_ref_appends_tag_only_when_missing() {
        let mut spec = ContainerSpec {
            image: "busybox".to_string(),
            tag: "1.36".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.image_ref(), "busybox:1.36");
        spec.image = "busybox:musl".to_string();
        assert_eq!(spec.image_ref(), "busybox:musl");
    }

    #[test]
    fn executor_spec_dispatches_on_type_tag() {
        let json = serde_json::json!({
            "type": "container",
            "image": "busybox",
            "parameters": [{"name": "cat", "value": "/mnt/shared/input.tsv"}],
        });
        let spec: ExecutorSpec = serde_json::from_value(json).unwrap();
        assert!(matches!(spec, ExecutorSpec::Container(_)));

        let json = serde_json::json!({
            "type": "http",
            "url": "http://localhost:8002/download_csv",
            "method": "GET",
            "auth": ["user-9753", "secret"],
        });
        let spec: ExecutorSpec = serde_json::from_value(json).unwrap();
        match spec {
            ExecutorSpec::Http(http) => {
                assert_eq!(http.method, HttpMethod::Get);
                assert_eq!(http.timeout_secs, 10);
                assert_eq!(
                    http.auth,
                    Some(("user-9753".to_string(), "secret".to_string()))
                );
            }
            other => panic!("expected http executor, got {other:?}"),
        }
    }

    #[test]
    fn multipart_detection_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "Multipart/Form-Data; boundary=x".to_string(),
        );
        let spec = HttpSpec {
            url: "http://localhost:8002/calculate".to_string(),
            method: HttpMethod::Post,
            headers,
            auth: None,
            body: None,
            timeout_secs: 10,
        };
        assert!(spec.is_multipart());
    }
}
