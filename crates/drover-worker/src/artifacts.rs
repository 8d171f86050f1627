// S3-compatible artifact store client
//
// Endpoint override + path-style addressing keeps this usable against MinIO
// and friends, not just AWS.

use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use drover_core::Settings;

#[derive(Clone)]
pub struct ArtifactStore {
    client: Client,
    bucket: String,
}

impl ArtifactStore {
    pub fn new(settings: &Settings) -> Self {
        let credentials = Credentials::new(
            settings.s3_access_key.clone(),
            settings.s3_secret_key.clone(),
            None,
            None,
            "drover",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&settings.s3_endpoint)
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: settings.s3_bucket.clone(),
        }
    }

    /// Create the artifact bucket at worker boot if it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                tracing::debug!(bucket = %self.bucket, "Bucket already exists");
            }
            Err(_) => {
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .with_context(|| format!("Failed to create bucket {}", self.bucket))?;
                tracing::info!(bucket = %self.bucket, "Bucket created");
            }
        }
        Ok(())
    }

    pub async fn upload_file(&self, object_name: &str, file_path: &Path) -> Result<()> {
        let body = ByteStream::from_path(file_path)
            .await
            .with_context(|| format!("Failed to open {} for upload", file_path.display()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_name)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload object {object_name}"))?;
        tracing::debug!(object = %object_name, "Object uploaded");
        Ok(())
    }

    pub async fn download_file(&self, object_name: &str, file_path: &Path) -> Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_name)
            .send()
            .await
            .with_context(|| format!("Failed to fetch object {object_name}"))?;
        let data = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of object {object_name}"))?;

        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(file_path, data.into_bytes())
            .await
            .with_context(|| format!("Failed to write {}", file_path.display()))?;
        tracing::debug!(object = %object_name, "Object downloaded");
        Ok(())
    }
}
