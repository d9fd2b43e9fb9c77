use super::uploader::BackupUploader;
use crate::config::StorageConfig;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::path::Path;
use tracing::{debug, info};

pub struct S3Uploader {
    client: s3::Client,
    bucket: String,
}

impl S3Uploader {
    pub async fn new(config: &StorageConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(endpoint_url(&config.endpoint))
            .region(Region::new(config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &config.access_key,
                &config.secret_key,
                None,
                None,
                "Static",
            ))
            .load()
            .await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Self {
            client: s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }
}

/// Bare `host[:port]` endpoints are assumed to speak TLS.
fn endpoint_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

#[async_trait]
impl BackupUploader for S3Uploader {
    async fn put(&self, bucket: &str, key: &str, file_path: &Path) -> Result<()> {
        info!("Uploading {} to {}/{}", file_path.display(), bucket, key);

        let body = ByteStream::from_path(file_path).await.map_err(|e| {
            BackupError::Upload(format!(
                "failed to read {}: {}",
                file_path.display(),
                e
            ))
        })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                BackupError::Upload(format!(
                    "failed to upload {} to {}/{}: {}",
                    file_path.display(),
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!("Upload of {}/{} acknowledged", bucket, key);
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                BackupError::Upload(format!(
                    "bucket {} is not accessible: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        info!("Bucket {} is accessible", self.bucket);
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn name(&self) -> &'static str {
        "S3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("minio.local:9000"), "https://minio.local:9000");
        assert_eq!(endpoint_url("http://localhost:9000/"), "http://localhost:9000");
        assert_eq!(
            endpoint_url("https://fra1.digitaloceanspaces.com"),
            "https://fra1.digitaloceanspaces.com"
        );
    }

    #[tokio::test]
    async fn test_uploader_keeps_bucket() {
        let config = StorageConfig {
            endpoint: "http://localhost:9000".to_string(),
            bucket: "nightly".to_string(),
            access_key: "minio".to_string(),
            secret_key: "minioadmin".to_string(),
            ..StorageConfig::default()
        };

        let uploader = S3Uploader::new(&config).await;
        assert_eq!(uploader.bucket(), "nightly");
        assert_eq!(uploader.name(), "S3");
    }
}
