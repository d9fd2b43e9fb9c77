use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Blob-store collaborator. `put` is a single attempt; callers decide on retries.
#[async_trait]
pub trait BackupUploader: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, file_path: &Path) -> Result<()>;
    async fn test_connection(&self) -> Result<()>;
    fn bucket(&self) -> &str;
    fn name(&self) -> &'static str;
}

/// Joins an optional key prefix and a file name into an object key.
pub fn object_key(prefix: Option<&str>, file_name: &str) -> String {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, file_name),
        None => file_name.to_string(),
    }
}
