mod s3;
mod uploader;

pub use uploader::{object_key, BackupUploader};

use crate::config::StorageConfig;

pub async fn create_uploader(config: &StorageConfig) -> Box<dyn BackupUploader> {
    Box::new(s3::S3Uploader::new(config).await)
}
