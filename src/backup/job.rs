use crate::backup::compression::{calculate_sha256, compress_file, compressed_path};
use crate::config::AppConfig;
use crate::database::{ConnectionSpec, Dumper};
use crate::error::{BackupError, Result};
use crate::upload::{object_key, BackupUploader};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dump,
    Compress,
    Upload,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Dump => write!(f, "dump"),
            Stage::Compress => write!(f, "compress"),
            Stage::Upload => write!(f, "upload"),
            Stage::Cleanup => write!(f, "cleanup"),
        }
    }
}

#[derive(Debug)]
pub struct BackupResult {

    pub target: String,

    pub success: bool,

    pub failed_stage: Option<Stage>,

    pub error: Option<BackupError>,

    /// Last artifact produced: uploaded on success, left on disk on failure.
    pub file_path: Option<PathBuf>,

    pub file_size: Option<u64>,

    pub duration_secs: u64,

    pub cleanup_warning: Option<String>,
}

impl BackupResult {
    fn failed(
        target: &ConnectionSpec,
        stage: Stage,
        err: BackupError,
        file_path: Option<PathBuf>,
        start: Instant,
    ) -> Self {
        error!(
            "Backup of {} failed at {} stage: {}",
            target.label(),
            stage,
            err
        );
        if let Some(path) = &file_path {
            warn!("Leaving {} on disk for inspection", path.display());
        }

        Self {
            target: target.label(),
            success: false,
            failed_stage: Some(stage),
            error: Some(err),
            file_size: file_path
                .as_deref()
                .and_then(|p| fs::metadata(p).ok())
                .map(|m| m.len()),
            file_path,
            duration_secs: start.elapsed().as_secs(),
            cleanup_warning: None,
        }
    }
}

/// Hands out artifact paths that never repeat within this process.
///
/// Names follow `<database>_<unixTimestamp>.<ext>`. A second request for the
/// same database within one second, or a name already taken on disk, gets a
/// `_<n>` disambiguator before the extension.
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    issued: HashMap<String, (i64, u32)>,
}

impl ArtifactNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_path(&mut self, dir: &Path, spec: &ConnectionSpec, timestamp: i64) -> PathBuf {
        let database = sanitize(&spec.database);
        let mut seq = match self.issued.get(&database) {
            Some((last, seq)) if *last == timestamp => seq + 1,
            _ => 0,
        };

        let path = loop {
            let candidate = dir.join(artifact_name(&database, timestamp, seq, spec.engine.extension()));
            if !candidate.exists() && !compressed_path(&candidate).exists() {
                break candidate;
            }
            seq += 1;
        };

        self.issued.insert(database, (timestamp, seq));
        path
    }
}

pub fn artifact_name(database: &str, timestamp: i64, seq: u32, extension: &str) -> String {
    if seq == 0 {
        format!("{}_{}.{}", database, timestamp, extension)
    } else {
        format!("{}_{}_{}.{}", database, timestamp, seq, extension)
    }
}

fn sanitize(database: &str) -> String {
    database
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Deletes a local artifact after upload. Failures, including an already
/// missing file, come back as a warning and never fail the iteration.
pub fn remove_artifact(path: &Path) -> Option<String> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Removed {}", path.display());
            None
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let msg = format!("{} was already removed", path.display());
            warn!("{}", msg);
            Some(msg)
        }
        Err(e) => {
            let msg = format!("failed to remove {}: {}", path.display(), e);
            warn!("{}", msg);
            Some(msg)
        }
    }
}

async fn compress(path: PathBuf, level: i32, keep_original: bool) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || compress_file(&path, level, keep_original))
        .await
        .map_err(|e| BackupError::Compression(format!("compression task failed: {}", e)))?
}

/// One iteration for one target: dump, compress, upload, cleanup.
///
/// Each stage depends on the previous one. A failed stage ends the iteration
/// and whatever was produced so far stays on disk.
pub async fn execute_target_backup(
    config: &AppConfig,
    dumper: &dyn Dumper,
    uploader: &dyn BackupUploader,
    spec: &ConnectionSpec,
    dump_path: PathBuf,
) -> BackupResult {
    let start = Instant::now();
    info!(
        "Starting {} backup of {} into {}",
        spec.engine,
        spec.label(),
        dump_path.display()
    );

    if let Err(e) = dumper.dump(spec, &dump_path).await {
        let left = dump_path.exists().then_some(dump_path);
        return BackupResult::failed(spec, Stage::Dump, e, left, start);
    }
    info!("Dumped {} to {}", spec.label(), dump_path.display());

    let artifact = if config.compression.enabled {
        let compression = &config.compression;
        match compress(dump_path.clone(), compression.level, compression.keep_original).await {
            Ok(path) => path,
            Err(e) => {
                return BackupResult::failed(spec, Stage::Compress, e, Some(dump_path), start)
            }
        }
    } else {
        dump_path
    };

    let file_size = match fs::metadata(&artifact) {
        Ok(meta) => meta.len(),
        Err(e) => {
            return BackupResult::failed(spec, Stage::Upload, e.into(), Some(artifact), start)
        }
    };
    match calculate_sha256(&artifact) {
        Ok(hash) => info!(
            "Artifact {} ready: {:.2} MB, sha256 {}",
            artifact.display(),
            file_size as f64 / 1024.0 / 1024.0,
            hash
        ),
        Err(e) => warn!("Could not checksum {}: {}", artifact.display(), e),
    }

    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let key = object_key(config.storage.prefix.as_deref(), &file_name);
    let bucket = uploader.bucket().to_string();

    if let Err(e) = uploader.put(&bucket, &key, &artifact).await {
        return BackupResult::failed(spec, Stage::Upload, e, Some(artifact), start);
    }
    info!(
        "Uploaded {} to {} bucket {} as {}",
        spec.label(),
        uploader.name(),
        bucket,
        key
    );

    let cleanup_warning = remove_artifact(&artifact);
    let duration_secs = start.elapsed().as_secs();
    debug!("Backup of {} finished in {} sec", spec.label(), duration_secs);

    BackupResult {
        target: spec.label(),
        success: true,
        failed_stage: None,
        error: None,
        file_path: Some(artifact),
        file_size: Some(file_size),
        duration_secs,
        cleanup_warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseEngine;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn spec(database: &str) -> ConnectionSpec {
        ConnectionSpec {
            engine: DatabaseEngine::Postgres,
            host: "db1".to_string(),
            port: 5432,
            database: database.to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        }
    }

    struct WritingDumper;

    #[async_trait]
    impl Dumper for WritingDumper {
        async fn dump(&self, spec: &ConnectionSpec, output: &Path) -> Result<()> {
            fs::write(output, format!("-- dump of {}\n", spec.database))?;
            Ok(())
        }
    }

    struct PartialDumper;

    #[async_trait]
    impl Dumper for PartialDumper {
        async fn dump(&self, _spec: &ConnectionSpec, output: &Path) -> Result<()> {
            fs::write(output, b"partial")?;
            Err(BackupError::Process {
                program: PathBuf::from("pg_dump"),
                code: Some(1),
            })
        }
    }

    /// Leaves a directory where the dump file should be, so compression fails.
    struct DirectoryDumper;

    #[async_trait]
    impl Dumper for DirectoryDumper {
        async fn dump(&self, _spec: &ConnectionSpec, output: &Path) -> Result<()> {
            fs::create_dir(output)?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingUploader {
        fail: bool,
        puts: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    #[async_trait]
    impl BackupUploader for RecordingUploader {
        async fn put(&self, bucket: &str, key: &str, file_path: &Path) -> Result<()> {
            if self.fail {
                return Err(BackupError::Upload("connection reset".to_string()));
            }
            let body = fs::read(file_path)?;
            self.puts
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string(), body));
            Ok(())
        }

        async fn test_connection(&self) -> Result<()> {
            Ok(())
        }

        fn bucket(&self) -> &str {
            "backups"
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn config(dir: &Path) -> AppConfig {
        AppConfig {
            local_backup_dir: dir.to_path_buf(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name("app", 1700000000, 0, "pgdump"), "app_1700000000.pgdump");
        assert_eq!(artifact_name("shop", 1700000000, 2, "sql"), "shop_1700000000_2.sql");
    }

    #[test]
    fn test_namer_disambiguates_same_second() {
        let dir = tempdir().unwrap();
        let mut namer = ArtifactNamer::new();
        let app = spec("app");

        let first = namer.next_path(dir.path(), &app, 1700000000);
        let second = namer.next_path(dir.path(), &app, 1700000000);
        let later = namer.next_path(dir.path(), &app, 1700000001);
        let other = namer.next_path(dir.path(), &spec("billing"), 1700000000);

        assert_eq!(first, dir.path().join("app_1700000000.pgdump"));
        assert_eq!(second, dir.path().join("app_1700000000_1.pgdump"));
        assert_eq!(later, dir.path().join("app_1700000001.pgdump"));
        assert_eq!(other, dir.path().join("billing_1700000000.pgdump"));
    }

    #[test]
    fn test_namer_skips_existing_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app_1700000000.pgdump.zst"), b"old").unwrap();

        let path = ArtifactNamer::new().next_path(dir.path(), &spec("app"), 1700000000);
        assert_eq!(path, dir.path().join("app_1700000000_1.pgdump"));
    }

    #[test]
    fn test_namer_sanitizes_database_name() {
        let dir = tempdir().unwrap();
        let path = ArtifactNamer::new().next_path(dir.path(), &spec("../etc/app"), 1);
        assert_eq!(path, dir.path().join(".._etc_app_1.pgdump"));
    }

    #[test]
    fn test_remove_artifact_twice_is_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app_1.pgdump.zst");
        fs::write(&path, b"x").unwrap();

        assert!(remove_artifact(&path).is_none());
        assert!(!path.exists());
        assert!(remove_artifact(&path).is_some());
    }

    #[tokio::test]
    async fn test_successful_backup_uploads_and_cleans_up() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.storage.prefix = Some("nightly".to_string());
        let uploader = RecordingUploader::default();
        let dump_path = dir.path().join("app_1700000000.pgdump");

        let result =
            execute_target_backup(&config, &WritingDumper, &uploader, &spec("app"), dump_path.clone())
                .await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.cleanup_warning.is_none());
        assert!(!dump_path.exists());
        assert!(!compressed_path(&dump_path).exists());

        let puts = uploader.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "backups");
        assert_eq!(puts[0].1, "nightly/app_1700000000.pgdump.zst");
        assert_eq!(zstd::decode_all(&puts[0].2[..]).unwrap(), b"-- dump of app\n");
    }

    #[tokio::test]
    async fn test_uncompressed_backup_uploads_dump() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.compression.enabled = false;
        let uploader = RecordingUploader::default();
        let dump_path = dir.path().join("app_1.pgdump");

        let result =
            execute_target_backup(&config, &WritingDumper, &uploader, &spec("app"), dump_path.clone())
                .await;

        assert!(result.success);
        assert_eq!(uploader.puts.lock().unwrap()[0].1, "app_1.pgdump");
        assert!(!dump_path.exists());
    }

    #[tokio::test]
    async fn test_dump_failure_skips_later_stages() {
        let dir = tempdir().unwrap();
        let uploader = RecordingUploader::default();
        let dump_path = dir.path().join("app_1.pgdump");

        let result = execute_target_backup(
            &config(dir.path()),
            &PartialDumper,
            &uploader,
            &spec("app"),
            dump_path.clone(),
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(Stage::Dump));
        assert!(matches!(result.error, Some(BackupError::Process { .. })));
        assert_eq!(result.file_path, Some(dump_path.clone()));
        assert!(dump_path.exists());
        assert!(!compressed_path(&dump_path).exists());
        assert!(uploader.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compress_failure_keeps_dump_and_skips_upload() {
        let dir = tempdir().unwrap();
        let uploader = RecordingUploader::default();
        let dump_path = dir.path().join("app_1.pgdump");

        let result = execute_target_backup(
            &config(dir.path()),
            &DirectoryDumper,
            &uploader,
            &spec("app"),
            dump_path.clone(),
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(Stage::Compress));
        assert_eq!(result.file_path, Some(dump_path.clone()));
        assert!(dump_path.exists());
        assert!(!compressed_path(&dump_path).exists());
        assert!(uploader.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_artifact() {
        let dir = tempdir().unwrap();
        let uploader = RecordingUploader {
            fail: true,
            ..RecordingUploader::default()
        };
        let dump_path = dir.path().join("app_1.pgdump");

        let result = execute_target_backup(
            &config(dir.path()),
            &WritingDumper,
            &uploader,
            &spec("app"),
            dump_path.clone(),
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(Stage::Upload));
        let artifact = compressed_path(&dump_path);
        assert_eq!(result.file_path, Some(artifact.clone()));
        assert!(artifact.exists());
    }
}
