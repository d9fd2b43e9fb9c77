use crate::backup::job::{execute_target_backup, ArtifactNamer, BackupResult, Stage};
use crate::config::AppConfig;
use crate::database::{ConnectionSpec, Dumper};
use crate::error::{BackupError, Result};
use crate::upload::BackupUploader;
use chrono::Utc;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::select;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Drives backup cycles over a fixed list of targets, one target at a time.
pub struct Scheduler {
    config: Arc<AppConfig>,
    targets: Vec<ConnectionSpec>,
    dumper: Box<dyn Dumper>,
    uploader: Box<dyn BackupUploader>,
    namer: ArtifactNamer,
}

impl Scheduler {
    pub fn new(
        config: Arc<AppConfig>,
        targets: Vec<ConnectionSpec>,
        dumper: Box<dyn Dumper>,
        uploader: Box<dyn BackupUploader>,
    ) -> Self {
        Self {
            config,
            targets,
            dumper,
            uploader,
            namer: ArtifactNamer::new(),
        }
    }

    /// Attempts every target once. A failing target never stops the others.
    pub async fn run_cycle(&mut self) -> Vec<BackupResult> {
        let backup_dir = self.config.local_backup_dir.clone();

        if let Err(e) = fs::create_dir_all(&backup_dir) {
            error!(
                "Failed to create backup directory {}: {}",
                backup_dir.display(),
                e
            );
            return self
                .targets
                .iter()
                .map(|target| BackupResult {
                    target: target.label(),
                    success: false,
                    failed_stage: Some(Stage::Dump),
                    error: Some(BackupError::Io(io::Error::new(e.kind(), e.to_string()))),
                    file_path: None,
                    file_size: None,
                    duration_secs: 0,
                    cleanup_warning: None,
                })
                .collect();
        }

        let mut results = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let dump_path = self
                .namer
                .next_path(&backup_dir, target, Utc::now().timestamp());
            let result = execute_target_backup(
                &self.config,
                self.dumper.as_ref(),
                self.uploader.as_ref(),
                target,
                dump_path,
            )
            .await;
            results.push(result);
        }

        log_summary(&results);
        results
    }

    /// Single-run mode: one cycle, first hard failure becomes the error.
    pub async fn run_once(&mut self) -> Result<Vec<BackupResult>> {
        let mut results = self.run_cycle().await;

        match results.iter().position(|r| !r.success) {
            Some(index) => Err(results[index].error.take().unwrap_or_else(|| {
                BackupError::Config(format!("backup of {} failed", results[index].target))
            })),
            None => Ok(results),
        }
    }

    /// Continuous mode: cycle, sleep `interval`, repeat until `shutdown` is raised.
    pub async fn run(&mut self, interval: Duration, shutdown: Arc<AtomicUsize>) {
        info!(
            "Starting backup scheduler: {} target(s), interval {} seconds",
            self.targets.len(),
            interval.as_secs()
        );

        loop {
            if shutdown.load(Ordering::Relaxed) > 0 {
                info!("Scheduler shutdown requested");
                break;
            }

            let started = Instant::now();
            self.run_cycle().await;
            info!(
                "Cycle took {} sec, sleeping for {} sec",
                started.elapsed().as_secs(),
                interval.as_secs()
            );

            select! {
                _ = sleep(interval) => {}
                _ = async {
                    while shutdown.load(Ordering::Relaxed) == 0 {
                        sleep(Duration::from_millis(100)).await;
                    }
                } => {
                    info!("Scheduler shutdown requested during wait");
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }
}

fn log_summary(results: &[BackupResult]) {
    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;

    info!(
        "Backup cycle finished: {} succeeded, {} failed",
        succeeded, failed
    );

    for result in results {
        if result.success {
            info!(
                "{}: {} ({:.2} MB) in {} sec",
                result.target,
                result
                    .file_path
                    .as_deref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                result.file_size.unwrap_or(0) as f64 / 1024.0 / 1024.0,
                result.duration_secs
            );
        }
        if let Some(stage) = result.failed_stage {
            warn!("{} did not complete ({} stage)", result.target, stage);
        }
        if let Some(warning) = &result.cleanup_warning {
            warn!("{} {} stage: {}", result.target, Stage::Cleanup, warning);
        }
    }
}
