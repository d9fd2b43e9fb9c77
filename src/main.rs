mod backup;
mod cli;
mod config;
mod database;
mod error;
mod log;
mod upload;

use backup::Scheduler;
use clap::Parser;
use cli::Cli;
use database::{CommandBuilder, ExternalDumper};
use error::{BackupError, Result};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    log::init();

    // Must happen before flags are parsed so env fallbacks see `.env` values.
    if let Err(e) = dotenv::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut app_config = config::load_from(&config_path)?;
    cli.apply(&mut app_config)?;
    app_config.validate()?;

    let targets = app_config.targets()?;
    info!(
        "Configured {} target(s): {}",
        targets.len(),
        targets
            .iter()
            .map(|t| format!("{} ({})", t.label(), t.engine))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let uploader = upload::create_uploader(&app_config.storage).await;
    if let Err(e) = uploader.test_connection().await {
        warn!("Storage check failed, uploads may not succeed: {}", e);
    }

    let builder = match &app_config.tool_path {
        Some(path) => CommandBuilder::with_search_path(path),
        None => CommandBuilder::new(),
    };

    let schedule = app_config.schedule;
    let mut scheduler = Scheduler::new(
        Arc::new(app_config),
        targets,
        Box::new(ExternalDumper::new(builder)),
        uploader,
    );

    match schedule {
        None => {
            let results = scheduler.run_once().await?;
            info!("Backup completed for {} target(s)", results.len());
        }
        Some(schedule) => {
            info!("Running backups: {}", schedule);
            let shutdown = install_shutdown_handler()?;
            scheduler.run(schedule.as_duration(), shutdown).await;
        }
    }

    Ok(())
}

fn install_shutdown_handler() -> Result<Arc<AtomicUsize>> {
    let ctrl_c_count = Arc::new(AtomicUsize::new(0));
    let ctrl_c_count_clone = ctrl_c_count.clone();

    ctrlc::set_handler(move || {
        let count = ctrl_c_count_clone.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            println!("\n\nShutdown signal received. The current backup will finish first; press Ctrl+C again to force exit...");
        } else {
            println!("\nForce exiting...");
            std::process::exit(130);
        }
    })
    .map_err(|e| BackupError::Config(format!("failed to install signal handler: {}", e)))?;

    Ok(ctrl_c_count)
}
