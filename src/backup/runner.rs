use crate::database::DumpCommand;
use crate::error::{BackupError, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Runs `cmd` to completion.
///
/// Both output streams are drained line by line on their own tasks while the
/// child runs; a dump tool that fills its stderr pipe would otherwise block
/// forever. The drains are joined before the exit status is classified.
pub async fn execute(cmd: &DumpCommand) -> Result<()> {
    info!(
        "Running {} dump: {} {}",
        cmd.engine,
        cmd.program.display(),
        cmd.redacted_args().join(" ")
    );

    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .envs(cmd.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| BackupError::Start {
            program: cmd.program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(|s| drain(s, "stdout"));
    let stderr = child.stderr.take().map(|s| drain(s, "stderr"));

    let status = child.wait().await?;

    for handle in [stdout, stderr].into_iter().flatten() {
        if let Err(e) = handle.await {
            warn!("Output drain task failed: {}", e);
        }
    }

    if status.success() {
        debug!("{} exited successfully", cmd.program.display());
        Ok(())
    } else {
        Err(BackupError::Process {
            program: cmd.program.clone(),
            code: status.code(),
        })
    }
}

fn drain<R>(stream: R, name: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(
        async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => info!(stream = name, "{}", line),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(stream = name, "Failed to read tool output: {}", e);
                        break;
                    }
                }
            }
        }
        .in_current_span(),
    )
}
