//! Process-per-source supervisor.
//!
//! `scanr run` starts one `scanr source --index N` child for every
//! launchable source and restarts children that exit with a failure.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use scanr_core::Settings;
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Restart delays after consecutive failures; the last entry is the cap.
const BACKOFF: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(60),
];

/// A child that stayed up this long resets the failure count.
const STABLE_AFTER: Duration = Duration::from_secs(120);

/// Time a child gets to stop on its own after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Delay before the restart that follows the `failures`-th consecutive
/// failure.
pub fn backoff_for(failures: u32) -> Duration {
    let index = (failures.max(1) - 1) as usize;
    BACKOFF[index.min(BACKOFF.len() - 1)]
}

/// Indices of the sources that get a process.
pub fn launchable_indices(settings: &Settings) -> Vec<usize> {
    settings
        .sources
        .iter()
        .enumerate()
        .filter(|(_, source)| source.is_launchable())
        .map(|(index, _)| index)
        .collect()
}

struct SourceProcess {
    exe: PathBuf,
    config: PathBuf,
    index: usize,
    source: String,
}

impl SourceProcess {
    fn spawn(&self) -> Result<Child> {
        Command::new(&self.exe)
            .arg("--config")
            .arg(&self.config)
            .arg("source")
            .arg("--index")
            .arg(self.index.to_string())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn process for source {}", self.source))
    }
}

/// Run every launchable source until `cancel` fires.
pub async fn run(settings: &Settings, config: &Path, cancel: CancellationToken) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate the scanr executable")?;
    let indices = launchable_indices(settings);

    if indices.is_empty() {
        tracing::warn!("No enabled sources with a scraper configured, nothing to launch");
        return Ok(());
    }

    let mut children = JoinSet::new();
    for index in indices {
        let source = settings.sources[index].url.clone();
        tracing::info!(%source, index, "Launching source process");

        let process = SourceProcess {
            exe: exe.clone(),
            config: config.to_path_buf(),
            index,
            source,
        };
        children.spawn(supervise(process, cancel.clone()));
    }

    while let Some(joined) = children.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Source supervisor task panicked");
        }
    }

    tracing::info!("All source processes stopped");
    Ok(())
}

async fn supervise(process: SourceProcess, cancel: CancellationToken) {
    let source = process.source.as_str();
    let mut failures: u32 = 0;

    loop {
        match process.spawn() {
            Ok(mut child) => {
                let started = Instant::now();
                let exited = tokio::select! {
                    status = child.wait() => Some(status),
                    _ = cancel.cancelled() => None,
                };

                let Some(status) = exited else {
                    stop(child, source).await;
                    return;
                };
                if started.elapsed() >= STABLE_AFTER {
                    failures = 0;
                }
                match status {
                    Ok(status) if status.success() => {
                        tracing::info!(%source, "Source process exited");
                        return;
                    }
                    Ok(status) => {
                        failures += 1;
                        tracing::warn!(%source, status = %describe(status), failures, "Source process failed");
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::error!(%source, error = %e, "Failed to wait on source process");
                    }
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!(%source, error = %e, "Source process did not start");
            }
        }

        let delay = backoff_for(failures);
        tracing::info!(%source, delay_secs = delay.as_secs(), "Restarting source process");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

/// Children share the terminal's interrupt; give them a moment to finish
/// their current item before killing them.
async fn stop(mut child: Child, source: &str) {
    match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
        Ok(_) => tracing::debug!(%source, "Source process stopped"),
        Err(_) => {
            tracing::warn!(%source, "Source process did not stop in time, killing it");
            if let Err(e) = child.kill().await {
                tracing::error!(%source, error = %e, "Failed to kill source process");
            }
        }
    }
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
