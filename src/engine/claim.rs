//! Taking possession of a dropped file by renaming it

use crate::endpoint::EndpointDescriptor;
use crate::fs_error::{self, IoClass};
use crate::handlers::ProcessingFile;
use crate::naming::{self, InstanceId};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Retry budget for files still locked by their producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRetry {
    /// Total attempts; 0 keeps retrying while the error is a lock
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl ClaimRetry {
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

impl Default for ClaimRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(ProcessingFile),
    /// Someone else renamed it first
    Vanished,
    /// Not a lock, the lock outlived the retry budget, or shutdown arrived while waiting
    Abandoned(io::Error),
}

/// Where `source` goes when this instance claims it
///
/// Claims stay next to the source unless the endpoint has a dedicated
/// in-progress directory, in which case the drop-relative hierarchy is kept there.
pub fn claim_target(
    endpoint: &EndpointDescriptor,
    source: &Path,
    instance: &InstanceId,
) -> Option<PathBuf> {
    let name = source.file_name()?.to_str()?;
    let claimed = naming::claimed_name(name, instance);

    let target = match endpoint.in_progress_path() {
        Some(root) => root.join(endpoint.relative_path(source)).with_file_name(claimed),
        None => source.with_file_name(claimed),
    };
    Some(target)
}

pub async fn claim(
    source: &Path,
    target: &Path,
    retry: ClaimRetry,
    shutdown_rx: &watch::Receiver<bool>,
) -> ClaimOutcome {
    if let Some(parent) = target.parent() {
        if source.parent() != Some(parent) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ClaimOutcome::Abandoned(e);
            }
        }
    }

    claim_with(source, target, retry, shutdown_rx, || {
        tokio::fs::rename(source, target)
    })
    .await
}

/// Retry loop around `rename`; lock errors back off until the budget or shutdown ends it
async fn claim_with<F, Fut>(
    source: &Path,
    target: &Path,
    retry: ClaimRetry,
    shutdown_rx: &watch::Receiver<bool>,
    mut rename: F,
) -> ClaimOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut shutdown_rx = shutdown_rx.clone();
    let mut attempt = 0;
    loop {
        attempt += 1;

        let err = match rename().await {
            Ok(()) => {
                return ClaimOutcome::Claimed(ProcessingFile::new(
                    target.to_path_buf(),
                    source.to_path_buf(),
                ));
            }
            Err(e) => e,
        };

        match fs_error::classify(&err) {
            IoClass::Vanished => return ClaimOutcome::Vanished,
            IoClass::Locked if retry.allows(attempt) => {
                debug!(
                    path = %source.display(),
                    attempt,
                    error = %err,
                    "File still locked, retrying claim"
                );
                if !backoff(retry.backoff, &mut shutdown_rx).await {
                    return ClaimOutcome::Abandoned(io::Error::new(
                        io::ErrorKind::Interrupted,
                        format!("shutdown while waiting for lock: {}", err),
                    ));
                }
            }
            _ => return ClaimOutcome::Abandoned(err),
        }
    }
}

/// Sleep for `delay`; false when shutdown was signalled first
async fn backoff(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
    }
}
