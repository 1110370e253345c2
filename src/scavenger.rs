//! Recovery of files stranded in the drop or in-progress directories
//!
//! A file is stranded when it sits untouched for longer than the endpoint's
//! recovery interval: either discovery never reported it, or the worker that
//! claimed it died. Each tick re-claims stale drop files with the `enqueue`
//! infix, renames every stale in-progress file back to its original name and
//! pushes it onto the pending queue.
//!
//! When every stale drop file could be taken by the scavenger, nobody else was
//! processing them, which means discovery has stopped delivering. That, or a
//! network-class error, asks the supervisor to rebuild the discovery strategy.

use crate::discovery::DiscoveryContext;
use crate::filter;
use crate::fs_error::{self, IoClass};
use crate::naming::{self, InstanceId};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Messages from the scavenger to the engine's supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySignal {
    Restart { reason: String },
}

/// Result of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScavengeReport {
    /// Stale unclaimed files found in the drop directory
    pub seen: usize,
    /// How many of those the scavenger managed to claim
    pub moved: usize,
    /// Stale in-progress files renamed back into the drop directory
    pub recovered: usize,
    /// Restored paths accepted by the pending queue
    pub requeued: usize,
    pub network_error: bool,
}

impl ScavengeReport {
    pub fn discovery_suspect(&self) -> bool {
        (self.seen > 0 && self.moved == self.seen) || self.network_error
    }

    fn restart_reason(&self) -> String {
        if self.network_error {
            "network error during scavenge".to_string()
        } else {
            format!("all {} stale drop files were unclaimed", self.seen)
        }
    }
}

#[derive(Clone)]
pub struct Scavenger {
    context: DiscoveryContext,
    instance: InstanceId,
    restart_tx: mpsc::Sender<DiscoverySignal>,
    busy: Arc<AtomicBool>,
}

impl Scavenger {
    pub fn new(
        context: DiscoveryContext,
        instance: InstanceId,
        restart_tx: mpsc::Sender<DiscoverySignal>,
    ) -> Self {
        Self {
            context,
            instance,
            restart_tx,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tick every scavenge interval until shutdown
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let endpoint = self.context.endpoint.clone();
        let mut ticker = tokio::time::interval(endpoint.scavenge_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        let mut last: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let scavenger = self.clone();
            last = Some(tokio::spawn(async move {
                scavenger.tick().await;
            }));
        }

        if let Some(task) = last {
            let _ = task.await;
        }
        debug!(endpoint = endpoint.name(), "Scavenger exited");
    }

    /// Run one scan unless the previous one is still going
    pub async fn tick(&self) -> Option<ScavengeReport> {
        let endpoint = self.context.endpoint.name();
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(endpoint, "Previous scavenge still running, skipping tick");
            return None;
        }

        let context = self.context.clone();
        let instance = self.instance.clone();
        let result =
            tokio::task::spawn_blocking(move || scan(&context, &instance, SystemTime::now())).await;
        self.busy.store(false, Ordering::Release);

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                error!(endpoint, error = %e, "Scavenge task failed");
                return None;
            }
        };

        self.context.metrics.scavenge_run();
        self.context.metrics.files_scavenged(report.recovered as u64);
        if report.recovered > 0 || report.seen > 0 {
            info!(
                endpoint,
                seen = report.seen,
                moved = report.moved,
                recovered = report.recovered,
                requeued = report.requeued,
                "Scavenged stale files"
            );
        }

        if report.discovery_suspect() {
            let signal = DiscoverySignal::Restart {
                reason: report.restart_reason(),
            };
            match self.restart_tx.try_send(signal) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(endpoint, "Discovery restart already pending");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(endpoint, "Supervisor gone, dropping restart request");
                }
            }
        }

        Some(report)
    }
}

/// One scavenge pass against the clock value `now`
pub fn scan(context: &DiscoveryContext, instance: &InstanceId, now: SystemTime) -> ScavengeReport {
    let endpoint = context.endpoint.as_ref();
    let mut report = ScavengeReport::default();

    let Some(cutoff) = now.checked_sub(endpoint.recovery_interval()) else {
        return report;
    };

    let mut roots = vec![endpoint.drop_path().to_path_buf()];
    roots.extend(endpoint.in_progress_path().map(Path::to_path_buf));

    let mut stale = Vec::new();
    for root in &roots {
        if let Err(e) = collect_stale(context, root, cutoff, &mut stale) {
            let class = fs_error::classify(&e);
            warn!(
                endpoint = endpoint.name(),
                root = %root.display(),
                error = %e,
                class = ?class,
                "Cannot scan directory"
            );
            // A vanished root is a share that went away.
            if matches!(class, IoClass::Network | IoClass::Vanished) {
                report.network_error = true;
            }
            return report;
        }
    }

    for path in stale {
        let in_progress = if naming::is_in_progress(&path) {
            path
        } else if context.filter.accepts(&path) {
            report.seen += 1;
            match claim_for_requeue(&path, instance) {
                Ok(claimed) => {
                    report.moved += 1;
                    claimed
                }
                Err(e) => {
                    note_error(&mut report, endpoint.name(), &path, &e);
                    continue;
                }
            }
        } else {
            continue;
        };

        match restore(context, instance, &in_progress) {
            Ok(Some(restored)) => {
                report.recovered += 1;
                if context.offer(restored) {
                    report.requeued += 1;
                }
            }
            Ok(None) => {}
            Err(e) => note_error(&mut report, endpoint.name(), &in_progress, &e),
        }
    }

    report
}

fn collect_stale(
    context: &DiscoveryContext,
    root: &Path,
    cutoff: SystemTime,
    stale: &mut Vec<PathBuf>,
) -> io::Result<()> {
    let endpoint = context.endpoint.as_ref();
    std::fs::metadata(root)?;

    let excluded = filter::excluded_directories(endpoint);
    // The in-progress root may itself be excluded from the drop walk.
    let prune = !excluded.contains(root);
    let max_depth = if endpoint.monitor_subdirectories() {
        usize::MAX
    } else {
        1
    };

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(prune && entry.file_type().is_dir() && excluded.contains(entry.path()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if let Some(io_err) = e.io_error() {
                    if fs_error::classify(io_err) == IoClass::Network {
                        return Err(io::Error::new(io_err.kind(), e.to_string()));
                    }
                }
                debug!(endpoint = endpoint.name(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if fs_error::is_older_than(&metadata, cutoff) {
            stale.push(entry.into_path());
        }
    }

    Ok(())
}

fn claim_for_requeue(path: &Path, instance: &InstanceId) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file name is not UTF-8"))?;
    let claimed = path.with_file_name(naming::enqueue_name(name, instance));
    std::fs::rename(path, &claimed)?;
    Ok(claimed)
}

/// Move an in-progress file back into the drop directory under its original name
///
/// The file is first renamed to this instance's enqueue name so concurrent
/// scavengers cannot both restore it, then hard-linked into the drop directory,
/// which fails instead of overwriting a file that arrived under the same name.
fn restore(
    context: &DiscoveryContext,
    instance: &InstanceId,
    in_progress: &Path,
) -> io::Result<Option<PathBuf>> {
    let endpoint = context.endpoint.as_ref();
    let Some(original) = in_progress
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(naming::original_name)
    else {
        debug!(
            endpoint = endpoint.name(),
            path = %in_progress.display(),
            "Not a claimed file name, leaving it alone"
        );
        return Ok(None);
    };

    let relative = endpoint.relative_path(in_progress).with_file_name(original);
    let target = endpoint.drop_path().join(relative);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let staged = in_progress.with_file_name(naming::enqueue_name(original, instance));
    if staged != in_progress {
        std::fs::rename(in_progress, &staged)?;
    }

    let target = link_without_replacing(&staged, &target)?;
    if let Err(e) = std::fs::remove_file(&staged) {
        // Leave a single copy behind: the staged one is picked up again later.
        let _ = std::fs::remove_file(&target);
        return Err(e);
    }
    debug!(
        endpoint = endpoint.name(),
        from = %in_progress.display(),
        to = %target.display(),
        "Restored stale file"
    );
    Ok(Some(target))
}

/// Hard-link `source` at `target`, or at a timestamped variant when the name is taken
fn link_without_replacing(source: &Path, target: &Path) -> io::Result<PathBuf> {
    const ATTEMPTS: usize = 10;

    let mut candidate = target.to_path_buf();
    let mut last_err = None;
    for _ in 0..ATTEMPTS {
        match std::fs::hard_link(source, &candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = naming::disambiguated(target, &naming::timestamp());
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists)))
}

fn note_error(report: &mut ScavengeReport, endpoint: &str, path: &Path, err: &io::Error) {
    match fs_error::classify(err) {
        IoClass::Vanished => {
            debug!(endpoint, path = %path.display(), "Stale file taken by someone else");
        }
        IoClass::Network => {
            warn!(endpoint, path = %path.display(), error = %err, "Network error while scavenging");
            report.network_error = true;
        }
        _ => {
            warn!(endpoint, path = %path.display(), error = %err, "Could not scavenge file");
        }
    }
}
