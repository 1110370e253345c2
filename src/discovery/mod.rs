//! Discovery strategies: how new drop-directory files reach the pending queue
//!
//! - [`WatchDiscovery`] - OS notifications via `notify`
//! - [`PollingDiscovery`] - fixed-interval sweeps, or sweeps woken by notification hints
//!
//! Every strategy sweeps the drop directory once on start.

mod polling;
mod watch;

pub use polling::{PollMode, PollingDiscovery};
pub use watch::WatchDiscovery;

use crate::config::DiscoveryKind;
use crate::endpoint::EndpointDescriptor;
use crate::filter::{self, FileFilter};
use crate::naming;
use crate::observability::Metrics;
use crate::queue::PendingQueue;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("drop directory {path} is not accessible: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[async_trait]
pub trait Discovery: Send {
    fn name(&self) -> &'static str;

    /// Sweep once and begin watching; errors leave the strategy stopped
    async fn start(&mut self) -> Result<(), DiscoveryError>;

    async fn stop(&mut self);
}

/// State shared by discovery, scavenger and workers of one engine
#[derive(Clone)]
pub struct DiscoveryContext {
    pub endpoint: Arc<EndpointDescriptor>,
    pub filter: Arc<dyn FileFilter>,
    pub queue: Arc<PendingQueue>,
    pub metrics: Arc<Metrics>,
}

impl DiscoveryContext {
    /// Enqueue a discovered path unless it is claimed or filtered out
    pub fn offer(&self, path: PathBuf) -> bool {
        if naming::is_in_progress(&path) || !self.filter.accepts(&path) {
            trace!(path = %path.display(), "Ignoring path");
            return false;
        }

        let queued = self.queue.push(path);
        if queued {
            self.metrics.file_enqueued();
        }
        queued
    }
}

pub fn build(context: &DiscoveryContext) -> Box<dyn Discovery> {
    match context.endpoint.discovery() {
        DiscoveryKind::Watch => Box::new(WatchDiscovery::new(context.clone())),
        DiscoveryKind::Poll => Box::new(PollingDiscovery::new(context.clone(), PollMode::Fixed)),
        DiscoveryKind::Hybrid => {
            Box::new(PollingDiscovery::new(context.clone(), PollMode::Hybrid))
        }
    }
}

/// Files currently in the drop directory that the endpoint would process,
/// least recently accessed first
pub fn list_candidates(context: &DiscoveryContext) -> io::Result<Vec<PathBuf>> {
    let endpoint = context.endpoint.as_ref();
    let root = endpoint.drop_path();
    std::fs::metadata(root)?;

    let excluded = filter::excluded_directories(endpoint);
    let max_depth = if endpoint.monitor_subdirectories() {
        usize::MAX
    } else {
        1
    };

    let mut found: Vec<(Option<SystemTime>, PathBuf)> = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !(entry.file_type().is_dir() && excluded.contains(entry.path()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(endpoint = endpoint.name(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if naming::is_in_progress(path) || !context.filter.accepts(path) {
            continue;
        }

        let accessed = entry.metadata().ok().and_then(|m| m.accessed().ok());
        found.push((accessed, entry.into_path()));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Offer every current candidate to the queue; returns how many were found
pub fn sweep_blocking(context: &DiscoveryContext) -> io::Result<usize> {
    let candidates = list_candidates(context)?;
    let count = candidates.len();
    for path in candidates {
        context.offer(path);
    }
    Ok(count)
}

/// [`sweep_blocking`] on the blocking pool; errors are logged and reported as zero files
pub async fn sweep(context: &DiscoveryContext) -> usize {
    let task_context = context.clone();
    let result = tokio::task::spawn_blocking(move || sweep_blocking(&task_context)).await;

    match result {
        Ok(Ok(count)) => count,
        Ok(Err(e)) => {
            warn!(
                endpoint = context.endpoint.name(),
                path = %context.endpoint.drop_path().display(),
                error = %e,
                "Sweep failed"
            );
            0
        }
        Err(e) => {
            warn!(endpoint = context.endpoint.name(), error = %e, "Sweep task failed");
            0
        }
    }
}

/// Check that the drop root is reachable before a strategy starts
pub(crate) fn check_root(path: &Path) -> Result<(), DiscoveryError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(DiscoveryError::Root {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        }),
        Err(source) => Err(DiscoveryError::Root {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn context(endpoint: EndpointDescriptor) -> DiscoveryContext {
        let filter = filter::for_endpoint(&endpoint, None).unwrap();
        DiscoveryContext {
            endpoint: Arc::new(endpoint),
            filter,
            queue: Arc::new(PendingQueue::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    fn endpoint(drop: &Path, filter: &str, recursive: bool) -> EndpointDescriptor {
        EndpointDescriptor::builder()
            .name("test")
            .drop_path(drop)
            .filter(filter)
            .monitor_subdirectories(recursive)
            .success_path(drop.join("done").display().to_string())
            .failure_path("/elsewhere/err")
            .exclude_dirs(vec![PathBuf::from("skip")])
            .build()
    }

    fn layout(temp_dir: &TempDir) -> PathBuf {
        let drop = temp_dir.path().to_path_buf();
        for dir in ["sub", "skip", "done"] {
            fs::create_dir_all(drop.join(dir)).unwrap();
        }
        for file in [
            "a.xml",
            "b.txt",
            "c.xml.id.inprogress",
            "sub/d.xml",
            "skip/e.xml",
            "done/f.xml",
        ] {
            fs::write(drop.join(file), b"x").unwrap();
        }
        drop
    }

    #[test]
    fn test_list_candidates_top_level() {
        let temp_dir = TempDir::new().unwrap();
        let drop = layout(&temp_dir);
        let context = context(endpoint(&drop, "*.xml", false));

        let found = list_candidates(&context).unwrap();
        assert_eq!(found, vec![drop.join("a.xml")]);
    }

    #[test]
    fn test_list_candidates_recursive_skips_excluded() {
        let temp_dir = TempDir::new().unwrap();
        let drop = layout(&temp_dir);
        let context = context(endpoint(&drop, "*", true));

        let mut found = list_candidates(&context).unwrap();
        found.sort();
        assert_eq!(
            found,
            vec![drop.join("a.xml"), drop.join("b.txt"), drop.join("sub/d.xml")]
        );
    }

    #[test]
    fn test_list_candidates_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let context = context(endpoint(&temp_dir.path().join("nope"), "*", false));

        assert!(list_candidates(&context).is_err());
    }

    #[test]
    fn test_offer_rejects_claimed_paths() {
        let temp_dir = TempDir::new().unwrap();
        let context = context(endpoint(temp_dir.path(), "*", false));

        assert!(!context.offer(temp_dir.path().join("a.xml.x.inprogress")));
        assert!(context.offer(temp_dir.path().join("a.xml")));
        assert!(!context.offer(temp_dir.path().join("a.xml")));
        assert_eq!(context.queue.len(), 1);
        assert_eq!(context.metrics.snapshot().files_enqueued, 1);
    }

    #[tokio::test]
    async fn test_sweep_enqueues_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let drop = layout(&temp_dir);
        let context = context(endpoint(&drop, "*.xml", true));

        assert_eq!(sweep(&context).await, 2);
        assert_eq!(context.queue.len(), 2);
    }
}
