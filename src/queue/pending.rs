use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

/// Pending-file queue between discovery and the workers
///
/// Producers may run on any thread (notify callbacks, blocking scans, async
/// tasks); consumers are the worker tasks. Each `push` stores a wake-up permit
/// so a worker that starts waiting after the push still sees it.
///
/// A path that is already waiting is not queued twice. Paths that were
/// dequeued may be pushed again; the claim rename resolves those duplicates.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: Mutex<Entries>,
    ready: Notify,
}

#[derive(Debug, Default)]
struct Entries {
    order: VecDeque<PathBuf>,
    waiting: HashSet<PathBuf>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a path; returns false when it was already waiting
    pub fn push(&self, path: PathBuf) -> bool {
        {
            let mut entries = self.entries.lock();
            if !entries.waiting.insert(path.clone()) {
                trace!(path = %path.display(), "Path already pending");
                return false;
            }
            entries.order.push_back(path);
        }

        self.ready.notify_one();
        true
    }

    pub fn pop(&self) -> Option<PathBuf> {
        let mut entries = self.entries.lock();
        let path = entries.order.pop_front()?;
        entries.waiting.remove(&path);
        Some(path)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().waiting.contains(path)
    }

    /// Wait until something is pushed or `timeout` elapses; returns true on a wake-up
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.ready.notified())
            .await
            .is_ok()
    }

    /// Wake every waiting worker (used on shutdown)
    pub fn wake_all(&self) {
        self.ready.notify_waiters();
    }
}
