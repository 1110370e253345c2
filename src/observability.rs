//! Per-endpoint counters, injected into every engine component

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    files_enqueued: AtomicU64,
    files_claimed: AtomicU64,
    claims_vanished: AtomicU64,
    claims_abandoned: AtomicU64,
    files_succeeded: AtomicU64,
    files_failed: AtomicU64,
    routes_missing: AtomicU64,
    post_process_failures: AtomicU64,
    files_scavenged: AtomicU64,
    scavenge_runs: AtomicU64,
    discovery_restarts: AtomicU64,
}

macro_rules! counter {
    ($method:ident, $field:ident) => {
        pub fn $method(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(counter = stringify!($field), "Metric incremented");
        }
    };
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(file_enqueued, files_enqueued);
    counter!(file_claimed, files_claimed);
    counter!(claim_vanished, claims_vanished);
    counter!(claim_abandoned, claims_abandoned);
    counter!(file_succeeded, files_succeeded);
    counter!(file_failed, files_failed);
    counter!(route_missing, routes_missing);
    counter!(post_process_failed, post_process_failures);
    counter!(scavenge_run, scavenge_runs);
    counter!(discovery_restarted, discovery_restarts);

    pub fn files_scavenged(&self, count: u64) {
        if count > 0 {
            self.files_scavenged.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_enqueued: self.files_enqueued.load(Ordering::Relaxed),
            files_claimed: self.files_claimed.load(Ordering::Relaxed),
            claims_vanished: self.claims_vanished.load(Ordering::Relaxed),
            claims_abandoned: self.claims_abandoned.load(Ordering::Relaxed),
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            routes_missing: self.routes_missing.load(Ordering::Relaxed),
            post_process_failures: self.post_process_failures.load(Ordering::Relaxed),
            files_scavenged: self.files_scavenged.load(Ordering::Relaxed),
            scavenge_runs: self.scavenge_runs.load(Ordering::Relaxed),
            discovery_restarts: self.discovery_restarts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub files_enqueued: u64,
    pub files_claimed: u64,
    pub claims_vanished: u64,
    pub claims_abandoned: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub routes_missing: u64,
    pub post_process_failures: u64,
    pub files_scavenged: u64,
    pub scavenge_runs: u64,
    pub discovery_restarts: u64,
}
