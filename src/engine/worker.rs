use super::claim::{self, ClaimOutcome};
use super::routing::{self, RouteOutcome};
use super::EngineSettings;
use crate::discovery::DiscoveryContext;
use crate::handlers::{FileHandler, PostProcessor, ProcessingFile};
use crate::naming::{self, InstanceId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What happened to one dequeued path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileOutcome {
    Skipped,
    Vanished,
    Abandoned,
    Succeeded,
    Failed,
    /// Handled, but the claimed file could not be moved to its destination
    Unrouted,
}

pub(crate) struct Worker {
    pub context: DiscoveryContext,
    pub handler: Arc<dyn FileHandler>,
    pub post_processor: Arc<dyn PostProcessor>,
    pub settings: EngineSettings,
    pub instance: InstanceId,
    pub shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
    pub async fn run(self, index: usize) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let endpoint = self.context.endpoint.name().to_string();
        debug!(endpoint = %endpoint, worker = index, "Worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if let Some(path) = self.context.queue.pop() {
                self.process(path).await;
                continue;
            }

            tokio::select! {
                _ = self.context.queue.wait(self.settings.idle_wait) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(endpoint = %endpoint, worker = index, "Worker exited");
    }

    pub async fn process(&self, path: PathBuf) -> FileOutcome {
        let endpoint = self.context.endpoint.as_ref();

        if naming::is_in_progress(&path) || !self.context.filter.accepts(&path) {
            return FileOutcome::Skipped;
        }

        let Some(target) = claim::claim_target(endpoint, &path, &self.instance) else {
            warn!(endpoint = endpoint.name(), path = %path.display(), "Path has no usable file name");
            return FileOutcome::Skipped;
        };

        let claimed =
            claim::claim(&path, &target, self.settings.claim_retry, &self.shutdown_rx).await;
        let file = match claimed {
            ClaimOutcome::Claimed(file) => file,
            ClaimOutcome::Vanished => {
                debug!(endpoint = endpoint.name(), path = %path.display(), "File already taken");
                self.context.metrics.claim_vanished();
                return FileOutcome::Vanished;
            }
            ClaimOutcome::Abandoned(e) => {
                warn!(
                    endpoint = endpoint.name(),
                    path = %path.display(),
                    error = %e,
                    "Could not claim file"
                );
                self.context.metrics.claim_abandoned();
                return FileOutcome::Abandoned;
            }
        };

        self.context.metrics.file_claimed();
        debug!(
            endpoint = endpoint.name(),
            path = %file.claimed_path().display(),
            "File claimed"
        );

        let successful = self.handle(&file).await;

        let outcome = routing::route(
            endpoint,
            &file,
            successful,
            self.settings.route_poll_attempts,
            self.settings.route_poll_interval,
        )
        .await;

        match outcome {
            RouteOutcome::Moved(destination) => {
                info!(
                    endpoint = endpoint.name(),
                    file = file.original_name(),
                    destination = %destination.display(),
                    successful,
                    "File processed"
                );
                if successful {
                    self.context.metrics.file_succeeded();
                } else {
                    self.context.metrics.file_failed();
                }
                self.post_process(&destination, successful).await;

                if successful {
                    FileOutcome::Succeeded
                } else {
                    FileOutcome::Failed
                }
            }
            RouteOutcome::AlreadyRouted(found) => {
                warn!(
                    endpoint = endpoint.name(),
                    file = file.original_name(),
                    found = %found.display(),
                    "Claimed file was routed by someone else"
                );
                self.context.metrics.route_missing();
                FileOutcome::Unrouted
            }
            RouteOutcome::Missing => {
                error!(
                    endpoint = endpoint.name(),
                    path = %file.claimed_path().display(),
                    "Claimed file disappeared and no routed copy was found"
                );
                self.context.metrics.route_missing();
                FileOutcome::Unrouted
            }
            RouteOutcome::Failed(e) => {
                error!(
                    endpoint = endpoint.name(),
                    path = %file.claimed_path().display(),
                    error = %e,
                    "Could not route file; the scavenger will recover it"
                );
                self.context.metrics.route_missing();
                FileOutcome::Unrouted
            }
        }
    }

    /// Run the handler in its own task so a panic only fails this file
    async fn handle(&self, file: &ProcessingFile) -> bool {
        let handler = self.handler.clone();
        let task_file = file.clone();
        let result = tokio::spawn(async move { handler.handle_file(&task_file).await }).await;

        let endpoint = self.context.endpoint.name();
        match result {
            Ok(Ok(successful)) => successful,
            Ok(Err(e)) => {
                warn!(endpoint, file = file.original_name(), error = %e, "Handler failed");
                false
            }
            Err(e) => {
                error!(endpoint, file = file.original_name(), error = %e, "Handler panicked");
                false
            }
        }
    }

    async fn post_process(&self, destination: &Path, successful: bool) {
        if let Err(e) = self.post_processor.post_process(destination, successful).await {
            warn!(
                endpoint = self.context.endpoint.name(),
                destination = %destination.display(),
                error = %e,
                "Post-processing failed"
            );
            self.context.metrics.post_process_failed();
        }
    }
}
