//! Processing engine: one per endpoint
//!
//! ## Architecture
//!
//! ```text
//!  discovery ──┐                 ┌─> worker ─> claim ─> handler ─> route ─> post-process
//!              ├─> PendingQueue ─┼─> worker ...
//!  scavenger ──┘                 └─> worker ...
//!      │
//!      └── restart signal ──> supervisor (owns the discovery strategy)
//! ```
//!
//! Workers from any number of engines (in this process or others) may point at
//! the same drop directory; the claim rename guarantees a single processor per file.

pub mod claim;
pub mod routing;
mod worker;

pub use claim::{ClaimOutcome, ClaimRetry};
pub use routing::RouteOutcome;

use crate::config::ValidationError;
use crate::discovery::{self, Discovery, DiscoveryContext};
use crate::endpoint::EndpointDescriptor;
use crate::filter::{self, FileFilter};
use crate::handlers::{FileHandler, PostProcessor};
use crate::naming::InstanceId;
use crate::observability::Metrics;
use crate::queue::PendingQueue;
use crate::scavenger::{DiscoverySignal, Scavenger};
use bon::bon;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use worker::Worker;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid endpoint: {0}")]
    Config(#[from] ValidationError),

    #[error("invalid filter: {0}")]
    Filter(#[from] glob::PatternError),

    #[error("cannot prepare directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Engine tuning shared by every endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// How long `stop` waits for in-flight work
    pub stop_timeout: Duration,
    /// Upper bound on a worker's sleep when the queue looks empty
    pub idle_wait: Duration,
    pub claim_retry: ClaimRetry,
    pub route_poll_attempts: u32,
    pub route_poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(10),
            idle_wait: Duration::from_secs(1),
            claim_retry: ClaimRetry::default(),
            route_poll_attempts: 5,
            route_poll_interval: Duration::from_millis(200),
        }
    }
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Engine {
    context: DiscoveryContext,
    handler: Arc<dyn FileHandler>,
    post_processor: Arc<dyn PostProcessor>,
    settings: EngineSettings,
    instance: InstanceId,
    running: Option<Running>,
}

#[bon]
impl Engine {
    #[builder]
    pub fn new(
        endpoint: EndpointDescriptor,
        handler: Arc<dyn FileHandler>,
        post_processor: Arc<dyn PostProcessor>,
        #[builder(default)] settings: EngineSettings,
        filter: Option<Arc<dyn FileFilter>>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, EngineError> {
        endpoint.validate()?;
        let filter = filter::for_endpoint(&endpoint, filter)?;

        let context = DiscoveryContext {
            endpoint: Arc::new(endpoint),
            filter,
            queue: Arc::new(PendingQueue::new()),
            metrics: metrics.unwrap_or_default(),
        };

        Ok(Self {
            context,
            handler,
            post_processor,
            settings,
            instance: InstanceId::new(),
            running: None,
        })
    }
}

impl Engine {
    /// Start discovery, scavenger and workers; restarts the engine if it is already running
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.running.is_some() {
            self.stop().await;
        }

        let endpoint = self.context.endpoint.clone();
        let mut dirs = vec![endpoint.drop_path().to_path_buf()];
        dirs.extend(endpoint.in_progress_path().map(|p| p.to_path_buf()));
        for dir in dirs {
            if let Err(source) = tokio::fs::create_dir_all(&dir).await {
                return Err(EngineError::Directory { path: dir, source });
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (restart_tx, restart_rx) = mpsc::channel(1);
        let mut tasks = Vec::with_capacity(endpoint.consumers() + 2);

        tasks.push(tokio::spawn(supervise(
            self.context.clone(),
            restart_rx,
            shutdown_rx.clone(),
        )));

        let scavenger = Scavenger::new(self.context.clone(), self.instance.clone(), restart_tx);
        tasks.push(tokio::spawn(scavenger.run(shutdown_rx.clone())));

        for index in 0..endpoint.consumers() {
            let worker = Worker {
                context: self.context.clone(),
                handler: self.handler.clone(),
                post_processor: self.post_processor.clone(),
                settings: self.settings,
                instance: self.instance.clone(),
                shutdown_rx: shutdown_rx.clone(),
            };
            tasks.push(tokio::spawn(worker.run(index)));
        }

        info!(
            endpoint = endpoint.name(),
            instance = %self.instance,
            drop_path = %endpoint.drop_path().display(),
            consumers = endpoint.consumers(),
            discovery = ?endpoint.discovery(),
            "Engine started"
        );

        self.running = Some(Running { shutdown_tx, tasks });
        Ok(())
    }

    /// Signal shutdown and wait up to `stop_timeout` for workers to finish their current file
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown_tx.send(true);
        self.context.queue.wake_all();

        let endpoint = self.context.endpoint.name().to_string();
        let drain = async {
            for task in running.tasks {
                if let Err(e) = task.await {
                    if e.is_panic() {
                        error!(endpoint = %endpoint, error = %e, "Engine task panicked");
                    }
                }
            }
        };

        match tokio::time::timeout(self.settings.stop_timeout, drain).await {
            Ok(()) => info!(endpoint = %endpoint, "Engine stopped"),
            Err(_) => warn!(
                endpoint = %endpoint,
                timeout = ?self.settings.stop_timeout,
                "Engine tasks still running after stop timeout"
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance
    }

    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.context.endpoint
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.context.metrics.clone()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown_tx.send(true);
            self.context.queue.wake_all();
        }
    }
}

async fn start_discovery(context: &DiscoveryContext) -> Box<dyn Discovery> {
    let mut strategy = discovery::build(context);
    if let Err(e) = strategy.start().await {
        error!(
            endpoint = context.endpoint.name(),
            strategy = strategy.name(),
            error = %e,
            "Discovery failed to start, waiting for the scavenger to request a restart"
        );
    }
    strategy
}

/// Owns the discovery strategy and rebuilds it when the scavenger asks for it
async fn supervise(
    context: DiscoveryContext,
    mut restart_rx: mpsc::Receiver<DiscoverySignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut strategy = start_discovery(&context).await;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            signal = restart_rx.recv() => match signal {
                Some(DiscoverySignal::Restart { reason }) => {
                    warn!(
                        endpoint = context.endpoint.name(),
                        strategy = strategy.name(),
                        reason,
                        "Restarting discovery"
                    );
                    strategy.stop().await;
                    context.metrics.discovery_restarted();
                    strategy = start_discovery(&context).await;
                }
                None => {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                    break;
                }
            }
        }
    }

    strategy.stop().await;
    debug!(endpoint = context.endpoint.name(), "Supervisor exited");
}
