use super::watch::{arrivals, attach};
use super::{Discovery, DiscoveryContext, DiscoveryError, check_root, sweep};
use async_trait::async_trait;
use notify::{Event, RecommendedWatcher};
use std::sync::Arc;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Sweep every polling interval
    Fixed,
    /// Sweep again after one interval while files keep arriving; when the
    /// directory was empty, sleep until a notification hint arrives
    Hybrid,
}

pub struct PollingDiscovery {
    context: DiscoveryContext,
    mode: PollMode,
    running: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl PollingDiscovery {
    pub fn new(context: DiscoveryContext, mode: PollMode) -> Self {
        Self {
            context,
            mode,
            running: None,
        }
    }

    fn hint_watcher(&self, hint: Arc<Notify>) -> Option<RecommendedWatcher> {
        let result = attach(&self.context, move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if event.need_rescan() || !arrivals(&event).is_empty() {
                    hint.notify_one();
                }
            }
        });

        match result {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(
                    endpoint = self.context.endpoint.name(),
                    error = %e,
                    "No notification hints available, polling at a fixed interval"
                );
                None
            }
        }
    }
}

#[async_trait]
impl Discovery for PollingDiscovery {
    fn name(&self) -> &'static str {
        match self.mode {
            PollMode::Fixed => "poll",
            PollMode::Hybrid => "hybrid",
        }
    }

    async fn start(&mut self) -> Result<(), DiscoveryError> {
        self.stop().await;
        check_root(self.context.endpoint.drop_path())?;

        let hint = Arc::new(Notify::new());
        let watcher = match self.mode {
            PollMode::Fixed => None,
            PollMode::Hybrid => self.hint_watcher(hint.clone()),
        };

        let found = sweep(&self.context).await;
        info!(
            endpoint = self.context.endpoint.name(),
            strategy = self.name(),
            found,
            "Polling drop directory"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(
            self.context.clone(),
            watcher,
            hint,
            found,
            shutdown_rx,
        ));
        self.running = Some((shutdown_tx, task));
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some((shutdown_tx, task)) = self.running.take() {
            let _ = shutdown_tx.send(true);
            let _ = task.await;
            debug!(endpoint = self.context.endpoint.name(), "Poller stopped");
        }
    }
}

async fn poll_loop(
    context: DiscoveryContext,
    watcher: Option<RecommendedWatcher>,
    hint: Arc<Notify>,
    mut found: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let interval = context.endpoint.polling_interval();

    loop {
        let hinted = watcher.is_some();
        let wait = async {
            if hinted && found == 0 {
                hint.notified().await;
            } else if hinted {
                tokio::select! {
                    _ = hint.notified() => {}
                    _ = tokio::time::sleep(interval) => {}
                }
            } else {
                tokio::time::sleep(interval).await;
            }
        };

        tokio::select! {
            _ = wait => {}
            _ = shutdown_rx.changed() => break,
        }
        if *shutdown_rx.borrow() {
            break;
        }

        found = sweep(&context).await;
    }

    drop(watcher);
}
