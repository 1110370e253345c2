use super::{Discovery, DiscoveryContext, DiscoveryError, check_root, sweep, sweep_blocking};
use async_trait::async_trait;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Event-driven discovery on top of the platform's notification API
pub struct WatchDiscovery {
    context: DiscoveryContext,
    watcher: Option<RecommendedWatcher>,
}

impl WatchDiscovery {
    pub fn new(context: DiscoveryContext) -> Self {
        Self {
            context,
            watcher: None,
        }
    }
}

#[async_trait]
impl Discovery for WatchDiscovery {
    fn name(&self) -> &'static str {
        "watch"
    }

    async fn start(&mut self) -> Result<(), DiscoveryError> {
        check_root(self.context.endpoint.drop_path())?;

        let context = self.context.clone();
        let watcher = attach(&self.context, move |res: notify::Result<Event>| match res {
            Ok(event) => on_event(&context, &event),
            Err(e) => warn!(endpoint = context.endpoint.name(), error = %e, "Watcher error"),
        })?;
        self.watcher = Some(watcher);

        let found = sweep(&self.context).await;
        info!(
            endpoint = self.context.endpoint.name(),
            found, "Watching drop directory"
        );
        Ok(())
    }

    async fn stop(&mut self) {
        if self.watcher.take().is_some() {
            debug!(endpoint = self.context.endpoint.name(), "Watcher stopped");
        }
    }
}

/// Attach a watcher to the endpoint's drop directory
pub(super) fn attach<F>(
    context: &DiscoveryContext,
    handler: F,
) -> Result<RecommendedWatcher, DiscoveryError>
where
    F: FnMut(notify::Result<Event>) + Send + 'static,
{
    let path = context.endpoint.drop_path().to_path_buf();
    let mode = if context.endpoint.monitor_subdirectories() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };

    let mut watcher = notify::recommended_watcher(handler).map_err(|source| {
        DiscoveryError::Watch {
            path: path.clone(),
            source,
        }
    })?;
    watcher
        .watch(&path, mode)
        .map_err(|source| DiscoveryError::Watch { path, source })?;

    Ok(watcher)
}

fn on_event(context: &DiscoveryContext, event: &Event) {
    if event.need_rescan() {
        debug!(endpoint = context.endpoint.name(), "Events were dropped, rescanning");
        if let Err(e) = sweep_blocking(context) {
            warn!(endpoint = context.endpoint.name(), error = %e, "Rescan failed");
        }
        return;
    }

    for path in arrivals(event) {
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {
                context.offer(path);
            }
            _ => {}
        }
    }
}

/// Paths that may have just become available for processing
pub(super) fn arrivals(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any))
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::tests::context;
    use crate::endpoint::EndpointDescriptor;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_arrival_kinds() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/d/a".into());
        assert_eq!(arrivals(&created), vec![PathBuf::from("/d/a")]);

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/tmp/a".into())
            .add_path("/d/a".into());
        assert_eq!(arrivals(&renamed), vec![PathBuf::from("/d/a")]);

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path("/d/a".into());
        assert!(arrivals(&removed).is_empty());

        let renamed_away = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path("/d/a".into());
        assert!(arrivals(&renamed_away).is_empty());
    }

    fn endpoint(drop: &Path) -> EndpointDescriptor {
        EndpointDescriptor::builder()
            .name("watch")
            .drop_path(drop)
            .success_path("/elsewhere/out")
            .failure_path("/elsewhere/err")
            .build()
    }

    #[tokio::test]
    async fn test_start_sweeps_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("early.txt"), b"x").unwrap();

        let context = context(endpoint(temp_dir.path()));
        let mut discovery = WatchDiscovery::new(context.clone());
        discovery.start().await.unwrap();

        assert!(context.queue.contains(&temp_dir.path().join("early.txt")));
        discovery.stop().await;
    }

    #[tokio::test]
    async fn test_renamed_in_file_is_enqueued() {
        let temp_dir = TempDir::new().unwrap();
        let drop = temp_dir.path().join("drop");
        fs::create_dir_all(&drop).unwrap();

        let context = context(endpoint(&drop));
        let mut discovery = WatchDiscovery::new(context.clone());
        discovery.start().await.unwrap();

        let staged = temp_dir.path().join("staged.txt");
        fs::write(&staged, b"x").unwrap();
        fs::rename(&staged, drop.join("late.txt")).unwrap();

        let target = drop.join("late.txt");
        let mut seen = false;
        for _ in 0..50 {
            if context.queue.contains(&target) {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        discovery.stop().await;

        assert!(seen, "renamed file was never enqueued");
    }

    #[tokio::test]
    async fn test_start_fails_without_drop_directory() {
        let temp_dir = TempDir::new().unwrap();
        let context = context(endpoint(&temp_dir.path().join("missing")));
        let mut discovery = WatchDiscovery::new(context);

        assert!(matches!(
            discovery.start().await,
            Err(DiscoveryError::Root { .. })
        ));
    }
}
