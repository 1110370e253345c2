//! Filing a handled file under its success or failure location

use crate::endpoint::{EndpointDescriptor, FILEPATH_TOKEN};
use crate::fs_error;
use crate::handlers::ProcessingFile;
use crate::naming;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Filesystem timestamps lag the system clock by up to a tick
const TIMESTAMP_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum RouteOutcome {
    Moved(PathBuf),
    /// Claimed file vanished but a routed copy showed up (another instance or an earlier run)
    AlreadyRouted(PathBuf),
    /// Claimed file vanished and nothing routed appeared
    Missing,
    Failed(io::Error),
}

/// Destination for a file originally dropped at `original_path`
///
/// Without `%filepath%` the drop-relative path is appended to the template.
/// With it, the token expands to the drop-relative directory and the routed
/// file name is appended to the expanded template.
pub fn destination(
    endpoint: &EndpointDescriptor,
    original_path: &Path,
    successful: bool,
    timestamp: &str,
) -> PathBuf {
    let template = if successful {
        endpoint.success_path()
    } else {
        endpoint.failure_path()
    };

    let relative = endpoint.relative_path(original_path);
    let file_name = relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let routed = naming::routed_name(&file_name, successful, timestamp);

    let path = if template.contains(FILEPATH_TOKEN) {
        let relative_dir = relative.parent().unwrap_or_else(|| Path::new(""));
        let expanded = template.replace(FILEPATH_TOKEN, &relative_dir.to_string_lossy());
        PathBuf::from(expanded).join(routed)
    } else {
        PathBuf::from(template).join(relative.with_file_name(routed))
    };

    path.components().collect()
}

/// Move the claimed file to its destination
pub async fn route(
    endpoint: &EndpointDescriptor,
    file: &ProcessingFile,
    successful: bool,
    poll_attempts: u32,
    poll_interval: Duration,
) -> RouteOutcome {
    let mut target = destination(endpoint, file.original_path(), successful, &naming::timestamp());

    if let Some(parent) = target.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return RouteOutcome::Failed(e);
        }
    }

    // Timestamps are nanosecond-resolution; a clash only happens on clocks that are coarser.
    while tokio::fs::try_exists(&target).await.unwrap_or(false) {
        target = destination(endpoint, file.original_path(), successful, &naming::timestamp());
    }

    match move_file(file.claimed_path(), &target).await {
        Ok(()) => RouteOutcome::Moved(target),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(
                path = %file.claimed_path().display(),
                "Claimed file vanished before routing, looking for a routed copy"
            );
            find_routed(endpoint, file, poll_attempts, poll_interval).await
        }
        Err(e) => RouteOutcome::Failed(e),
    }
}

/// Rename, falling back to copy + remove when the destination is on another device
async fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(rename_err) => {
            warn!(
                source = %source.display(),
                destination = %destination.display(),
                error = %rename_err,
                "Rename failed, copying instead"
            );
            tokio::fs::copy(source, destination).await?;
            if let Err(remove_err) = tokio::fs::remove_file(source).await {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    return Err(remove_err);
                }
            }
            Ok(())
        }
    }
}

async fn find_routed(
    endpoint: &EndpointDescriptor,
    file: &ProcessingFile,
    attempts: u32,
    interval: Duration,
) -> RouteOutcome {
    for attempt in 0..attempts.max(1) {
        for successful in [true, false] {
            if let Some(found) = routed_sibling(endpoint, file, successful).await {
                return RouteOutcome::AlreadyRouted(found);
            }
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    RouteOutcome::Missing
}

async fn routed_sibling(
    endpoint: &EndpointDescriptor,
    file: &ProcessingFile,
    successful: bool,
) -> Option<PathBuf> {
    let sample = destination(endpoint, file.original_path(), successful, "");
    let dir = sample.parent()?;
    let prefix = naming::routed_prefix(file.original_name(), successful);
    let since = file
        .claimed_at()
        .checked_sub(TIMESTAMP_SLACK)
        .unwrap_or(file.claimed_at());

    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        // Routed copies from earlier drops of the same name predate this claim.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if fs_error::last_touched(&metadata).is_some_and(|touched| touched >= since) {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn endpoint(drop: &Path, success: &str, failure: &str) -> EndpointDescriptor {
        EndpointDescriptor::builder()
            .name("test")
            .drop_path(drop)
            .success_path(success)
            .failure_path(failure)
            .build()
    }

    #[test]
    fn test_destination_with_filepath_token() {
        let endpoint = endpoint(Path::new("/drop"), "/out/%filepath%", "/err");

        assert_eq!(
            destination(&endpoint, Path::new("/drop/invoice.txt"), true, "123"),
            PathBuf::from("/out/invoice.txt.suc_123")
        );
        assert_eq!(
            destination(&endpoint, Path::new("/drop/2026/q1/invoice.txt"), true, "123"),
            PathBuf::from("/out/2026/q1/invoice.txt.suc_123")
        );
    }

    #[test]
    fn test_destination_token_in_the_middle() {
        let endpoint = endpoint(Path::new("/drop"), "/out/%filepath%/archive", "/err");

        assert_eq!(
            destination(&endpoint, Path::new("/drop/sub/a.xml"), true, "1"),
            PathBuf::from("/out/sub/archive/a.xml.suc_1")
        );
        assert_eq!(
            destination(&endpoint, Path::new("/drop/a.xml"), true, "1"),
            PathBuf::from("/out/archive/a.xml.suc_1")
        );
    }

    #[test]
    fn test_destination_without_token_keeps_hierarchy() {
        let endpoint = endpoint(Path::new("/drop"), "/out", "/err");

        assert_eq!(
            destination(&endpoint, Path::new("/drop/sub/a.xml"), false, "9"),
            PathBuf::from("/err/sub/a.xml.err_9")
        );
    }

    #[tokio::test]
    async fn test_route_moves_claimed_file() {
        let temp_dir = TempDir::new().unwrap();
        let drop = temp_dir.path().join("drop");
        let out = temp_dir.path().join("out");
        fs::create_dir_all(&drop).unwrap();

        let endpoint = endpoint(&drop, &format!("{}/%filepath%", out.display()), "/unused");
        let claimed = drop.join("invoice.txt.id.inprogress");
        fs::write(&claimed, b"total=1").unwrap();
        let file = ProcessingFile::new(claimed.clone(), drop.join("invoice.txt"));

        let outcome = route(&endpoint, &file, true, 1, Duration::from_millis(1)).await;

        let RouteOutcome::Moved(target) = outcome else {
            panic!("file was not moved");
        };
        assert_eq!(target.parent().unwrap(), out);
        assert!(target
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("invoice.txt.suc_"));
        assert_eq!(fs::read(&target).unwrap(), b"total=1");
        assert!(!claimed.exists());
    }

    #[tokio::test]
    async fn test_route_finds_copy_routed_elsewhere() {
        let temp_dir = TempDir::new().unwrap();
        let drop = temp_dir.path().join("drop");
        let err = temp_dir.path().join("err");
        fs::create_dir_all(&drop).unwrap();
        fs::create_dir_all(&err).unwrap();
        fs::write(err.join("invoice.txt.err_1"), b"").unwrap();

        let endpoint = endpoint(&drop, "/unused/out", &err.display().to_string());
        let file = ProcessingFile::new(
            drop.join("invoice.txt.id.inprogress"),
            drop.join("invoice.txt"),
        );

        let outcome = route(&endpoint, &file, false, 2, Duration::from_millis(1)).await;

        match outcome {
            RouteOutcome::AlreadyRouted(path) => assert_eq!(path, err.join("invoice.txt.err_1")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_route_ignores_routed_copies_older_than_claim() {
        let temp_dir = TempDir::new().unwrap();
        let drop = temp_dir.path().join("drop");
        let out = temp_dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("invoice.txt.suc_20260101000000000000000"), b"").unwrap();

        let endpoint = endpoint(
            &drop,
            &out.display().to_string(),
            &out.display().to_string(),
        );
        let file = ProcessingFile::new(
            drop.join("invoice.txt.id.inprogress"),
            drop.join("invoice.txt"),
        )
        .with_claimed_at(SystemTime::now() + Duration::from_secs(60));

        let outcome = route(&endpoint, &file, true, 2, Duration::from_millis(1)).await;
        assert!(matches!(outcome, RouteOutcome::Missing));
    }

    #[tokio::test]
    async fn test_route_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let drop = temp_dir.path().join("drop");
        let out = temp_dir.path().join("out");

        let endpoint = endpoint(
            &drop,
            &out.display().to_string(),
            &out.display().to_string(),
        );
        let file = ProcessingFile::new(drop.join("a.id.inprogress"), drop.join("a"));

        let outcome = route(&endpoint, &file, true, 2, Duration::from_millis(1)).await;
        assert!(matches!(outcome, RouteOutcome::Missing));
    }
}
