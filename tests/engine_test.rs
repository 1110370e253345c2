use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use filedrop::config::DiscoveryKind;
use filedrop::endpoint::EndpointDescriptor;
use filedrop::engine::{Engine, EngineSettings};
use filedrop::handlers::{
    AcceptHandler, FileHandler, HandlerError, NoopPostProcessor, PostProcessor, ProcessingFile,
};

/// Sleeps, then returns a fixed verdict
struct SlowHandler {
    delay: Duration,
    verdict: bool,
}

#[async_trait]
impl FileHandler for SlowHandler {
    async fn handle_file(&self, _file: &ProcessingFile) -> Result<bool, HandlerError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.verdict)
    }
}

struct FailingHandler;

#[async_trait]
impl FileHandler for FailingHandler {
    async fn handle_file(&self, file: &ProcessingFile) -> Result<bool, HandlerError> {
        Err(HandlerError::InvalidContent(format!(
            "cannot parse {}",
            file.original_name()
        )))
    }
}

#[derive(Default)]
struct RecordingPostProcessor {
    calls: Mutex<Vec<(PathBuf, bool)>>,
}

#[async_trait]
impl PostProcessor for RecordingPostProcessor {
    async fn post_process(&self, destination: &Path, successful: bool) -> Result<(), HandlerError> {
        self.calls.lock().push((destination.to_path_buf(), successful));
        Ok(())
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        idle_wait: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(5),
        ..EngineSettings::default()
    }
}

/// Write outside the drop directory, then rename in, the way producers must
fn drop_file(temp_dir: &TempDir, drop: &Path, name: &str, content: &[u8]) {
    let staging = temp_dir.path().join("staging");
    fs::create_dir_all(&staging).unwrap();
    let staged = staging.join(name);
    fs::write(&staged, content).unwrap();
    fs::rename(&staged, drop.join(name)).unwrap();
}

fn file_names(dir: &Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invoice_routed_to_filepath_template() {
    let temp_dir = TempDir::new().unwrap();
    let drop = temp_dir.path().join("drop");
    let out = temp_dir.path().join("out");

    let endpoint = EndpointDescriptor::builder()
        .name("invoices")
        .drop_path(&drop)
        .success_path(format!("{}/%filepath%", out.display()))
        .failure_path(temp_dir.path().join("err").display().to_string())
        .recovery_interval(Duration::from_secs(5))
        .build();
    let post_processor = Arc::new(RecordingPostProcessor::default());

    let mut engine = Engine::builder()
        .endpoint(endpoint)
        .handler(Arc::new(SlowHandler {
            delay: Duration::from_secs(1),
            verdict: true,
        }))
        .post_processor(post_processor.clone())
        .settings(settings())
        .build()
        .unwrap();
    engine.start().await.unwrap();

    // Someone else's live claim sits next to the new drop and must be left alone.
    fs::write(drop.join("other.txt.feedface.inprogress"), b"busy").unwrap();
    drop_file(&temp_dir, &drop, "invoice.txt", b"total=42");

    let routed = wait_until(Duration::from_secs(10), || {
        file_names(&out)
            .iter()
            .any(|n| n.starts_with("invoice.txt.suc_"))
    })
    .await;
    engine.stop().await;

    assert!(routed, "invoice.txt never reached the success directory");
    assert_eq!(file_names(&drop), vec!["other.txt.feedface.inprogress"]);

    let calls = post_processor.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1);
    assert_eq!(calls[0].0.parent().unwrap(), out);
    assert_eq!(fs::read(&calls[0].0).unwrap(), b"total=42");

    let metrics = engine.metrics().snapshot();
    assert_eq!(metrics.files_succeeded, 1);
    assert_eq!(metrics.files_failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_handler_routes_to_failure_path() {
    let temp_dir = TempDir::new().unwrap();
    let drop = temp_dir.path().join("drop");
    let err = temp_dir.path().join("err");

    let endpoint = EndpointDescriptor::builder()
        .name("orders")
        .drop_path(&drop)
        .success_path(temp_dir.path().join("out").display().to_string())
        .failure_path(err.display().to_string())
        .discovery(DiscoveryKind::Poll)
        .polling_interval(Duration::from_millis(100))
        .monitor_subdirectories(true)
        .build();
    let post_processor = Arc::new(RecordingPostProcessor::default());

    let mut engine = Engine::builder()
        .endpoint(endpoint)
        .handler(Arc::new(FailingHandler))
        .post_processor(post_processor.clone())
        .settings(settings())
        .build()
        .unwrap();
    engine.start().await.unwrap();

    fs::create_dir_all(drop.join("2026")).unwrap();
    drop_file(&temp_dir, &drop.join("2026"), "order.xml", b"<broken");

    let routed = wait_until(Duration::from_secs(10), || {
        file_names(&err.join("2026"))
            .iter()
            .any(|n| n.starts_with("order.xml.err_"))
    })
    .await;
    engine.stop().await;

    assert!(routed, "order.xml never reached the failure directory");
    let calls = post_processor.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scavenger_recovers_abandoned_claim() {
    let temp_dir = TempDir::new().unwrap();
    let drop = temp_dir.path().join("drop");
    let out = temp_dir.path().join("out");
    fs::create_dir_all(&drop).unwrap();

    // Left behind by an instance that crashed mid-file
    fs::write(drop.join("report.csv.deadbeef.inprogress"), b"a,b").unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let endpoint = EndpointDescriptor::builder()
        .name("reports")
        .drop_path(&drop)
        .success_path(out.display().to_string())
        .failure_path(temp_dir.path().join("err").display().to_string())
        .scavenge_interval(Duration::from_millis(100))
        .recovery_interval(Duration::from_millis(300))
        .build();

    let mut engine = Engine::builder()
        .endpoint(endpoint)
        .handler(Arc::new(AcceptHandler))
        .post_processor(Arc::new(NoopPostProcessor))
        .settings(settings())
        .build()
        .unwrap();
    engine.start().await.unwrap();

    let routed = wait_until(Duration::from_secs(10), || {
        file_names(&out)
            .iter()
            .any(|n| n.starts_with("report.csv.suc_"))
    })
    .await;
    engine.stop().await;

    assert!(routed, "abandoned claim was never recovered");
    assert!(file_names(&drop).is_empty());
    assert!(engine.metrics().snapshot().files_scavenged >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_engines_process_each_file_once() {
    let temp_dir = TempDir::new().unwrap();
    let drop = temp_dir.path().join("drop");
    let out = temp_dir.path().join("out");
    fs::create_dir_all(&drop).unwrap();

    for i in 0..20 {
        fs::write(drop.join(format!("batch-{i:02}.dat")), b"x").unwrap();
    }

    let mut engines = Vec::new();
    for name in ["left", "right"] {
        let endpoint = EndpointDescriptor::builder()
            .name(name)
            .drop_path(&drop)
            .success_path(out.display().to_string())
            .failure_path(temp_dir.path().join("err").display().to_string())
            .consumers(3)
            .build();
        let engine = Engine::builder()
            .endpoint(endpoint)
            .handler(Arc::new(SlowHandler {
                delay: Duration::from_millis(10),
                verdict: true,
            }))
            .post_processor(Arc::new(NoopPostProcessor))
            .settings(settings())
            .build()
            .unwrap();
        engines.push(engine);
    }
    for engine in &mut engines {
        engine.start().await.unwrap();
    }

    let done = wait_until(Duration::from_secs(10), || file_names(&out).len() >= 20).await;
    for engine in &mut engines {
        engine.stop().await;
    }

    assert!(done, "not every file was processed");
    assert_eq!(file_names(&out).len(), 20);
    assert!(file_names(&drop).is_empty());

    let succeeded: u64 = engines
        .iter()
        .map(|e| e.metrics().snapshot().files_succeeded)
        .sum();
    assert_eq!(succeeded, 20);
}

#[tokio::test]
async fn test_start_is_idempotent_and_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let drop = temp_dir.path().join("a").join("drop");
    let work = temp_dir.path().join("a").join("work");

    let endpoint = EndpointDescriptor::builder()
        .name("idempotent")
        .drop_path(&drop)
        .in_progress_path(&work)
        .success_path("/unused/out")
        .failure_path("/unused/err")
        .build();

    let mut engine = Engine::builder()
        .endpoint(endpoint)
        .handler(Arc::new(AcceptHandler))
        .post_processor(Arc::new(NoopPostProcessor))
        .settings(settings())
        .build()
        .unwrap();

    engine.start().await.unwrap();
    let first = engine.instance_id().clone();
    engine.start().await.unwrap();

    assert!(engine.is_running());
    assert_eq!(engine.instance_id(), &first);
    assert!(drop.is_dir());
    assert!(work.is_dir());

    engine.stop().await;
    assert!(!engine.is_running());
    engine.stop().await;
}

#[test]
fn test_builder_rejects_invalid_endpoint() {
    let endpoint = EndpointDescriptor::builder()
        .name("broken")
        .drop_path("/data/drop")
        .success_path("/data/out")
        .failure_path("/data/err")
        .consumers(0)
        .build();

    let result = Engine::builder()
        .endpoint(endpoint)
        .handler(Arc::new(AcceptHandler))
        .post_processor(Arc::new(NoopPostProcessor))
        .build();

    assert!(result.is_err());
}
