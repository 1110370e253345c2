use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use super::traits::{FileHandler, HandlerError, PostProcessor};
use super::types::ProcessingFile;

/// Accepts every file
///
/// Useful when the pipeline only needs to move files from the drop
/// directory to the success location.
#[derive(Debug, Clone, Default)]
pub struct AcceptHandler;

#[async_trait]
impl FileHandler for AcceptHandler {
    async fn handle_file(&self, file: &ProcessingFile) -> Result<bool, HandlerError> {
        debug!(file = file.original_name(), "Accepting file");
        Ok(true)
    }
}

/// Routes every file to the failure path
#[derive(Debug, Clone, Default)]
pub struct RejectHandler;

#[async_trait]
impl FileHandler for RejectHandler {
    async fn handle_file(&self, file: &ProcessingFile) -> Result<bool, HandlerError> {
        debug!(file = file.original_name(), "Rejecting file");
        Ok(false)
    }
}

/// Succeeds for files with content, fails zero-byte drops
#[derive(Debug, Clone, Default)]
pub struct NonEmptyHandler;

#[async_trait]
impl FileHandler for NonEmptyHandler {
    async fn handle_file(&self, file: &ProcessingFile) -> Result<bool, HandlerError> {
        let metadata = tokio::fs::metadata(file.claimed_path()).await?;
        if metadata.len() == 0 {
            return Err(HandlerError::InvalidContent(format!(
                "{} is empty",
                file.original_name()
            )));
        }
        Ok(true)
    }
}

/// Logs where each file ended up
#[derive(Debug, Clone, Default)]
pub struct LogPostProcessor;

#[async_trait]
impl PostProcessor for LogPostProcessor {
    async fn post_process(&self, destination: &Path, successful: bool) -> Result<(), HandlerError> {
        info!(destination = %destination.display(), successful, "File routed");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoopPostProcessor;

#[async_trait]
impl PostProcessor for NoopPostProcessor {
    async fn post_process(&self, _destination: &Path, _successful: bool) -> Result<(), HandlerError> {
        Ok(())
    }
}
