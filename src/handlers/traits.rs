use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use super::types::ProcessingFile;

/// Handler errors; any of them routes the file to the failure path
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid content: {0}")]
    InvalidContent(String),
}

/// Business logic applied to each claimed file
///
/// `Ok(true)` routes the file to the success path; `Ok(false)`, an error or a
/// panic routes it to the failure path.
#[async_trait]
pub trait FileHandler: Send + Sync {
    async fn handle_file(&self, file: &ProcessingFile) -> Result<bool, HandlerError>;
}

/// Side effects after a file has been filed away (notifications, audit, ...)
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn post_process(&self, destination: &Path, successful: bool) -> Result<(), HandlerError>;
}
