use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A file this instance has claimed, handed to the business handler
///
/// `claimed_path` is where the content lives while it is being processed;
/// `original_path` and `original_name` describe where it was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingFile {
    claimed_path: PathBuf,
    original_name: String,
    original_path: PathBuf,
    claimed_at: SystemTime,
}

impl ProcessingFile {
    pub fn new(claimed_path: PathBuf, original_path: PathBuf) -> Self {
        let original_name = original_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            claimed_path,
            original_name,
            original_path,
            claimed_at: SystemTime::now(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_claimed_at(mut self, claimed_at: SystemTime) -> Self {
        self.claimed_at = claimed_at;
        self
    }

    pub fn claimed_path(&self) -> &Path {
        &self.claimed_path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    pub fn claimed_at(&self) -> SystemTime {
        self.claimed_at
    }
}
