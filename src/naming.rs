//! File naming conventions for claimed and routed files
//!
//! - claimed by a worker: `<name>.<instance>.inprogress`
//! - claimed by the scavenger: `<name>.<instance>.enqueue.inprogress`
//! - routed: `<name>.suc_<timestamp>` / `<name>.err_<timestamp>`

use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const IN_PROGRESS_EXTENSION: &str = "inprogress";
pub const ENQUEUE_INFIX: &str = "enqueue";
pub const SUCCESS_MARKER: &str = "suc";
pub const FAILURE_MARKER: &str = "err";

/// Process-unique token embedded in claimed file names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a path carries the in-progress marker
pub fn is_in_progress(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(IN_PROGRESS_EXTENSION))
}

pub fn claimed_name(file_name: &str, instance: &InstanceId) -> String {
    format!("{}.{}.{}", file_name, instance, IN_PROGRESS_EXTENSION)
}

pub fn enqueue_name(file_name: &str, instance: &InstanceId) -> String {
    format!(
        "{}.{}.{}.{}",
        file_name, instance, ENQUEUE_INFIX, IN_PROGRESS_EXTENSION
    )
}

/// Recover the dropped file name from any instance's in-progress name
pub fn original_name(in_progress_name: &str) -> Option<&str> {
    let rest = in_progress_name.strip_suffix(IN_PROGRESS_EXTENSION)?;
    let rest = rest.strip_suffix('.')?;
    let rest = rest
        .strip_suffix(ENQUEUE_INFIX)
        .and_then(|r| r.strip_suffix('.'))
        .unwrap_or(rest);
    let (original, instance) = rest.rsplit_once('.')?;

    if original.is_empty() || instance.is_empty() {
        return None;
    }
    Some(original)
}

/// Sortable, digits-only UTC timestamp with nanosecond resolution
pub fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S%9f").to_string()
}

pub fn routed_name(file_name: &str, successful: bool, timestamp: &str) -> String {
    format!("{}.{}_{}", file_name, marker(successful), timestamp)
}

pub fn marker(successful: bool) -> &'static str {
    if successful {
        SUCCESS_MARKER
    } else {
        FAILURE_MARKER
    }
}

/// Prefix shared by every routed variant of `file_name` for one outcome
pub fn routed_prefix(file_name: &str, successful: bool) -> String {
    format!("{}.{}_", file_name, marker(successful))
}

/// Alternative restore target when the original name is taken: `<stem>_<timestamp>.<ext>`
pub fn disambiguated(path: &Path, timestamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, timestamp),
    };
    path.with_file_name(name)
}
