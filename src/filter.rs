//! File filters shared by discovery and the scavenger

use crate::endpoint::EndpointDescriptor;
use crate::naming;
use glob::{MatchOptions, Pattern, PatternError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decides whether a discovered path should be processed at all
pub trait FileFilter: Send + Sync {
    fn accepts(&self, path: &Path) -> bool;
}

impl<F> FileFilter for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn accepts(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Glob patterns matched against the file name; `;` separates alternatives
#[derive(Debug, Clone)]
pub struct PatternFilter {
    patterns: Vec<Pattern>,
    wildcard: bool,
}

impl PatternFilter {
    pub fn parse(patterns: &str) -> Result<Self, PatternError> {
        let patterns = patterns
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Pattern::new)
            .collect::<Result<Vec<_>, _>>()?;

        let wildcard = patterns
            .iter()
            .any(|p| matches!(p.as_str(), "*" | "*.*"));

        Ok(Self { patterns, wildcard })
    }
}

impl FileFilter for PatternFilter {
    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        // Claimed files match a wildcard too; they are never candidates.
        if naming::is_in_progress(path) {
            return false;
        }

        if self.wildcard {
            return true;
        }

        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::default()
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(name, options))
    }
}

/// Rejects anything below one of the listed directories
#[derive(Debug, Clone, Default)]
pub struct ExcludedDirectories {
    dirs: Vec<PathBuf>,
}

impl ExcludedDirectories {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.dirs.iter().any(|dir| path.starts_with(dir))
    }
}

impl FileFilter for ExcludedDirectories {
    fn accepts(&self, path: &Path) -> bool {
        !self.contains(path)
    }
}

/// Accepts a path only when every member accepts it
#[derive(Clone, Default)]
pub struct AllOf {
    filters: Vec<Arc<dyn FileFilter>>,
}

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.filters.push(filter);
        self
    }
}

impl fmt::Debug for AllOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllOf")
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl FileFilter for AllOf {
    fn accepts(&self, path: &Path) -> bool {
        self.filters.iter().all(|f| f.accepts(path))
    }
}

/// Directories an endpoint must never treat as drop content: configured
/// exclusions plus the claim and routing roots when they live under the drop path.
pub fn excluded_directories(endpoint: &EndpointDescriptor) -> ExcludedDirectories {
    let mut dirs = endpoint.exclude_dirs();

    let nested = [
        endpoint.in_progress_path().map(Path::to_path_buf),
        Some(EndpointDescriptor::template_root(endpoint.success_path())),
        Some(EndpointDescriptor::template_root(endpoint.failure_path())),
    ];
    for dir in nested.into_iter().flatten() {
        if dir.starts_with(endpoint.drop_path()) && dir != endpoint.drop_path() {
            dirs.push(dir);
        }
    }

    ExcludedDirectories::new(dirs)
}

/// Compose the endpoint's own filter with an optional host-supplied one
pub fn for_endpoint(
    endpoint: &EndpointDescriptor,
    additional: Option<Arc<dyn FileFilter>>,
) -> Result<Arc<dyn FileFilter>, PatternError> {
    let mut all = AllOf::new()
        .with(Arc::new(PatternFilter::parse(endpoint.filter())?))
        .with(Arc::new(excluded_directories(endpoint)));

    if let Some(extra) = additional {
        all = all.with(extra);
    }

    Ok(Arc::new(all))
}
