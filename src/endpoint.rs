//! Endpoint descriptor: where files are dropped, claimed and routed

use crate::config::{DiscoveryKind, EndpointConfig, ValidationError};
use crate::filter::PatternFilter;
use bon::Builder;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Template token replaced by the drop-relative directory of the original file
pub const FILEPATH_TOKEN: &str = "%filepath%";

/// Immutable description of one drop directory and its routing targets
#[derive(Debug, Clone, Builder)]
pub struct EndpointDescriptor {
    #[builder(into)]
    name: String,
    #[builder(into)]
    drop_path: PathBuf,
    #[builder(into)]
    in_progress_path: Option<PathBuf>,
    #[builder(into, default = "*".to_string())]
    filter: String,
    #[builder(default)]
    monitor_subdirectories: bool,
    #[builder(into)]
    success_path: String,
    #[builder(into)]
    failure_path: String,
    #[builder(default = Duration::from_secs(30))]
    scavenge_interval: Duration,
    #[builder(default = Duration::from_secs(300))]
    recovery_interval: Duration,
    #[builder(default = Duration::from_secs(5))]
    polling_interval: Duration,
    #[builder(default = 1)]
    consumers: usize,
    #[builder(default)]
    discovery: DiscoveryKind,
    #[builder(default)]
    exclude_dirs: Vec<PathBuf>,
}

impl EndpointDescriptor {
    /// Build and validate a descriptor from its configuration table
    pub fn from_config(name: &str, config: &EndpointConfig) -> Result<Self, ValidationError> {
        let descriptor = Self::builder()
            .name(name)
            .drop_path(config.drop_path.clone())
            .maybe_in_progress_path(config.in_progress_path.clone())
            .filter(config.filter.clone())
            .monitor_subdirectories(config.monitor_subdirectories)
            .success_path(config.success_path.clone())
            .failure_path(config.failure_path.clone())
            .scavenge_interval(config.scavenge_interval.as_duration())
            .recovery_interval(config.recovery_interval.as_duration())
            .polling_interval(config.polling_interval.as_duration())
            .consumers(config.consumers)
            .discovery(config.discovery)
            .exclude_dirs(config.exclude_dirs.clone())
            .build();

        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check required fields once, before anything starts
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing = |field| ValidationError::MissingField {
            endpoint: self.name.clone(),
            field,
        };

        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if self.drop_path.as_os_str().is_empty() {
            return Err(missing("drop_path"));
        }
        if self.success_path.trim().is_empty() {
            return Err(missing("success_path"));
        }
        if self.failure_path.trim().is_empty() {
            return Err(missing("failure_path"));
        }
        if self.filter.trim().is_empty() {
            return Err(missing("filter"));
        }

        PatternFilter::parse(&self.filter).map_err(|e| ValidationError::InvalidFilter {
            endpoint: self.name.clone(),
            filter: self.filter.clone(),
            reason: e.to_string(),
        })?;

        for (field, value) in [
            ("scavenge_interval", self.scavenge_interval),
            ("recovery_interval", self.recovery_interval),
            ("polling_interval", self.polling_interval),
        ] {
            if value.is_zero() {
                return Err(ValidationError::ZeroInterval {
                    endpoint: self.name.clone(),
                    field,
                });
            }
        }

        if self.consumers == 0 {
            return Err(ValidationError::NoConsumers {
                endpoint: self.name.clone(),
            });
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn drop_path(&self) -> &Path {
        &self.drop_path
    }

    /// Dedicated claim directory, if any
    pub fn in_progress_path(&self) -> Option<&Path> {
        self.in_progress_path.as_deref()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn monitor_subdirectories(&self) -> bool {
        self.monitor_subdirectories
    }

    pub fn success_path(&self) -> &str {
        &self.success_path
    }

    pub fn failure_path(&self) -> &str {
        &self.failure_path
    }

    pub fn scavenge_interval(&self) -> Duration {
        self.scavenge_interval
    }

    pub fn recovery_interval(&self) -> Duration {
        self.recovery_interval
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn consumers(&self) -> usize {
        self.consumers
    }

    pub fn discovery(&self) -> DiscoveryKind {
        self.discovery
    }

    /// Excluded directories resolved against the drop path
    pub fn exclude_dirs(&self) -> Vec<PathBuf> {
        self.exclude_dirs
            .iter()
            .map(|dir| self.drop_path.join(dir))
            .collect()
    }

    /// Path of `path` relative to the drop root, or just its file name when it lies elsewhere
    pub fn relative_path(&self, path: &Path) -> PathBuf {
        if let Some(root) = self.in_progress_path() {
            if let Ok(relative) = path.strip_prefix(root) {
                return relative.to_path_buf();
            }
        }

        match path.strip_prefix(&self.drop_path) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
        }
    }

    /// Fixed part of a routing template, i.e. everything before `%filepath%`
    pub fn template_root(template: &str) -> PathBuf {
        let root = match template.find(FILEPATH_TOKEN) {
            Some(pos) => &template[..pos],
            None => template,
        };
        PathBuf::from(root)
    }
}
