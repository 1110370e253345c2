use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Engine tuning shared by every endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// How long `stop()` waits for workers to finish their current file
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: HumanDuration,
    /// Upper bound on how long an idle worker sleeps before re-checking shutdown
    #[serde(default = "default_idle_wait")]
    pub idle_wait: HumanDuration,
    /// Claim attempts on a locked file (0 = retry until the error is no longer a lock)
    #[serde(default = "default_claim_max_attempts")]
    pub claim_max_attempts: u32,
    #[serde(default = "default_claim_backoff")]
    pub claim_backoff: HumanDuration,
    /// Polls for an already-routed file when the claimed file vanished before the final move
    #[serde(default = "default_route_poll_attempts")]
    pub route_poll_attempts: u32,
    #[serde(default = "default_route_poll_interval")]
    pub route_poll_interval: HumanDuration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_timeout: default_stop_timeout(),
            idle_wait: default_idle_wait(),
            claim_max_attempts: default_claim_max_attempts(),
            claim_backoff: default_claim_backoff(),
            route_poll_attempts: default_route_poll_attempts(),
            route_poll_interval: default_route_poll_interval(),
        }
    }
}

fn default_stop_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_idle_wait() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_claim_max_attempts() -> u32 {
    3
}

fn default_claim_backoff() -> HumanDuration {
    HumanDuration::from_millis(500)
}

fn default_route_poll_attempts() -> u32 {
    5
}

fn default_route_poll_interval() -> HumanDuration {
    HumanDuration::from_millis(200)
}

/// How an endpoint discovers new files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryKind {
    /// OS change notifications
    #[default]
    Watch,
    /// Fixed-interval directory sweep
    Poll,
    /// Sweep while busy, sleep on a notification hint while empty
    Hybrid,
}

/// One drop directory and where its files go
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub drop_path: PathBuf,
    /// Dedicated directory for claimed files (defaults to claiming in place)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_progress_path: Option<PathBuf>,
    /// Glob on the file name; `;` separates alternatives
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub monitor_subdirectories: bool,
    /// Destination template; `%filepath%` expands to the drop-relative directory
    pub success_path: String,
    pub failure_path: String,
    #[serde(default = "default_scavenge_interval")]
    pub scavenge_interval: HumanDuration,
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval: HumanDuration,
    #[serde(default = "default_polling_interval")]
    pub polling_interval: HumanDuration,
    #[serde(default = "default_consumers")]
    pub consumers: usize,
    #[serde(default)]
    pub discovery: DiscoveryKind,
    /// Directories under the drop path that are never processed
    #[serde(default)]
    pub exclude_dirs: Vec<PathBuf>,
    /// Registered handler name
    #[serde(default = "default_handler")]
    pub handler: String,
    /// Registered post-processor name
    #[serde(default = "default_post_processor")]
    pub post_processor: String,
}

fn default_filter() -> String {
    "*".to_string()
}

fn default_scavenge_interval() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_recovery_interval() -> HumanDuration {
    HumanDuration::from_secs(300)
}

fn default_polling_interval() -> HumanDuration {
    HumanDuration::from_secs(5)
}

fn default_consumers() -> usize {
    1
}

fn default_handler() -> String {
    "accept".to_string()
}

fn default_post_processor() -> String {
    "log".to_string()
}

/// Status HTTP surface
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.endpoints.is_empty());
        assert_eq!(config.engine.stop_timeout.as_duration(), Duration::from_secs(10));
        assert_eq!(config.engine.claim_max_attempts, 3);
        assert_eq!(config.status.bind_addr.to_string(), "127.0.0.1:8080");
        assert!(!config.status.enabled);
    }

    #[test]
    fn test_endpoint_defaults_from_toml() {
        let endpoint: EndpointConfig = toml::from_str(
            r#"
drop_path = "/data/drop"
success_path = "/data/out/%filepath%"
failure_path = "/data/err"
            "#,
        )
        .unwrap();

        assert_eq!(endpoint.filter, "*");
        assert_eq!(endpoint.discovery, DiscoveryKind::Watch);
        assert_eq!(endpoint.consumers, 1);
        assert_eq!(endpoint.recovery_interval.as_duration(), Duration::from_secs(300));
        assert_eq!(endpoint.handler, "accept");
        assert_eq!(endpoint.post_processor, "log");
        assert!(endpoint.in_progress_path.is_none());
    }
}
