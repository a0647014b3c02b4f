use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Runtime knobs consumed by [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Label used in runtime log lines.
    pub name: String,
    /// Initial level of per-service loggers: "trace" | "debug" | "info" | "warn" | "error" | "off".
    pub log_level: String,
    /// Floor interval between dependency resolution attempts.
    #[serde(with = "humantime_serde")]
    pub dependency_poll_interval: Duration,
    /// Give up on unresolved dependencies after this long. `None` waits forever.
    #[serde(with = "humantime_serde")]
    pub dependency_timeout: Option<Duration>,
    /// Per-hook bound during shutdown. `None` waits for every hook to return.
    #[serde(with = "humantime_serde")]
    pub shutdown_hook_timeout: Option<Duration>,
    /// Install the built-in subscriber that logs every lifecycle event.
    pub lifecycle_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "runtime".to_string(),
            log_level: "info".to_string(),
            dependency_poll_interval: Duration::from_millis(10),
            dependency_timeout: None,
            shutdown_hook_timeout: None,
            lifecycle_logging: true,
        }
    }
}

impl RuntimeConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn log_level_filter(&self) -> LevelFilter {
        parse_level_filter(&self.log_level)
    }
}

/// Lenient level parsing: unknown values fall back to INFO.
pub fn parse_level_filter(s: &str) -> LevelFilter {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" | "none" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}
