//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::{default_env_deny_prefixes, DEFAULT_OUTPUT_GRACE};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory tasks run from (defaults to the git root)
    pub root_dir: Option<PathBuf>,

    /// Running in a CI environment
    pub ci: bool,

    /// Remove temporary files and downloads when done
    pub cleanup: bool,

    /// Logging configuration
    pub log: LogConfig,

    /// Command execution configuration
    pub run: RunConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: None,
            ci: false,
            cleanup: true,
            log: LogConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Config {
    /// Whether debug output (including full stack traces) is enabled
    pub fn debug(&self) -> bool {
        self.log.debug || self.log.trace
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Output debug logging and perform additional diagnostic work
    pub debug: bool,

    /// Enables debug and even more verbose logging
    pub trace: bool,

    /// Directory for JSON log files; no file logging when unset
    pub dir: Option<PathBuf>,
}

/// Command execution configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Inherited environment variables starting with any of these are dropped
    pub env_deny_prefixes: Vec<String>,

    /// Seconds to wait for output copying after a process exits
    pub output_grace_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            env_deny_prefixes: default_env_deny_prefixes(),
            output_grace_secs: DEFAULT_OUTPUT_GRACE.as_secs(),
        }
    }
}

impl RunConfig {
    pub fn output_grace(&self) -> Duration {
        Duration::from_secs(self.output_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.cleanup);
        assert!(!config.debug());
        assert_eq!(config.run.output_grace(), Duration::from_secs(10));
        assert!(config
            .run
            .env_deny_prefixes
            .iter()
            .any(|p| p == "CARGO_MANIFEST_"));
    }

    #[test]
    fn test_trace_implies_debug() {
        let mut config = Config::default();
        config.log.trace = true;
        assert!(config.debug());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("ci = true\n[log]\ndebug = true\n").unwrap();
        assert!(config.ci);
        assert!(config.log.debug);
        assert_eq!(config.run, RunConfig::default());
    }
}
