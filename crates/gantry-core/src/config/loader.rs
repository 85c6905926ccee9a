//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
        "YAML"
    } else {
        "TOML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load the layered configuration for a run started in `dir`.
///
/// Defaults, then the nearest config file (if any), then the process
/// environment. A config file that exists but fails to parse is an error.
pub fn load_config_or_default(dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    let (mut config, path) = match find_config(dir) {
        Some(path) => (load_config(&path)?, Some(path)),
        None => {
            debug!(dir = %dir.display(), "no config found, using defaults");
            (Config::default(), None)
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if config.root_dir.is_none() {
        config.root_dir = Some(find_root_dir(dir));
    }
    Ok((config, path))
}

/// Overlay `DEBUG`, `TRACE`, `ACTIONS_RUNNER_DEBUG` and `CI` onto `config`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let flag = |key: &str| lookup(key).and_then(|v| parse_bool(&v));

    if let Some(trace) = flag("TRACE") {
        config.log.trace = trace;
    }
    if let Some(debug) = flag("DEBUG").or_else(|| flag("ACTIONS_RUNNER_DEBUG")) {
        config.log.debug = debug;
    }
    if let Some(ci) = flag("CI") {
        config.ci = ci;
    }
    if config.debug() || config.ci {
        config.cleanup = false;
    }
}

/// The nearest ancestor of `start` containing `.git`, or `start` itself.
pub fn find_root_dir(start: &Path) -> PathBuf {
    let mut current = start.to_path_buf();
    loop {
        if current.join(".git").exists() {
            return current;
        }
        if !current.pop() {
            return start.to_path_buf();
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" | "" => Some(false),
        _ => None,
    }
}
