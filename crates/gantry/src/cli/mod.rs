//! Command-line definition for build programs

use std::path::PathBuf;

use clap::Parser;
use gantry_core::config::load_config_or_default;
use gantry_core::{Config, Result};
use tracing::debug;

/// Run build tasks and their dependencies
#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Print debug logs and full stack traces
    #[arg(long)]
    pub debug: bool,

    /// Print trace logs; implies --debug
    #[arg(long)]
    pub trace: bool,

    /// Working directory
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,

    /// Tasks to run, in order (default: help)
    pub tasks: Vec<String>,
}

impl Cli {
    /// Directory the run starts from, after applying `-C`
    pub fn start_dir(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(match &self.directory {
            Some(dir) => cwd.join(dir),
            None => cwd,
        })
    }

    /// Layered configuration with command-line flags applied last
    pub fn load_config(&self, start_dir: &std::path::Path) -> Result<Config> {
        let (mut config, path) = load_config_or_default(start_dir)?;
        if let Some(path) = &path {
            debug!(path = %path.display(), "loaded configuration");
        }

        if self.debug {
            config.log.debug = true;
        }
        if self.trace {
            config.log.trace = true;
        }
        if config.debug() {
            config.cleanup = false;
        }
        Ok(config)
    }

    /// Requested tasks, falling back to `help`
    pub fn task_names(&self) -> Vec<String> {
        if self.tasks.is_empty() {
            vec!["help".to_string()]
        } else {
            self.tasks.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags_and_tasks() {
        let cli = Cli::try_parse_from(["gantry", "--debug", "-C", "sub", "lint", "test"]).unwrap();
        assert!(cli.debug);
        assert!(!cli.trace);
        assert_eq!(cli.directory, Some(PathBuf::from("sub")));
        assert_eq!(cli.task_names(), vec!["lint", "test"]);
    }

    #[test]
    fn test_default_task_is_help() {
        let cli = Cli::try_parse_from(["gantry"]).unwrap();
        assert_eq!(cli.task_names(), vec!["help"]);
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("gantry.toml"),
            "[log]\ndebug = false\n[run]\noutput_grace_secs = 3\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from(["gantry", "--trace"]).unwrap();
        let config = cli.load_config(temp.path()).unwrap();

        assert!(config.log.trace);
        assert!(config.debug());
        assert!(!config.cleanup);
        assert_eq!(config.run.output_grace_secs, 3);
        assert!(config.root_dir.is_some());
    }
}
