//! Tracing subscriber setup

use std::path::{Path, PathBuf};

use gantry_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Set up tracing with up to two layers:
/// - Console: `RUST_LOG` if set, else the level implied by the config
/// - File: debug-level JSON under `log.dir`, when configured
///
/// Installing twice is a no-op.
pub fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(config)));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    if let Some(log_dir) = config.log.dir.as_deref().and_then(log_directory) {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "gantry.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let _ = tracing_subscriber::registry()
            .with(console)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new("debug")),
            )
            .try_init();

        return Some(guard);
    }

    let _ = tracing_subscriber::registry().with(console).try_init();
    None
}

fn default_level(config: &Config) -> &'static str {
    if config.log.trace {
        "trace"
    } else if config.log.debug {
        "debug"
    } else {
        "info"
    }
}

/// Expand a leading `~` and create the directory
fn log_directory(dir: &Path) -> Option<PathBuf> {
    let dir = match dir.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()?.join(rest),
        Err(_) => dir.to_path_buf(),
    };
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
