//! Default configuration values

use std::time::Duration;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "gantry.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "gantry.yaml";

/// Hidden configuration file name
pub const ALT_CONFIG_FILE: &str = ".gantry.toml";

/// Time allowed after a process exits for its output to finish copying
pub const DEFAULT_OUTPUT_GRACE: Duration = Duration::from_secs(10);

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML, ALT_CONFIG_FILE]
}

/// Environment variable name prefixes never passed on to child processes.
///
/// These are the variables `cargo run` sets for the make executable itself;
/// leaking them into a nested `cargo` invocation makes it build the wrong
/// package.
pub fn default_env_deny_prefixes() -> Vec<String> {
    [
        "CARGO_PKG_",
        "CARGO_MANIFEST_",
        "CARGO_CRATE_",
        "CARGO_BIN_",
        "CARGO_PRIMARY_PACKAGE",
        "RUSTC",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
