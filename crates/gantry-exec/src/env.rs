//! Child process environment filtering

use std::ffi::OsString;

use tracing::trace;

/// Whether `name` starts with any of the denied prefixes
pub fn is_denied(name: &str, deny_prefixes: &[String]) -> bool {
    deny_prefixes
        .iter()
        .any(|prefix| name.starts_with(prefix.as_str()))
}

/// Split `vars` into the entries to pass on and the names that were dropped
pub fn filter_env<I>(
    vars: I,
    deny_prefixes: &[String],
) -> (Vec<(OsString, OsString)>, Vec<String>)
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut kept = Vec::new();
    let mut dropped = Vec::new();

    for (name, value) in vars {
        let lossy = name.to_string_lossy();
        if is_denied(&lossy, deny_prefixes) {
            dropped.push(lossy.into_owned());
        } else {
            kept.push((name, value));
        }
    }

    (kept, dropped)
}

/// Snapshot the host environment, minus denied variables
pub fn inherited_env(deny_prefixes: &[String]) -> Vec<(OsString, OsString)> {
    let (kept, dropped) = filter_env(std::env::vars_os(), deny_prefixes);
    for name in &dropped {
        trace!(name = %name, "dropped environment entry");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        vec!["CARGO_PKG_".to_string(), "RUSTC".to_string()]
    }

    #[test]
    fn test_is_denied() {
        assert!(is_denied("CARGO_PKG_NAME", &prefixes()));
        assert!(is_denied("RUSTC_WRAPPER", &prefixes()));
        assert!(!is_denied("CARGO_HOME", &prefixes()));
        assert!(!is_denied("PATH", &prefixes()));
    }

    #[test]
    fn test_filter_env() {
        let vars = vec![
            (OsString::from("PATH"), OsString::from("/bin")),
            (OsString::from("CARGO_PKG_VERSION"), OsString::from("1.0.0")),
            (OsString::from("HOME"), OsString::from("/root")),
        ];

        let (kept, dropped) = filter_env(vars, &prefixes());

        let names: Vec<_> = kept
            .iter()
            .map(|(k, _)| k.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["PATH", "HOME"]);
        assert_eq!(dropped, vec!["CARGO_PKG_VERSION"]);
    }
}
