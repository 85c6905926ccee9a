//! Error types for Gantry
//!
//! Every fallible operation in the workspace returns [`Result`], whose error
//! is a [`TracedError`]: a [`GantryError`] enriched with an optional process
//! exit code, the stack trace captured where the error was first raised, and
//! an optional pre-rendered log block (usually the buffered output of a failed
//! command).
//!
//! The outermost caller recovers errors with [`catch`] and reports them once
//! through [`handle_errors`].

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use console::style;
use thiserror::Error;

/// Result type alias using TracedError
pub type Result<T> = std::result::Result<T, TracedError>;

/// Exit code used when an error does not carry its own
pub const DEFAULT_EXIT_CODE: i32 = 1;

/// Frames whose function path starts with one of these are framework
/// internals and are hidden from reports unless debug output is enabled.
const INTERNAL_FRAME_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "tokio::",
    "test::",
    "gantry_core::",
    "gantry_exec::",
    "gantry_tasks::",
    "rust_begin_unwind",
    "__rust",
    "__libc",
    "_start",
    "start_thread",
    "clone",
    "<alloc::",
    "<core::",
    "<std::",
];

/// Main error type for Gantry operations
#[derive(Debug, Error)]
pub enum GantryError {
    /// A task name matched no registered task
    #[error("no tasks named: {0}")]
    UnknownTask(String),

    /// Nothing was registered, so there is no default task to run
    #[error("no tasks defined")]
    NoTasks,

    /// An external command failed to start or exited non-zero
    #[error("error executing: '{command}': {reason}")]
    CommandExecution {
        command: String,
        reason: String,
        exit_code: Option<i32>,
        log: String,
    },

    /// Sentinel: stop now, successfully
    #[error("OK")]
    Stop,

    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A panic recovered by [`catch`]
    #[error("{0}")]
    Panic(String),

    /// Errors raised by host code
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

impl GantryError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(anyhow::anyhow!(msg.into()))
    }
}

/// One frame of a captured stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Demangled function path
    pub function: String,
    /// `file:line:col`, when symbol information is available
    pub location: Option<String>,
}

impl Frame {
    /// Whether this frame belongs to the runtime or to Gantry itself
    pub fn is_internal(&self) -> bool {
        INTERNAL_FRAME_PREFIXES
            .iter()
            .any(|prefix| self.function.starts_with(prefix))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}\n\t{}", self.function, location),
            None => write!(f, "{}", self.function),
        }
    }
}

/// A [`GantryError`] enriched with exit code, stack trace and log output
pub struct TracedError {
    error: GantryError,
    exit_code: Option<i32>,
    stack: Vec<Frame>,
    log: Option<String>,
}

impl TracedError {
    /// Wrap an error, capturing the current stack
    pub fn new(error: impl Into<GantryError>) -> Self {
        let error = error.into();
        let (exit_code, log) = match &error {
            GantryError::CommandExecution { exit_code, log, .. } => {
                (*exit_code, (!log.is_empty()).then(|| log.clone()))
            }
            _ => (None, None),
        };
        Self {
            error,
            exit_code,
            stack: capture_frames(),
            log,
        }
    }

    /// The sentinel "stop now, successfully" error
    pub fn stop() -> Self {
        Self {
            error: GantryError::Stop,
            exit_code: None,
            stack: Vec::new(),
            log: None,
        }
    }

    /// Set the process exit code to report
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    /// Attach a pre-rendered log block
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }

    /// Append the frames of the current stack, keeping the original ones
    pub fn append_stack_trace(mut self) -> Self {
        self.stack.extend(capture_frames());
        self
    }

    pub fn error(&self) -> &GantryError {
        &self.error
    }

    pub fn into_inner(self) -> GantryError {
        self.error
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn log(&self) -> Option<&str> {
        self.log.as_deref()
    }

    /// All captured frames, internal ones included
    pub fn stack(&self) -> &[Frame] {
        &self.stack
    }

    /// Frames to show in a report; internal frames are kept only in debug
    pub fn visible_frames(&self, debug: bool) -> Vec<&Frame> {
        self.stack
            .iter()
            .filter(|frame| debug || !frame.is_internal())
            .collect()
    }

    /// Whether this is the sentinel OK error
    pub fn is_stop(&self) -> bool {
        matches!(self.error, GantryError::Stop)
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with a non-string payload".to_string()
        };
        Self::new(GantryError::Panic(message))
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit code {})", code)?;
        }
        if let Some(log) = &self.log {
            write!(f, "\n{}", log.trim_end())?;
        }
        Ok(())
    }
}

impl fmt::Debug for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedError")
            .field("error", &self.error)
            .field("exit_code", &self.exit_code)
            .field("log", &self.log)
            .field("frames", &self.stack.len())
            .finish()
    }
}

impl std::error::Error for TracedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<GantryError> for TracedError {
    fn from(error: GantryError) -> Self {
        Self::new(error)
    }
}

impl From<ConfigError> for TracedError {
    fn from(error: ConfigError) -> Self {
        Self::new(error)
    }
}

impl From<std::io::Error> for TracedError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error)
    }
}

impl From<anyhow::Error> for TracedError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

/// Extension methods for results carrying a [`TracedError`]
pub trait ResultExt<T> {
    /// Append the caller's stack to the error, if any
    fn append_stack_trace(self) -> Result<T>;

    /// Override the exit code reported for the error, if any
    fn with_exit_code(self, exit_code: i32) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn append_stack_trace(self) -> Result<T> {
        self.map_err(TracedError::append_stack_trace)
    }

    fn with_exit_code(self, exit_code: i32) -> Result<T> {
        self.map_err(|e| e.with_exit_code(exit_code))
    }
}

/// Run `f`, turning both returned errors and panics into a `Result`.
///
/// Used for steps that must not take the whole run down with them.
pub fn catch<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(TracedError::from_panic(payload)),
    }
}

/// Render the report printed for an unrecovered error.
///
/// Returns `None` for the sentinel OK error, which is not reported.
pub fn render_report(err: &TracedError, debug: bool) -> Option<String> {
    if err.is_stop() {
        return None;
    }

    let headline = format!("ERROR: {}", err.error());
    let mut out = format!(
        "\n{}\n",
        style(format!("\n {} \n", headline.trim())).white().on_red()
    );

    if let Some(log) = err.log() {
        let log = log.trim();
        if !log.is_empty() {
            out.push('\n');
            out.push_str(log);
            out.push('\n');
        }
    }

    if debug {
        let frames = err.visible_frames(true);
        if !frames.is_empty() {
            let trace = frames
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("\n");
            out.push('\n');
            out.push_str(&style(trace).dim().to_string());
            out.push('\n');
        }
    }

    Some(out)
}

/// Report the outcome of a whole run and return the process exit code.
///
/// Sentinel OK and success exit 0; any other error is printed to stderr and
/// exits with its carried code, or [`DEFAULT_EXIT_CODE`].
pub fn handle_errors(result: Result<()>, debug: bool) -> i32 {
    let err = match result {
        Ok(()) => return 0,
        Err(err) => err,
    };

    match render_report(&err, debug) {
        None => 0,
        Some(report) => {
            eprintln!("{}", report);
            match err.exit_code() {
                Some(code) if code > 0 => code,
                _ => DEFAULT_EXIT_CODE,
            }
        }
    }
}

fn capture_frames() -> Vec<Frame> {
    let backtrace = Backtrace::force_capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_backtrace(&backtrace.to_string())
}

fn parse_backtrace(rendered: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for line in rendered.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.location = Some(location.to_string());
            }
            continue;
        }
        let Some((index, function)) = line.split_once(": ") else {
            continue;
        };
        if index.chars().all(|c| c.is_ascii_digit()) {
            frames.push(Frame {
                function: function.trim().to_string(),
                location: None,
            });
        }
    }
    // drop the capture machinery itself
    frames.retain(|f| !f.function.contains("error::capture_frames"));
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_execution_populates_exit_code_and_log() {
        let err = TracedError::new(GantryError::CommandExecution {
            command: "false".to_string(),
            reason: "exit status: 2".to_string(),
            exit_code: Some(2),
            log: "STDERR:\nboom".to_string(),
        });

        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(err.log(), Some("STDERR:\nboom"));
        let text = err.to_string();
        assert!(text.contains("error executing: 'false'"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_stop_is_not_reported() {
        let err = TracedError::stop();
        assert!(err.is_stop());
        assert!(render_report(&err, false).is_none());
        assert_eq!(handle_errors(Err(TracedError::stop()), false), 0);
    }

    #[test]
    fn test_handle_errors_exit_codes() {
        assert_eq!(handle_errors(Ok(()), false), 0);

        let plain = TracedError::new(GantryError::UnknownTask("nope".into()));
        assert_eq!(handle_errors(Err(plain), false), DEFAULT_EXIT_CODE);

        let coded = TracedError::new(GantryError::other("bad")).with_exit_code(7);
        assert_eq!(handle_errors(Err(coded), false), 7);
    }

    #[test]
    fn test_report_includes_log() {
        let err = TracedError::new(GantryError::other("bad thing")).with_log("captured output");
        let report = render_report(&err, false).unwrap();
        assert!(report.contains("bad thing"));
        assert!(report.contains("captured output"));
    }

    #[test]
    fn test_report_shows_stack_only_when_debugging() {
        let mut err = TracedError::new(GantryError::other("bad thing"));
        err.stack = vec![Frame {
            function: "my_make::build".into(),
            location: Some("src/main.rs:20:5".into()),
        }];

        let plain = render_report(&err, false).unwrap();
        assert!(plain.contains("bad thing"));
        assert!(!plain.contains("my_make::build"));
        assert!(!plain.contains("src/main.rs"));

        let debug = render_report(&err, true).unwrap();
        assert!(debug.contains("my_make::build"));
        assert!(debug.contains("src/main.rs:20:5"));
    }

    #[test]
    fn test_catch_returns_error() {
        let result = catch(|| Err(GantryError::UnknownTask("x".into()).into()));
        let err = result.unwrap_err();
        assert!(matches!(err.error(), GantryError::UnknownTask(name) if name == "x"));
    }

    #[test]
    fn test_catch_recovers_panics() {
        let result = catch(|| panic!("something broke"));
        let err = result.unwrap_err();
        assert!(matches!(err.error(), GantryError::Panic(msg) if msg == "something broke"));
    }

    #[test]
    fn test_catch_passes_success() {
        assert!(catch(|| Ok(())).is_ok());
    }

    #[test]
    fn test_append_stack_trace_keeps_existing_frames() {
        let err = TracedError::new(GantryError::NoTasks);
        let before = err.stack().len();
        let err = err.append_stack_trace();
        assert!(err.stack().len() >= before);
    }

    #[test]
    fn test_result_ext_sets_exit_code() {
        let result: Result<()> = Err(GantryError::NoTasks.into());
        let err = result.with_exit_code(3).unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
    }

    #[test]
    fn test_parse_backtrace() {
        let rendered = concat!(
            "   0: my_make::build\n",
            "             at ./src/main.rs:20:5\n",
            "   1: std::rt::lang_start\n",
            "             at /rustc/library/std/src/rt.rs:1:1\n",
            "   2: gantry_tasks::executor::run\n",
        );
        let frames = parse_backtrace(rendered);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].function, "my_make::build");
        assert_eq!(frames[0].location.as_deref(), Some("./src/main.rs:20:5"));
        assert!(!frames[0].is_internal());
        assert!(frames[1].is_internal());
        assert!(frames[2].is_internal());
    }

    #[test]
    fn test_visible_frames_filters_internal_unless_debug() {
        let mut err = TracedError::new(GantryError::NoTasks);
        err.stack = vec![
            Frame {
                function: "my_make::main".into(),
                location: Some("src/main.rs:20:5".into()),
            },
            Frame {
                function: "gantry_exec::runner::Session::run".into(),
                location: None,
            },
        ];

        assert_eq!(err.visible_frames(false).len(), 1);
        assert_eq!(err.visible_frames(true).len(), 2);
    }
}
