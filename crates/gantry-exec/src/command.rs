//! Command description and its builder options

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use console::style;
use gantry_core::Result;

use crate::tee::Sink;

/// Arguments past this many are truncated in log lines
const DISPLAY_MAX_ARGS: usize = 16;

/// Per-argument display limit once [`DISPLAY_MAX_ARGS`] is exceeded
const DISPLAY_MAX_ARG_LEN: usize = 16;

/// Where a child output stream goes
#[derive(Debug, Clone, Default)]
pub enum Output {
    /// Buffered in memory. For stdout this is the command's result.
    #[default]
    Capture,
    /// Echoed to the matching host stream
    Terminal,
    /// Dropped
    Discard,
    /// Written to each of the given sinks
    Sinks(Vec<Sink>),
}

impl Output {
    pub fn sink(writer: impl Write + Send + 'static) -> Self {
        Output::Sinks(vec![Sink::new(writer)])
    }
}

/// What the child reads on stdin
#[derive(Debug, Clone, Default)]
pub enum Input {
    #[default]
    Null,
    Inherit,
    Bytes(Vec<u8>),
}

/// An external command plus how to run it
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) dir: Option<PathBuf>,
    pub(crate) stdout: Output,
    pub(crate) stderr: Output,
    pub(crate) stdin: Input,
    pub(crate) quiet: bool,
    pub(crate) no_fail: bool,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            dir: None,
            stdout: Output::Capture,
            stderr: Output::Terminal,
            stdin: Input::Null,
            quiet: false,
            no_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable. Explicit entries bypass the deny-list.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Run in `dir` instead of the current directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn stdout(mut self, output: Output) -> Self {
        self.stdout = output;
        self
    }

    pub fn stderr(mut self, output: Output) -> Self {
        self.stderr = output;
        self
    }

    pub fn stdin(mut self, input: Input) -> Self {
        self.stdin = input;
        self
    }

    pub fn stdin_bytes(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin(Input::Bytes(bytes.into()))
    }

    /// Let the child read the host's stdin
    pub fn inherit_stdin(self) -> Self {
        self.stdin(Input::Inherit)
    }

    /// Also write stdout to `path`. The file is created or truncated now.
    ///
    /// Once a file is attached, stdout is no longer the command's result.
    pub fn stdout_to_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let file = Sink::file(path)?;
        self.stdout = match self.stdout {
            Output::Capture | Output::Discard => Output::Sinks(vec![file]),
            Output::Terminal => Output::Sinks(vec![Sink::stdout(), file]),
            Output::Sinks(mut sinks) => {
                sinks.push(file);
                Output::Sinks(sinks)
            }
        };
        Ok(self)
    }

    /// Log the command line at debug level and hide stderr unless debugging
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Report failure as a debug log and succeed anyway
    pub fn no_fail(mut self) -> Self {
        self.no_fail = true;
        self
    }

    /// Append linker flags, merging into an existing `-ldflags` argument
    pub fn ldflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let joined = flags
            .into_iter()
            .map(Into::into)
            .collect::<Vec<_>>()
            .join(" ");

        match self.args.iter().position(|a| a == "-ldflags") {
            Some(i) if i + 1 < self.args.len() => {
                let existing = &mut self.args[i + 1];
                existing.push(' ');
                existing.push_str(&joined);
            }
            Some(_) => self.args.push(joined),
            None => {
                self.args.push("-ldflags".to_string());
                self.args.push(joined);
            }
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn is_no_fail(&self) -> bool {
        self.no_fail
    }

    /// Full command line with arguments quoted where they contain spaces
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Abbreviated command line for log output
    pub fn display_line(&self, debug: bool) -> String {
        let mut parts = vec![display_program(&self.program, debug)];
        parts.extend(display_args(&self.args).iter().map(|a| quote_arg(a)));
        parts.join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if !arg.contains(' ') {
        arg.to_string()
    } else if arg.contains('\'') {
        format!("\"{arg}\"")
    } else {
        format!("'{arg}'")
    }
}

/// Arguments past the display limit are cut to a fixed width
pub fn display_args(args: &[String]) -> Vec<String> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            if i > DISPLAY_MAX_ARGS && arg.chars().count() > DISPLAY_MAX_ARG_LEN {
                arg.chars().take(DISPLAY_MAX_ARG_LEN).collect()
            } else {
                arg.clone()
            }
        })
        .collect()
}

/// Program path relative to the working directory, with its parent dimmed.
///
/// Programs outside the working directory show only their file name unless
/// debugging.
pub fn display_program(program: &str, debug: bool) -> String {
    let path = Path::new(program);
    if debug || !path.is_absolute() {
        return dim_parent(path);
    }

    let relative = std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf));

    match relative {
        Some(rel) => dim_parent(&rel),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string()),
    }
}

fn dim_parent(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => format!(
            "{}{}",
            style(format!("{}{}", parent.display(), std::path::MAIN_SEPARATOR)).dim(),
            file
        ),
        None => path.display().to_string(),
    }
}
