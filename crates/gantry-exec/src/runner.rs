//! Running external commands for the current task

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use gantry_core::{Config, ExitHooks, GantryError, Result, TracedError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::CancelScope;
use crate::collab::{
    CommandResolver, IdentityRenderer, PathResolver, Renderer, Tokenizer, WordTokenizer,
};
use crate::command::{Command, Input, Output};
use crate::env::inherited_env;
use crate::signals::{self, kill_tree, SignalRelay};
use crate::tee::{SharedBuffer, Sink, Tee};

const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Runtime state shared by every task of one invocation
pub struct Session {
    config: Config,
    scope: Arc<CancelScope>,
    runtime: Runtime,
    label: Mutex<Option<String>>,
    resolver: Box<dyn CommandResolver>,
    renderer: Box<dyn Renderer>,
    tokenizer: Box<dyn Tokenizer>,
    exit_hooks: ExitHooks,
    interrupt_cancels: AtomicBool,
}

/// Restores the previous task label when dropped
pub struct TaskLabel<'a> {
    session: &'a Session,
    previous: Option<String>,
}

impl Drop for TaskLabel<'_> {
    fn drop(&mut self) {
        *self.session.lock_label() = self.previous.take();
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
}

impl Session {
    pub fn new(config: Config) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("gantry-exec")
            .enable_all()
            .build()?;

        Ok(Self {
            config,
            scope: Arc::new(CancelScope::new()),
            runtime,
            label: Mutex::new(None),
            resolver: Box::new(PathResolver),
            renderer: Box::new(IdentityRenderer),
            tokenizer: Box::new(WordTokenizer),
            exit_hooks: ExitHooks::new(),
            interrupt_cancels: AtomicBool::new(false),
        })
    }

    pub fn with_resolver(mut self, resolver: impl CommandResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizer = Box::new(tokenizer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn debug(&self) -> bool {
        self.config.debug()
    }

    pub fn exit_hooks(&self) -> &ExitHooks {
        &self.exit_hooks
    }

    /// Shared handle to the cancellation scope, e.g. for a signal handler
    pub fn cancel_scope(&self) -> Arc<CancelScope> {
        self.scope.clone()
    }

    /// Interrupt every running command; later commands start normally
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    /// Scope commands under `parent` from now on
    pub fn set_context(&self, parent: &CancellationToken) {
        self.scope.replace(parent);
    }

    /// Treat SIGINT or SIGTERM caught during a command as the end of the run.
    ///
    /// The interrupted command fails even when marked `no_fail`, and every
    /// other command in flight is cancelled. Between commands the host keeps
    /// its own signal dispositions.
    pub fn cancel_on_interrupt(&self) {
        self.interrupt_cancels.store(true, Ordering::Release);
    }

    fn lock_label(&self) -> MutexGuard<'_, Option<String>> {
        self.label.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Name of the task currently running, if any
    pub fn current_task(&self) -> Option<String> {
        self.lock_label().clone()
    }

    /// Mark `name` as the running task until the guard is dropped
    pub fn enter_task(&self, name: &str) -> TaskLabel<'_> {
        let previous = self.lock_label().replace(name.to_string());
        TaskLabel {
            session: self,
            previous,
        }
    }

    /// Build a command from a single line: render, split, resolve the program
    pub fn parse_line(&self, line: &str) -> Result<Command> {
        let rendered = self.renderer.render(line);
        let mut words = self.tokenizer.split(&rendered).into_iter();
        let Some(name) = words.next() else {
            let message = format!("empty command line: '{line}'");
            return Err(GantryError::other(message).into());
        };

        let program = match self.resolver.resolve(&name) {
            Some(path) => path.to_string_lossy().into_owned(),
            None => {
                debug!(command = %name, "command not resolved, running as given");
                name
            }
        };

        Ok(Command::new(program).args(words))
    }

    /// Run a command given as a single line
    pub fn run_line(&self, line: &str) -> Result<String> {
        let cmd = self.parse_line(line)?;
        self.run(cmd)
    }

    /// Run `cmd` to completion, returning its trimmed stdout.
    ///
    /// Blocks the calling thread. Must not be called from async code.
    pub fn run(&self, cmd: Command) -> Result<String> {
        self.runtime.block_on(self.execute(cmd))
    }

    pub async fn execute(&self, cmd: Command) -> Result<String> {
        let token = self.scope.current();
        let debug = self.debug();
        let shown = cmd.display_line(debug);

        if cmd.quiet {
            debug!("$ {shown}");
        } else {
            info!("$ {shown}");
        }

        let stderr_mode = stderr_output(&cmd, debug);

        let stdout_buffer = SharedBuffer::new();
        let stderr_buffer = SharedBuffer::new();
        let stdout_tee = match &cmd.stdout {
            Output::Capture => Some(Tee::new(vec![stdout_buffer.sink()])),
            Output::Terminal => Some(Tee::new(vec![Sink::stdout()])),
            Output::Sinks(sinks) => Some(Tee::new(sinks.clone())),
            Output::Discard => None,
        };
        let stderr_tee = {
            let mut sinks = vec![stderr_buffer.sink()];
            match stderr_mode {
                Output::Terminal => sinks.push(Sink::stderr()),
                Output::Sinks(extra) => sinks.extend(extra),
                Output::Capture | Output::Discard => {}
            }
            Tee::new(sinks)
        };

        let mut child_cmd = tokio::process::Command::new(&cmd.program);
        child_cmd
            .args(&cmd.args)
            .env_clear()
            .envs(inherited_env(&self.config.run.env_deny_prefixes))
            .envs(&cmd.env)
            .stdout(if stdout_tee.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .stdin(match &cmd.stdin {
                Input::Null => Stdio::null(),
                Input::Inherit => Stdio::inherit(),
                Input::Bytes(_) => Stdio::piped(),
            })
            .kill_on_drop(true);
        if let Some(dir) = &cmd.dir {
            child_cmd.current_dir(dir);
        }
        #[cfg(unix)]
        child_cmd.process_group(0);

        let mut relay = SignalRelay::install();
        let caught_before = signals::caught();
        let mut child = match child_cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return self.failure(&cmd, None, e.to_string(), &stdout_buffer, &stderr_buffer);
            }
        };
        let pgid = child.id();
        if let Some(pgid) = pgid {
            relay.forward_to(pgid);
        }

        let mut copiers: Vec<JoinHandle<std::io::Result<()>>> = Vec::new();
        if let (Some(pipe), Some(tee)) = (child.stdout.take(), stdout_tee) {
            copiers.push(tokio::spawn(copy_output(pipe, Arc::new(tee))));
        }
        if let Some(pipe) = child.stderr.take() {
            copiers.push(tokio::spawn(copy_output(pipe, Arc::new(stderr_tee))));
        }
        if let (Some(mut pipe), Input::Bytes(bytes)) = (child.stdin.take(), cmd.stdin.clone()) {
            copiers.push(tokio::spawn(async move {
                match pipe.write_all(&bytes).await {
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                    _ => Ok(()),
                }
            }));
        }

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = token.cancelled() => {
                debug!(pid = ?pgid, "cancelled, killing child process group");
                kill_tree(&mut child, pgid);
                let _ = child.wait().await;
                Outcome::Cancelled
            }
        };

        drop(relay);
        self.drain(copiers).await;

        if self.interrupt_cancels.load(Ordering::Acquire) && signals::caught() != caught_before {
            info!("interrupt received, cancelling running commands");
            self.scope.cancel();
            return Err(TracedError::new(GantryError::CommandExecution {
                command: cmd.command_line(),
                reason: "interrupted".to_string(),
                exit_code: None,
                log: failure_log(&stdout_buffer, &stderr_buffer),
            }));
        }

        let reason = match outcome {
            Outcome::Exited(Ok(status)) if status.success() => None,
            Outcome::Exited(Ok(status)) => Some((status.code(), status.to_string())),
            Outcome::Exited(Err(e)) => Some((None, e.to_string())),
            Outcome::Cancelled => Some((None, "cancelled".to_string())),
        };

        match reason {
            None => Ok(stdout_buffer.contents().trim().to_string()),
            Some((exit_code, reason)) => {
                self.failure(&cmd, exit_code, reason, &stdout_buffer, &stderr_buffer)
            }
        }
    }

    /// Wait for output copying to finish, giving up once the grace period ends
    async fn drain(&self, copiers: Vec<JoinHandle<std::io::Result<()>>>) {
        let grace = self.config.run.output_grace();
        let deadline = tokio::time::Instant::now() + grace;
        for mut copier in copiers {
            match tokio::time::timeout_at(deadline, &mut copier).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(error = %e, "failed copying command output"),
                Ok(Err(e)) => warn!(error = %e, "output copy task failed"),
                Err(_) => {
                    warn!(
                        grace_secs = grace.as_secs(),
                        "output still open after command exit, abandoning"
                    );
                    copier.abort();
                }
            }
        }
    }

    fn failure(
        &self,
        cmd: &Command,
        exit_code: Option<i32>,
        reason: String,
        stdout: &SharedBuffer,
        stderr: &SharedBuffer,
    ) -> Result<String> {
        let command = cmd.command_line();
        if cmd.no_fail {
            debug!(exit_code = ?exit_code, "error executing: '{command}': {reason}");
            return Ok(stdout.contents().trim().to_string());
        }

        Err(TracedError::new(GantryError::CommandExecution {
            command,
            reason,
            exit_code,
            log: failure_log(stdout, stderr),
        }))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("current_task", &self.current_task())
            .field("exit_hooks", &self.exit_hooks)
            .finish_non_exhaustive()
    }
}

/// Where stderr goes: quiet commands keep it in the failure log only
fn stderr_output(cmd: &Command, debug: bool) -> Output {
    match &cmd.stderr {
        Output::Terminal if cmd.quiet && !debug => Output::Capture,
        other => other.clone(),
    }
}

async fn copy_output<R>(mut reader: R, tee: Arc<Tee>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if let Err(e) = tee.write_bytes(&buf[..n]) {
            warn!(error = %e, "failed writing command output");
        }
    }
}

fn failure_log(stdout: &SharedBuffer, stderr: &SharedBuffer) -> String {
    let mut log = String::new();
    if !stdout.is_empty() {
        log.push_str("\nSTDOUT:\n");
        log.push_str(&stdout.contents());
    }
    if !stderr.is_empty() {
        log.push_str("\nSTDERR:\n");
        log.push_str(&stderr.contents());
    }
    log
}
