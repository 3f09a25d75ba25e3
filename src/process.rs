use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::cancel::CancelToken;

mod command_line;

pub use command_line::split_command_line;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("command not found: {program}")]
    NotFound { program: String },
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Non-zero exit. `message` is the captured stderr, or a generic
    /// exit-code message when the process wrote nothing to stderr.
    #[error("{message}")]
    Failed { code: Option<i32>, message: String },
    #[error("process aborted")]
    Aborted,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProcessError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ProcessError::Aborted)
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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

    /// Splits a shell-like command line, honoring quoted arguments.
    /// Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = split_command_line(line).into_iter();
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Receives complete, trimmed output lines as a process produces them.
pub trait LineSink: Send + Sync {
    fn stdout_line(&self, line: &str);
    fn stderr_line(&self, line: &str);
}

#[derive(Default, Clone, Copy)]
pub struct RunOptions<'a> {
    pub cwd: Option<&'a Path>,
    pub sink: Option<&'a dyn LineSink>,
    pub cancel: Option<&'a CancelToken>,
}

/// The only place external processes are started from.
#[async_trait]
pub trait ProcessRunner: Send + Sync + 'static {
    /// Runs `command` to completion and returns its captured stdout.
    async fn run(&self, command: &CommandSpec, opts: RunOptions<'_>)
    -> Result<String, ProcessError>;

    /// Starts `command` without waiting for it or owning its lifetime.
    fn spawn_detached(&self, command: &CommandSpec, cwd: Option<&Path>)
    -> Result<(), ProcessError>;
}

/// Runner backed by real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        opts: RunOptions<'_>,
    ) -> Result<String, ProcessError> {
        if opts.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ProcessError::Aborted);
        }

        let program = resolve_program(&command.program, opts.cwd)?;
        debug!(program = %program.display(), args = ?command.args, "running command");

        let mut cmd = Command::new(&program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = opts.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| spawn_error(&command.program, source))?;

        let outcome = match opts.cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = collect(&mut child, opts.sink) => Some(result),
            },
            None => Some(collect(&mut child, opts.sink).await),
        };

        let Some(result) = outcome else {
            debug!(program = %command.program, "killing cancelled process");
            if let Err(err) = child.kill().await {
                warn!(program = %command.program, "failed to kill process: {err}");
            }
            return Err(ProcessError::Aborted);
        };

        let (status, stdout, stderr) = result?;
        if opts.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ProcessError::Aborted);
        }

        if status.success() {
            return Ok(stdout);
        }

        let code = status.code();
        let message = if stderr.trim().is_empty() {
            match code {
                Some(code) => format!("`{}` exited with code {code}", command.program),
                None => format!("`{}` was terminated by a signal", command.program),
            }
        } else {
            stderr
        };
        Err(ProcessError::Failed { code, message })
    }

    fn spawn_detached(
        &self,
        command: &CommandSpec,
        cwd: Option<&Path>,
    ) -> Result<(), ProcessError> {
        let program = resolve_program(&command.program, cwd)?;
        debug!(program = %program.display(), args = ?command.args, "spawning detached");

        let mut cmd = Command::new(&program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        // Dropping the handle leaves the child running; tokio reaps it.
        cmd.spawn()
            .map(drop)
            .map_err(|source| spawn_error(&command.program, source))
    }
}

fn spawn_error(program: &str, source: io::Error) -> ProcessError {
    if source.kind() == io::ErrorKind::NotFound {
        ProcessError::NotFound {
            program: program.to_string(),
        }
    } else {
        ProcessError::Spawn {
            program: program.to_string(),
            source,
        }
    }
}

/// Bare program names are looked up on `PATH`; anything with a path
/// separator is taken as-is, relative to `cwd`.
fn resolve_program(program: &str, cwd: Option<&Path>) -> Result<PathBuf, ProcessError> {
    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        return Ok(match cwd {
            Some(cwd) if path.is_relative() => cwd.join(path),
            _ => path.to_path_buf(),
        });
    }

    which::which(program).map_err(|_| ProcessError::NotFound {
        program: program.to_string(),
    })
}

async fn collect(
    child: &mut Child,
    sink: Option<&dyn LineSink>,
) -> io::Result<(ExitStatus, String, String)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (stdout, stderr) = tokio::try_join!(
        pump(stdout, sink, Channel::Stdout),
        pump(stderr, sink, Channel::Stderr),
    )?;
    let status = child.wait().await?;

    Ok((status, stdout, stderr))
}

#[derive(Clone, Copy)]
enum Channel {
    Stdout,
    Stderr,
}

async fn pump<R: AsyncRead + Unpin>(
    reader: Option<R>,
    sink: Option<&dyn LineSink>,
    channel: Channel,
) -> io::Result<String> {
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };

    let mut captured = Vec::new();
    let mut lines = LineBuffer::default();
    let mut chunk = [0u8; 4096];

    let emit = |line: String| {
        if let Some(sink) = sink {
            match channel {
                Channel::Stdout => sink.stdout_line(&line),
                Channel::Stderr => sink.stderr_line(&line),
            }
        }
    };

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        captured.extend_from_slice(&chunk[..n]);
        lines.push(&chunk[..n]).into_iter().for_each(emit);
    }
    lines.finish().into_iter().for_each(emit);

    Ok(String::from_utf8_lossy(&captured).into_owned())
}

/// Accumulates raw output and hands back complete, trimmed lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.extend(self.take_line());
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flushes a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!line.is_empty()).then_some(line)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    type Hook = Box<dyn Fn(&CommandSpec, Option<&Path>) -> Result<String, ProcessError> + Send + Sync>;

    /// Scripted runner: records every command and answers from a queue of
    /// canned results, falling back to `on_run`, then to empty success.
    #[derive(Default)]
    pub struct StubRunner {
        pub calls: Mutex<Vec<CommandSpec>>,
        pub detached: Mutex<Vec<CommandSpec>>,
        pub results: Mutex<VecDeque<Result<String, ProcessError>>>,
        pub on_run: Option<Hook>,
        pub output: Vec<&'static str>,
    }

    impl StubRunner {
        pub fn with_hook(
            hook: impl Fn(&CommandSpec, Option<&Path>) -> Result<String, ProcessError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self {
                on_run: Some(Box::new(hook)),
                ..Default::default()
            }
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls.lock().iter().map(|c| c.program.clone()).collect()
        }

        pub fn into_arc(self) -> Arc<Self> {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl ProcessRunner for StubRunner {
        async fn run(
            &self,
            command: &CommandSpec,
            opts: RunOptions<'_>,
        ) -> Result<String, ProcessError> {
            self.calls.lock().push(command.clone());
            if let Some(sink) = opts.sink {
                for line in &self.output {
                    sink.stdout_line(line);
                }
            }
            tokio::task::yield_now().await;

            let queued = self.results.lock().pop_front();
            let result = match (queued, &self.on_run) {
                (Some(result), _) => result,
                (None, Some(hook)) => hook(command, opts.cwd),
                (None, None) => Ok(String::new()),
            };

            if opts.cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(ProcessError::Aborted);
            }
            result
        }

        fn spawn_detached(
            &self,
            command: &CommandSpec,
            _cwd: Option<&Path>,
        ) -> Result<(), ProcessError> {
            self.detached.lock().push(command.clone());
            Ok(())
        }
    }
}
