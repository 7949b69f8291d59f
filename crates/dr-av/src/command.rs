//! Async execution of external tools with line streaming and cancellation.
//!
//! [`ToolCommand`] is a builder bound to one allow-listed program (obtain it
//! from [`crate::ToolRegistry::command`]). It can either be run to completion
//! with [`ToolCommand::execute_with_lines`], or spawned into a
//! [`RunningTool`] for callers that need to interleave their own work (file
//! polling, stall detection) with the process's output.
//!
//! Arguments are handed to the OS as discrete argv elements and never pass
//! through a shell, so whitespace or quotes inside paths cannot split into
//! extra arguments.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;

use dr_core::Error;

/// Capacity of the channel between the stream readers and the consumer.
const LINE_BUFFER: usize = 256;

/// Number of trailing stderr lines retained for error messages.
const STDERR_TAIL_LINES: usize = 200;

/// A single line longer than this is flushed without waiting for a newline.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One line of process output, tagged by stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub text: String,
}

/// Output captured from a successful tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Stdout lines joined with `\n`.
    pub stdout: String,
    /// Trailing stderr lines joined with `\n`.
    pub stderr: String,
}

/// A builder for one invocation of an allow-listed external tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: String,
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub(crate) fn new(tool: impl Into<String>, program: PathBuf) -> Self {
        Self {
            tool: tool.into(),
            program,
            args: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(s.as_ref().to_os_string());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(&mut self, iter: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(iter.into_iter().map(|s| s.as_ref().to_os_string()));
        self
    }

    /// Append `prefix` immediately followed by a path, as one argument
    /// (e.g. `--stream-record=<path>`).
    pub fn prefixed_path_arg(&mut self, prefix: &str, path: &Path) -> &mut Self {
        let mut arg = OsString::from(prefix);
        arg.push(path.as_os_str());
        self.args.push(arg);
        self
    }

    /// Name of the tool this command runs.
    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// The command line with every element shell-quoted, suitable for logs
    /// and for pasting back into a shell.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| {
                let part = part.to_string_lossy();
                shlex::try_quote(&part)
                    .map(|q| q.into_owned())
                    .unwrap_or_else(|_| format!("{part:?}"))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn the process and start streaming its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolLaunch`] if the program cannot be started.
    pub fn spawn(&self) -> dr_core::Result<RunningTool> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::tool_launch(
                &self.tool,
                format!("failed to spawn {}: {e}", self.program.display()),
            )
        })?;

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, StreamKind::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, StreamKind::Stderr, tx)));
        }

        Ok(RunningTool {
            tool: self.tool.clone(),
            child,
            lines: rx,
            readers,
        })
    }

    /// Run to completion, discarding line callbacks.
    pub async fn execute(&self, cancel: &CancellationToken) -> dr_core::Result<ToolOutput> {
        self.execute_with_lines(|_| {}, cancel).await
    }

    /// Run to completion, forwarding every output line to `on_line` in the
    /// order it was read.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` fires; the process is killed first.
    /// - [`Error::ToolLaunch`] if the program cannot be started.
    /// - [`Error::ToolExit`] on a non-zero exit, carrying the captured stderr.
    pub async fn execute_with_lines(
        &self,
        mut on_line: impl FnMut(&OutputLine),
        cancel: &CancellationToken,
    ) -> dr_core::Result<ToolOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tracing::debug!("exec: {}", self.display());
        let mut running = self.spawn()?;

        let mut stdout: Vec<String> = Vec::new();
        let mut stderr: VecDeque<String> = VecDeque::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    running.kill().await;
                    return Err(Error::Cancelled);
                }
                line = running.next_line() => match line {
                    Some(line) => {
                        on_line(&line);
                        match line.stream {
                            StreamKind::Stdout => stdout.push(line.text),
                            StreamKind::Stderr => {
                                if stderr.len() == STDERR_TAIL_LINES {
                                    stderr.pop_front();
                                }
                                stderr.push_back(line.text);
                            }
                        }
                    }
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                running.kill().await;
                return Err(Error::Cancelled);
            }
            status = running.wait() => status?,
        };

        let stderr = Vec::from(stderr).join("\n");
        if !status.success() {
            return Err(Error::tool_exit(&self.tool, status.code(), stderr));
        }

        Ok(ToolOutput {
            status,
            stdout: stdout.join("\n"),
            stderr,
        })
    }
}

/// A live process whose stdout/stderr lines are available via
/// [`RunningTool::next_line`].
///
/// Dropping a `RunningTool` kills the process if it is still alive.
#[derive(Debug)]
pub struct RunningTool {
    tool: String,
    child: Child,
    lines: mpsc::Receiver<OutputLine>,
    readers: Vec<JoinHandle<()>>,
}

impl RunningTool {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Next line from either stream; `None` once both streams are closed.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Non-blocking exit check.
    pub fn try_exit_status(&mut self) -> dr_core::Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> dr_core::Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Best-effort termination. Safe to call on an already-exited process;
    /// failures are logged and swallowed.
    pub async fn kill(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            self.abort_readers();
            return;
        }

        if let Err(e) = self.child.start_kill() {
            tracing::debug!("kill {} failed: {e}", self.tool);
        }
        if let Err(e) = self.child.wait().await {
            tracing::debug!("reaping {} after kill failed: {e}", self.tool);
        }
        self.abort_readers();
    }

    // A killed process may leave descendants holding the pipes open.
    fn abort_readers(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

impl Drop for RunningTool {
    fn drop(&mut self) {
        self.abort_readers();
    }
}

async fn forward_lines<R>(reader: R, stream: StreamKind, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, LineSplitter::default());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(text) => {
                if tx.send(OutputLine { stream, text }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("stopped reading {stream:?}: {e}");
                break;
            }
        }
    }
}

/// Splits a byte stream into lines on `\n`, `\r`, or `\r\n`.
///
/// Terminal-style status output rewrites one line with bare carriage
/// returns, so each `\r` ends a line. Invalid UTF-8 is replaced lossily.
#[derive(Debug, Default)]
pub struct LineSplitter {
    skip_lf: bool,
}

impl Decoder for LineSplitter {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if self.skip_lf && !buf.is_empty() {
            if buf[0] == b'\n' {
                buf.advance(1);
            }
            self.skip_lf = false;
        }

        match buf.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(pos) => {
                let line = buf.split_to(pos);
                self.skip_lf = buf[0] == b'\r';
                buf.advance(1);
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None if buf.len() > MAX_LINE_BYTES => {
                let line = buf.split_to(buf.len());
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}
