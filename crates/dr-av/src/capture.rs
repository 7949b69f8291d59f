//! Title capture with progress parsing, stall detection, and tool fallback.
//!
//! The primary capture tool records the title stream to the raw file while
//! printing percentage status lines. Two independent signals count as
//! forward progress: a parsed status line and growth of the raw file. When
//! neither has been seen for the stall threshold, the primary is killed and
//! the secondary tool dumps the whole title instead.

use std::fmt;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use dr_core::{Error, LogSink, ProgressSender};

use crate::command::{RunningTool, ToolCommand};
use crate::tools::{Tool, ToolRegistry};
use crate::workspace::file_size;

/// How often the raw file size, process exit, and stall clock are checked.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Silence (no status line, no file growth) after which the primary is
/// considered stalled.
pub const STALL_THRESHOLD: Duration = Duration::from_secs(10);

/// Pause after the primary exits before the raw file is inspected.
pub const EXIT_GRACE: Duration = Duration::from_millis(300);

static PROGRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)%").expect("progress pattern is valid"));

/// Timing knobs for [`CaptureController`].
///
/// Production code uses [`CaptureTimings::default`]; tests shorten them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTimings {
    pub poll_interval: Duration,
    pub stall_threshold: Duration,
    pub exit_grace: Duration,
}

impl Default for CaptureTimings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            stall_threshold: STALL_THRESHOLD,
            exit_grace: EXIT_GRACE,
        }
    }
}

/// Lifecycle of one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Starting,
    Streaming,
    Stalled,
    FallbackStreaming,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Stalled => "stalled",
            Self::FallbackStreaming => "fallback streaming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How the primary capture attempt ended, when it did not end the job.
#[derive(Debug)]
enum PrimaryOutcome {
    Exited(ExitStatus),
    Stalled,
    LaunchFailed(Error),
}

/// Forward-progress clock for one primary run.
///
/// Updated by the line reader (status lines) and the poller (file growth);
/// read by the poller only.
#[derive(Debug)]
struct Activity {
    last_progress_at: Instant,
    last_growth_at: Instant,
    last_size: Option<u64>,
}

impl Activity {
    fn new(now: Instant, size: Option<u64>) -> Self {
        Self {
            last_progress_at: now,
            last_growth_at: now,
            last_size: size,
        }
    }

    fn progress(&mut self, now: Instant) {
        self.last_progress_at = now;
    }

    fn observe_size(&mut self, size: Option<u64>, now: Instant) {
        if size > self.last_size {
            self.last_growth_at = now;
        }
        if size.is_some() {
            self.last_size = size;
        }
    }

    fn is_stalled(&self, now: Instant, threshold: Duration) -> bool {
        let last = self.last_progress_at.max(self.last_growth_at);
        now.saturating_duration_since(last) >= threshold
    }
}

/// Captures one title to a raw file.
#[derive(Debug, Clone)]
pub struct CaptureController {
    tools: Arc<ToolRegistry>,
    timings: CaptureTimings,
}

impl CaptureController {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self::with_timings(tools, CaptureTimings::default())
    }

    pub fn with_timings(tools: Arc<ToolRegistry>, timings: CaptureTimings) -> Self {
        Self { tools, timings }
    }

    /// Capture `title` from `device` into `raw`.
    ///
    /// Primary-tool failures and stalls are recovered by the secondary tool;
    /// only a secondary failure or cancellation is returned. Progress is
    /// never forced to 100 here.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` fires; the live process is killed.
    /// - [`Error::Capture`] for every other failure.
    pub async fn capture(
        &self,
        device: &str,
        title: u32,
        raw: &Path,
        progress: &ProgressSender,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        let result = self
            .run(device, title, raw, progress, log, cancel)
            .await
            .map_err(|e| match e {
                Error::Cancelled | Error::Capture(_) => e,
                other => Error::Capture(other.to_string()),
            });

        match &result {
            Ok(()) => self.enter(CapturePhase::Completed, log),
            Err(Error::Cancelled) => {
                self.enter(CapturePhase::Cancelled, log);
                log.info(format!("Capture of title {title} cancelled"));
            }
            Err(e) => {
                self.enter(CapturePhase::Failed, log);
                log.error(format!("Title {title}: {e}"));
            }
        }
        result
    }

    async fn run(
        &self,
        device: &str,
        title: u32,
        raw: &Path,
        progress: &ProgressSender,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        self.enter(CapturePhase::Starting, log);
        log.info(format!("Capturing title {title} from {device}"));

        let needs_fallback = match self.run_primary(device, title, raw, progress, log, cancel).await? {
            PrimaryOutcome::Stalled => true,
            PrimaryOutcome::LaunchFailed(e) => {
                log.error(format!("Primary capture could not start: {e}"));
                true
            }
            PrimaryOutcome::Exited(status) => {
                let size = file_size(raw).unwrap_or(0);
                if !status.success() {
                    log.info(format!("Primary capture exited with {status}"));
                }
                if size > 0 {
                    log.info(format!("Primary capture wrote {size} bytes"));
                    false
                } else {
                    log.info("Primary capture produced no data");
                    true
                }
            }
        };

        if !needs_fallback {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.enter(CapturePhase::FallbackStreaming, log);
        self.run_secondary(device, title, raw, log, cancel).await
    }

    /// Run the primary tool until it exits, stalls, or is cancelled.
    async fn run_primary(
        &self,
        device: &str,
        title: u32,
        raw: &Path,
        progress: &ProgressSender,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<PrimaryOutcome> {
        let cmd = match self.tools.command(Tool::Mpv) {
            Ok(cmd) => primary_command(cmd, device, title, raw),
            Err(e) => return Ok(PrimaryOutcome::LaunchFailed(e)),
        };
        log.debug(cmd.display());

        let mut running = match cmd.spawn() {
            Ok(running) => running,
            Err(e) => return Ok(PrimaryOutcome::LaunchFailed(e)),
        };
        self.enter(CapturePhase::Streaming, log);

        let outcome = self
            .watch_primary(&mut running, raw, progress, log, cancel)
            .await?;

        if let PrimaryOutcome::Exited(_) = outcome {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.timings.exit_grace) => {}
            }
            running.wait().await?;
        }
        Ok(outcome)
    }

    async fn watch_primary(
        &self,
        running: &mut RunningTool,
        raw: &Path,
        progress: &ProgressSender,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<PrimaryOutcome> {
        let mut activity = Activity::new(Instant::now(), file_size(raw));
        let mut ticker = tokio::time::interval(self.timings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut lines_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    running.kill().await;
                    return Err(Error::Cancelled);
                }
                line = running.next_line(), if lines_open => match line {
                    Some(line) => {
                        if let Some(pct) = parse_progress(&line.text) {
                            progress.send(pct);
                            activity.progress(Instant::now());
                        } else if !line.text.trim().is_empty() {
                            log.debug(format!("{}: {}", running.tool(), line.text));
                        }
                    }
                    None => lines_open = false,
                },
                _ = ticker.tick() => {
                    let now = Instant::now();
                    activity.observe_size(file_size(raw), now);

                    if let Some(status) = running.try_exit_status()? {
                        // Status lines still buffered in the pipe.
                        while let Ok(Some(line)) =
                            tokio::time::timeout(self.timings.exit_grace, running.next_line()).await
                        {
                            if let Some(pct) = parse_progress(&line.text) {
                                progress.send(pct);
                            }
                        }
                        return Ok(PrimaryOutcome::Exited(status));
                    }
                    if activity.is_stalled(now, self.timings.stall_threshold) {
                        self.enter(CapturePhase::Stalled, log);
                        log.info(format!(
                            "No progress for {}s; stopping {}",
                            self.timings.stall_threshold.as_secs_f32(),
                            running.tool()
                        ));
                        running.kill().await;
                        return Ok(PrimaryOutcome::Stalled);
                    }
                }
            }
        }
    }

    /// Dump the whole title with the secondary tool and require a non-empty
    /// result.
    async fn run_secondary(
        &self,
        device: &str,
        title: u32,
        raw: &Path,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        let cmd = secondary_command(self.tools.command(Tool::Mplayer)?, device, title, raw);
        log.info(format!("Falling back to {} for title {title}", cmd.tool()));
        log.debug(cmd.display());

        // Discard whatever the primary left behind.
        tokio::fs::File::create(raw).await?;

        cmd.execute(cancel).await.map_err(|e| match e {
            Error::Cancelled => e,
            other => Error::Capture(format!("secondary capture failed: {other}")),
        })?;

        match file_size(raw) {
            Some(size) if size > 0 => {
                log.info(format!("Secondary capture wrote {size} bytes"));
                Ok(())
            }
            _ => Err(Error::Capture(
                "secondary capture finished without producing data".into(),
            )),
        }
    }

    fn enter(&self, phase: CapturePhase, log: &LogSink) {
        log.debug(format!("Capture phase: {phase}"));
    }
}

fn primary_command(mut cmd: ToolCommand, device: &str, title: u32, raw: &Path) -> ToolCommand {
    cmd.args([
        "--no-config",
        "--msg-level=all=error,statusline=status",
        "--vo=null",
        "--ao=null",
        "--term-status-msg=PROGRESS ${percent-pos}%",
    ])
    .arg(format!("--dvd-device={device}"))
    .prefixed_path_arg("--stream-record=", raw)
    .arg(format!("dvd://{title}"));
    cmd
}

fn secondary_command(mut cmd: ToolCommand, device: &str, title: u32, raw: &Path) -> ToolCommand {
    cmd.args(["-noconfig", "all", "-quiet", "-dumpstream", "-dumpfile"])
        .arg(raw)
        .arg("-dvd-device")
        .arg(device)
        .arg(format!("dvd://{title}"));
    cmd
}

/// Extract a percentage from a status line, clamped to `[0, 100]`.
pub fn parse_progress(line: &str) -> Option<f32> {
    let caps = PROGRESS_RE.captures(line)?;
    let pct: f32 = caps.get(1)?.as_str().parse().ok()?;
    Some(pct.clamp(0.0, 100.0))
}
