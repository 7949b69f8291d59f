//! Job event sinks: leveled log lines and progress samples.
//!
//! Controllers never assume a threading model from their caller. They report
//! through a [`LogSink`] and a [`ProgressSender`], each wrapping a callback
//! the caller supplies. Channel-backed constructors are provided for callers
//! that prefer to consume events from another task.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, watch};

/// Target used when mirroring job log lines into `tracing`.
pub const JOB_LOG_TARGET: &str = "discrip::job";

// ---------------------------------------------------------------------------
// LogLevel / LogLine
// ---------------------------------------------------------------------------

/// Severity of a [`LogLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Error => "ERROR",
        };
        f.pad(label)
    }
}

/// A single leveled, timestamped log line emitted by a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<5} {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Append-only sink for [`LogLine`]s.
///
/// Every emitted line is also mirrored into `tracing` at the matching level,
/// so the session log stays complete regardless of what the callback does.
/// Lines are delivered synchronously in emission order.
pub struct LogSink {
    callback: Box<dyn Fn(&LogLine) + Send + Sync>,
}

impl LogSink {
    /// Create a new sink from the given callback.
    pub fn new(callback: impl Fn(&LogLine) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a sink that only mirrors into `tracing`.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Create a sink that forwards every line into an unbounded channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LogLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self::new(move |line| {
            let _ = tx.send(line.clone());
        });
        (sink, rx)
    }

    /// Emit a line at the given level.
    pub fn emit(&self, level: LogLevel, message: impl Into<String>) {
        let line = LogLine {
            level,
            message: message.into(),
            timestamp: Local::now(),
        };

        match level {
            LogLevel::Debug => tracing::debug!(target: JOB_LOG_TARGET, "{}", line.message),
            LogLevel::Info => tracing::info!(target: JOB_LOG_TARGET, "{}", line.message),
            LogLevel::Error => tracing::error!(target: JOB_LOG_TARGET, "{}", line.message),
        }

        (self.callback)(&line);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message);
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ProgressSender
// ---------------------------------------------------------------------------

/// Sender for capture progress samples, a percentage in `[0, 100]`.
///
/// Samples are best-effort; observers should treat the most recent value as
/// authoritative.
pub struct ProgressSender {
    callback: Box<dyn Fn(f32) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Create a sender backed by a `watch` channel (last value wins).
    pub fn watch() -> (Self, watch::Receiver<f32>) {
        let (tx, rx) = watch::channel(0.0);
        let sender = Self::new(move |pct| {
            let _ = tx.send(pct);
        });
        (sender, rx)
    }

    /// Report progress. Values are clamped to `[0, 100]`; NaN is dropped.
    pub fn send(&self, pct: f32) {
        if pct.is_nan() {
            return;
        }
        (self.callback)(pct.clamp(0.0, 100.0));
    }
}

impl Default for ProgressSender {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}
