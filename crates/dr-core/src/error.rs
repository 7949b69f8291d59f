//! Unified error type for discrip.
//!
//! Every failure raised by the scanner, capture, and remux controllers is
//! funneled into [`Error`]. A stall is deliberately absent: it is a handled
//! state transition inside the capture controller, never an error.

/// Unified error type covering all failure modes in discrip.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An external tool could not be found or started.
    #[error("Failed to launch {tool}: {message}")]
    ToolLaunch {
        /// Name of the tool that could not be started.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool ran but exited with a non-zero status.
    #[error("{tool} exited with {}: {stderr}", exit_label(.code))]
    ToolExit {
        /// Name of the tool that failed.
        tool: String,
        /// Exit code, or `None` when the process was terminated by a signal.
        code: Option<i32>,
        /// Captured error stream, or a generic message when it was empty.
        stderr: String,
    },

    /// Tool output (XML or text) could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The caller requested an abort.
    #[error("Operation cancelled")]
    Cancelled,

    /// Both capture tools failed to produce a raw stream.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Both mux tools failed to produce the output container.
    #[error("Remux failed: {0}")]
    Remux(String),

    /// Input or configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}

impl Error {
    /// Convenience constructor for [`Error::ToolLaunch`].
    pub fn tool_launch(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolLaunch {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ToolExit`].
    ///
    /// An empty `stderr` is replaced with a generic "non-zero exit" message.
    pub fn tool_exit(tool: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        let stderr = if stderr.trim().is_empty() {
            "non-zero exit".to_string()
        } else {
            stderr
        };
        Error::ToolExit {
            tool: tool.into(),
            code,
            stderr,
        }
    }

    /// Whether this error represents a caller-requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
