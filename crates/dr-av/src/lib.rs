//! # dr-av
//!
//! External tool orchestration for extracting titles from an optical disc.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to the five
//!   allow-listed programs: lsdvd, mpv, mplayer, mkvmerge, and ffmpeg.
//! - **Process execution** ([`ToolCommand`], [`RunningTool`]) -- async
//!   spawning with line-by-line stdout/stderr streaming and cooperative
//!   cancellation.
//! - **Title scanning** ([`TitleScanner`]) -- structured probe with a
//!   per-title identify fallback.
//! - **Capture** ([`CaptureController`]) -- raw stream dump with progress
//!   parsing, stall detection, and a secondary-tool fallback.
//! - **Remuxing** ([`RemuxController`]) -- container muxing with a
//!   timestamp-correcting fallback.
//! - **Scratch files** ([`RawFile`]) -- a uniquely named temporary raw file
//!   that is removed when dropped.

pub mod capture;
pub mod command;
pub mod remux;
pub mod scanner;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use capture::{CapturePhase, CaptureController, CaptureTimings};
pub use command::{OutputLine, RunningTool, StreamKind, ToolCommand, ToolOutput};
pub use remux::RemuxController;
pub use scanner::TitleScanner;
pub use tools::{Tool, ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::RawFile;
