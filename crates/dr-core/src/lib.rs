//! dr-core: shared types, errors, configuration, and job event sinks.
//!
//! This crate is the foundational dependency for the other dr-* crates,
//! providing the [`Title`] model, a unified error type, the leveled log sink
//! and progress sender that controllers report through, and tool path
//! configuration.

pub mod config;
pub mod error;
pub mod events;
pub mod title;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use events::{LogLevel, LogLine, LogSink, ProgressSender};
pub use title::Title;
