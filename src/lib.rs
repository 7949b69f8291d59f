//! discrip - optical disc title extraction
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod logging;
pub mod ripper;

pub use ripper::{RipJob, Ripper};
