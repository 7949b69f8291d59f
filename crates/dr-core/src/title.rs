//! The [`Title`] model produced by the title scanner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A selectable video program on the disc.
///
/// Identity is [`Title::number`]. A duration of `0` means "unknown"; such
/// titles are still captureable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Title {
    /// 1-based title index as reported by the probe tools.
    pub number: u32,
    /// Approximate duration in whole seconds (0 = unknown).
    pub duration_secs: u64,
}

impl Title {
    pub fn new(number: u32, duration_secs: u64) -> Self {
        Self {
            number,
            duration_secs,
        }
    }

    /// Build a title from a fractional-seconds length, rounding to the
    /// nearest whole second. Negative or non-finite lengths become `0`.
    pub fn from_fractional_secs(number: u32, secs: f64) -> Self {
        Self::new(number, round_secs(secs))
    }

    /// Duration formatted as `HH:MM:SS`.
    pub fn duration_hms(&self) -> String {
        let secs = self.duration_secs;
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Title {} ({})", self.number, self.duration_hms())
    }
}

/// Round fractional seconds to the nearest whole second.
pub fn round_secs(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    secs.round() as u64
}
