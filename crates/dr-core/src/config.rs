//! Tool path configuration shared between the library crates.
//!
//! The full application configuration (device, temp dir, logging) lives in
//! the `discrip` binary crate; only the part the tool registry needs is
//! defined here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional path overrides for the five external tools.
///
/// A `None` (or a path that does not exist) means "look it up on `PATH`".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub lsdvd_path: Option<PathBuf>,
    pub mpv_path: Option<PathBuf>,
    pub mplayer_path: Option<PathBuf>,
    pub mkvmerge_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
}

impl ToolsConfig {
    /// Look up the override for a tool by its program name.
    pub fn path_for(&self, name: &str) -> Option<&Path> {
        match name {
            "lsdvd" => self.lsdvd_path.as_deref(),
            "mpv" => self.mpv_path.as_deref(),
            "mplayer" => self.mplayer_path.as_deref(),
            "mkvmerge" => self.mkvmerge_path.as_deref(),
            "ffmpeg" => self.ffmpeg_path.as_deref(),
            _ => None,
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let entries = [
            ("lsdvd_path", &self.lsdvd_path),
            ("mpv_path", &self.mpv_path),
            ("mplayer_path", &self.mplayer_path),
            ("mkvmerge_path", &self.mkvmerge_path),
            ("ffmpeg_path", &self.ffmpeg_path),
        ];

        entries
            .into_iter()
            .filter_map(|(key, path)| match path {
                Some(p) if !p.exists() => Some(format!(
                    "tools.{key} = {} does not exist; falling back to PATH",
                    p.display()
                )),
                _ => None,
            })
            .collect()
    }
}
