//! External tool allow-list, detection, and lookup.
//!
//! Only the five programs named by [`Tool`] can ever be launched. The
//! [`ToolRegistry`] resolves each of them once (config override, then
//! `PATH`) and hands out [`ToolCommand`] builders bound to the resolved path.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dr_core::config::ToolsConfig;

use crate::command::ToolCommand;

/// The allow-listed external programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Structured title probe (`lsdvd -Ox`).
    Lsdvd,
    /// Primary capture tool (headless `--stream-record`).
    Mpv,
    /// Secondary capture tool and per-title identify probe.
    Mplayer,
    /// Primary mux tool.
    Mkvmerge,
    /// Secondary mux tool with timestamp correction.
    Ffmpeg,
}

impl Tool {
    /// Every tool the registry manages, in pipeline order.
    pub const ALL: [Tool; 5] = [
        Tool::Lsdvd,
        Tool::Mpv,
        Tool::Mplayer,
        Tool::Mkvmerge,
        Tool::Ffmpeg,
    ];

    /// Program name looked up on `PATH`.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Lsdvd => "lsdvd",
            Tool::Mpv => "mpv",
            Tool::Mplayer => "mplayer",
            Tool::Mkvmerge => "mkvmerge",
            Tool::Ffmpeg => "ffmpeg",
        }
    }

    /// What the pipeline uses this tool for.
    pub fn role(&self) -> &'static str {
        match self {
            Tool::Lsdvd => "title probe",
            Tool::Mpv => "capture (primary)",
            Tool::Mplayer => "capture (secondary), title identify",
            Tool::Mkvmerge => "mux (primary)",
            Tool::Ffmpeg => "mux (secondary)",
        }
    }

    fn version_args(&self) -> &'static [&'static str] {
        match self {
            Tool::Lsdvd => &["-V"],
            Tool::Mpv | Tool::Mkvmerge => &["--version"],
            // mplayer prints its banner and exits when given no input.
            Tool::Mplayer => &[],
            Tool::Ffmpeg => &["-version"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved tool location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub tool: Tool,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub tool: Tool,
    /// Whether the tool was found.
    pub available: bool,
    /// First line of the tool's version banner, if it could be read.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding resolved tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<Tool, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// A configured path is used only if it exists; otherwise [`which::which`]
    /// is consulted. Tools that are not found are omitted, and asking for
    /// them later yields a launch error.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for tool in Tool::ALL {
            let resolved = match tools_config.path_for(tool.name()) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured {} path {} does not exist; searching PATH",
                        tool,
                        p.display()
                    );
                    which::which(tool.name()).ok()
                }
                None => which::which(tool.name()).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!("Resolved {} -> {}", tool, path.display());
                    tools.insert(tool, ToolConfig { tool, path });
                }
                None => tracing::debug!("{} not found", tool),
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths, skipping discovery entirely.
    pub fn with_paths(paths: impl IntoIterator<Item = (Tool, PathBuf)>) -> Self {
        let tools = paths
            .into_iter()
            .map(|(tool, path)| (tool, ToolConfig { tool, path }))
            .collect();
        Self { tools }
    }

    /// Return the [`ToolConfig`] for the given tool, or a launch error if
    /// it was not found during discovery.
    pub fn require(&self, tool: Tool) -> dr_core::Result<&ToolConfig> {
        self.tools.get(&tool).ok_or_else(|| {
            dr_core::Error::tool_launch(
                tool.name(),
                format!("{tool} not found; is it installed and in PATH?"),
            )
        })
    }

    /// Start a command builder for the given tool.
    pub fn command(&self, tool: Tool) -> dr_core::Result<ToolCommand> {
        let cfg = self.require(tool)?;
        Ok(ToolCommand::new(tool.name(), cfg.path.clone()))
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL
            .iter()
            .map(|&tool| match self.tools.get(&tool) {
                Some(cfg) => ToolInfo {
                    tool,
                    available: true,
                    version: detect_version(tool, &cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    tool,
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run the tool's version query and return the first non-empty line from
/// stdout (or stderr, for tools that print their banner there).
fn detect_version(tool: Tool, path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .args(tool.version_args())
        .stdin(std::process::Stdio::null())
        .output()
        .ok()?;

    let first_line = |bytes: &[u8]| {
        String::from_utf8_lossy(bytes)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    };

    first_line(&output.stdout).or_else(|| first_line(&output.stderr))
}
