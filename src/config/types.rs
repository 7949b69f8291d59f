use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use dr_core::config::ToolsConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub rip: RipConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RipConfig {
    /// Disc device used when the command line does not name one
    #[serde(default = "default_device")]
    pub device: String,

    /// Directory for raw capture files (default: system temp dir)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for RipConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            temp_dir: None,
        }
    }
}

impl RipConfig {
    /// Directory raw capture files are created in.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_device() -> String {
    "/dev/sr0".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory session log files are written to
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Minimum level written to the session log
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_level() -> String {
    "info".to_string()
}
