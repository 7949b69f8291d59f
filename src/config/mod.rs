mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Levels accepted by `logging.level`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./discrip.toml",
        "~/.config/discrip/config.toml",
        "/etc/discrip/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration.
///
/// Returns non-fatal warnings; fatal problems are errors.
pub fn validate_config(config: &Config) -> Result<Vec<String>> {
    if config.rip.device.trim().is_empty() {
        anyhow::bail!("rip.device cannot be empty");
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        anyhow::bail!(
            "logging.level '{}' is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        );
    }

    let mut warnings = config.tools.validate();

    if let Some(dir) = &config.rip.temp_dir {
        if !dir.is_dir() {
            warnings.push(format!(
                "rip.temp_dir {:?} does not exist; it will be created on first rip",
                dir
            ));
        }
    }

    Ok(warnings)
}
