pub mod context;
pub mod doctor;
pub mod init;
pub mod serve;
pub mod verify;

use std::path::{Path, PathBuf};

use vaultgate_config::AppConfig;

pub fn default_config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

/// Load the config file, apply environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with_env(path).map_err(|e| format!("Failed to load config: {e}").into())
}
