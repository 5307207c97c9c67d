pub mod chat;
pub mod init;
pub mod serve;
pub mod sessions;

use filachat_config::AppConfig;
use std::path::{Path, PathBuf};

/// The config file a command should use.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = config_path(explicit);
    AppConfig::load_from(&path)
        .map_err(|e| format!("Failed to load config from {}: {e}", path.display()).into())
}
