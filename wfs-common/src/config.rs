//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// TOML configuration file contents.
///
/// Every key is optional; command-line and environment layers take priority
/// over this file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the SQLite database
    pub root_folder: Option<String>,
    /// Cluster count for the regime clusterer
    pub kmeans_k: Option<usize>,
    /// Free-text model version tag written with every feature row
    pub model_version: Option<String>,
    /// Curated feature columns used by the model run
    pub features: Option<Vec<String>>,
    /// Seed for centroid initialization
    pub seed: Option<u64>,
    /// Directory the external export tool reads from
    pub export_dir: Option<String>,
}

/// Parse a TOML config document.
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Load the config file from the first well-known location.
///
/// Tries the user config directory (`wfs/config.toml`) then
/// `/etc/wfs/config.toml`. A missing file is not an error.
pub fn load_toml_config() -> Result<TomlConfig> {
    let Some(path) = config_file_path() else {
        return Ok(TomlConfig::default());
    };
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = parse_toml_config(&content)?;
    info!("Loaded config file: {}", path.display());
    Ok(config)
}

fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("wfs").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }
    let system = PathBuf::from("/etc/wfs/config.toml");
    if system.exists() {
        return Some(system);
    }
    None
}

/// Root folder resolution priority order:
/// 1. Command-line argument or environment variable (handled by the CLI)
/// 2. TOML config file
/// 3. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = &toml.root_folder {
        return PathBuf::from(path);
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("wfs"))
        .unwrap_or_else(|| PathBuf::from("./wfs_data"))
}

/// Create the root folder directory if it doesn't exist
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

/// Database file location inside the root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join("wfs.db")
}
