mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Config file name looked up in each search directory
pub const CONFIG_FILE_NAME: &str = "mysql-healthcheck.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })?;
    config.http.normalize_path();
    Ok(config)
}

/// Directories searched for the config file, in priority order
pub fn search_paths() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/etc/sysconfig"),
        PathBuf::from("/etc/default"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join(".config"));
    }
    dirs.push(PathBuf::from("."));
    dirs
}

/// First existing config file in the given directories
pub fn discover(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Load the effective configuration
///
/// An explicit path must exist. Without one, the search paths are tried and
/// a missing file falls back to defaults. A file that exists but cannot be
/// read or parsed is always an error.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover(&search_paths()),
    };

    match path {
        Some(path) => {
            let config = load_config(&path)?;
            debug!(path = %path.display(), "Config loaded");
            Ok(config)
        }
        None => {
            warn!("No config file found. Using default configuration!");
            Ok(Config::default())
        }
    }
}
