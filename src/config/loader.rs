//! Configuration loading.
//!
//! Config is a read-only input: the core keeps nothing on disk, so there is
//! no save path. A missing or malformed file falls back to defaults with a
//! warning, and every loaded value passes through [`Config::normalized`] so
//! out-of-range settings are clamped instead of making the core fail to
//! construct.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::schema::Config;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "BREAKWATER_CONFIG";

/// Resolve the config file path: explicit argument first, then
/// `$BREAKWATER_CONFIG`, then `~/.breakwater/config.json`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Some(p) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(p);
    }
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".breakwater").join("config.json")
}

/// Load configuration from the resolved path and normalize it.
///
/// Anything that prevents reading a valid [`Config`] degrades to defaults —
/// the caller always gets something the core can be built from.
pub fn load_config(explicit: Option<&Path>) -> Config {
    let path = config_path(explicit);
    read_config_file(&path).unwrap_or_default().normalized()
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return None;
    }
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
            return None;
        }
    };
    match serde_json::from_str::<Config>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config invalid, using defaults");
            None
        }
    }
}
