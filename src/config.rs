//=============================================
// sciblock/config.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Process-wide block settings
// Objective: Load settings from TOML with environment overrides and
//            built-in defaults
//=============================================

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::interpreter::DEFAULT_MAX_CALL_DEPTH;
use crate::surface::SurfaceLifecycle;

pub const CONFIG_ENV: &str = "SCIBLOCK_CONFIG";
pub const SHOW_PLOTS_ENV: &str = "SCIBLOCK_SHOW_PLOTS";
pub const DEFAULT_VIRTUAL_ID: &str = "<exec_block>";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Also hand successful plots to the interactive display.
    pub show_plots: bool,
    pub surface_lifecycle: SurfaceLifecycle,
    pub virtual_id: String,
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            show_plots: false,
            surface_lifecycle: SurfaceLifecycle::Fresh,
            virtual_id: DEFAULT_VIRTUAL_ID.to_string(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    /// `<config dir>/sciblock/config.toml`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sciblock").join("config.toml"))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    //Function: load
    //Purpose: Resolve the effective configuration
    //Inputs: explicit path (e.g. from --config)
    //Returns: Config with environment overrides applied
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_from(&path)?,
            None => match Self::default_path().filter(|path| path.is_file()) {
                Some(path) => Self::load_from(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = env::var(SHOW_PLOTS_ENV) {
            match parse_flag(&raw) {
                Some(flag) => self.show_plots = flag,
                None => warn!(value = %raw, "ignoring unrecognised {}", SHOW_PLOTS_ENV),
            }
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.show_plots);
        assert_eq!(config.surface_lifecycle, SurfaceLifecycle::Fresh);
        assert_eq!(config.virtual_id, "<exec_block>");
        assert_eq!(config.max_call_depth, 200);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("show_plots = true\nsurface_lifecycle = \"accumulate\"\n").unwrap();
        assert!(config.show_plots);
        assert_eq!(config.surface_lifecycle, SurfaceLifecycle::Accumulate);
        assert_eq!(config.max_call_depth, 200);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::from_toml_str("show_plot = true\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "virtual_id = \"<cell_7>\"\nmax_call_depth = 50").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.virtual_id, "<cell_7>");
        assert_eq!(config.max_call_depth, 50);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
