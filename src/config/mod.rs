use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPathError {
    MissingHomeDirectory,
}

const APP_DIR: &str = "mediamask";
const APP_CONFIG_FILE: &str = "config.json";

const DEFAULT_INIT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONVERT_TIMEOUT_SECS: u64 = 300;

/// Application-level settings from `config.json`. Every field has a default,
/// so a missing or partial file still yields a working configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Deadline for sandbox readiness and engine initialization; generous
    /// because the engine binary is fetched on first load.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
    /// Deadline for a single conversion.
    #[serde(default = "default_convert_timeout_secs")]
    pub convert_timeout_secs: u64,
    /// Fraction of the shorter media side used as the vertex pick radius.
    #[serde(default = "default_vertex_threshold_ratio")]
    pub vertex_threshold_ratio: f64,
    /// Content-space tolerance for freehand path simplification.
    #[serde(default = "default_simplify_tolerance")]
    pub simplify_tolerance: f64,
    /// Freehand paths above this length are simplified when finalized.
    #[serde(default = "default_max_freehand_points")]
    pub max_freehand_points: usize,
}

fn default_init_timeout_secs() -> u64 {
    DEFAULT_INIT_TIMEOUT_SECS
}

fn default_convert_timeout_secs() -> u64 {
    DEFAULT_CONVERT_TIMEOUT_SECS
}

fn default_vertex_threshold_ratio() -> f64 {
    crate::selection::polygon::VERTEX_THRESHOLD_RATIO
}

fn default_simplify_tolerance() -> f64 {
    2.0
}

fn default_max_freehand_points() -> usize {
    crate::selection::polygon::MAX_FREEHAND_POINTS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: default_init_timeout_secs(),
            convert_timeout_secs: default_convert_timeout_secs(),
            vertex_threshold_ratio: default_vertex_threshold_ratio(),
            simplify_tolerance: default_simplify_tolerance(),
            max_freehand_points: default_max_freehand_points(),
        }
    }
}

impl AppConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs)
    }
}

pub fn load_app_config() -> AppConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_app_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_app_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> AppConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return AppConfig::default(),
    };
    if !path.exists() {
        return AppConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            AppConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}
