use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sidecar_core::DEFAULT_API_BASE;
use sidecar_platform::AppPaths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub install_dir: Option<PathBuf>,

    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    #[serde(default = "default_release_repo")]
    pub release_repo: String,

    #[serde(default = "default_api_base")]
    pub release_api_base: String,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    /// Extra variables for the child process, on top of the inherited ones.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_binary_name() -> String {
    "viceroy".to_string()
}

fn default_release_repo() -> String {
    "fastly/viceroy".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            install_dir: None,
            binary_name: default_binary_name(),
            release_repo: default_release_repo(),
            release_api_base: default_api_base(),
            probe_timeout_secs: default_probe_timeout(),
            http_timeout_secs: default_http_timeout(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            env: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Settings from the platform settings file, plus a warning to log once
    /// logging is up.
    pub fn load() -> (Self, Option<String>) {
        let Ok(paths) = AppPaths::new() else {
            return (Self::default(), None);
        };
        Self::load_from(&paths.settings_file())
    }

    /// Missing files give defaults. Unreadable or invalid ones also give
    /// defaults, along with a warning describing the problem.
    pub fn load_from(path: &Path) -> (Self, Option<String>) {
        if !path.exists() {
            return (Self::default(), None);
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => (settings, None),
                Err(error) => (
                    Self::default(),
                    Some(format!("Ignoring invalid settings {}: {error}", path.display())),
                ),
            },
            Err(error) => (
                Self::default(),
                Some(format!("Failed to read settings {}: {error}", path.display())),
            ),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
