use log::debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const APP_DIR_NAME: &str = "sidecar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine cache directory")]
    CacheDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
    #[error("unable to deduce user config dir or user home dir")]
    NoInstallDir,
}

/// Directory companion binaries are installed into.
///
/// Resolved once at startup and handed to the installer, so a machine with
/// neither a config nor a home directory fails at construction instead of
/// mid-install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallDir(PathBuf);

impl InstallDir {
    /// Prefer `<config>/sidecar`, fall back to `<home>/.sidecar`.
    ///
    /// # Errors
    /// Returns [`AppPathsError::NoInstallDir`] when neither base directory can
    /// be determined.
    pub fn resolve() -> Result<Self, AppPathsError> {
        let dir = select_install_dir(dirs::config_dir(), dirs::home_dir())?;
        debug!("Resolved install directory: {}", dir.display());
        Ok(Self(dir))
    }

    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }

    #[must_use]
    pub fn binary_path(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

fn select_install_dir(
    config_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Result<PathBuf, AppPathsError> {
    if let Some(config) = config_dir {
        return Ok(config.join(APP_DIR_NAME));
    }
    if let Some(home) = home_dir {
        return Ok(home.join(format!(".{APP_DIR_NAME}")));
    }
    Err(AppPathsError::NoInstallDir)
}

pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform.
    ///
    /// # Errors
    /// Returns an error when a required base directory cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        Ok(Self {
            config_dir: dirs::config_dir()
                .ok_or(AppPathsError::ConfigDirUnavailable)?
                .join(APP_DIR_NAME),
            cache_dir: dirs::cache_dir()
                .ok_or(AppPathsError::CacheDirUnavailable)?
                .join(APP_DIR_NAME),
            data_dir: dirs::data_dir()
                .ok_or(AppPathsError::DataDirUnavailable)?
                .join(APP_DIR_NAME),
        })
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("sidecar.log")
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
