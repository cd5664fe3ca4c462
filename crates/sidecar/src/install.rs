use std::path::PathBuf;

use log::info;

use sidecar_backend::{ProgressSink, stderr_output};
use sidecar_core::GitHubVersionSource;
use sidecar_install::BinaryInstaller;
use sidecar_platform::InstallDir;

use crate::error::AppError;
use crate::settings::Settings;

/// Installer for the configured location. Version notices go to stderr so
/// stdout carries only what `install` prints for scripts.
pub fn installer_for(settings: &Settings) -> Result<BinaryInstaller, AppError> {
    let installer = match &settings.install_dir {
        Some(dir) => BinaryInstaller::new(InstallDir::from_path(dir)),
        None => BinaryInstaller::from_environment()?,
    };
    Ok(installer
        .with_output(stderr_output())
        .with_probe_timeout(settings.probe_timeout()))
}

pub fn release_source(settings: &Settings) -> Result<GitHubVersionSource, AppError> {
    let client = reqwest::Client::builder()
        .timeout(settings.http_timeout())
        .user_agent(format!("sidecar/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AppError::http_client)?;

    Ok(
        GitHubVersionSource::new(client, &settings.release_repo, &settings.binary_name)
            .with_api_base(&settings.release_api_base),
    )
}

/// Resolve the install location, then install or update the companion binary.
pub async fn ensure_binary(
    settings: &Settings,
    progress: &dyn ProgressSink,
) -> Result<PathBuf, AppError> {
    let installer = installer_for(settings)?;
    let source = release_source(settings)?;

    info!(
        "Ensuring {} from {} in {}",
        settings.binary_name,
        settings.release_repo,
        installer.install_dir().path().display()
    );

    Ok(installer.ensure(progress, &source).await?)
}
