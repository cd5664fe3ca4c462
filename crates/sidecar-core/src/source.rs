use std::path::PathBuf;

use async_trait::async_trait;
use log::{debug, info};
use semver::Version;

use sidecar_backend::{SourceError, VersionSource};

use crate::archive::{download_file, extract_archive, find_binary, verify_sha256};
use crate::update::{
    GitHubRelease, asset_stem, latest_stable_release, parse_sha256_digest, response_snippet,
    select_asset,
};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Release channel backed by a GitHub repository's published releases.
#[derive(Debug, Clone)]
pub struct GitHubVersionSource {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    binary: String,
    installed_name: String,
}

impl GitHubVersionSource {
    /// `repo` is `owner/name`; `binary` is the executable name inside the
    /// release archive, without any platform suffix.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        repo: impl Into<String>,
        binary: impl Into<String>,
    ) -> Self {
        let binary = binary.into();
        let installed_name = format!("{binary}{}", std::env::consts::EXE_SUFFIX);
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            repo: repo.into(),
            binary,
            installed_name,
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.api_base, self.repo)
    }

    fn release_by_tag_url(&self, version: &Version) -> String {
        format!("{}/repos/{}/releases/tags/v{version}", self.api_base, self.repo)
    }

    async fn get_json<T>(&self, operation: &'static str, url: &str) -> Result<T, SourceError>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .header("User-Agent", "sidecar")
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|error| SourceError::request_from(operation, error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(SourceError::request(
                operation,
                format!("HTTP {status}{body_snippet}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|error| SourceError::parse_from(operation, error))
    }
}

#[async_trait]
impl VersionSource for GitHubVersionSource {
    fn name(&self) -> &str {
        &self.installed_name
    }

    async fn latest_version(&self) -> Result<Version, SourceError> {
        const OPERATION: &str = "fetch latest release";

        let releases: Vec<GitHubRelease> = self.get_json(OPERATION, &self.releases_url()).await?;
        let (version, release) = latest_stable_release(&releases).ok_or_else(|| {
            SourceError::parse(
                OPERATION,
                format!("no published release with a semver tag in {}", self.repo),
            )
        })?;

        debug!("Latest {} release is {} ({})", self.binary, version, release.html_url);
        Ok(version)
    }

    async fn download(&self, version: &Version) -> Result<PathBuf, SourceError> {
        const OPERATION: &str = "download release";

        let release: GitHubRelease = self
            .get_json(OPERATION, &self.release_by_tag_url(version))
            .await?;

        let stem = asset_stem(&self.binary, version).ok_or_else(|| {
            SourceError::artifact(
                OPERATION,
                format!(
                    "no {} build for {}/{}",
                    self.binary,
                    std::env::consts::OS,
                    std::env::consts::ARCH
                ),
            )
        })?;
        let asset = select_asset(&release, &stem).ok_or_else(|| {
            SourceError::artifact(OPERATION, format!("release v{version} has no asset {stem}"))
        })?;

        let work_dir = tempfile::Builder::new()
            .prefix("sidecar-download-")
            .tempdir()
            .map_err(|error| SourceError::artifact_from(OPERATION, error))?;
        let archive_path = work_dir.path().join(&asset.name);

        info!("Downloading {} from {}", asset.name, asset.browser_download_url);
        download_file(&self.client, &asset.browser_download_url, &archive_path)
            .await
            .map_err(|error| SourceError::request_from(OPERATION, error))?;

        if let Some(expected) = asset.digest.as_deref().and_then(parse_sha256_digest) {
            verify_sha256(&archive_path, &expected)
                .map_err(|error| SourceError::artifact_from(OPERATION, error))?;
        }

        let extract_dir = work_dir.path().join("extracted");
        extract_archive(&archive_path, &extract_dir)
            .map_err(|error| SourceError::artifact_from(OPERATION, error))?;

        let extracted = find_binary(&extract_dir, &self.installed_name).ok_or_else(|| {
            SourceError::artifact(
                OPERATION,
                format!("{} not found in {}", self.installed_name, asset.name),
            )
        })?;

        // Hand the caller a standalone file; the work dir is removed on drop.
        let (_, binary_path) = tempfile::Builder::new()
            .prefix(&format!("{}-", self.binary))
            .tempfile()
            .and_then(|file| {
                std::fs::copy(&extracted, file.path())?;
                file.keep().map_err(|error| error.error)
            })
            .map_err(|error| SourceError::artifact_from(OPERATION, error))?;

        debug!("Downloaded {} v{version} to {}", self.binary, binary_path.display());
        Ok(binary_path)
    }
}
