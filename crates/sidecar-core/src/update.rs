use semver::Version;
use serde::Deserialize;

use sidecar_backend::parse_version;

pub(crate) const ARCHIVE_EXTENSIONS: [&str; 3] = [".tar.gz", ".tgz", ".zip"];

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    pub html_url: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// Highest published, non-prerelease release by semver order of its tag.
///
/// GitHub lists releases by creation date, which is not the same thing as
/// version order once maintenance releases are cut from older branches.
#[must_use]
pub fn latest_stable_release(releases: &[GitHubRelease]) -> Option<(Version, &GitHubRelease)> {
    releases
        .iter()
        .filter(|release| !release.draft && !release.prerelease)
        .filter_map(|release| {
            parse_version(&release.tag_name)
                .ok()
                .map(|version| (version, release))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
}

/// Asset name without extension, e.g. `viceroy_v0.9.3_linux-amd64`.
#[must_use]
pub fn asset_stem(binary: &str, version: &Version) -> Option<String> {
    let os = if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else {
        return None;
    };
    let arch = if cfg!(target_arch = "x86_64") {
        "amd64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        return None;
    };
    Some(format!("{binary}_v{version}_{os}-{arch}"))
}

#[must_use]
pub fn select_asset<'a>(release: &'a GitHubRelease, stem: &str) -> Option<&'a GitHubAsset> {
    release.assets.iter().find(|asset| {
        asset
            .name
            .strip_prefix(stem)
            .is_some_and(|ext| ARCHIVE_EXTENSIONS.contains(&ext))
    })
}

pub(crate) fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}

pub(crate) fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
