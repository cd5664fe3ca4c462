use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use semver::Version;

use sidecar_backend::{ProgressSink, SharedOutput, VersionSource, stdout_output, write_shared};
use sidecar_platform::InstallDir;

use crate::error::InstallError;
use crate::probe::{DEFAULT_PROBE_TIMEOUT, parse_probe_output, probe};
use crate::swap::swap_binary;

/// Keeps a companion binary present and current inside an install directory.
///
/// Concurrent `ensure` calls against the same directory are not coordinated.
pub struct BinaryInstaller {
    install_dir: InstallDir,
    output: SharedOutput,
    probe_timeout: Duration,
}

impl BinaryInstaller {
    #[must_use]
    pub fn new(install_dir: InstallDir) -> Self {
        Self {
            install_dir,
            output: stdout_output(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Installer rooted at the platform default install directory.
    ///
    /// # Errors
    /// Returns [`InstallError::Environment`] when no install directory can be
    /// determined.
    pub fn from_environment() -> Result<Self, InstallError> {
        Ok(Self::new(InstallDir::resolve()?))
    }

    /// Where version-change notices are written.
    #[must_use]
    pub fn with_output(mut self, output: SharedOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn install_dir(&self) -> &InstallDir {
        &self.install_dir
    }

    /// Make sure the latest release of `source` is installed and return its
    /// path.
    ///
    /// A binary that cannot be executed is treated as missing and installed
    /// fresh; a working but older binary is replaced in place.
    ///
    /// # Errors
    /// Network failures, a binary whose `--version` output does not follow
    /// `<name> <version>`, or a failed filesystem swap.
    pub async fn ensure(
        &self,
        progress: &dyn ProgressSink,
        source: &dyn VersionSource,
    ) -> Result<PathBuf, InstallError> {
        let display = display_name(source.name());
        progress.step(&format!("Checking latest {display} release..."));

        let latest = match source.latest_version().await {
            Ok(latest) => latest,
            Err(error) => {
                progress.fail();
                return Err(InstallError::LatestVersion(error));
            }
        };

        let bin = self.install_dir.binary_path(source.name());
        let installed = probe(&bin, self.probe_timeout).await;

        match installed.version {
            None => {
                info!("{display} not installed at {}, installing v{latest}", bin.display());
                self.install(progress, source, &latest, &bin).await?;
            }
            Some(probe_output) => {
                self.update(progress, source, &probe_output, &latest, &bin)
                    .await?;
            }
        }

        progress.done();
        Ok(bin)
    }

    async fn install(
        &self,
        progress: &dyn ProgressSink,
        source: &dyn VersionSource,
        latest: &Version,
        bin: &Path,
    ) -> Result<(), InstallError> {
        let display = display_name(source.name());
        progress.step(&format!("Fetching latest {display} release..."));
        let tmp = download(progress, source, latest).await?;
        place(progress, source, &tmp, bin)
    }

    async fn update(
        &self,
        progress: &dyn ProgressSink,
        source: &dyn VersionSource,
        probe_output: &str,
        latest: &Version,
        bin: &Path,
    ) -> Result<(), InstallError> {
        let display = display_name(source.name());
        progress.step(&format!("Checking installed {display} version..."));

        let current = match parse_probe_output(display, probe_output) {
            Ok(current) => current,
            Err(error) => {
                progress.fail();
                return Err(error);
            }
        };

        if *latest <= current {
            debug!("{display} v{current} is up to date (latest v{latest})");
            return Ok(());
        }

        let notice = format!(
            "Current {display} version: {current}\nLatest {display} version: {latest}\n"
        );
        if let Err(error) = write_shared(&self.output, notice.as_bytes()) {
            debug!("Failed to write {display} version notice: {error}");
        }

        progress.step(&format!("Fetching latest {display} release..."));
        let tmp = download(progress, source, latest).await?;

        progress.step(&format!("Replacing {display} binary..."));
        place(progress, source, &tmp, bin)
    }
}

async fn download(
    progress: &dyn ProgressSink,
    source: &dyn VersionSource,
    version: &Version,
) -> Result<PathBuf, InstallError> {
    source.download(version).await.map_err(|error| {
        progress.fail();
        InstallError::Download {
            binary: display_name(source.name()).to_string(),
            source: error,
        }
    })
}

fn place(
    progress: &dyn ProgressSink,
    source: &dyn VersionSource,
    tmp: &Path,
    bin: &Path,
) -> Result<(), InstallError> {
    let result = swap_binary(tmp, bin);
    if tmp.exists() {
        let _ = std::fs::remove_file(tmp);
    }

    match result {
        Ok(method) => {
            info!("Placed {} via {method:?}", bin.display());
            Ok(())
        }
        Err(error) => {
            progress.fail();
            Err(InstallError::Swap {
                binary: display_name(source.name()).to_string(),
                path: bin.to_path_buf(),
                source: error,
            })
        }
    }
}

fn display_name(file_name: &str) -> &str {
    file_name
        .strip_suffix(std::env::consts::EXE_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(file_name)
}
#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use semver::Version;

    use sidecar_backend::{NoProgress, ProgressSink, SharedOutput, SourceError, VersionSource};
    use sidecar_platform::InstallDir;

    use super::{BinaryInstaller, display_name};
    use crate::error::InstallError;

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl RecordingProgress {
        fn events(&self) -> Vec<String> {
            self.events.lock().expect("lock").clone()
        }
    }

    impl ProgressSink for RecordingProgress {
        fn step(&self, label: &str) {
            self.events.lock().expect("lock").push(label.to_string());
        }

        fn fail(&self) {
            self.events.lock().expect("lock").push("<fail>".to_string());
        }

        fn done(&self) {
            self.events.lock().expect("lock").push("<done>".to_string());
        }
    }

    struct FailingSource {
        downloads: AtomicUsize,
    }

    #[async_trait]
    impl VersionSource for FailingSource {
        fn name(&self) -> &str {
            "viceroy"
        }

        async fn latest_version(&self) -> Result<Version, SourceError> {
            Err(SourceError::request("fetch latest release", "connection refused"))
        }

        async fn download(&self, _version: &Version) -> Result<PathBuf, SourceError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::request("download", "unreachable"))
        }
    }

    struct UnreachableDownloads;

    #[async_trait]
    impl VersionSource for UnreachableDownloads {
        fn name(&self) -> &str {
            "viceroy"
        }

        async fn latest_version(&self) -> Result<Version, SourceError> {
            Ok(Version::new(0, 9, 3))
        }

        async fn download(&self, _version: &Version) -> Result<PathBuf, SourceError> {
            Err(SourceError::artifact("download", "no asset for platform"))
        }
    }

    #[tokio::test]
    async fn latest_version_failure_is_network_error_and_fails_progress() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let installer = BinaryInstaller::new(InstallDir::from_path(dir.path()));
        let progress = RecordingProgress::default();
        let source = FailingSource {
            downloads: AtomicUsize::new(0),
        };

        let result = installer.ensure(&progress, &source).await;

        let error = result.expect_err("latest version failure propagates");
        assert!(matches!(error, InstallError::LatestVersion(_)));
        assert!(error.is_network());
        assert_eq!(
            progress.events(),
            vec!["Checking latest viceroy release...", "<fail>"]
        );
        assert_eq!(source.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_failure_on_fresh_install_is_network_error() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let installer = BinaryInstaller::new(InstallDir::from_path(dir.path()));
        let progress = RecordingProgress::default();

        let error = installer
            .ensure(&progress, &UnreachableDownloads)
            .await
            .expect_err("download failure propagates");

        assert!(matches!(error, InstallError::Download { ref binary, .. } if binary == "viceroy"));
        assert_eq!(
            progress.events(),
            vec![
                "Checking latest viceroy release...",
                "Fetching latest viceroy release...",
                "<fail>"
            ]
        );
        assert!(!dir.path().join("viceroy").exists());
    }

    #[tokio::test]
    async fn builder_options_are_applied() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let output: SharedOutput = buffer.clone();
        let installer = BinaryInstaller::new(InstallDir::from_path("/opt/sidecar"))
            .with_output(output)
            .with_probe_timeout(std::time::Duration::from_millis(250));

        assert_eq!(installer.install_dir().path(), std::path::Path::new("/opt/sidecar"));
        assert_eq!(installer.probe_timeout.as_millis(), 250);

        let _ = installer.ensure(&NoProgress, &UnreachableDownloads).await;
        assert!(buffer.lock().expect("lock").is_empty());
    }

    #[test]
    fn display_name_strips_platform_suffix_only() {
        let exe = format!("viceroy{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(display_name(&exe), "viceroy");
        assert_eq!(display_name("viceroy"), "viceroy");
    }
}
