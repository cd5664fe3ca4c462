#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use tempfile::{TempDir, tempdir};

use sidecar_backend::{ProgressSink, SharedOutput, SourceError, VersionSource};
use sidecar_install::{BinaryInstaller, InstallError, Remediation, probe};
use sidecar_platform::InstallDir;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn write_script(path: &Path, version: &str) {
    std::fs::write(path, format!("#!/bin/sh\necho \"viceroy {version}\"\n"))
        .expect("write script");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .expect("make script executable");
}

/// Serves one fixed release; every download writes a fresh script reporting it.
struct ScriptSource {
    latest: Version,
    staging: TempDir,
    downloads: AtomicUsize,
    reachable: bool,
}

impl ScriptSource {
    fn new(latest: &str) -> Self {
        Self {
            latest: Version::parse(latest).expect("valid version"),
            staging: tempdir().expect("create staging dir"),
            downloads: AtomicUsize::new(0),
            reachable: true,
        }
    }

    fn offline() -> Self {
        Self {
            reachable: false,
            ..Self::new("0.0.0")
        }
    }

    fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionSource for ScriptSource {
    fn name(&self) -> &str {
        "viceroy"
    }

    async fn latest_version(&self) -> Result<Version, SourceError> {
        if !self.reachable {
            return Err(SourceError::request(
                "fetch latest release",
                "dns error: failed to lookup address information",
            ));
        }
        Ok(self.latest.clone())
    }

    async fn download(&self, version: &Version) -> Result<PathBuf, SourceError> {
        let n = self.downloads.fetch_add(1, Ordering::SeqCst);
        let path = self.staging.path().join(format!("download-{n}"));
        write_script(&path, &version.to_string());
        Ok(path)
    }
}

#[derive(Default)]
struct RecordingProgress {
    steps: Mutex<Vec<String>>,
    failed: AtomicUsize,
    done: AtomicUsize,
}

impl ProgressSink for RecordingProgress {
    fn step(&self, label: &str) {
        self.steps.lock().expect("lock steps").push(label.to_string());
    }

    fn fail(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

fn installer(dir: &Path) -> (BinaryInstaller, Arc<Mutex<Vec<u8>>>) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let output: SharedOutput = buffer.clone();
    let installer = BinaryInstaller::new(InstallDir::from_path(dir))
        .with_output(output)
        .with_probe_timeout(PROBE_TIMEOUT);
    (installer, buffer)
}

#[tokio::test]
async fn fresh_install_downloads_once_and_probes_afterwards() {
    let install = tempdir().expect("create install dir");
    let target = install.path().join("nested").join("bin");
    let (installer, output) = installer(&target);
    let source = ScriptSource::new("0.9.3");
    let progress = RecordingProgress::default();

    let path = installer
        .ensure(&progress, &source)
        .await
        .expect("fresh install succeeds");

    assert_eq!(path, target.join("viceroy"));
    assert_eq!(source.downloads(), 1);
    assert_eq!(progress.done.load(Ordering::SeqCst), 1);
    assert_eq!(progress.failed.load(Ordering::SeqCst), 0);

    let installed = probe(&path, PROBE_TIMEOUT).await;
    assert_eq!(installed.version.as_deref(), Some("viceroy 0.9.3\n"));
    assert!(output.lock().expect("lock output").is_empty());
}

#[tokio::test]
async fn up_to_date_binary_is_left_alone() {
    let install = tempdir().expect("create install dir");
    let bin = install.path().join("viceroy");
    write_script(&bin, "0.9.3");
    let before = std::fs::metadata(&bin).expect("stat binary").modified().ok();

    let (installer, output) = installer(install.path());
    let source = ScriptSource::new("0.9.3");
    let progress = RecordingProgress::default();

    installer
        .ensure(&progress, &source)
        .await
        .expect("up-to-date ensure succeeds");

    assert_eq!(source.downloads(), 0);
    assert_eq!(std::fs::metadata(&bin).expect("stat binary").modified().ok(), before);
    assert!(output.lock().expect("lock output").is_empty());
    assert_eq!(progress.done.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn newer_local_binary_is_never_downgraded() {
    let install = tempdir().expect("create install dir");
    let bin = install.path().join("viceroy");
    write_script(&bin, "1.0.0");

    let (installer, _) = installer(install.path());
    let source = ScriptSource::new("0.9.3");

    installer
        .ensure(&sidecar_backend::NoProgress, &source)
        .await
        .expect("ensure succeeds");

    assert_eq!(source.downloads(), 0);
    let installed = probe(&bin, PROBE_TIMEOUT).await;
    assert_eq!(installed.version.as_deref(), Some("viceroy 1.0.0\n"));
}

struct ClosedOutput;

impl std::io::Write for ClosedOutput {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn closed_notice_output_does_not_block_update() {
    let install = tempdir().expect("create install dir");
    let bin = install.path().join("viceroy");
    write_script(&bin, "0.1.0");

    let output: SharedOutput = Arc::new(Mutex::new(ClosedOutput));
    let installer = BinaryInstaller::new(InstallDir::from_path(install.path()))
        .with_output(output)
        .with_probe_timeout(PROBE_TIMEOUT);
    let source = ScriptSource::new("0.1.1");

    installer
        .ensure(&RecordingProgress::default(), &source)
        .await
        .expect("update succeeds without the notice");

    assert_eq!(source.downloads(), 1);
    let installed = probe(&bin, PROBE_TIMEOUT).await;
    assert_eq!(installed.version.as_deref(), Some("viceroy 0.1.1\n"));
}

#[tokio::test]
async fn outdated_binary_is_replaced_once() {
    let install = tempdir().expect("create install dir");
    let bin = install.path().join("viceroy");
    write_script(&bin, "0.1.0");

    let (installer, output) = installer(install.path());
    let source = ScriptSource::new("0.1.1");
    let progress = RecordingProgress::default();

    installer
        .ensure(&progress, &source)
        .await
        .expect("update succeeds");

    assert_eq!(source.downloads(), 1);
    let installed = probe(&bin, PROBE_TIMEOUT).await;
    assert_eq!(installed.version.as_deref(), Some("viceroy 0.1.1\n"));

    let printed = String::from_utf8(output.lock().expect("lock output").clone())
        .expect("notice is utf-8");
    assert_eq!(
        printed,
        "Current viceroy version: 0.1.0\nLatest viceroy version: 0.1.1\n"
    );

    let steps = progress.steps.lock().expect("lock steps").clone();
    assert_eq!(
        steps,
        vec![
            "Checking latest viceroy release...",
            "Checking installed viceroy version...",
            "Fetching latest viceroy release...",
            "Replacing viceroy binary...",
        ]
    );

    installer
        .ensure(&progress, &source)
        .await
        .expect("second ensure succeeds");
    assert_eq!(source.downloads(), 1);
}

#[tokio::test]
async fn corrupt_binary_is_reinstalled() {
    let install = tempdir().expect("create install dir");
    let bin = install.path().join("viceroy");
    std::fs::write(&bin, b"truncated download").expect("write corrupt binary");

    let (installer, _) = installer(install.path());
    let source = ScriptSource::new("0.9.3");

    installer
        .ensure(&sidecar_backend::NoProgress, &source)
        .await
        .expect("reinstall succeeds");

    assert_eq!(source.downloads(), 1);
    assert!(probe(&bin, PROBE_TIMEOUT).await.is_installed());
}

#[tokio::test]
async fn malformed_version_output_fails_with_bug_remediation() {
    let install = tempdir().expect("create install dir");
    let bin = install.path().join("viceroy");
    std::fs::write(&bin, "#!/bin/sh\necho viceroy\n").expect("write script");
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755))
        .expect("make script executable");

    let (installer, _) = installer(install.path());
    let source = ScriptSource::new("0.9.3");
    let progress = RecordingProgress::default();

    let error = installer
        .ensure(&progress, &source)
        .await
        .expect_err("malformed probe output is an error");

    assert!(matches!(error, InstallError::MalformedProbeOutput { .. }));
    assert_eq!(error.remediation(), Remediation::Bug);
    assert_eq!(progress.failed.load(Ordering::SeqCst), 1);
    assert_eq!(source.downloads(), 0);
}

#[tokio::test]
async fn network_failure_fails_progress_with_network_remediation() {
    let install = tempdir().expect("create install dir");
    let (installer, _) = installer(install.path());
    let source = ScriptSource::offline();
    let progress = RecordingProgress::default();

    let error = installer
        .ensure(&progress, &source)
        .await
        .expect_err("offline ensure fails");

    assert_eq!(error.remediation(), Remediation::Network);
    assert!(error.to_string().starts_with("error fetching latest version"));
    assert_eq!(progress.failed.load(Ordering::SeqCst), 1);
    assert_eq!(progress.done.load(Ordering::SeqCst), 0);
    assert!(!install.path().join("viceroy").exists());
}
