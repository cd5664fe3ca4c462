use semver::Version;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Writer shared between the caller and background output pumps.
pub type SharedOutput = Arc<Mutex<dyn Write + Send>>;

/// The process's standard output as a [`SharedOutput`].
#[must_use]
pub fn stdout_output() -> SharedOutput {
    Arc::new(Mutex::new(std::io::stdout()))
}

#[must_use]
pub fn stderr_output() -> SharedOutput {
    Arc::new(Mutex::new(std::io::stderr()))
}

/// Write `bytes` to a shared sink and flush it. Recovers a poisoned lock.
///
/// # Errors
/// Propagates the underlying write error.
pub fn write_shared(output: &SharedOutput, bytes: &[u8]) -> std::io::Result<()> {
    let mut guard = output
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.write_all(bytes)?;
    guard.flush()
}

/// A binary at a known install location, as seen by executing it.
///
/// `version` holds the raw probe output and is `None` whenever the probe
/// could not run the binary, so a corrupt or half-written file reads the
/// same as a missing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBinary {
    pub path: PathBuf,
    pub version: Option<String>,
}

impl InstalledBinary {
    #[must_use]
    pub fn absent(path: PathBuf) -> Self {
        Self {
            path,
            version: None,
        }
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.version.is_some()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Invalid version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

/// Parse a release or probe version, tolerating a leading `v` and
/// surrounding whitespace.
pub fn parse_version(input: &str) -> Result<Version, VersionParseError> {
    let trimmed = input.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare).map_err(|error| VersionParseError {
        input: input.to_string(),
        reason: error.to_string(),
    })
}
