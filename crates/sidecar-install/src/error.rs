use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use sidecar_backend::{SourceError, VersionParseError};
use sidecar_platform::AppPathsError;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("error fetching latest version: {0}")]
    LatestVersion(#[source] SourceError),

    #[error("error downloading latest {binary} release: {source}")]
    Download {
        binary: String,
        #[source]
        source: SourceError,
    },

    #[error("error moving latest {binary} binary in place at {}: {source}", .path.display())]
    Swap {
        binary: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} version not found in probe output {output:?}")]
    MalformedProbeOutput { binary: String, output: String },

    #[error("error reading current version: {0}")]
    VersionParse(#[source] VersionParseError),

    #[error(transparent)]
    Environment(#[from] AppPathsError),
}

/// What the user can do about an [`InstallError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    Network,
    Bug,
    Environment,
    None,
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(
                f,
                "Please ensure you have network connectivity and try again."
            ),
            Self::Bug => write!(
                f,
                "The installed binary did not report its version as expected. \
                 If this persists please report it, or delete the binary to force a reinstall."
            ),
            Self::Environment => write!(
                f,
                "Set HOME (or the platform config directory) so an install location \
                 can be determined."
            ),
            Self::None => Ok(()),
        }
    }
}

impl InstallError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::LatestVersion(_) | Self::Download { .. } => Remediation::Network,
            Self::MalformedProbeOutput { .. } | Self::VersionParse(_) => Remediation::Bug,
            Self::Environment(_) => Remediation::Environment,
            Self::Swap { .. } => Remediation::None,
        }
    }

    #[must_use]
    pub fn is_network(&self) -> bool {
        self.remediation() == Remediation::Network
    }
}
