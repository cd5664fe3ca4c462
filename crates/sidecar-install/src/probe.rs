use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::debug;
use semver::Version;
use tokio::process::Command;

use sidecar_backend::{InstalledBinary, parse_version};
use sidecar_platform::HideWindow;

use crate::error::InstallError;

pub const VERSION_PROBE_ARG: &str = "--version";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `path --version` and capture what it prints.
///
/// Any failure (missing file, not executable, non-zero exit, timeout) yields
/// an absent binary rather than an error. `PATH` is never consulted.
pub async fn probe(path: &Path, timeout: Duration) -> InstalledBinary {
    let mut command = Command::new(path);
    command
        .arg(VERSION_PROBE_ARG)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .hide_window();

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(error)) => {
            debug!("Probe of {} failed to run: {error}", path.display());
            return InstalledBinary::absent(path.to_path_buf());
        }
        Err(_) => {
            debug!(
                "Probe of {} timed out after {}s",
                path.display(),
                timeout.as_secs()
            );
            return InstalledBinary::absent(path.to_path_buf());
        }
    };

    if !output.status.success() {
        debug!(
            "Probe of {} exited with {:?}",
            path.display(),
            output.status.code()
        );
        return InstalledBinary::absent(path.to_path_buf());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    debug!("Probe of {} reported {:?}", path.display(), combined.trim());

    InstalledBinary {
        path: path.to_path_buf(),
        version: Some(combined),
    }
}

/// Extract the version from `<name> <version>` probe output.
///
/// # Errors
/// [`InstallError::MalformedProbeOutput`] when there is no second token,
/// [`InstallError::VersionParse`] when the token is not a semantic version.
pub fn parse_probe_output(binary: &str, output: &str) -> Result<Version, InstallError> {
    let Some(token) = output.split_whitespace().nth(1) else {
        return Err(InstallError::MalformedProbeOutput {
            binary: binary.to_string(),
            output: output.to_string(),
        });
    };

    parse_version(token).map_err(InstallError::VersionParse)
}
