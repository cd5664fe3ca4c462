use std::io;
use std::path::Path;

use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMethod {
    Renamed,
    Copied,
}

/// Move a freshly downloaded binary to `dest`, replacing whatever is there.
///
/// A rename is tried first. When it fails (typically because the temp
/// directory lives on another device) the file is copied and the source
/// removed.
///
/// # Errors
/// Returns the copy error when both strategies fail, or an error creating
/// the destination directory.
pub fn swap_binary(tmp: &Path, dest: &Path) -> io::Result<SwapMethod> {
    swap_with(tmp, dest, |from, to| std::fs::rename(from, to))
}

pub(crate) fn swap_with<F>(tmp: &Path, dest: &Path, rename: F) -> io::Result<SwapMethod>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let method = match rename(tmp, dest) {
        Ok(()) => SwapMethod::Renamed,
        Err(error) => {
            debug!(
                "Rename {} -> {} failed ({error}), copying instead",
                tmp.display(),
                dest.display()
            );
            std::fs::copy(tmp, dest)?;
            if let Err(error) = std::fs::remove_file(tmp) {
                warn!("Failed to remove {}: {error}", tmp.display());
            }
            SwapMethod::Copied
        }
    };

    mark_executable(dest)?;
    Ok(method)
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{SwapMethod, swap_binary, swap_with};

    const SCRIPT: &str = "#!/bin/sh\necho \"viceroy 0.9.3\"\n";

    #[test]
    fn rename_moves_file_into_new_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let tmp = temp.path().join("download");
        let dest = temp.path().join("install").join("viceroy");
        std::fs::write(&tmp, SCRIPT).expect("download written");

        let method = swap_binary(&tmp, &dest).expect("swap succeeds");

        assert_eq!(method, SwapMethod::Renamed);
        assert!(!tmp.exists());
        assert_eq!(
            std::fs::read_to_string(&dest).expect("dest readable"),
            SCRIPT
        );
    }

    #[test]
    fn swap_replaces_existing_binary() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let tmp = temp.path().join("download");
        let dest = temp.path().join("viceroy");
        std::fs::write(&dest, "old").expect("old binary written");
        std::fs::write(&tmp, "new").expect("download written");

        swap_binary(&tmp, &dest).expect("swap succeeds");

        assert_eq!(std::fs::read_to_string(&dest).expect("dest readable"), "new");
    }

    #[test]
    fn rename_failure_falls_back_to_copy_and_removes_source() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let tmp = temp.path().join("download");
        let dest = temp.path().join("viceroy");
        std::fs::write(&tmp, SCRIPT).expect("download written");

        let method = swap_with(&tmp, &dest, |_, _| {
            Err(io::Error::other("Invalid cross-device link (os error 18)"))
        })
        .expect("copy fallback succeeds");

        assert_eq!(method, SwapMethod::Copied);
        assert!(dest.exists());
        assert!(!tmp.exists());
    }

    #[test]
    fn copy_failure_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let missing = temp.path().join("never-downloaded");
        let dest = temp.path().join("viceroy");

        let result = swap_with(&missing, &dest, |_, _| Err(io::Error::other("exdev")));

        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copied_binary_is_executable_and_probes() {
        use std::time::Duration;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let tmp = temp.path().join("download");
        let dest = temp.path().join("bin").join("viceroy");
        std::fs::write(&tmp, SCRIPT).expect("download written");

        swap_with(&tmp, &dest, |_, _| Err(io::Error::other("exdev"))).expect("copy fallback");

        let binary = crate::probe(&dest, Duration::from_secs(5)).await;
        assert_eq!(binary.version.as_deref(), Some("viceroy 0.9.3\n"));
    }
}
