use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{0}")]
    Invalid(String),
}

impl ArchiveError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

/// Stream `url` into `dest`, returning the number of bytes written.
///
/// # Errors
/// Returns an error when the request fails, the server answers with a
/// non-success status, or the file cannot be written.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, ArchiveError> {
    use futures_util::StreamExt;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| ArchiveError::http("download request failed", error))?;

    if !response.status().is_success() {
        return Err(ArchiveError::Invalid(format!(
            "Download failed with status {}",
            response.status()
        )));
    }

    let mut downloaded: u64 = 0;
    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        ArchiveError::io_with_path("failed to create download file", dest, &error)
    })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| ArchiveError::http("download stream error", error))?;
        file.write_all(&chunk).await.map_err(|error| {
            ArchiveError::io_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(|error| {
        ArchiveError::io_with_path("failed to flush download file", dest, &error)
    })?;

    info!("Download complete: {downloaded} bytes");
    Ok(downloaded)
}

/// Lower-case hex SHA-256 of the file at `path`.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, ArchiveError> {
    let mut file = std::fs::File::open(path).map_err(|error| {
        ArchiveError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            ArchiveError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare the file's digest against `expected` (hex, any case).
///
/// # Errors
/// Returns [`ArchiveError::Invalid`] on mismatch.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), ArchiveError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        debug!("Checksum verified for {}", path.display());
        Ok(())
    } else {
        Err(ArchiveError::Invalid(format!(
            "Checksum mismatch for {}: expected {}, got {actual}",
            path.display(),
            expected.to_ascii_lowercase()
        )))
    }
}

/// Unpack a `.tar.gz`/`.tgz` or `.zip` archive into `dest`.
///
/// # Errors
/// Returns an error for unknown extensions or unreadable archives.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(dest).map_err(|error| {
        ArchiveError::io_with_path("failed to create extraction directory", dest, &error)
    })?;

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive, dest)
    } else if name.ends_with(".zip") {
        extract_zip(archive, dest)
    } else {
        Err(ArchiveError::Invalid(format!(
            "Unsupported archive format: {}",
            archive.display()
        )))
    }
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let file = std::fs::File::open(archive_path).map_err(|error| {
        ArchiveError::io_with_path("failed to open tar.gz file", archive_path, &error)
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));

    // `unpack` refuses entries that would land outside `dest`.
    archive.unpack(dest).map_err(|error| {
        ArchiveError::io_with_path("failed to extract tar.gz archive", archive_path, &error)
    })?;

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::open(zip_path).map_err(|error| {
        ArchiveError::io_with_path("failed to open zip file", zip_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ArchiveError::zip("failed to read zip archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ArchiveError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ArchiveError::io_with_path(
                    "failed to create extraction directory",
                    &out_path,
                    &error,
                )
            })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    ArchiveError::io_with_path(
                        "failed to create extraction parent directory",
                        parent,
                        &error,
                    )
                })?;
            }
            let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
                ArchiveError::io_with_path("failed to create extracted file", &out_path, &error)
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|error| {
                ArchiveError::io_with_path("failed to extract archive entry", &out_path, &error)
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ =
                        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
                }
            }
        }
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

/// Depth-first search for a regular file called `file_name` under `dir`.
#[must_use]
pub fn find_binary(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry.file_name() == file_name {
            return Some(path);
        }
    }

    subdirs
        .into_iter()
        .find_map(|subdir| find_binary(&subdir, file_name))
}
