//! Release-channel plumbing for companion binaries.
//!
//! This crate knows how to talk to a GitHub releases endpoint:
//! - Pick the highest published release (drafts and pre-releases skipped).
//! - Choose the asset built for the running platform.
//! - Stream, checksum and unpack that asset into a private temp file.

pub mod archive;
mod source;
mod update;

/// Archive download and extraction errors.
pub use archive::ArchiveError;
/// [`sidecar_backend::VersionSource`] backed by GitHub releases.
pub use source::{DEFAULT_API_BASE, GitHubVersionSource};
/// GitHub release model and selection helpers.
pub use update::{GitHubAsset, GitHubRelease, asset_stem, latest_stable_release, select_asset};
