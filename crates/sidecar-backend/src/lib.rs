mod error;
mod traits;
mod types;

pub use error::{NetworkStage, SourceError};
pub use traits::{NoProgress, ProgressSink, VersionSource};
pub use types::{
    InstalledBinary, SharedOutput, VersionParseError, parse_version, stderr_output, stdout_output,
    write_shared,
};

pub use semver::Version;
