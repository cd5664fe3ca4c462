use async_trait::async_trait;
use semver::Version;
use std::path::PathBuf;

use crate::error::SourceError;

/// Release channel for a companion binary.
///
/// Implementations hold no per-call state; every method may be called any
/// number of times.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Filename the binary is installed under. Independent of the version.
    fn name(&self) -> &str;

    /// The highest version currently published on the channel.
    async fn latest_version(&self) -> Result<Version, SourceError>;

    /// Fetch `version` into a private temporary location and return the path
    /// of the extracted binary. The caller owns the returned file.
    async fn download(&self, version: &Version) -> Result<PathBuf, SourceError>;
}

/// Multi-step progress reporter. Purely informational.
pub trait ProgressSink: Send + Sync {
    fn step(&self, label: &str);
    fn fail(&self);
    fn done(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn step(&self, _label: &str) {}
    fn fail(&self) {}
    fn done(&self) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for &T {
    fn step(&self, label: &str) {
        (**self).step(label);
    }

    fn fail(&self) {
        (**self).fail();
    }

    fn done(&self) {
        (**self).done();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct FixedSource {
        version: &'static str,
    }

    #[async_trait]
    impl VersionSource for FixedSource {
        fn name(&self) -> &str {
            "viceroy"
        }

        async fn latest_version(&self) -> Result<Version, SourceError> {
            Version::parse(self.version).map_err(|e| SourceError::parse_from("latest", e))
        }

        async fn download(&self, _version: &Version) -> Result<PathBuf, SourceError> {
            Err(SourceError::artifact("download", "not implemented"))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingProgress {
        fn step(&self, label: &str) {
            self.events.lock().expect("lock").push(format!("step:{label}"));
        }

        fn fail(&self) {
            self.events.lock().expect("lock").push("fail".to_string());
        }

        fn done(&self) {
            self.events.lock().expect("lock").push("done".to_string());
        }
    }

    #[tokio::test]
    async fn boxed_source_is_usable_as_trait_object() {
        let source: Box<dyn VersionSource> = Box::new(FixedSource { version: "0.9.3" });

        assert_eq!(source.name(), "viceroy");
        let latest = source.latest_version().await.expect("fixed version parses");
        assert_eq!(latest, Version::new(0, 9, 3));
        assert!(source.download(&latest).await.is_err());
    }

    #[test]
    fn progress_reference_forwards_events() {
        let progress = RecordingProgress::default();
        let by_ref = &progress;

        by_ref.step("Checking");
        by_ref.fail();
        by_ref.done();

        let events = progress.events.lock().expect("lock").clone();
        assert_eq!(events, vec!["step:Checking", "fail", "done"]);
    }

    #[test]
    fn no_progress_accepts_all_events() {
        let progress = NoProgress;
        progress.step("anything");
        progress.fail();
        progress.done();
    }
}
