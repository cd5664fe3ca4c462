use thiserror::Error;

/// Failure resolving or fetching a release of the companion binary.
///
/// The user-facing remediation for every variant is the same (check network
/// connectivity), so the stage only exists to make logs precise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Network error during {operation} ({stage}): {details}")]
pub struct SourceError {
    pub operation: &'static str,
    pub stage: NetworkStage,
    pub details: String,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStage {
    #[error("request")]
    Request,
    #[error("response parse")]
    ResponseParse,
    #[error("artifact")]
    Artifact,
}

impl SourceError {
    pub fn new(operation: &'static str, stage: NetworkStage, details: impl Into<String>) -> Self {
        Self {
            operation,
            stage,
            details: details.into(),
        }
    }

    pub fn request(operation: &'static str, details: impl Into<String>) -> Self {
        Self::new(operation, NetworkStage::Request, details)
    }

    pub fn request_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::request(operation, error.to_string())
    }

    pub fn parse(operation: &'static str, details: impl Into<String>) -> Self {
        Self::new(operation, NetworkStage::ResponseParse, details)
    }

    pub fn parse_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::parse(operation, error.to_string())
    }

    pub fn artifact(operation: &'static str, details: impl Into<String>) -> Self {
        Self::new(operation, NetworkStage::Artifact, details)
    }

    pub fn artifact_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::artifact(operation, error.to_string())
    }
}
