use sidecar_exec::SuperviseError;
use sidecar_install::{InstallError, Remediation};

#[derive(Debug)]
pub enum AppError {
    HttpClient {
        details: String,
    },
    Install(InstallError),
    Supervise(SuperviseError),
}

impl AppError {
    pub fn http_client(details: impl ToString) -> Self {
        Self::HttpClient {
            details: details.to_string(),
        }
    }

    /// Guidance to print after the error, if any applies.
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Install(source) => {
                Some(source.remediation()).filter(|remediation| *remediation != Remediation::None)
            }
            Self::HttpClient { .. } => Some(Remediation::Network),
            Self::Supervise(_) => None,
        }
    }

    /// A child that may still be running after a shutdown request.
    pub fn is_fatal_signal_failure(&self) -> bool {
        matches!(
            self,
            Self::Supervise(SuperviseError::SignalDelivery(_))
        )
    }
}

impl From<InstallError> for AppError {
    fn from(value: InstallError) -> Self {
        Self::Install(value)
    }
}

impl From<SuperviseError> for AppError {
    fn from(value: SuperviseError) -> Self {
        Self::Supervise(value)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpClient { details } => write!(f, "Failed to build HTTP client: {details}"),
            Self::Install(source) => write!(f, "{source}"),
            Self::Supervise(source) => write!(f, "{source}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Install(source) => Some(source),
            Self::Supervise(source) => Some(source),
            Self::HttpClient { .. } => None,
        }
    }
}
