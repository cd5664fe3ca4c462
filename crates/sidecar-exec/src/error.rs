use std::path::PathBuf;

use thiserror::Error;

use crate::process::ProcessSignal;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("error during execution process: failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error during execution process")]
    Failed { code: Option<i32> },

    /// Non-zero exit summarised by what the child wrote to stderr.
    #[error("{0}")]
    Stderr(String),

    #[error("error waiting for {}: {source}", .program.display())]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process has already been started")]
    AlreadyStarted,

    #[error("failed to deliver {signal} to child process: {details}")]
    Signal {
        signal: ProcessSignal,
        details: String,
    },

    #[error("{0} cannot be delivered on this platform")]
    UnsupportedSignal(ProcessSignal),
}

impl ExecError {
    pub(crate) fn signal(signal: ProcessSignal, details: impl ToString) -> Self {
        Self::Signal {
            signal,
            details: details.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SuperviseError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("failed to stop child process after shutdown request: {0}")]
    SignalDelivery(#[source] ExecError),

    #[error("failed to listen for shutdown signals: {0}")]
    Listen(#[source] std::io::Error),
}
