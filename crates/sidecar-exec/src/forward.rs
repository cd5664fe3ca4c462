use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::error::{ExecError, SuperviseError};
use crate::process::{ProcessSignal, SupervisedProcess};

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited,
    /// A shutdown request killed the child; its exit status is not an error.
    Interrupted,
}

/// Listener for the parent's own termination signals.
///
/// Handlers are installed by [`ShutdownSignal::register`] and stay installed
/// for the life of the program, so signals arriving after the first are
/// absorbed rather than terminating the parent.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// # Errors
    /// Fails when the OS signal handlers cannot be installed.
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// # Errors
    /// Never fails on this platform; ctrl-c is hooked on first wait.
    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next shutdown signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> ProcessSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ProcessSignal::Interrupt,
            _ = self.terminate.recv() => ProcessSignal::Terminate,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> ProcessSignal {
        if let Err(error) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for ctrl-c: {error}");
            std::future::pending::<()>().await;
        }
        ProcessSignal::Interrupt
    }
}

/// Cancel `token` on the first shutdown signal, then stop listening.
///
/// Returns early without cancelling when `token` is cancelled elsewhere.
pub async fn forward_shutdown(mut signals: ShutdownSignal, token: CancellationToken) {
    tokio::select! {
        received = signals.recv() => {
            info!("Received {received}, stopping child process");
            token.cancel();
        }
        () = token.cancelled() => {}
    }
}

/// Run `process` until it exits or `token` is cancelled.
///
/// The run is polled before the token, so the child is spawned and tracked
/// before any kill can be issued. On cancellation exactly one kill is sent
/// and the run is still awaited to completion.
///
/// # Errors
/// [`SuperviseError::SignalDelivery`] when the kill cannot be delivered,
/// otherwise whatever the run itself failed with.
pub async fn run_until_cancelled(
    process: &SupervisedProcess,
    token: &CancellationToken,
) -> Result<Outcome, SuperviseError> {
    let run = process.run();
    tokio::pin!(run);

    tokio::select! {
        biased;
        result = &mut run => return result.map(|()| Outcome::Exited).map_err(Into::into),
        () = token.cancelled() => {}
    }

    let handle = process.handle();
    let kill = handle.signal(ProcessSignal::Kill);
    tokio::pin!(kill);
    let mut kill_sent = false;

    let result = loop {
        tokio::select! {
            biased;
            result = &mut run => break result,
            delivered = &mut kill, if !kill_sent => {
                kill_sent = true;
                delivered.map_err(SuperviseError::SignalDelivery)?;
            }
        }
    };

    match result {
        Ok(()) => Ok(Outcome::Exited),
        Err(ExecError::Stderr(_) | ExecError::Failed { .. }) => {
            debug!("Child process stopped after shutdown request");
            Ok(Outcome::Interrupted)
        }
        Err(error) => Err(error.into()),
    }
}

/// Run `process` with the parent's SIGINT/SIGTERM forwarded to it as a kill.
///
/// # Errors
/// [`SuperviseError::Listen`] when the signal handlers cannot be installed,
/// otherwise as [`run_until_cancelled`].
pub async fn supervise(process: &SupervisedProcess) -> Result<Outcome, SuperviseError> {
    let signals = ShutdownSignal::register().map_err(SuperviseError::Listen)?;
    let token = CancellationToken::new();
    let forwarder = tokio::spawn(forward_shutdown(signals, token.clone()));

    let outcome = run_until_cancelled(process, &token).await;

    token.cancel();
    let _ = forwarder.await;
    outcome
}
