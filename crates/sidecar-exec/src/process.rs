use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use sidecar_backend::{SharedOutput, stdout_output, write_shared};
use sidecar_platform::HideWindow;

use crate::error::ExecError;

const PUMP_BUFFER_SIZE: usize = 8 * 1024;

/// How long output is still drained after a killed child has been reaped.
const KILLED_OUTPUT_DRAIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    Interrupt,
    Terminate,
    Kill,
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Running,
    Exited { success: bool },
    Killed,
}

struct SignalRequest {
    signal: ProcessSignal,
    reply: oneshot::Sender<Result<(), ExecError>>,
}

struct Tracked {
    state: ProcessState,
    pid: Option<u32>,
    requests: Option<mpsc::UnboundedSender<SignalRequest>>,
    delivered: usize,
}

/// Cloneable view of a [`SupervisedProcess`] used to observe and signal it
/// from other tasks.
///
/// Signals are handed to the task running the child, so they never reach a
/// pid that has already been reaped.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<Mutex<Tracked>>,
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tracked {
                state: ProcessState::Idle,
                pid: None,
                requests: None,
                delivered: 0,
            })),
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracked = self.lock();
        f.debug_struct("ProcessHandle")
            .field("state", &tracked.state)
            .field("pid", &tracked.pid)
            .field("delivered", &tracked.delivered)
            .finish()
    }
}

impl ProcessHandle {
    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    /// OS pid of the live child, if one is running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.lock().pid
    }

    /// Number of signals the OS accepted for this run.
    #[must_use]
    pub fn signals_delivered(&self) -> usize {
        self.lock().delivered
    }

    /// Deliver `signal` to the running child and everything it started.
    ///
    /// Does nothing when no child is running, including after it has exited.
    ///
    /// # Errors
    /// [`ExecError::Signal`] when the OS refuses the signal,
    /// [`ExecError::UnsupportedSignal`] for signals the platform cannot send.
    pub async fn signal(&self, signal: ProcessSignal) -> Result<(), ExecError> {
        let requests = {
            let tracked = self.lock();
            match (&tracked.state, &tracked.requests) {
                (ProcessState::Running, Some(requests)) => requests.clone(),
                _ => {
                    debug!("No running process to receive {signal}");
                    return Ok(());
                }
            }
        };

        let (reply, response) = oneshot::channel();
        if requests.send(SignalRequest { signal, reply }).is_err() {
            return Ok(());
        }

        // A dropped reply means the child exited before the request was seen.
        response.await.unwrap_or(Ok(()))
    }

    fn start(&self) -> Result<mpsc::UnboundedReceiver<SignalRequest>, ExecError> {
        let mut tracked = self.lock();
        if tracked.state != ProcessState::Idle {
            return Err(ExecError::AlreadyStarted);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        tracked.state = ProcessState::Running;
        tracked.requests = Some(sender);
        Ok(receiver)
    }

    fn record_pid(&self, pid: Option<u32>) {
        self.lock().pid = pid;
    }

    fn record_delivery(&self) {
        self.lock().delivered += 1;
    }

    fn finish(&self, state: ProcessState) {
        let mut tracked = self.lock();
        tracked.state = state;
        tracked.pid = None;
        tracked.requests = None;
    }
}

/// A single run of an external command with streamed output.
///
/// Stdout and stderr are both copied to the output sink as they arrive.
/// Stderr is also buffered so a failed run can be reported with what the
/// child printed, unless `verbose` is set and the user has already seen it.
pub struct SupervisedProcess {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    verbose: bool,
    output: SharedOutput,
    handle: ProcessHandle,
}

impl SupervisedProcess {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
            verbose: false,
            output: stdout_output(),
            handle: ProcessHandle::default(),
        }
    }

    /// Variables added on top of the inherited environment.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.envs
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn output(mut self, output: SharedOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.handle.state()
    }

    /// Spawn the command and wait for it to exit.
    ///
    /// On unix the child leads its own process group, so signals reach any
    /// processes it forks. After a kill, output still held open by an escaped
    /// descendant is abandoned after a short grace period.
    ///
    /// # Errors
    /// [`ExecError::AlreadyStarted`] on a second call, [`ExecError::Spawn`]
    /// when the program cannot be started, [`ExecError::Stderr`] or
    /// [`ExecError::Failed`] on a non-zero exit.
    pub async fn run(&self) -> Result<(), ExecError> {
        let mut requests = self.handle.start()?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .hide_window();
        #[cfg(unix)]
        command.process_group(0);

        debug!("Executing: {} {:?}", self.program.display(), self.args);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.handle.finish(ProcessState::Exited { success: false });
                return Err(ExecError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
        };
        self.handle.record_pid(child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut captured = Vec::new();
        let mut killed = false;

        let status = {
            let pumps = async {
                tokio::join!(
                    pump(stdout, &self.output, None),
                    pump(stderr, &self.output, Some(&mut captured)),
                );
            };
            tokio::pin!(pumps);

            let (status, drained) = tokio::select! {
                status = wait_for_exit(&mut child, &mut requests, &self.handle, &mut killed) => {
                    (status, false)
                }
                () = &mut pumps => {
                    let status =
                        wait_for_exit(&mut child, &mut requests, &self.handle, &mut killed).await;
                    (status, true)
                }
            };

            if !drained {
                if killed {
                    if tokio::time::timeout(KILLED_OUTPUT_DRAIN, &mut pumps)
                        .await
                        .is_err()
                    {
                        warn!(
                            "Output of {} still open after kill; no longer reading it",
                            self.program.display()
                        );
                    }
                } else {
                    pumps.await;
                }
            }
            status
        };

        let status = match status {
            Ok(status) => status,
            Err(source) => {
                self.handle.finish(ProcessState::Exited { success: false });
                return Err(ExecError::Wait {
                    program: self.program.clone(),
                    source,
                });
            }
        };

        let state = if killed {
            ProcessState::Killed
        } else {
            ProcessState::Exited {
                success: status.success(),
            }
        };
        self.handle.finish(state);

        if status.success() {
            debug!("{} exited successfully", self.program.display());
            return Ok(());
        }

        info!("{} exited with {status}", self.program.display());
        Err(self.failure(&status, &captured))
    }

    fn failure(&self, status: &ExitStatus, captured: &[u8]) -> ExecError {
        let summary = String::from_utf8_lossy(captured);
        let summary = summary.trim();
        if !self.verbose && !summary.is_empty() {
            return ExecError::Stderr(summary.to_string());
        }
        ExecError::Failed {
            code: status.code(),
        }
    }
}

async fn wait_for_exit(
    child: &mut Child,
    requests: &mut mpsc::UnboundedReceiver<SignalRequest>,
    handle: &ProcessHandle,
    killed: &mut bool,
) -> std::io::Result<ExitStatus> {
    loop {
        tokio::select! {
            status = child.wait() => return status,
            Some(request) = requests.recv() => {
                let result = deliver(child, request.signal);
                if result.is_ok() {
                    handle.record_delivery();
                    if request.signal == ProcessSignal::Kill {
                        *killed = true;
                    }
                }
                let _ = request.reply.send(result);
            }
        }
    }
}

/// Signal the child's process group. The group id is the child's pid, which
/// stays reserved until `wait` reaps it.
#[cfg(unix)]
fn deliver(child: &mut Child, signal: ProcessSignal) -> Result<(), ExecError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pgid = i32::try_from(pid).map_err(|error| ExecError::signal(signal, error))?;
    let os_signal = match signal {
        ProcessSignal::Interrupt => Signal::SIGINT,
        ProcessSignal::Terminate => Signal::SIGTERM,
        ProcessSignal::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(pgid), os_signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(ExecError::signal(signal, errno)),
    }
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, signal: ProcessSignal) -> Result<(), ExecError> {
    if signal != ProcessSignal::Kill {
        return Err(ExecError::UnsupportedSignal(signal));
    }
    child
        .start_kill()
        .map_err(|error| ExecError::signal(signal, error))
}

async fn pump<R>(reader: Option<R>, output: &SharedOutput, mut capture: Option<&mut Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    let mut write_failed = false;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(error) => {
                warn!("Failed to read child output: {error}");
                return;
            }
        };

        if let Some(capture) = capture.as_deref_mut() {
            capture.extend_from_slice(&buf[..n]);
        }

        // Keep draining after a write error so the child never blocks on a
        // full pipe.
        if let Err(error) = write_shared(output, &buf[..n])
            && !write_failed
        {
            warn!("Failed to forward child output: {error}");
            write_failed = true;
        }
    }
}
