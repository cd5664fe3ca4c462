//! Running a companion binary as a supervised child process.
//!
//! [`SupervisedProcess`] streams the child's output into a shared sink and
//! summarises failures from what it wrote to stderr. [`run_until_cancelled`]
//! and [`supervise`] tie a process to the parent's shutdown signals so an
//! interrupt kills the child exactly once.

mod error;
mod forward;
mod process;

pub use error::{ExecError, SuperviseError};
pub use forward::{Outcome, ShutdownSignal, forward_shutdown, run_until_cancelled, supervise};
pub use process::{ProcessHandle, ProcessSignal, ProcessState, SupervisedProcess};
