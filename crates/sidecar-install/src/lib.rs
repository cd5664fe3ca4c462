mod error;
mod installer;
mod probe;
mod swap;

pub use error::{InstallError, Remediation};
pub use installer::BinaryInstaller;
pub use probe::{DEFAULT_PROBE_TIMEOUT, VERSION_PROBE_ARG, parse_probe_output, probe};
pub use swap::{SwapMethod, swap_binary};
