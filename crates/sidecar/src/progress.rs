use std::sync::{Mutex, PoisonError};

use sidecar_backend::{ProgressSink, SharedOutput, stderr_output, write_shared};

/// Line-per-step progress for an interactive terminal.
pub struct TerminalProgress {
    output: SharedOutput,
    current: Mutex<Option<String>>,
}

impl TerminalProgress {
    pub fn stderr() -> Self {
        Self::new(stderr_output())
    }

    pub fn new(output: SharedOutput) -> Self {
        Self {
            output,
            current: Mutex::new(None),
        }
    }

    fn emit(&self, line: &str) {
        let _ = write_shared(&self.output, format!("{line}\n").as_bytes());
    }

    fn take_current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl ProgressSink for TerminalProgress {
    fn step(&self, label: &str) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(label.to_string());
        self.emit(label);
    }

    fn fail(&self) {
        match self.take_current() {
            Some(label) => self.emit(&format!("✗ {}", label.trim_end_matches('.'))),
            None => self.emit("✗ Failed"),
        }
    }

    fn done(&self) {
        if self.take_current().is_some() {
            self.emit("✓ Done");
        }
    }
}
