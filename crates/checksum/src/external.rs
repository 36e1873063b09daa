//! Out-of-process checksum helpers.

use std::process::{Command, Stdio};

use tracing::debug;

use crate::ChecksumError;

/// A helper command line. The object path is appended as the final argument
/// and the first whitespace-delimited token of stdout is the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalHelper {
    program: String,
    args: Vec<String>,
}

impl ExternalHelper {
    /// Splits `command_line` on whitespace. `None` when it is blank.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the helper against `path` and blocks until it exits.
    pub fn run(&self, path: &str) -> Result<String, ChecksumError> {
        debug!(helper = %self.command_line(), path, "running external helper");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| self.failure(format!("spawn: {e}")))?;

        if !output.status.success() {
            return Err(self.failure(format!("exited with {}", output.status)));
        }

        String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| self.failure("no output".to_string()))
    }

    fn failure(&self, reason: String) -> ChecksumError {
        ChecksumError::Helper {
            command: self.command_line(),
            reason,
        }
    }
}
