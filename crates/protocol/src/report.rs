//! Structured failure reports handed to the transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of every failure a transfer or command can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BackendOpenFailure,
    #[serde(rename = "backend_io_failure")]
    BackendIOFailure,
    PositioningMismatch,
    ResourceExhaustion,
    UnsupportedCommand,
    TransientReadStall,
    TransportFailure,
    PreflightDenied,
    HelperFailure,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendOpenFailure => "backend_open_failure",
            ErrorKind::BackendIOFailure => "backend_io_failure",
            ErrorKind::PositioningMismatch => "positioning_mismatch",
            ErrorKind::ResourceExhaustion => "resource_exhaustion",
            ErrorKind::UnsupportedCommand => "unsupported_command",
            ErrorKind::TransientReadStall => "transient_read_stall",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::PreflightDenied => "preflight_denied",
            ErrorKind::HelperFailure => "helper_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single structured error a transport receives for a failed transfer
/// or command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub kind: ErrorKind,
    /// Operation that failed (`open`, `read`, `write`, `seek`, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation: String,
    /// Raw OS error code, when the failure came from a system call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_code: Option<i32>,
    pub message: String,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if !self.operation.is_empty() {
            write!(f, " {}:", self.operation)?;
        }
        write!(f, " {}", self.message)?;
        if let Some(code) = self.os_code {
            write!(f, " (os error {code})")?;
        }
        Ok(())
    }
}
