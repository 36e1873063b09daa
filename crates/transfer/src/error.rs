//! Error type for storage transfers.

use std::io;

use storlink_protocol::{ErrorKind, FailureReport};

/// Errors produced while moving bytes between storage and a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op} landed at offset {actual}, expected {expected}")]
    Positioning {
        op: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("short write at offset {offset}: {written} of {requested} bytes accepted")]
    ShortWrite {
        offset: u64,
        requested: usize,
        written: usize,
    },

    #[error("failed to allocate a {size} byte buffer")]
    BufferAllocation { size: usize },

    #[error("transport: {0}")]
    Transport(String),

    #[error("denied: {0}")]
    Denied(String),
}

impl TransferError {
    /// Wraps an I/O error raised by the named operation.
    pub fn io(op: &'static str) -> impl FnOnce(io::Error) -> TransferError {
        move |source| TransferError::Io { op, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Open { .. } => ErrorKind::BackendOpenFailure,
            TransferError::Io { .. } => ErrorKind::BackendIOFailure,
            TransferError::Positioning { .. } | TransferError::ShortWrite { .. } => {
                ErrorKind::PositioningMismatch
            }
            TransferError::BufferAllocation { .. } => ErrorKind::ResourceExhaustion,
            TransferError::Transport(_) => ErrorKind::TransportFailure,
            TransferError::Denied(_) => ErrorKind::PreflightDenied,
        }
    }

    /// Name of the operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            TransferError::Open { .. } => "open",
            TransferError::Io { op, .. } | TransferError::Positioning { op, .. } => *op,
            TransferError::ShortWrite { .. } => "write",
            TransferError::BufferAllocation { .. } => "alloc",
            TransferError::Transport(_) => "transport",
            TransferError::Denied(_) => "preflight",
        }
    }

    /// Underlying OS error code, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            TransferError::Open { source, .. } | TransferError::Io { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }

    pub fn report(&self) -> FailureReport {
        FailureReport {
            kind: self.kind(),
            operation: self.operation().to_string(),
            os_code: self.os_code(),
            message: self.to_string(),
        }
    }
}
