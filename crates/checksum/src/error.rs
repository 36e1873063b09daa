use storlink_protocol::{ErrorKind, FailureReport, UnknownAlgorithm};
use storlink_transfer::TransferError;

/// Errors that end a checksum command.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error(transparent)]
    UnknownAlgorithm(#[from] UnknownAlgorithm),

    #[error("{path} is not a regular file")]
    NotRegularFile { path: String },

    #[error(transparent)]
    Storage(#[from] TransferError),

    #[error("read at offset {offset} made no progress after {attempts} attempts")]
    Stalled { offset: u64, attempts: u32 },

    #[error("checksum helper `{command}` failed: {reason}")]
    Helper { command: String, reason: String },

    #[error("checksum cancelled")]
    Cancelled,
}

impl ChecksumError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChecksumError::UnknownAlgorithm(_) => ErrorKind::UnsupportedCommand,
            ChecksumError::NotRegularFile { .. } => ErrorKind::BackendOpenFailure,
            ChecksumError::Storage(e) => e.kind(),
            ChecksumError::Stalled { .. } => ErrorKind::TransientReadStall,
            ChecksumError::Helper { .. } => ErrorKind::HelperFailure,
            ChecksumError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn report(&self) -> FailureReport {
        let (operation, os_code) = match self {
            ChecksumError::Storage(e) => (e.operation(), e.os_code()),
            ChecksumError::NotRegularFile { .. } => ("open", None),
            ChecksumError::Stalled { .. } => ("read", None),
            ChecksumError::Helper { .. } => ("helper", None),
            ChecksumError::UnknownAlgorithm(_) | ChecksumError::Cancelled => ("checksum", None),
        };
        FailureReport {
            kind: self.kind(),
            operation: operation.to_string(),
            os_code,
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let unknown: ChecksumError = UnknownAlgorithm("crc64".into()).into();
        assert_eq!(unknown.kind(), ErrorKind::UnsupportedCommand);
        assert_eq!(unknown.to_string(), "unsupported checksum algorithm: crc64");

        let stalled = ChecksumError::Stalled {
            offset: 4096,
            attempts: 5,
        };
        assert_eq!(stalled.report().kind, ErrorKind::TransientReadStall);
        assert_eq!(stalled.report().operation, "read");
    }

    #[test]
    fn storage_errors_keep_their_classification() {
        let err: ChecksumError = TransferError::Io {
            op: "read",
            source: std::io::Error::from_raw_os_error(5),
        }
        .into();
        let report = err.report();
        assert_eq!(report.kind, ErrorKind::BackendIOFailure);
        assert_eq!(report.os_code, Some(5));
    }
}
