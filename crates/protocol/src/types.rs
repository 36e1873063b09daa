use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Direction of a transfer, seen from the storage side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Storage is read and the bytes are handed to the transport.
    #[serde(rename = "send")]
    Send,
    /// The transport supplies bytes that are written to storage.
    #[serde(rename = "receive")]
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Receive => f.write_str("receive"),
        }
    }
}

/// A byte window `[offset, offset + length)`.
///
/// `length == None` means "until end of stream".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl ByteRange {
    /// A range starting at `offset` that runs to end of stream.
    pub fn unbounded(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }

    pub fn bounded(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    /// Builds a range from the signed representation used by most transports,
    /// where a negative length means unbounded. Negative offsets clamp to zero.
    pub fn from_signed(offset: i64, length: i64) -> Self {
        Self {
            offset: offset.max(0) as u64,
            length: u64::try_from(length).ok(),
        }
    }

    /// Exclusive end of the window, if bounded.
    pub fn end(&self) -> Option<u64> {
        self.length.map(|len| self.offset.saturating_add(len))
    }

    pub fn is_unbounded(&self) -> bool {
        self.length.is_none()
    }
}

/// Digest algorithms understood by the checksum engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Adler32,
    Sha256,
}

impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 3] = [
        ChecksumAlgorithm::Md5,
        ChecksumAlgorithm::Adler32,
        ChecksumAlgorithm::Sha256,
    ];

    /// Native digest length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Md5 => 16,
            ChecksumAlgorithm::Adler32 => 4,
            ChecksumAlgorithm::Sha256 => 32,
        }
    }

    /// Length of the canonical lowercase hex rendering.
    pub fn hex_len(&self) -> usize {
        self.digest_len() * 2
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Adler32 => "adler32",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when an algorithm name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported checksum algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for ChecksumAlgorithm {
    type Err = UnknownAlgorithm;

    /// Names are matched case-insensitively (`md5` and `MD5` are the same).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// Lifecycle of a single directional transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    Idle,
    Opening,
    /// Operations are being issued.
    Active,
    /// `done` is set; waiting for outstanding operations to complete.
    Draining,
    Finished,
}

impl TransferPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferPhase::Finished)
    }
}

/// Periodic notification of cumulative bytes processed by a long command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMarker {
    pub total_bytes: u64,
}

impl fmt::Display for ProgressMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.total_bytes)
    }
}

/// A run of consecutive operations that moved the same number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRun {
    pub size: usize,
    pub count: u64,
}

impl fmt::Display for BlockRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blocks of size {} bytes", self.count, self.size)
    }
}

/// Statistics for one transfer, returned alongside its finished report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    pub direction: Direction,
    /// Bytes moved between storage and transport.
    pub bytes: u64,
    /// Operations that moved at least one byte.
    pub operations: u64,
    pub peak_outstanding: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_runs: Vec<BlockRun>,
    pub elapsed_ms: u64,
}

impl TransferStats {
    pub fn empty(direction: Direction) -> Self {
        Self {
            direction,
            bytes: 0,
            operations: 0,
            peak_outstanding: 0,
            block_runs: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// Average throughput in bytes/second (0 when nothing was timed).
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.bytes as f64 / (self.elapsed_ms as f64 / 1000.0)
    }
}
