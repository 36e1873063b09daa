//! Types exchanged between the storage engines and the transport driving them.
//!
//! Nothing in here performs I/O; it is the vocabulary used to describe
//! ranges, digests, failures and per-transfer statistics.

pub mod report;
pub mod types;

pub use report::{ErrorKind, FailureReport};
pub use types::{
    BlockRun, ByteRange, ChecksumAlgorithm, Direction, ProgressMarker, TransferPhase,
    TransferStats, UnknownAlgorithm,
};
