//! Incremental digests over a byte range of a stored object.
//!
//! Work is split into bounded steps ([`ChecksumTask::step`]) that a tokio
//! driver reschedules one at a time, so a multi-gigabyte digest never holds
//! a thread for long and keeps emitting progress markers.

mod algorithm;
mod engine;
mod error;
mod external;
mod scheduler;
mod sink;
mod task;

#[cfg(test)]
mod testing;

pub use algorithm::{Digest, digest_hex};
pub use engine::{ChecksumEngine, ChecksumRequest};
pub use error::ChecksumError;
pub use external::ExternalHelper;
pub use scheduler::{drive, spawn};
pub use sink::{ChannelSink, CommandResult};
pub use task::{
    ChecksumSettings, ChecksumTask, CommandSink, DEFAULT_CHUNK_LIMIT, MarkThrottle, Step,
};
