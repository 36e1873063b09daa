//! Windowed transfers between a transport and local storage.
//!
//! A [`TransferCoordinator`] opens one storage object per transfer and hands
//! it to a [`WindowedEngine`], which keeps up to the transport's optimal
//! number of operations in flight and reports a single outcome once
//! everything has drained.

mod coordinator;
mod engine;
mod error;
mod handle;
mod loopback;
#[cfg(any(test, feature = "testing"))]
mod memory;
mod pool;
mod preflight;
mod state;
mod stats;
mod storage;
mod transport;

pub use coordinator::{Transfer, TransferCoordinator};
pub use engine::WindowedEngine;
pub use error::TransferError;
pub use handle::StorageObjectHandle;
pub use loopback::{LoopbackConfig, LoopbackTransport};
#[cfg(any(test, feature = "testing"))]
pub use memory::{CallCounts, MemoryStorage};
pub use pool::{Buffer, BufferPool};
pub use preflight::{Admission, Preflight, PreflightChain};
pub use state::{Event, TransferState, next_phase};
pub use stats::StatsRecorder;
pub use storage::{
    NON_SEEKABLE_PATHS, ObjectMeta, OpenMode, PosixStorage, Storage, StorageObject,
    is_seekable_path,
};
pub use transport::{
    OnRead, OnWrite, ReadCompletion, Received, Rejected, TransferOutcome, Transport,
    WriteCompletion,
};

/// Default I/O unit: 256 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default number of operations kept in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;
