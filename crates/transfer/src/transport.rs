//! The contract between the engines and the transport that drives them.

use storlink_protocol::{ByteRange, Direction, FailureReport, TransferStats};

use crate::TransferError;
use crate::pool::Buffer;

/// Bytes the transport placed into a registered read slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub nbytes: usize,
    /// Target offset of these bytes in the object.
    pub offset: u64,
    /// The transport has no more data after this slot.
    pub eof: bool,
}

/// Completion of a [`Transport::register_read`] slot.
#[derive(Debug)]
pub struct ReadCompletion {
    pub buffer: Buffer,
    pub result: Result<Received, TransferError>,
}

/// Completion of a [`Transport::register_write`] slot. `Ok` carries the
/// number of bytes the transport accepted.
#[derive(Debug)]
pub struct WriteCompletion {
    pub buffer: Buffer,
    pub result: Result<usize, TransferError>,
}

pub type OnRead = Box<dyn FnOnce(ReadCompletion) + Send + 'static>;
pub type OnWrite = Box<dyn FnOnce(WriteCompletion) + Send + 'static>;

/// A registration the transport refused. The buffer is handed back.
#[derive(Debug)]
pub struct Rejected {
    pub buffer: Buffer,
    pub error: TransferError,
}

/// Final report of a transfer.
#[derive(Debug)]
pub struct TransferOutcome {
    pub result: Result<(), TransferError>,
    pub stats: TransferStats,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure(&self) -> Option<FailureReport> {
        self.result.as_ref().err().map(TransferError::report)
    }
}

/// Transport side of a transfer.
///
/// Completions may be delivered on any thread, but never synchronously from
/// inside `register_read`/`register_write`: the engine holds its lock while
/// registering. For the same reason `bytes_transferred` and
/// `transfer_finished` must not call back into the transfer.
pub trait Transport: Send + Sync {
    /// Size of each I/O unit. Constant for a transfer.
    fn block_size(&self) -> usize;

    /// Target number of in-flight operations. Queried before every refill.
    fn optimal_concurrency(&self) -> usize;

    /// Window requested by the client for `direction`.
    fn requested_range(&self, direction: Direction) -> ByteRange;

    /// Registers a slot the transport fills with incoming bytes.
    fn register_read(&self, buffer: Buffer, on_complete: OnRead) -> Result<(), Rejected>;

    /// Hands `len` bytes destined for `offset` to the transport.
    fn register_write(
        &self,
        buffer: Buffer,
        len: usize,
        offset: u64,
        on_complete: OnWrite,
    ) -> Result<(), Rejected>;

    /// Accounting for a byte range that was moved.
    fn bytes_transferred(&self, offset: u64, len: u64);

    /// Called exactly once per transfer.
    fn transfer_finished(&self, outcome: TransferOutcome);
}
