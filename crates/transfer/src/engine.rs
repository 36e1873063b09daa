//! Windowed I/O engine: keeps up to `optimal_concurrency` operations in
//! flight between one storage object and the transport.
//!
//! All mutation happens under the per-transfer lock. Completions may arrive
//! on any thread; each one takes the lock for its whole body, settles the
//! counters, refills the window and, once `done` with nothing outstanding,
//! closes the object and reports the outcome exactly once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storlink_protocol::{Direction, TransferPhase};
use tracing::{debug, error, info};

use crate::TransferError;
use crate::handle::StorageObjectHandle;
use crate::pool::BufferPool;
use crate::state::{Event, TransferState};
use crate::stats::StatsRecorder;
use crate::transport::{ReadCompletion, Rejected, Transport, TransferOutcome, WriteCompletion};

struct EngineInner {
    state: TransferState,
    handle: StorageObjectHandle,
    pool: BufferPool,
    stats: StatsRecorder,
}

/// Drives one directional transfer.
pub struct WindowedEngine {
    direction: Direction,
    transport: Arc<dyn Transport>,
    inner: Mutex<EngineInner>,
}

impl WindowedEngine {
    /// `state` must be in the `Opening` phase.
    pub(crate) fn new(
        direction: Direction,
        transport: Arc<dyn Transport>,
        state: TransferState,
        handle: StorageObjectHandle,
        pool: BufferPool,
    ) -> Arc<Self> {
        Arc::new(Self {
            direction,
            transport,
            inner: Mutex::new(EngineInner {
                state,
                handle,
                pool,
                stats: StatsRecorder::new(direction),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn phase(&self) -> TransferPhase {
        self.lock().state.phase()
    }

    pub fn outstanding(&self) -> usize {
        self.lock().state.outstanding()
    }

    /// Window size used by the most recent refill.
    pub fn optimal_concurrency(&self) -> usize {
        self.lock().state.optimal
    }

    /// Bytes moved so far.
    pub fn bytes_moved(&self) -> u64 {
        self.lock().stats.bytes()
    }

    /// Current window position and remaining length.
    pub fn window(&self) -> (u64, Option<u64>) {
        let inner = self.lock();
        (inner.handle.offset(), inner.handle.remaining())
    }

    /// Starts issuing operations.
    pub(crate) fn start(self: &Arc<Self>) {
        let mut inner = self.lock();
        inner.state.apply(Event::Opened);
        debug!(
            direction = %self.direction,
            path = inner.handle.path(),
            offset = inner.handle.offset(),
            remaining = ?inner.handle.remaining(),
            seekable = inner.handle.is_seekable(),
            "transfer active"
        );
        self.refill(&mut inner);
        self.settle(&mut inner);
    }

    /// Transport-signalled failure: stop issuing and let outstanding
    /// operations drain before the outcome is reported.
    pub fn abort(self: &Arc<Self>, error: TransferError) {
        let mut inner = self.lock();
        if inner.state.phase().is_terminal() {
            return;
        }
        info!(direction = %self.direction, %error, "transfer aborted by transport");
        inner.state.fail(error);
        self.settle(&mut inner);
    }

    fn refill(self: &Arc<Self>, inner: &mut EngineInner) {
        inner.state.optimal = self.transport.optimal_concurrency().max(1);
        while !inner.state.is_done() && inner.state.outstanding < inner.state.optimal {
            let issued = match self.direction {
                Direction::Receive => self.issue_receive(inner),
                Direction::Send => self.issue_send(inner),
            };
            if let Err(error) = issued {
                error!(direction = %self.direction, %error, "failed to issue operation");
                inner.state.fail(error);
            }
        }
    }

    /// Registers one read slot with the transport.
    fn issue_receive(self: &Arc<Self>, inner: &mut EngineInner) -> Result<(), TransferError> {
        let buffer = inner.pool.checkout()?;
        let engine = Arc::clone(self);
        let registered = self
            .transport
            .register_read(buffer, Box::new(move |done| engine.on_received(done)));
        self.after_register(inner, registered)
    }

    /// Reads one block from storage and hands it to the transport.
    fn issue_send(self: &Arc<Self>, inner: &mut EngineInner) -> Result<(), TransferError> {
        if inner.handle.is_exhausted() {
            debug!(offset = inner.handle.offset(), "requested range fully read");
            inner.state.halt();
            return Ok(());
        }

        let len = inner.handle.next_read_len();
        let mut buffer = inner.pool.checkout()?;
        let nbytes = match inner.handle.read_next(&mut buffer.as_mut_slice()[..len]) {
            Ok(n) => n,
            Err(e) => {
                inner.pool.checkin(buffer);
                return Err(e);
            }
        };
        if nbytes == 0 {
            debug!(offset = inner.handle.offset(), "end of object");
            inner.pool.checkin(buffer);
            inner.state.halt();
            return Ok(());
        }

        // The window advances at issuance so the next read gets its own offset.
        let offset = inner.handle.offset();
        inner.handle.advance(nbytes as u64);

        let engine = Arc::clone(self);
        let registered = self.transport.register_write(
            buffer,
            nbytes,
            offset,
            Box::new(move |done| engine.on_sent(done, offset, nbytes)),
        );
        self.after_register(inner, registered)
    }

    fn after_register(
        &self,
        inner: &mut EngineInner,
        registered: Result<(), Rejected>,
    ) -> Result<(), TransferError> {
        match registered {
            Ok(()) => {
                inner.state.outstanding += 1;
                inner.stats.observe_outstanding(inner.state.outstanding);
                Ok(())
            }
            Err(Rejected { buffer, error }) => {
                inner.pool.checkin(buffer);
                Err(error)
            }
        }
    }

    /// Completion of a receive slot: write the bytes to storage.
    fn on_received(self: Arc<Self>, completion: ReadCompletion) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let ReadCompletion { buffer, result } = completion;

        if inner.state.phase().is_terminal() {
            inner.pool.checkin(buffer);
            return;
        }
        inner.state.outstanding = inner.state.outstanding.saturating_sub(1);

        match result {
            Err(error) => {
                error!(%error, "receive operation failed");
                inner.state.fail(error);
            }
            Ok(received) => {
                let nbytes = received.nbytes.min(buffer.len());
                if nbytes > 0 {
                    let data = &buffer.as_slice()[..nbytes];
                    match inner.handle.write_at(data, received.offset) {
                        Ok(()) => {
                            inner.handle.advance(nbytes as u64);
                            inner.stats.record(nbytes);
                            self.transport
                                .bytes_transferred(received.offset, nbytes as u64);
                        }
                        Err(error) => {
                            error!(offset = received.offset, nbytes, %error, "storage write failed");
                            inner.state.fail(error);
                        }
                    }
                }
                if received.eof || nbytes == 0 {
                    inner.state.halt();
                }
            }
        }

        inner.pool.checkin(buffer);
        if !inner.state.is_done() {
            self.refill(inner);
        }
        self.settle(inner);
    }

    /// Completion of a send slot: the transport consumed the bytes.
    fn on_sent(self: Arc<Self>, completion: WriteCompletion, offset: u64, nbytes: usize) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let WriteCompletion { buffer, result } = completion;

        if inner.state.phase().is_terminal() {
            inner.pool.checkin(buffer);
            return;
        }
        inner.state.outstanding = inner.state.outstanding.saturating_sub(1);

        match result {
            Err(error) => {
                error!(offset, %error, "send operation failed");
                inner.state.fail(error);
            }
            Ok(accepted) if accepted < nbytes => {
                inner.state.fail(TransferError::ShortWrite {
                    offset,
                    requested: nbytes,
                    written: accepted,
                });
            }
            Ok(_) => {
                inner.stats.record(nbytes);
                self.transport.bytes_transferred(offset, nbytes as u64);
            }
        }

        inner.pool.checkin(buffer);
        if !inner.state.is_done() {
            self.refill(inner);
        }
        self.settle(inner);
    }

    /// Reports the outcome once `done` is set and nothing is outstanding.
    fn settle(&self, inner: &mut EngineInner) {
        if !inner.state.ready_to_finish() {
            return;
        }

        if let Err(error) = inner.handle.close() {
            inner.state.record(error);
        }
        inner.state.apply(Event::Drained);

        let result = inner.state.take_result();
        let stats = inner.stats.snapshot();
        match &result {
            Ok(()) => info!(
                direction = %self.direction,
                path = inner.handle.path(),
                bytes = stats.bytes,
                operations = stats.operations,
                elapsed_ms = stats.elapsed_ms,
                "transfer finished"
            ),
            Err(error) => error!(
                direction = %self.direction,
                path = inner.handle.path(),
                bytes = stats.bytes,
                %error,
                "transfer failed"
            ),
        }
        for run in &stats.block_runs {
            info!(direction = %self.direction, "{run}");
        }

        self.transport
            .transfer_finished(TransferOutcome { result, stats });
    }
}
