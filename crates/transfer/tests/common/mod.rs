//! A transport whose completions are driven by the test.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use storlink_protocol::{ByteRange, Direction};
use storlink_transfer::{
    Buffer, OnRead, OnWrite, ReadCompletion, Received, Rejected, TransferError, TransferOutcome,
    Transport, WriteCompletion,
};

pub enum Pending {
    Read {
        buffer: Buffer,
        on_complete: OnRead,
    },
    Write {
        buffer: Buffer,
        len: usize,
        offset: u64,
        on_complete: OnWrite,
    },
}

struct Source {
    data: Vec<u8>,
    consumed: usize,
}

/// Queues every registration until the test completes it.
pub struct ScriptedTransport {
    block_size: usize,
    concurrency: AtomicUsize,
    range: ByteRange,
    pending: Mutex<VecDeque<Pending>>,
    source: Mutex<Source>,
    registered: AtomicUsize,
    peak_pending: AtomicUsize,
    reject_after: Mutex<Option<usize>>,
    accept_limit: Mutex<Option<usize>>,
    transferred: Mutex<Vec<(u64, u64)>>,
    sent: Mutex<Vec<(u64, Vec<u8>)>>,
    outcomes: Mutex<Vec<TransferOutcome>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap()
}

impl ScriptedTransport {
    pub fn new(block_size: usize, concurrency: usize, range: ByteRange) -> Self {
        Self {
            block_size,
            concurrency: AtomicUsize::new(concurrency),
            range,
            pending: Mutex::new(VecDeque::new()),
            source: Mutex::new(Source {
                data: Vec::new(),
                consumed: 0,
            }),
            registered: AtomicUsize::new(0),
            peak_pending: AtomicUsize::new(0),
            reject_after: Mutex::new(None),
            accept_limit: Mutex::new(None),
            transferred: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
        }
    }

    /// Bytes handed to receive slots, starting at the window offset.
    pub fn with_source(self, data: Vec<u8>) -> Self {
        lock(&self.source).data = data;
        self
    }

    pub fn set_concurrency(&self, n: usize) {
        self.concurrency.store(n, Ordering::SeqCst);
    }

    /// Refuses every registration after the first `n`.
    pub fn reject_after(&self, n: usize) {
        *lock(&self.reject_after) = Some(n);
    }

    /// Caps the bytes each send completion reports as accepted.
    pub fn accept_at_most(&self, n: usize) {
        *lock(&self.accept_limit) = Some(n);
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn peak_pending(&self) -> usize {
        self.peak_pending.load(Ordering::SeqCst)
    }

    pub fn transferred(&self) -> Vec<(u64, u64)> {
        lock(&self.transferred).clone()
    }

    /// Payloads of completed sends, in completion order.
    pub fn sent(&self) -> Vec<(u64, Vec<u8>)> {
        lock(&self.sent).clone()
    }

    pub fn finished_count(&self) -> usize {
        lock(&self.outcomes).len()
    }

    pub fn take_outcome(&self) -> TransferOutcome {
        let mut outcomes = lock(&self.outcomes);
        assert_eq!(outcomes.len(), 1, "expected exactly one finished report");
        outcomes.remove(0)
    }

    fn pop(&self, from_back: bool) -> Option<Pending> {
        let mut pending = lock(&self.pending);
        if from_back {
            pending.pop_back()
        } else {
            pending.pop_front()
        }
    }

    fn pop_at(&self, index: usize) -> Option<Pending> {
        let mut pending = lock(&self.pending);
        let index = index % pending.len().max(1);
        pending.remove(index)
    }

    /// Completes the oldest pending operation successfully.
    pub fn complete_next(&self) -> bool {
        self.pop(false).map(|op| self.complete(op)).is_some()
    }

    /// Completes the newest pending operation successfully.
    pub fn complete_last(&self) -> bool {
        self.pop(true).map(|op| self.complete(op)).is_some()
    }

    /// Fails the oldest pending operation.
    pub fn fail_next(&self, message: &str) -> bool {
        let Some(op) = self.pop(false) else {
            return false;
        };
        let error = TransferError::Transport(message.to_string());
        match op {
            Pending::Read {
                buffer,
                on_complete,
            } => on_complete(ReadCompletion {
                buffer,
                result: Err(error),
            }),
            Pending::Write {
                buffer,
                on_complete,
                ..
            } => on_complete(WriteCompletion {
                buffer,
                result: Err(error),
            }),
        }
        true
    }

    /// Completes everything, including operations issued along the way.
    pub fn drain(&self) {
        while self.complete_next() {}
    }

    /// Completes everything in a pseudo-random order derived from `seed`.
    pub fn drain_shuffled(&self, seed: u64) {
        let mut x = seed | 1;
        loop {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            match self.pop_at(x as usize) {
                Some(op) => self.complete(op),
                None => break,
            }
        }
    }

    fn complete(&self, op: Pending) {
        match op {
            Pending::Read {
                mut buffer,
                on_complete,
            } => {
                let received = {
                    let mut source = lock(&self.source);
                    let offset = self.range.offset + source.consumed as u64;
                    let left = source.data.len() - source.consumed;
                    let n = left.min(buffer.len());
                    let start = source.consumed;
                    buffer.as_mut_slice()[..n].copy_from_slice(&source.data[start..start + n]);
                    source.consumed += n;
                    Received {
                        nbytes: n,
                        offset,
                        eof: source.consumed == source.data.len(),
                    }
                };
                on_complete(ReadCompletion {
                    buffer,
                    result: Ok(received),
                });
            }
            Pending::Write {
                buffer,
                len,
                offset,
                on_complete,
            } => {
                let accepted = lock(&self.accept_limit).map_or(len, |cap| cap.min(len));
                lock(&self.sent).push((offset, buffer.as_slice()[..len].to_vec()));
                on_complete(WriteCompletion {
                    buffer,
                    result: Ok(accepted),
                });
            }
        }
    }

    fn admit(&self, op: Pending) -> Result<(), Rejected> {
        let limit = *lock(&self.reject_after);
        if limit.is_some_and(|n| self.registered() >= n) {
            let buffer = match op {
                Pending::Read { buffer, .. } | Pending::Write { buffer, .. } => buffer,
            };
            return Err(Rejected {
                buffer,
                error: TransferError::Transport("registration refused".into()),
            });
        }
        self.registered.fetch_add(1, Ordering::SeqCst);
        let mut pending = lock(&self.pending);
        pending.push_back(op);
        self.peak_pending.fetch_max(pending.len(), Ordering::SeqCst);
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn optimal_concurrency(&self) -> usize {
        self.concurrency.load(Ordering::SeqCst)
    }

    fn requested_range(&self, _direction: Direction) -> ByteRange {
        self.range
    }

    fn register_read(&self, buffer: Buffer, on_complete: OnRead) -> Result<(), Rejected> {
        self.admit(Pending::Read {
            buffer,
            on_complete,
        })
    }

    fn register_write(
        &self,
        buffer: Buffer,
        len: usize,
        offset: u64,
        on_complete: OnWrite,
    ) -> Result<(), Rejected> {
        self.admit(Pending::Write {
            buffer,
            len,
            offset,
            on_complete,
        })
    }

    fn bytes_transferred(&self, offset: u64, len: u64) {
        lock(&self.transferred).push((offset, len));
    }

    fn transfer_finished(&self, outcome: TransferOutcome) {
        lock(&self.outcomes).push(outcome);
    }
}

/// Deterministic test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
