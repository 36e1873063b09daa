//! One checksum command as a resumable unit of work.
//!
//! [`ChecksumTask::step`] consumes at most one chunk and returns, so a host
//! scheduler can interleave long digests with other work. The task reports
//! its result to its [`CommandSink`] exactly once: on success, on the first
//! unrecoverable error, on cancellation, or when it is dropped unfinished.

use std::sync::Arc;
use std::time::{Duration, Instant};

use storlink_protocol::{ByteRange, ChecksumAlgorithm, FailureReport, ProgressMarker};
use storlink_transfer::{OpenMode, Storage, StorageObjectHandle, TransferError, is_seekable_path};
use tracing::{debug, error, info, warn};

use crate::ChecksumError;
use crate::algorithm::Digest;

/// Largest chunk consumed by one step: 4 MiB.
pub const DEFAULT_CHUNK_LIMIT: usize = 4 * 1024 * 1024;

/// Tuning for checksum tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumSettings {
    pub chunk_limit: usize,
    /// Minimum spacing between progress markers.
    pub mark_interval: Duration,
    /// Zero-byte reads tolerated in a row before giving up.
    pub max_stall_retries: u32,
    pub stall_backoff: Duration,
}

impl Default for ChecksumSettings {
    fn default() -> Self {
        Self {
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            mark_interval: Duration::from_secs(5),
            max_stall_retries: 5,
            stall_backoff: Duration::from_secs(2),
        }
    }
}

/// Where a checksum command reports to.
pub trait CommandSink: Send + Sync {
    /// Cumulative bytes digested so far.
    fn progress(&self, marker: ProgressMarker);

    /// Called exactly once per command.
    fn command_finished(&self, result: Result<String, FailureReport>);
}

/// What the scheduler should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Reschedule promptly.
    Continue,
    /// Reschedule after the delay; the last read made no progress.
    Backoff(Duration),
    /// The result has been reported.
    Finished,
}

/// Rate limiter for progress markers.
#[derive(Debug, Clone, Copy)]
pub struct MarkThrottle {
    interval: Duration,
    last: Instant,
}

impl MarkThrottle {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: now,
        }
    }

    /// Whether a marker is due at `now`. Resets the window when it is.
    pub fn due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

pub struct ChecksumTask {
    handle: StorageObjectHandle,
    algorithm: ChecksumAlgorithm,
    digest: Option<Digest>,
    buf: Vec<u8>,
    consumed: u64,
    marks: MarkThrottle,
    stalls: u32,
    settings: ChecksumSettings,
    sink: Arc<dyn CommandSink>,
    finished: bool,
}

impl ChecksumTask {
    /// Opens `path` and positions it at `range.offset`.
    ///
    /// The target must be a regular file. An unbounded range, or one that
    /// runs past the end of the object, is clamped to the object size. On
    /// error nothing is reported to `sink`; the caller owns that.
    pub fn open(
        storage: &dyn Storage,
        path: &str,
        algorithm: ChecksumAlgorithm,
        range: ByteRange,
        settings: ChecksumSettings,
        sink: &Arc<dyn CommandSink>,
    ) -> Result<Self, ChecksumError> {
        let open_error = |source| TransferError::Open {
            path: path.to_string(),
            source,
        };
        let meta = storage.metadata(path).map_err(open_error)?;
        if !meta.is_file {
            return Err(ChecksumError::NotRegularFile {
                path: path.to_string(),
            });
        }

        let available = meta.len.saturating_sub(range.offset);
        let length = range.length.map_or(available, |len| len.min(available));
        let chunk = settings.chunk_limit.max(1);
        let buf_len = length.min(chunk as u64) as usize;

        let mut buf = Vec::new();
        buf.try_reserve_exact(buf_len)
            .map_err(|_| TransferError::BufferAllocation { size: buf_len })?;
        buf.resize(buf_len, 0);

        let object = storage.open(path, OpenMode::Read).map_err(open_error)?;
        let mut handle = StorageObjectHandle::new(
            path,
            object,
            is_seekable_path(path),
            chunk,
            ByteRange::bounded(range.offset, length),
        );
        if let Err(e) = handle.position_at_start() {
            if let Err(close) = handle.close() {
                debug!(%close, "close after failed positioning");
            }
            return Err(e.into());
        }

        debug!(path, %algorithm, offset = range.offset, length, "checksum opened");
        Ok(Self {
            handle,
            algorithm,
            digest: Some(Digest::new(algorithm)),
            buf,
            consumed: 0,
            marks: MarkThrottle::new(settings.mark_interval, Instant::now()),
            stalls: 0,
            settings,
            sink: Arc::clone(sink),
            finished: false,
        })
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Bytes left in the range.
    pub fn remaining(&self) -> u64 {
        self.handle.remaining().unwrap_or(0)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consumes at most one chunk.
    pub fn step(&mut self) -> Step {
        if self.finished {
            return Step::Finished;
        }

        if self.handle.is_exhausted() {
            let hex = self
                .digest
                .take()
                .unwrap_or_else(|| Digest::new(self.algorithm))
                .finalize_hex();
            self.finish(Ok(hex));
            return Step::Finished;
        }

        let len = self.handle.next_read_len();
        match self.handle.read_next(&mut self.buf[..len]) {
            Err(e) => {
                self.finish(Err(e.into()));
                Step::Finished
            }
            Ok(0) => {
                self.stalls += 1;
                let offset = self.handle.offset();
                if self.stalls > self.settings.max_stall_retries {
                    self.finish(Err(ChecksumError::Stalled {
                        offset,
                        attempts: self.stalls,
                    }));
                    return Step::Finished;
                }
                warn!(
                    path = self.handle.path(),
                    offset,
                    attempt = self.stalls,
                    "checksum read made no progress, retrying"
                );
                Step::Backoff(self.settings.stall_backoff)
            }
            Ok(n) => {
                self.stalls = 0;
                if let Some(digest) = self.digest.as_mut() {
                    digest.update(&self.buf[..n]);
                }
                self.consumed += n as u64;
                self.handle.advance(n as u64);
                if self.marks.due(Instant::now()) {
                    self.sink.progress(ProgressMarker {
                        total_bytes: self.consumed,
                    });
                }
                Step::Continue
            }
        }
    }

    /// Finishes with `Cancelled` unless a result was already reported.
    pub fn cancel(&mut self) {
        if !self.finished {
            self.finish(Err(ChecksumError::Cancelled));
        }
    }

    fn finish(&mut self, result: Result<String, ChecksumError>) {
        self.finished = true;
        if let Err(error) = self.handle.close() {
            warn!(path = self.handle.path(), %error, "close after checksum failed");
        }
        match &result {
            Ok(hex) => info!(
                path = self.handle.path(),
                algorithm = %self.algorithm,
                bytes = self.consumed,
                digest = %hex,
                "checksum finished"
            ),
            Err(error) => error!(
                path = self.handle.path(),
                algorithm = %self.algorithm,
                bytes = self.consumed,
                %error,
                "checksum failed"
            ),
        }
        self.sink.command_finished(result.map_err(|e| e.report()));
    }
}

impl Drop for ChecksumTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
