//! Binds one storage object and one engine for the life of a transfer.

use std::io;
use std::sync::Arc;

use storlink_protocol::{Direction, TransferPhase, TransferStats};
use tracing::{debug, error, info, warn};

use crate::TransferError;
use crate::engine::WindowedEngine;
use crate::handle::StorageObjectHandle;
use crate::pool::BufferPool;
use crate::preflight::{Admission, Preflight};
use crate::state::{Event, TransferState};
use crate::storage::{OpenMode, Storage, StorageObject, is_seekable_path};
use crate::transport::{TransferOutcome, Transport};

/// Starts sends and receives against a storage backend on behalf of a
/// transport.
pub struct TransferCoordinator {
    storage: Arc<dyn Storage>,
    transport: Arc<dyn Transport>,
    preflight: Option<Arc<dyn Preflight>>,
    buffer_limit: Option<usize>,
}

impl TransferCoordinator {
    pub fn new(storage: Arc<dyn Storage>, transport: Arc<dyn Transport>) -> Self {
        Self {
            storage,
            transport,
            preflight: None,
            buffer_limit: None,
        }
    }

    /// Consulted before every receive opens its target.
    pub fn with_preflight(mut self, preflight: Arc<dyn Preflight>) -> Self {
        self.preflight = Some(preflight);
        self
    }

    /// Caps the number of buffers a transfer may hold at once.
    pub fn with_buffer_limit(mut self, slots: usize) -> Self {
        self.buffer_limit = Some(slots);
        self
    }

    /// Streams `path` from storage to the transport.
    pub fn start_send(&self, path: &str) -> Transfer {
        self.start(Direction::Send, path)
    }

    /// Streams bytes from the transport into `path`.
    pub fn start_receive(&self, path: &str) -> Transfer {
        self.start(Direction::Receive, path)
    }

    fn start(&self, direction: Direction, path: &str) -> Transfer {
        let mut state = TransferState::new();
        state.apply(Event::Open);

        let range = self.transport.requested_range(direction);
        let block_size = self.transport.block_size().max(1);
        let seekable = is_seekable_path(path);
        info!(
            %direction,
            path,
            offset = range.offset,
            length = ?range.length,
            block_size,
            seekable,
            "starting transfer"
        );

        let opened = self.open(direction, path).and_then(|object| {
            let mut handle = StorageObjectHandle::new(path, object, seekable, block_size, range);
            if direction == Direction::Send {
                if let Err(e) = handle.position_at_start() {
                    if let Err(close) = handle.close() {
                        debug!(%close, "close after failed positioning");
                    }
                    return Err(e);
                }
            }
            Ok(handle)
        });

        match opened {
            Ok(handle) => {
                let pool = match self.buffer_limit {
                    Some(slots) => BufferPool::with_limit(block_size, slots),
                    None => BufferPool::new(block_size),
                };
                let engine = WindowedEngine::new(
                    direction,
                    Arc::clone(&self.transport),
                    state,
                    handle,
                    pool,
                );
                engine.start();
                Transfer {
                    direction,
                    path: path.to_string(),
                    engine: Some(engine),
                }
            }
            Err(error) => {
                state.apply(Event::OpenFailed);
                error!(%direction, path, %error, "transfer failed before any I/O");
                self.transport.transfer_finished(TransferOutcome {
                    result: Err(error),
                    stats: TransferStats::empty(direction),
                });
                Transfer {
                    direction,
                    path: path.to_string(),
                    engine: None,
                }
            }
        }
    }

    fn open(
        &self,
        direction: Direction,
        path: &str,
    ) -> Result<Box<dyn StorageObject>, TransferError> {
        match direction {
            Direction::Send => {
                self.storage
                    .open(path, OpenMode::Read)
                    .map_err(|source| TransferError::Open {
                        path: path.to_string(),
                        source,
                    })
            }
            Direction::Receive => {
                let target = match self.preflight.as_ref().map(|check| check.admit(path)) {
                    None | Some(Admission::Allow) => path.to_string(),
                    Some(Admission::Redirect(to)) => {
                        debug!(from = path, to = %to, "receive target rewritten");
                        to
                    }
                    Some(Admission::Deny(reason)) => {
                        warn!(path, %reason, "receive denied by pre-flight check");
                        return Err(TransferError::Denied(reason));
                    }
                };

                // Existing objects are never truncated; absent ones are created.
                let mode = match self.storage.metadata(path) {
                    Ok(_) => OpenMode::WriteExisting,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => OpenMode::WriteCreate,
                    Err(source) => {
                        return Err(TransferError::Open {
                            path: path.to_string(),
                            source,
                        });
                    }
                };

                self.storage
                    .open(&target, mode)
                    .map_err(|source| TransferError::Open {
                        path: target.clone(),
                        source,
                    })
            }
        }
    }
}

/// A started transfer, as seen by the transport.
pub struct Transfer {
    direction: Direction,
    path: String,
    engine: Option<Arc<WindowedEngine>>,
}

impl Transfer {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `Finished` when the object could not be opened.
    pub fn phase(&self) -> TransferPhase {
        self.engine
            .as_ref()
            .map_or(TransferPhase::Finished, |engine| engine.phase())
    }

    pub fn is_finished(&self) -> bool {
        self.phase().is_terminal()
    }

    pub fn outstanding(&self) -> usize {
        self.engine.as_ref().map_or(0, |engine| engine.outstanding())
    }

    pub fn bytes_moved(&self) -> u64 {
        self.engine.as_ref().map_or(0, |engine| engine.bytes_moved())
    }

    /// Marks the transfer failed on behalf of the transport. Outstanding
    /// operations still drain before the outcome is reported.
    pub fn abort(&self, error: TransferError) {
        if let Some(engine) = &self.engine {
            engine.abort(error);
        }
    }

    pub fn engine(&self) -> Option<&Arc<WindowedEngine>> {
        self.engine.as_ref()
    }
}
