//! A transport backed by local tokio I/O.
//!
//! Receives pull their bytes from any [`AsyncRead`]; sends push theirs into
//! a file at positions relative to the requested window. Completions are
//! delivered from the blocking pool because the engine performs storage
//! I/O while it holds its lock.

use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use storlink_protocol::{ByteRange, Direction};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

use crate::TransferError;
use crate::pool::Buffer;
use crate::transport::{
    OnRead, OnWrite, ReadCompletion, Received, Rejected, TransferOutcome, Transport,
    WriteCompletion,
};

/// Parameters of a [`LoopbackTransport`].
#[derive(Debug, Clone, Copy)]
pub struct LoopbackConfig {
    pub block_size: usize,
    pub concurrency: usize,
    pub range: ByteRange,
}

struct Source {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    cursor: u64,
    remaining: Option<u64>,
    eof: bool,
}

enum Endpoint {
    Source(AsyncMutex<Source>),
    Sink(AsyncMutex<File>),
}

/// Transport that moves bytes through local async I/O.
pub struct LoopbackTransport {
    runtime: Handle,
    config: LoopbackConfig,
    endpoint: Arc<Endpoint>,
    bytes_accounted: AtomicU64,
    finished: Mutex<Option<oneshot::Sender<TransferOutcome>>>,
}

type Started = (Arc<LoopbackTransport>, oneshot::Receiver<TransferOutcome>);

impl LoopbackTransport {
    /// A transport for receives: `reader` supplies the bytes of the window.
    pub fn receiving_from<R>(reader: R, config: LoopbackConfig) -> Result<Started, TransferError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let source = Source {
            reader: Box::new(reader),
            cursor: config.range.offset,
            remaining: config.range.length,
            eof: false,
        };
        Self::build(Endpoint::Source(AsyncMutex::new(source)), config)
    }

    /// A transport for sends: bytes at window offset `o` land at
    /// `o - range.offset` in `sink`.
    pub fn sending_to(sink: File, config: LoopbackConfig) -> Result<Started, TransferError> {
        Self::build(Endpoint::Sink(AsyncMutex::new(sink)), config)
    }

    fn build(endpoint: Endpoint, config: LoopbackConfig) -> Result<Started, TransferError> {
        let runtime = Handle::try_current()
            .map_err(|e| TransferError::Transport(format!("no async runtime: {e}")))?;
        let (tx, rx) = oneshot::channel();
        let transport = Arc::new(Self {
            runtime,
            config,
            endpoint: Arc::new(endpoint),
            bytes_accounted: AtomicU64::new(0),
            finished: Mutex::new(Some(tx)),
        });
        Ok((transport, rx))
    }

    /// Total reported through `bytes_transferred`.
    pub fn bytes_accounted(&self) -> u64 {
        self.bytes_accounted.load(Ordering::SeqCst)
    }
}

async fn fill(source: &mut Source, buf: &mut [u8]) -> std::io::Result<Received> {
    let offset = source.cursor;
    if source.eof {
        return Ok(Received {
            nbytes: 0,
            offset,
            eof: true,
        });
    }

    let want = match source.remaining {
        Some(left) => left.min(buf.len() as u64) as usize,
        None => buf.len(),
    };
    let mut filled = 0;
    while filled < want {
        let n = source.reader.read(&mut buf[filled..want]).await?;
        if n == 0 {
            source.eof = true;
            break;
        }
        filled += n;
    }

    source.cursor += filled as u64;
    if let Some(left) = source.remaining.as_mut() {
        *left -= filled as u64;
        if *left == 0 {
            source.eof = true;
        }
    }
    Ok(Received {
        nbytes: filled,
        offset,
        eof: source.eof,
    })
}

impl Transport for LoopbackTransport {
    fn block_size(&self) -> usize {
        self.config.block_size
    }

    fn optimal_concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    fn requested_range(&self, _direction: Direction) -> ByteRange {
        self.config.range
    }

    fn register_read(&self, mut buffer: Buffer, on_complete: OnRead) -> Result<(), Rejected> {
        let endpoint = Arc::clone(&self.endpoint);
        if !matches!(*endpoint, Endpoint::Source(_)) {
            return Err(Rejected {
                buffer,
                error: TransferError::Transport("loopback sink cannot supply data".into()),
            });
        }
        self.runtime.spawn(async move {
            let Endpoint::Source(source) = &*endpoint else {
                return;
            };
            let result = {
                let mut source = source.lock().await;
                fill(&mut source, buffer.as_mut_slice()).await
            }
            .map_err(|e| TransferError::Transport(format!("source read: {e}")));
            tokio::task::spawn_blocking(move || on_complete(ReadCompletion { buffer, result }));
        });
        Ok(())
    }

    fn register_write(
        &self,
        buffer: Buffer,
        len: usize,
        offset: u64,
        on_complete: OnWrite,
    ) -> Result<(), Rejected> {
        let endpoint = Arc::clone(&self.endpoint);
        if !matches!(*endpoint, Endpoint::Sink(_)) {
            return Err(Rejected {
                buffer,
                error: TransferError::Transport("loopback source cannot accept data".into()),
            });
        }
        let position = offset.saturating_sub(self.config.range.offset);
        self.runtime.spawn(async move {
            let Endpoint::Sink(sink) = &*endpoint else {
                return;
            };
            let written = async {
                let mut file = sink.lock().await;
                file.seek(SeekFrom::Start(position)).await?;
                file.write_all(&buffer.as_slice()[..len]).await?;
                file.flush().await
            }
            .await;
            let result = written
                .map(|()| len)
                .map_err(|e| TransferError::Transport(format!("sink write: {e}")));
            tokio::task::spawn_blocking(move || on_complete(WriteCompletion { buffer, result }));
        });
        Ok(())
    }

    fn bytes_transferred(&self, offset: u64, len: u64) {
        debug!(offset, len, "bytes transferred");
        self.bytes_accounted.fetch_add(len, Ordering::SeqCst);
    }

    fn transfer_finished(&self, outcome: TransferOutcome) {
        let sender = self
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!("transfer outcome dropped, receiver gone");
                }
            }
            None => warn!("transfer reported finished more than once"),
        }
    }
}
