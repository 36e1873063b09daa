use std::io;

use storlink_protocol::ByteRange;

use crate::TransferError;
use crate::storage::StorageObject;

/// Per-object state for one transfer: the open descriptor, whether it can
/// be positioned, and the window still to move.
///
/// The window only moves forward: `offset` grows and a bounded `remaining`
/// shrinks by exactly the bytes each completed operation moved.
pub struct StorageObjectHandle {
    path: String,
    object: Option<Box<dyn StorageObject>>,
    seekable: bool,
    block_size: usize,
    offset: u64,
    remaining: Option<u64>,
}

impl StorageObjectHandle {
    pub fn new(
        path: impl Into<String>,
        object: Box<dyn StorageObject>,
        seekable: bool,
        block_size: usize,
        range: ByteRange,
    ) -> Self {
        Self {
            path: path.into(),
            object: Some(object),
            seekable,
            block_size: block_size.max(1),
            offset: range.offset,
            remaining: range.length,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    pub fn is_open(&self) -> bool {
        self.object.is_some()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Next offset in the window.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes left in the window; `None` when unbounded.
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    /// A bounded window with nothing left.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Size of the next storage read: one block, or less near the end of a
    /// bounded window.
    pub fn next_read_len(&self) -> usize {
        match self.remaining {
            Some(left) => left.min(self.block_size as u64) as usize,
            None => self.block_size,
        }
    }

    /// Moves the window past `nbytes`.
    pub fn advance(&mut self, nbytes: u64) {
        self.offset += nbytes;
        if let Some(left) = self.remaining.as_mut() {
            *left = left.saturating_sub(nbytes);
        }
    }

    /// Positions a seekable object at the window start. No-op otherwise.
    pub fn position_at_start(&mut self) -> Result<(), TransferError> {
        if !self.seekable {
            return Ok(());
        }
        let expected = self.offset;
        let actual = self
            .object_mut()?
            .seek(expected)
            .map_err(TransferError::io("seek"))?;
        if actual != expected {
            return Err(TransferError::Positioning {
                op: "seek",
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Reads the next chunk from the current position.
    pub fn read_next(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        self.object_mut()?
            .read(buf)
            .map_err(TransferError::io("read"))
    }

    /// Writes `data` at its explicit target `offset`.
    ///
    /// Seekable objects are positioned first and a landing position other
    /// than `offset` is fatal; sinks skip positioning entirely. Accepting
    /// fewer bytes than offered is a short write.
    pub fn write_at(&mut self, data: &[u8], offset: u64) -> Result<(), TransferError> {
        let seekable = self.seekable;
        let object = self.object_mut()?;
        if seekable {
            let actual = object.seek(offset).map_err(TransferError::io("seek"))?;
            if actual != offset {
                return Err(TransferError::Positioning {
                    op: "seek",
                    expected: offset,
                    actual,
                });
            }
        }
        let written = object.write(data).map_err(TransferError::io("write"))?;
        if written < data.len() {
            return Err(TransferError::ShortWrite {
                offset,
                requested: data.len(),
                written,
            });
        }
        Ok(())
    }

    /// Closes the descriptor. Only the first call does anything.
    pub fn close(&mut self) -> Result<(), TransferError> {
        match self.object.take() {
            Some(object) => object.close().map_err(TransferError::io("close")),
            None => Ok(()),
        }
    }

    fn object_mut(&mut self) -> Result<&mut (dyn StorageObject + 'static), TransferError> {
        self.object.as_deref_mut().ok_or_else(|| TransferError::Io {
            op: "descriptor",
            source: io::Error::other(format!("{} is already closed", self.path)),
        })
    }
}
