//! Fixed-size I/O buffers, checked out per operation and returned on completion.

use crate::TransferError;

/// One block-sized buffer, owned by a single in-flight operation.
#[derive(Debug)]
pub struct Buffer {
    slot: usize,
    data: Box<[u8]>,
}

impl Buffer {
    /// Pool slot this buffer belongs to.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Full block capacity.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Slot-indexed pool of block-sized buffers.
///
/// Buffers are allocated lazily, so the pool grows to the peak number of
/// simultaneously outstanding operations and then recycles.
#[derive(Debug)]
pub struct BufferPool {
    block_size: usize,
    slots: Vec<Option<Box<[u8]>>>,
    free: Vec<usize>,
    max_slots: Option<usize>,
}

impl BufferPool {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            slots: Vec::new(),
            free: Vec::new(),
            max_slots: None,
        }
    }

    /// A pool that refuses to grow past `max_slots` buffers.
    pub fn with_limit(block_size: usize, max_slots: usize) -> Self {
        Self {
            max_slots: Some(max_slots),
            ..Self::new(block_size)
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Buffers currently owned by operations.
    pub fn checked_out(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Buffers allocated so far.
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    pub fn checkout(&mut self) -> Result<Buffer, TransferError> {
        if let Some(slot) = self.free.pop() {
            if let Some(data) = self.slots[slot].take() {
                return Ok(Buffer { slot, data });
            }
        }

        if self.max_slots.is_some_and(|max| self.slots.len() >= max) {
            return Err(TransferError::BufferAllocation {
                size: self.block_size,
            });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(self.block_size)
            .map_err(|_| TransferError::BufferAllocation {
                size: self.block_size,
            })?;
        data.resize(self.block_size, 0);

        let slot = self.slots.len();
        self.slots.push(None);
        Ok(Buffer {
            slot,
            data: data.into_boxed_slice(),
        })
    }

    pub fn checkin(&mut self, buffer: Buffer) {
        let Buffer { slot, data } = buffer;
        match self.slots.get_mut(slot) {
            Some(entry) if entry.is_none() => {
                *entry = Some(data);
                self.free.push(slot);
            }
            _ => tracing::warn!(slot, "buffer returned to a pool that does not own it"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_allocates_block_sized_buffers() {
        let mut pool = BufferPool::new(64);
        let buf = pool.checkout().unwrap();
        assert_eq!(buf.len(), 64);
        assert_eq!(pool.checked_out(), 1);
    }

    #[test]
    fn checkin_recycles_slots() {
        let mut pool = BufferPool::new(8);
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        assert_ne!(a.slot(), b.slot());
        pool.checkin(a);
        assert_eq!(pool.checked_out(), 1);

        let c = pool.checkout().unwrap();
        assert_eq!(pool.allocated(), 2);
        pool.checkin(b);
        pool.checkin(c);
        assert_eq!(pool.checked_out(), 0);
    }

    #[test]
    fn limit_reports_exhaustion() {
        let mut pool = BufferPool::with_limit(8, 1);
        let held = pool.checkout().unwrap();
        let err = pool.checkout().unwrap_err();
        assert!(matches!(err, TransferError::BufferAllocation { size: 8 }));

        pool.checkin(held);
        assert!(pool.checkout().is_ok());
    }

    #[test]
    fn foreign_buffer_ignored() {
        let mut donor = BufferPool::new(8);
        donor.checkout().unwrap();
        let foreign = donor.checkout().unwrap();

        let mut pool = BufferPool::new(8);
        pool.checkin(foreign);
        assert_eq!(pool.allocated(), 0);
    }
}
