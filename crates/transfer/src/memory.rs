//! In-memory storage backend.
//!
//! Mostly useful for tests and throughput runs: it counts every call made
//! against it, emulates the `/dev/null` and `/dev/zero` sentinels, and can be
//! told to accept short writes.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::storage::{ObjectMeta, OpenMode, Storage, StorageObject};

type Blob = Arc<Mutex<Vec<u8>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-backend call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub opens: AtomicU64,
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub seeks: AtomicU64,
    pub closes: AtomicU64,
}

impl CallCounts {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }
}

/// A map of path -> bytes behind a lock.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Blob>>,
    counts: Arc<CallCounts>,
    write_limit: Mutex<Option<usize>>,
    seek_skew: Mutex<Option<u64>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` at `path`, replacing existing contents in place so that
    /// already-open objects observe the change.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let mut objects = lock(&self.objects);
        match objects.get(path) {
            Some(blob) => *lock(blob) = data,
            None => {
                objects.insert(path.to_string(), Arc::new(Mutex::new(data)));
            }
        }
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(path).map(|blob| lock(blob).clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.objects).contains_key(path)
    }

    /// Caps the number of bytes any single write accepts.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        *lock(&self.write_limit) = limit;
    }

    /// Makes every seek on objects opened afterwards land `skew` bytes past
    /// the requested offset.
    pub fn set_seek_skew(&self, skew: Option<u64>) {
        *lock(&self.seek_skew) = skew;
    }

    pub fn counts(&self) -> &CallCounts {
        &self.counts
    }
}

impl Storage for MemoryStorage {
    fn metadata(&self, path: &str) -> io::Result<ObjectMeta> {
        if path == "/dev/null" || path == "/dev/zero" {
            return Ok(ObjectMeta {
                len: 0,
                is_file: false,
            });
        }
        let objects = lock(&self.objects);
        let blob = objects
            .get(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let len = lock(blob).len() as u64;
        Ok(ObjectMeta { len, is_file: true })
    }

    fn open(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn StorageObject>> {
        self.counts.opens.fetch_add(1, Ordering::SeqCst);
        let kind = match path {
            "/dev/null" => Kind::Null,
            "/dev/zero" => Kind::Zero,
            _ => {
                let mut objects = lock(&self.objects);
                let blob = match (objects.get(path).cloned(), mode) {
                    (Some(blob), _) => blob,
                    (None, OpenMode::WriteCreate) => {
                        let blob: Blob = Arc::default();
                        objects.insert(path.to_string(), Arc::clone(&blob));
                        blob
                    }
                    (None, _) => return Err(io::Error::from(io::ErrorKind::NotFound)),
                };
                Kind::Blob(blob)
            }
        };
        Ok(Box::new(MemoryObject {
            kind,
            pos: 0,
            counts: Arc::clone(&self.counts),
            write_limit: *lock(&self.write_limit),
            seek_skew: lock(&self.seek_skew).unwrap_or(0),
        }))
    }
}

enum Kind {
    Blob(Blob),
    Null,
    Zero,
}

struct MemoryObject {
    kind: Kind,
    pos: u64,
    counts: Arc<CallCounts>,
    write_limit: Option<usize>,
    seek_skew: u64,
}

impl StorageObject for MemoryObject {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.counts.reads.fetch_add(1, Ordering::SeqCst);
        match &self.kind {
            Kind::Null => Ok(0),
            Kind::Zero => {
                buf.fill(0);
                Ok(buf.len())
            }
            Kind::Blob(blob) => {
                let data = lock(blob);
                let start = (self.pos as usize).min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                self.pos += n as u64;
                Ok(n)
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.counts.writes.fetch_add(1, Ordering::SeqCst);
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        match &self.kind {
            Kind::Null => Ok(n),
            Kind::Zero => Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            Kind::Blob(blob) => {
                let mut data = lock(blob);
                let start = self.pos as usize;
                if data.len() < start + n {
                    data.resize(start + n, 0);
                }
                data[start..start + n].copy_from_slice(&buf[..n]);
                self.pos += n as u64;
                Ok(n)
            }
        }
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.counts.seeks.fetch_add(1, Ordering::SeqCst);
        match self.kind {
            Kind::Blob(_) => {
                self.pos = offset + self.seek_skew;
                Ok(self.pos)
            }
            // ESPIPE: the sentinels have no position.
            Kind::Null | Kind::Zero => Err(io::Error::from_raw_os_error(29)),
        }
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
