//! Storage backend abstraction and the POSIX implementation.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Targets that have no addressable offset (pure sinks/sources).
///
/// Used for memory-to-memory throughput runs; no seek is ever issued
/// against them.
pub const NON_SEEKABLE_PATHS: [&str; 2] = ["/dev/null", "/dev/zero"];

/// Returns `false` for the well-known discard/zero endpoints.
pub fn is_seekable_path(path: &str) -> bool {
    !NON_SEEKABLE_PATHS.contains(&path)
}

/// How an object is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only.
    Read,
    /// Write-only, object must already exist. Never truncates.
    WriteExisting,
    /// Write-only, created (mode 0644) if absent. Never truncates.
    WriteCreate,
}

/// Subset of object metadata the engines need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub len: u64,
    pub is_file: bool,
}

/// An open object. Exclusively owned by the engine that opened it.
pub trait StorageObject: Send {
    /// Reads from the current position. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes at the current position. May accept fewer bytes than offered.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Positions the object at an absolute offset and returns the new position.
    fn seek(&mut self, offset: u64) -> io::Result<u64>;

    /// Releases the descriptor.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// A storage backend that can stat and open objects by path.
pub trait Storage: Send + Sync {
    fn metadata(&self, path: &str) -> io::Result<ObjectMeta>;

    fn open(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn StorageObject>>;
}

/// Local filesystem backend using plain POSIX semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixStorage;

impl Storage for PosixStorage {
    fn metadata(&self, path: &str) -> io::Result<ObjectMeta> {
        let meta = std::fs::metadata(path)?;
        Ok(ObjectMeta {
            len: meta.len(),
            is_file: meta.is_file(),
        })
    }

    fn open(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn StorageObject>> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => {
                options.read(true);
            }
            OpenMode::WriteExisting => {
                options.write(true);
            }
            OpenMode::WriteCreate => {
                options.write(true).create(true).truncate(false);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::OpenOptionsExt;
                    options.mode(0o644);
                }
            }
        }
        let file = options.open(path)?;
        Ok(Box::new(PosixObject { file }))
    }
}

struct PosixObject {
    file: File,
}

impl StorageObject for PosixObject {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.file.seek(SeekFrom::Start(offset))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let PosixObject { mut file } = *self;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path_str(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn sentinels_are_not_seekable() {
        assert!(!is_seekable_path("/dev/null"));
        assert!(!is_seekable_path("/dev/zero"));
        assert!(is_seekable_path("/data/file.bin"));
        assert!(is_seekable_path("//dev/null"));
    }

    #[test]
    fn write_create_makes_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = path_str(&dir, "new.bin");
        let mut obj = PosixStorage.open(&path, OpenMode::WriteCreate).unwrap();
        assert_eq!(obj.write(b"hello").unwrap(), 5);
        obj.close().unwrap();

        let meta = PosixStorage.metadata(&path).unwrap();
        assert_eq!(meta.len, 5);
        assert!(meta.is_file);
    }

    #[cfg(unix)]
    #[test]
    fn write_create_uses_0644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = path_str(&dir, "mode.bin");
        PosixStorage
            .open(&path, OpenMode::WriteCreate)
            .unwrap()
            .close()
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        // The umask may only clear bits.
        assert_eq!(mode & !0o644, 0);
    }

    #[test]
    fn write_existing_does_not_truncate() {
        let dir = TempDir::new().unwrap();
        let path = path_str(&dir, "keep.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut obj = PosixStorage.open(&path, OpenMode::WriteExisting).unwrap();
        assert_eq!(obj.seek(2).unwrap(), 2);
        obj.write(b"AB").unwrap();
        obj.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"01AB456789");
    }

    #[test]
    fn write_existing_requires_file() {
        let dir = TempDir::new().unwrap();
        let path = path_str(&dir, "missing.bin");
        let err = PosixStorage
            .open(&path, OpenMode::WriteExisting)
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn read_from_offset() {
        let dir = TempDir::new().unwrap();
        let path = path_str(&dir, "read.bin");
        std::fs::write(&path, b"abcdef").unwrap();

        let mut obj = PosixStorage.open(&path, OpenMode::Read).unwrap();
        obj.seek(3).unwrap();
        let mut buf = [0u8; 8];
        let n = obj.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"def");
        assert_eq!(obj.read(&mut buf).unwrap(), 0);
    }
}
