use storlink_protocol::ByteRange;

/// A one-shot command issued by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Checksum {
        path: String,
        algorithm: String,
        offset: u64,
        /// `None` digests to the end of the object.
        length: Option<u64>,
    },
    Mkdir { path: String },
    Rmdir { path: String },
    Delete { path: String },
    Rename { from: String, to: String },
    Chmod { path: String, mode: u32 },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Checksum { .. } => "cksm",
            Command::Mkdir { .. } => "mkdir",
            Command::Rmdir { .. } => "rmdir",
            Command::Delete { .. } => "delete",
            Command::Rename { .. } => "rename",
            Command::Chmod { .. } => "chmod",
        }
    }

    /// The range a checksum command covers.
    pub fn range(&self) -> Option<ByteRange> {
        match self {
            Command::Checksum { offset, length, .. } => Some(ByteRange {
                offset: *offset,
                length: *length,
            }),
            _ => None,
        }
    }
}
