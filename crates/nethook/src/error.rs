//! Error types shared across the loader and decoders.

use std::path::PathBuf;

use nethook_buffers::BufferError;
use thiserror::Error;

use crate::wire::WireError;

/// Failure of a whole directory load.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("dump directory {} is unreadable: {source}", path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to decode a record's header. The record stays inspectable; only
/// its body is not attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("truncated header at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("malformed protobuf header: {0}")]
    Malformed(WireError),
}

impl From<BufferError> for HeaderError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::EndOfBuffer {
                offset,
                needed,
                available,
            } => HeaderError::Truncated {
                offset,
                needed,
                available,
            },
            BufferError::InvalidUtf8 { offset } => {
                HeaderError::Malformed(WireError::InvalidUtf8 { offset })
            }
        }
    }
}

impl From<WireError> for HeaderError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::EndOfBuffer {
                offset,
                needed,
                available,
            } => HeaderError::Truncated {
                offset,
                needed,
                available,
            },
            other => HeaderError::Malformed(other),
        }
    }
}

/// A dump filename that carries a sequence and direction but whose remaining
/// metadata could not be parsed. The record is still loaded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedFilename {
    #[error("missing message type field")]
    MissingType,
    #[error("message type `{0}` is not a number")]
    InvalidType(String),
}
