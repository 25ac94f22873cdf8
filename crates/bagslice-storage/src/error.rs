//! Error types for bagslice-storage

use thiserror::Error;

/// Errors that can occur while reading or writing a bag
#[derive(Debug, Error)]
pub enum StorageError {
    /// No recognizable index at the given location
    #[error("no bag index found at {0}")]
    NotFound(String),

    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// Record data that cannot be decoded
    #[error("corrupt bag: {0}")]
    Corrupt(String),

    /// Write to a channel that was never declared, or a conflicting declaration
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// Destination already holds a bag
    #[error("destination already contains a bag: {0}")]
    AlreadyExists(String),

    /// Encoded record exceeds the frame size limit
    #[error("record of {size} bytes exceeds the {max} byte frame limit")]
    RecordTooLarge { size: usize, max: usize },

    /// `read_next` called after the last record
    #[error("no more records")]
    Exhausted,
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<postcard::Error> for StorageError {
    fn from(err: postcard::Error) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

impl StorageError {
    pub fn not_found(location: impl Into<String>) -> Self {
        Self::NotFound(location.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }

    pub fn invalid_channel(name: impl Into<String>) -> Self {
        Self::InvalidChannel(name.into())
    }

    pub fn record_too_large(size: usize) -> Self {
        Self::RecordTooLarge {
            size,
            max: crate::bag::MAX_FRAME_LEN,
        }
    }
}
