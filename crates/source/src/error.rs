//! Error type shared by every file backend

use std::fmt;

/// Result alias for file operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Error type for file operations.
///
/// Errors are `Clone` because a failed write session latches its first error
/// and hands the same error back on every later call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// Seek whence outside start/current/end
    #[error("Seek: invalid whence {0}")]
    InvalidWhence(i32),

    /// Seek target outside the bounds of the file
    #[error("Seek: invalid offset {offset}")]
    InvalidOffset { offset: i64 },

    /// Failure reported by the storage transport
    #[error("{op} failed: {message}")]
    Transport { op: &'static str, message: String },

    /// No bytes left to read
    #[error("end of stream")]
    EndOfStream,

    /// Operation not meaningful for this kind of handle
    #[error("{0} is not supported by this handle")]
    Unsupported(&'static str),

    /// The operation context was cancelled
    #[error("{op} cancelled")]
    Cancelled { op: &'static str },

    /// Write after the pipe was closed without an error
    #[error("write on closed pipe")]
    ClosedPipe,

    /// Handle used after `close`
    #[error("file already closed")]
    Closed,

    /// Local I/O failure
    #[error("{op}: {message}")]
    Io {
        op: &'static str,
        kind: std::io::ErrorKind,
        message: String,
    },

    /// Named file does not exist
    #[error("file not found: {0}")]
    NotFound(String),
}

impl SourceError {
    /// Wrap a transport failure, keeping the full context chain in the message.
    pub fn transport(op: &'static str, err: impl fmt::Display) -> Self {
        SourceError::Transport {
            op,
            message: format!("{err:#}"),
        }
    }

    /// Wrap a local I/O failure.
    pub fn io(op: &'static str, err: &std::io::Error) -> Self {
        SourceError::Io {
            op,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Whether this is the end-of-stream signal rather than a real failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, SourceError::EndOfStream)
    }
}

impl From<SourceError> for std::io::Error {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Io { kind, .. } => std::io::Error::new(kind, err),
            SourceError::InvalidWhence(_) | SourceError::InvalidOffset { .. } => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
            }
            SourceError::Unsupported(_) => {
                std::io::Error::new(std::io::ErrorKind::Unsupported, err)
            }
            SourceError::NotFound(_) => std::io::Error::new(std::io::ErrorKind::NotFound, err),
            SourceError::ClosedPipe => std::io::Error::new(std::io::ErrorKind::BrokenPipe, err),
            other => std::io::Error::other(other),
        }
    }
}
