//! Seekable file capability for columnar readers and writers
//!
//! This crate defines one synchronous file interface, [`SourceFile`], that
//! every storage backend implements. Callers such as a columnar writer only
//! ever see `create`/`open`/`seek`/`read`/`write`/`close`; where the bytes
//! actually live is decided by which handle they were given.
//!
//! # Backends
//!
//! - **Local**: [`LocalFile`], a plain file on the local filesystem
//! - **In-memory**: [`MemFile`] inside an explicit [`MemFs`], with an optional
//!   close callback for handing the finished bytes elsewhere
//! - **Writer sink**: [`WriterFile`], write-only over any `std::io::Write`
//! - **Object storage**: `S3File` in the `objfile-s3` crate
//!
//! # Example
//!
//! ```ignore
//! use objfile_source::{LocalFile, SourceFile, Whence};
//!
//! let mut file = LocalFile::create("/tmp/data.bin")?;
//! file.write(b"hello world")?;
//! file.close()?;
//!
//! let mut reader = file.open("")?;
//! reader.seek(6, Whence::Start)?;
//! let mut buf = [0u8; 5];
//! reader.read(&mut buf)?;
//! ```

mod error;
mod io;
mod local;
mod mem;
mod writer;

pub use error::{Result, SourceError};
pub use io::SourceIo;
pub use local::LocalFile;
pub use mem::{MemFile, MemFs, OnClose};
pub use writer::WriterFile;

/// Reference point for a seek offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Whence {
    /// Relative to the start of the file
    #[default]
    Start,
    /// Relative to the current cursor
    Current,
    /// Relative to the end of the file (offsets are expected to be <= 0)
    End,
}

impl Whence {
    /// Convert a raw whence value (0 = start, 1 = current, 2 = end).
    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(SourceError::InvalidWhence(other)),
        }
    }

    /// Raw whence value, the inverse of [`Whence::from_raw`].
    pub fn as_raw(self) -> i32 {
        match self {
            Whence::Start => 0,
            Whence::Current => 1,
            Whence::End => 2,
        }
    }
}

/// Synchronous, seekable byte-stream file.
///
/// Handles are either read or write handles for their whole lifetime.
/// `create` and `open` never switch the mode of `self`; they return a new
/// handle sharing the identity (directory, bucket, filesystem) of the parent.
/// An empty `name` passed to `open` reuses the parent's own name, which is how
/// a columnar reader fans out one reader per column.
pub trait SourceFile: Send {
    /// Create a new write handle for `name`.
    fn create(&self, name: &str) -> Result<Box<dyn SourceFile>>;

    /// Open a new read handle for `name` (or the parent's name if empty).
    fn open(&self, name: &str) -> Result<Box<dyn SourceFile>>;

    /// Move the read cursor and return the resulting position.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64>;

    /// Read up to `buf.len()` bytes.
    ///
    /// Returns [`SourceError::EndOfStream`] when no bytes are left.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `buf`, returning the number of bytes accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Finish the handle. Write handles are only durable once this succeeds.
    fn close(&mut self) -> Result<()>;
}

impl<F: SourceFile + ?Sized> SourceFile for Box<F> {
    fn create(&self, name: &str) -> Result<Box<dyn SourceFile>> {
        (**self).create(name)
    }

    fn open(&self, name: &str) -> Result<Box<dyn SourceFile>> {
        (**self).open(name)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64> {
        (**self).seek(offset, whence)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whence_from_raw() {
        assert_eq!(Whence::from_raw(0).unwrap(), Whence::Start);
        assert_eq!(Whence::from_raw(1).unwrap(), Whence::Current);
        assert_eq!(Whence::from_raw(2).unwrap(), Whence::End);
    }

    #[test]
    fn test_whence_from_raw_invalid() {
        assert!(matches!(
            Whence::from_raw(3),
            Err(SourceError::InvalidWhence(3))
        ));
        assert!(matches!(
            Whence::from_raw(-1),
            Err(SourceError::InvalidWhence(-1))
        ));
    }

    #[test]
    fn test_whence_raw_roundtrip() {
        for whence in [Whence::Start, Whence::Current, Whence::End] {
            assert_eq!(Whence::from_raw(whence.as_raw()).unwrap(), whence);
        }
    }
}
