//! Bridge from [`SourceFile`] to the `std::io` traits

use std::io::{Read, Seek, SeekFrom, Write};

use crate::{SourceError, SourceFile, Whence};

/// Adapts any [`SourceFile`] to `std::io::{Read, Write, Seek}`.
///
/// [`SourceError::EndOfStream`] becomes `Ok(0)`, so `std::io::copy` and
/// `read_to_end` terminate normally.
pub struct SourceIo<F> {
    inner: F,
}

impl<F: SourceFile> SourceIo<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn get_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: SourceFile> Read for SourceIo<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(SourceError::EndOfStream) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl<F: SourceFile> Write for SourceIo<F> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(self.inner.write(buf)?)
    }

    // Bytes are handed off on every write; durability only comes with close.
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<F: SourceFile> Seek for SourceIo<F> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset)
                    .map_err(|_| SourceError::InvalidOffset { offset: i64::MAX })?;
                (offset, Whence::Start)
            }
            SeekFrom::Current(offset) => (offset, Whence::Current),
            SeekFrom::End(offset) => (offset, Whence::End),
        };
        let new_pos = self.inner.seek(offset, whence)?;
        // End-relative handles may report a relative (negative) cursor
        u64::try_from(new_pos)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Unsupported, "relative position"))
    }
}
