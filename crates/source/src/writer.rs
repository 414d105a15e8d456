//! Write-only handle over any `std::io::Write`

use std::io::Write;

use crate::{Result, SourceError, SourceFile, Whence};

/// Forwards writes to an inner writer. Every other operation is unsupported.
pub struct WriterFile<W> {
    writer: W,
}

impl<W: Write + Send> WriterFile<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Give back the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> SourceFile for WriterFile<W> {
    fn create(&self, _name: &str) -> Result<Box<dyn SourceFile>> {
        Err(SourceError::Unsupported("create"))
    }

    fn open(&self, _name: &str) -> Result<Box<dyn SourceFile>> {
        Err(SourceError::Unsupported("open"))
    }

    fn seek(&mut self, _offset: i64, _whence: Whence) -> Result<i64> {
        Err(SourceError::Unsupported("seek"))
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(SourceError::Unsupported("read"))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.writer
            .write_all(buf)
            .map_err(|e| SourceError::io("Writer::write", &e))?;
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| SourceError::io("Writer::flush", &e))
    }
}
