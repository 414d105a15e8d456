//! Local filesystem file handle

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{Result, SourceError, SourceFile, Whence};

/// A file on the local filesystem.
pub struct LocalFile {
    path: PathBuf,
    file: Option<File>,
}

impl LocalFile {
    /// Create (or truncate) `path` for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| SourceError::io("File::create", &e))?;
        tracing::debug!("Created local file: {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| SourceError::io("File::open", &e))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Path of this file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(SourceError::Closed)
    }
}

impl SourceFile for LocalFile {
    fn create(&self, name: &str) -> Result<Box<dyn SourceFile>> {
        Ok(Box::new(LocalFile::create(name)?))
    }

    fn open(&self, name: &str) -> Result<Box<dyn SourceFile>> {
        if name.is_empty() {
            return Ok(Box::new(LocalFile::open(&self.path)?));
        }
        Ok(Box::new(LocalFile::open(name)?))
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64> {
        let pos = match whence {
            Whence::Start => {
                let start = u64::try_from(offset)
                    .map_err(|_| SourceError::InvalidOffset { offset })?;
                SeekFrom::Start(start)
            }
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        let new_pos = self.file()?.seek(pos).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidInput => SourceError::InvalidOffset { offset },
            _ => SourceError::io("File::seek", &e),
        })?;
        Ok(new_pos as i64)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let file = self.file()?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SourceError::io("File::read", &e)),
            }
        }
        if filled == 0 {
            return Err(SourceError::EndOfStream);
        }
        Ok(filled)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.file()?
            .write_all(buf)
            .map_err(|e| SourceError::io("File::write", &e))?;
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .map_err(|e| SourceError::io("File::flush", &e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");

        let mut writer = LocalFile::create(&path).unwrap();
        writer.write(b"hello ").unwrap();
        writer.write(b"world").unwrap();
        writer.close().unwrap();

        let mut reader = writer.open("").unwrap();
        let mut buf = [0u8; 32];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
        assert!(reader.read(&mut buf).unwrap_err().is_end_of_stream());
    }

    #[test]
    fn test_seek_whence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut reader = LocalFile::open(&path).unwrap();
        assert_eq!(reader.seek(-3, Whence::End).unwrap(), 7);
        let mut buf = [0u8; 3];
        reader.read(&mut buf).unwrap();
        assert_eq!(&buf, b"789");

        assert_eq!(reader.seek(2, Whence::Start).unwrap(), 2);
        assert_eq!(reader.seek(3, Whence::Current).unwrap(), 5);
        reader.read(&mut buf).unwrap();
        assert_eq!(&buf, b"567");
    }

    #[test]
    fn test_seek_negative_start_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();

        let mut reader = LocalFile::open(&path).unwrap();
        assert!(matches!(
            reader.seek(-1, Whence::Start),
            Err(SourceError::InvalidOffset { offset: -1 })
        ));
    }

    #[test]
    fn test_use_after_close() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = LocalFile::create(temp_dir.path().join("x")).unwrap();
        file.close().unwrap();
        assert!(matches!(file.write(b"late"), Err(SourceError::Closed)));
        // closing twice is harmless
        file.close().unwrap();
    }

    #[test]
    fn test_open_missing_file() {
        let result = LocalFile::open("/nonexistent/path/file.bin");
        assert!(matches!(
            result,
            Err(SourceError::Io {
                kind: std::io::ErrorKind::NotFound,
                ..
            })
        ));
    }
}
