//! In-memory file handles with an optional close callback

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Result, SourceError, SourceFile, Whence};

/// Called when a [`MemFile`] is closed, with the file's base name and a
/// reader over its complete contents.
pub type OnClose = Arc<dyn Fn(&str, &mut dyn std::io::Read) -> Result<()> + Send + Sync>;

type Buffer = Arc<Mutex<Vec<u8>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory filesystem.
///
/// Cloning a `MemFs` shares the same set of files.
#[derive(Clone, Default)]
pub struct MemFs {
    files: Arc<Mutex<HashMap<String, Buffer>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or truncate) `name` and return a write handle for it.
    pub fn create(&self, name: &str, on_close: Option<OnClose>) -> MemFile {
        let data: Buffer = Arc::default();
        lock(&self.files).insert(name.to_string(), data.clone());
        MemFile {
            fs: self.clone(),
            name: name.to_string(),
            data,
            pos: 0,
            on_close,
            closed: false,
        }
    }

    /// Open an existing file.
    pub fn open(&self, name: &str) -> Result<MemFile> {
        let data = lock(&self.files)
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))?;
        Ok(MemFile {
            fs: self.clone(),
            name: name.to_string(),
            data,
            pos: 0,
            on_close: None,
            closed: false,
        })
    }

    /// Snapshot of a file's contents.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(name).map(|data| lock(data).clone())
    }

    /// Remove a file, returning whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        lock(&self.files).remove(name).is_some()
    }
}

/// A file inside a [`MemFs`].
pub struct MemFile {
    fs: MemFs,
    name: String,
    data: Buffer,
    pos: u64,
    on_close: Option<OnClose>,
    closed: bool,
}

impl MemFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        Ok(())
    }
}

impl SourceFile for MemFile {
    fn create(&self, name: &str) -> Result<Box<dyn SourceFile>> {
        Ok(Box::new(self.fs.create(name, self.on_close.clone())))
    }

    fn open(&self, name: &str) -> Result<Box<dyn SourceFile>> {
        let name = if name.is_empty() { &self.name } else { name };
        Ok(Box::new(self.fs.open(name)?))
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64> {
        self.ensure_open()?;
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos as i64,
            Whence::End => lock(&self.data).len() as i64,
        };
        let target = base
            .checked_add(offset)
            .filter(|target| *target >= 0)
            .ok_or(SourceError::InvalidOffset { offset })?;
        self.pos = target as u64;
        Ok(target)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let data = lock(&self.data);
        let start = self.pos as usize;
        if start >= data.len() {
            return Err(SourceError::EndOfStream);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        let mut data = lock(&self.data);
        let start = self.pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(on_close) = &self.on_close {
            let base_name = Path::new(&self.name)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.name.clone());
            let snapshot = lock(&self.data).clone();
            on_close(&base_name, &mut Cursor::new(snapshot))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_create_write_open_read() {
        let fs = MemFs::new();
        let mut file = fs.create("dir/data.bin", None);
        file.write(b"abcdef").unwrap();
        file.close().unwrap();

        let mut reader = file.open("").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert!(reader.read(&mut buf).unwrap_err().is_end_of_stream());
    }

    #[test]
    fn test_on_close_receives_base_name_and_contents() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let on_close: OnClose = Arc::new(move |name: &str, reader: &mut dyn Read| {
            let mut contents = Vec::new();
            reader
                .read_to_end(&mut contents)
                .map_err(|e| SourceError::io("read", &e))?;
            *sink.lock().unwrap() = Some((name.to_string(), contents));
            Ok(())
        });

        let fs = MemFs::new();
        let mut file = fs.create("out/part-0.parquet", Some(on_close));
        file.write(b"PAR1").unwrap();
        file.close().unwrap();

        let seen = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.0, "part-0.parquet");
        assert_eq!(seen.1, b"PAR1");
    }

    #[test]
    fn test_on_close_error_propagates() {
        let on_close: OnClose =
            Arc::new(|_: &str, _: &mut dyn Read| Err(SourceError::Unsupported("upload")));
        let fs = MemFs::new();
        let mut file = fs.create("a", Some(on_close));
        assert!(matches!(file.close(), Err(SourceError::Unsupported(_))));
    }

    #[test]
    fn test_seek_and_overwrite() {
        let fs = MemFs::new();
        let mut file = fs.create("a", None);
        file.write(b"hello world").unwrap();
        assert_eq!(file.seek(-5, Whence::End).unwrap(), 6);
        file.write(b"there").unwrap();
        assert_eq!(fs.contents("a").unwrap(), b"hello there");

        assert!(matches!(
            file.seek(-1, Whence::Start),
            Err(SourceError::InvalidOffset { offset: -1 })
        ));
    }

    #[test]
    fn test_open_missing() {
        let fs = MemFs::new();
        assert!(matches!(fs.open("missing"), Err(SourceError::NotFound(_))));
        assert!(!fs.remove("missing"));
    }
}
