//! Integration tests for moving bytes between local, in-memory and S3 handles
//!
//! The S3 side runs against `MemoryObjectStore`, so no network is needed.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use objfile_s3::{parse_s3_uri, MemoryObjectStore, ObjectStore, OperationContext, S3File};
use objfile_source::{LocalFile, MemFs, OnClose, SourceError, SourceFile, SourceIo, Whence};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

#[test]
fn test_local_file_to_s3_and_back() {
    let rt = runtime();
    let store = Arc::new(MemoryObjectStore::new());
    let ctx = OperationContext::new(rt.handle().clone());
    let (bucket, key) = parse_s3_uri("s3://data/in/blob.bin").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("blob.bin");
    let data = payload(100_000);
    std::fs::write(&src_path, &data).unwrap();

    // local -> s3
    let mut src = SourceIo::new(LocalFile::open(&src_path).unwrap());
    let mut dst = SourceIo::new(S3File::writer(store.clone(), ctx.clone(), &bucket, &key));
    let copied = std::io::copy(&mut src, &mut dst).unwrap();
    assert_eq!(copied, data.len() as u64);
    dst.get_mut().close().unwrap();
    assert_eq!(store.get(&bucket, &key).unwrap(), data);

    // s3 -> local
    let out_path = dir.path().join("copy.bin");
    let mut src = SourceIo::new(S3File::reader(store.clone(), ctx, &bucket, &key));
    let mut dst = SourceIo::new(LocalFile::create(&out_path).unwrap());
    std::io::copy(&mut src, &mut dst).unwrap();
    dst.get_mut().close().unwrap();

    assert_eq!(std::fs::read(&out_path).unwrap(), data);
    assert_eq!(store.probe_calls(), 1);
}

#[test]
fn test_read_exact_after_std_seek() {
    let rt = runtime();
    let store = Arc::new(MemoryObjectStore::new());
    let data = payload(4096);
    store.insert("b", "k", data.clone());
    let ctx = OperationContext::new(rt.handle().clone());

    let mut io = SourceIo::new(S3File::reader(store.clone(), ctx, "b", "k"));
    assert_eq!(io.seek(SeekFrom::Start(1024)).unwrap(), 1024);
    let mut buf = [0u8; 16];
    io.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, &data[1024..1040]);
    assert_eq!(io.seek(SeekFrom::Current(0)).unwrap(), 1040);

    let mut rest = Vec::new();
    io.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, &data[1040..]);
}

#[test]
fn test_tail_of_object() {
    let rt = runtime();
    let store = Arc::new(MemoryObjectStore::new());
    store.insert("b", "log.txt", &b"line one\nline two\nline three\n"[..]);
    let ctx = OperationContext::new(rt.handle().clone());

    let mut file = S3File::reader(store.clone(), ctx, "b", "log.txt");
    file.seek(-11, Whence::End).unwrap();
    let mut tail = SourceIo::new(file);
    let mut out = String::new();
    tail.read_to_string(&mut out).unwrap();
    assert_eq!(out, "line three\n");
}

#[test]
fn test_mem_file_close_hook_uploads_to_s3() {
    let rt = runtime();
    let store = Arc::new(MemoryObjectStore::new());
    let ctx = OperationContext::new(rt.handle().clone());
    let uploaded = Arc::new(Mutex::new(Vec::new()));

    // Stage in memory, push to the object store once complete
    let hook_store: Arc<dyn ObjectStore> = store.clone();
    let hook_uploaded = uploaded.clone();
    let on_close: OnClose = Arc::new(move |name: &str, reader: &mut dyn Read| {
        let mut io = SourceIo::new(S3File::writer(
            hook_store.clone(),
            ctx.clone(),
            "staging",
            name,
        ));
        std::io::copy(reader, &mut io).map_err(|e| SourceError::io("copy", &e))?;
        io.get_mut().close()?;
        hook_uploaded.lock().unwrap().push(name.to_string());
        Ok(())
    });

    let fs = MemFs::new();
    let mut staged = SourceIo::new(fs.create("out/part-0.bin", Some(on_close)));
    staged.write_all(b"staged contents").unwrap();
    staged.get_mut().close().unwrap();

    assert_eq!(*uploaded.lock().unwrap(), vec!["part-0.bin"]);
    assert_eq!(
        &store.get("staging", "part-0.bin").unwrap()[..],
        b"staged contents"
    );
}

#[test]
fn test_failed_upload_surfaces_through_std_io() {
    let rt = runtime();
    let store = Arc::new(MemoryObjectStore::new());
    store.fail_uploads_after(0, "AccessDenied");
    let ctx = OperationContext::new(rt.handle().clone());

    let mut io = SourceIo::new(S3File::writer(store.clone(), ctx, "b", "denied"));
    let err = io.write_all(b"anything").unwrap_err();
    assert!(err.to_string().contains("AccessDenied"));
    assert!(io.get_mut().close().is_err());
    assert!(store.get("b", "denied").is_none());
}
