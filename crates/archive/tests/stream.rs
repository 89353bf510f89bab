#![forbid(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use flate2::write::GzEncoder;
use flate2::Compression;

use rewind_archive::ArchiveStream;
use rewind_core::RestoreError;

fn temp_path(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("rewind-archive-{}-{}.tar.gz", tag, nanos))
}

fn write_archive(path: &PathBuf, entries: &[(&str, &[u8])], with_dir: bool) {
    let file = std::fs::File::create(path).unwrap();
    let enc = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(enc);
    if with_dir {
        let mut h = tar::Header::new_gnu();
        h.set_entry_type(tar::EntryType::Directory);
        h.set_size(0);
        h.set_mode(0o755);
        h.set_cksum();
        builder.append_data(&mut h, "pods.#v1/", std::io::empty()).unwrap();
    }
    for (p, d) in entries {
        let mut h = tar::Header::new_gnu();
        h.set_size(d.len() as u64);
        h.set_mode(0o644);
        h.set_cksum();
        builder.append_data(&mut h, p, *d).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

#[test]
fn yields_regular_files_in_order_and_skips_directories() {
    let path = temp_path("order");
    write_archive(
        &path,
        &[
            ("pods.#v1/kube-system/dns.json", b"{\"a\":1}".as_slice()),
            ("nodes.#v1/worker-0.json", b"{\"b\":2}".as_slice()),
        ],
        true,
    );
    let mut stream = ArchiveStream::open(&path).unwrap();
    let got: Vec<_> = stream.entries().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].path, "pods.#v1/kube-system/dns.json");
    assert_eq!(got[0].data, b"{\"a\":1}");
    assert_eq!(got[1].path, "nodes.#v1/worker-0.json");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn empty_archive_terminates_normally() {
    let path = temp_path("empty");
    write_archive(&path, &[], false);
    let mut stream = ArchiveStream::open(&path).unwrap();
    assert_eq!(stream.entries().unwrap().count(), 0);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_file_is_open_error() {
    let err = ArchiveStream::open(&temp_path("missing")).unwrap_err();
    assert!(matches!(err, RestoreError::Open { .. }), "got {:?}", err);
}

#[test]
fn non_gzip_file_is_open_error() {
    let path = temp_path("plain");
    std::fs::write(&path, b"definitely not a gzip stream").unwrap();
    let err = ArchiveStream::open(&path).unwrap_err();
    match err {
        RestoreError::Open { reason, .. } => assert!(reason.contains("not a gzip"), "reason={}", reason),
        other => panic!("expected Open, got {:?}", other),
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn corrupt_inner_stream_is_format_error() {
    // Valid gzip, but the decompressed payload is not a tar stream.
    let path = temp_path("corrupt");
    let file = std::fs::File::create(&path).unwrap();
    let mut enc = GzEncoder::new(file, Compression::default());
    enc.write_all(&[0xAB; 1024]).unwrap();
    enc.finish().unwrap();

    let mut stream = ArchiveStream::open(&path).unwrap();
    let first = stream.entries().unwrap().next().unwrap();
    assert!(matches!(first, Err(RestoreError::Format { .. })), "got {:?}", first);
    let _ = std::fs::remove_file(&path);
}
