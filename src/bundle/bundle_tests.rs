use super::*;
use std::sync::Arc;

use crate::error::ContentError;
use crate::filters::IdentityFilter;
use crate::node::{ContentReader, MemoryContent};

fn node(prefix: &str, name: &str, body: &[u8]) -> ContentNode {
    ContentNode::from_bytes(prefix, name, body.to_vec())
}

fn read_back(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(bytes);
    archive
        .entries()
        .unwrap()
        .map(|e| {
            let mut e = e.unwrap();
            let path = String::from_utf8(e.path_bytes().into_owned()).unwrap();
            let mut body = Vec::new();
            e.read_to_end(&mut body).unwrap();
            (path, body)
        })
        .collect()
}

#[test]
fn common_prefix_cases() {
    let nodes = vec![node("a/b/c", "1", b""), node("a/b/d", "2", b"")];
    assert_eq!(common_prefix(&nodes), "a/b");

    let nodes = vec![node("x", "1", b""), node("y", "2", b"")];
    assert_eq!(common_prefix(&nodes), "");

    // ragged component counts never index past the shorter prefix
    let nodes = vec![node("a/b/c/d", "1", b""), node("a/b", "2", b"")];
    assert_eq!(common_prefix(&nodes), "a/b");
    let nodes = vec![node("a", "1", b""), node("a/b/c", "2", b"")];
    assert_eq!(common_prefix(&nodes), "a");

    assert_eq!(common_prefix(&[]), "");
    assert_eq!(common_prefix(&[node("solo/dir", "f", b"")]), "solo/dir");
}

#[test]
fn entry_path_prefers_common_prefix() {
    let n = node("a/b/c", "f.txt", b"");
    assert_eq!(entry_path("a/b", &n), "a/b/f.txt");
    assert_eq!(entry_path("", &n), "a/b/c/f.txt");
    assert_eq!(entry_path("", &node("", "f.txt", b"")), "f.txt");
}

#[test]
fn archive_holds_one_entry_per_node_in_order() {
    let nodes = vec![
        node("data/run1", "b.bin", b"bbbb"),
        node("data/run2", "a.bin", b"a"),
        node("data", "c.bin", &[7u8; 700]),
    ];
    let mut out: Vec<u8> = Vec::new();
    let n = write_archive(&IdentityFilter, &FilterParams::default(), &nodes, &mut out).unwrap();
    assert_eq!(n, out.len() as u64);
    assert_eq!(n % TAR_RECORD_SIZE, 0);

    let entries = read_back(&out);
    let paths: Vec<&str> = entries.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths, vec!["data/b.bin", "data/a.bin", "data/c.bin"]);
    assert_eq!(entries[0].1, b"bbbb");
    assert_eq!(entries[2].1.len(), 700);
}

#[test]
fn estimate_matches_written_length_with_long_paths() {
    let deep = "d".repeat(60);
    let nodes = vec![
        node(&format!("{deep}/one"), &"n".repeat(70), &[1u8; 513]),
        node(&format!("{deep}/two"), "short", b"xyz"),
    ];
    let common = common_prefix(&nodes);
    let paths: Vec<String> = nodes.iter().map(|n| entry_path(&common, n)).collect();
    assert!(paths[0].len() > 100);
    let estimate = estimate_archive_size(paths.iter().map(|p| p.as_str()).zip(nodes.iter().map(|n| n.size())));

    let mut out: Vec<u8> = Vec::new();
    let n = write_archive(&IdentityFilter, &FilterParams::default(), &nodes, &mut out).unwrap();
    assert_eq!(estimate, n);
    assert_eq!(read_back(&out)[0].0, paths[0]);
}

/// Serves fixed bytes without random access and claims whatever length it is given.
struct UnverifiedContent {
    bytes: Vec<u8>,
    claimed: Option<u64>,
}

impl ContentReader for UnverifiedContent {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::Cursor::new(self.bytes.clone())))
    }

    fn exact_size(&self) -> Option<u64> { self.claimed }
}

fn unverified(name: &str, declared: u64, bytes: &[u8], claimed: Option<u64>) -> ContentNode {
    ContentNode::new("p", name, declared, Arc::new(UnverifiedContent { bytes: bytes.to_vec(), claimed }))
}

#[test]
fn approximate_declared_sizes_are_buffered() {
    let nodes = vec![
        unverified("short", 8, b"abcde", None),
        unverified("long", 2, b"abcdef", None),
        ContentNode::new("p", "mem", 100, Arc::new(MemoryContent::new(b"xyz".to_vec()))),
    ];
    let mut out: Vec<u8> = Vec::new();
    let n = write_archive(&IdentityFilter, &FilterParams::default(), &nodes, &mut out).unwrap();
    assert_eq!(n, out.len() as u64);
    let entries = read_back(&out);
    assert_eq!(entries[0], ("p/short".to_string(), b"abcde".to_vec()));
    assert_eq!(entries[1], ("p/long".to_string(), b"abcdef".to_vec()));
    assert_eq!(entries[2], ("p/mem".to_string(), b"xyz".to_vec()));
}

#[test]
fn vouched_length_mismatch_fails_without_terminating_archive() {
    let nodes = vec![unverified("a", 8, b"abcde", Some(8)), unverified("b", 1, b"z", Some(1))];
    let mut out: Vec<u8> = Vec::new();
    let err = write_archive(&IdentityFilter, &FilterParams::default(), &nodes, &mut out).unwrap_err();
    assert!(matches!(err, ContentError::ContentFilter(_)));
    // header and the partial body only; no end-of-archive blocks
    assert_eq!(out.len(), 512 + 5);

    let long = vec![unverified("a", 2, b"abcdef", Some(2))];
    let mut out: Vec<u8> = Vec::new();
    assert!(write_archive(&IdentityFilter, &FilterParams::default(), &long, &mut out).is_err());
    assert!(out.len() < 1024 + 512);
}

#[test]
fn exact_reader_passes_exact_sources() {
    let mut r = ExactReader::new(&b"abcd"[..], 4);
    let mut s = Vec::new();
    r.read_to_end(&mut s).unwrap();
    assert_eq!(s, b"abcd");
}
