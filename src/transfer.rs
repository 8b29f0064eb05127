//! Checksummed transfers and the sharded on-disk content store.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3;

use crate::error::{ContentError, ContentResult};
use crate::idgen::{shard_dir, IdGenerator, Identifier};
use crate::node::{ContentNode, FileContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Xxh3,
    Crc32,
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "xxh3" | "xxh3_64" => Ok(ChecksumAlgorithm::Xxh3),
            "crc32" => Ok(ChecksumAlgorithm::Crc32),
            other => Err(format!("unknown checksum algorithm '{}'", other)),
        }
    }
}

enum Hasher {
    Sha256(Sha256),
    Xxh3(Box<Xxh3>),
    Crc32(crc32fast::Hasher),
}

impl Hasher {
    fn new(algo: ChecksumAlgorithm) -> Self {
        match algo {
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumAlgorithm::Xxh3 => Hasher::Xxh3(Box::new(Xxh3::new())),
            ChecksumAlgorithm::Crc32 => Hasher::Crc32(crc32fast::Hasher::new()),
        }
    }

    fn update(&mut self, buf: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(buf),
            Hasher::Xxh3(h) => h.update(buf),
            Hasher::Crc32(h) => h.update(buf),
        }
    }

    // Integer digests are stored big-endian so the hex form reads like the number.
    fn finish(self) -> Vec<u8> {
        match self {
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Xxh3(h) => h.digest().to_be_bytes().to_vec(),
            Hasher::Crc32(h) => h.finalize().to_be_bytes().to_vec(),
        }
    }
}

/// Outcome of moving one stream of bytes to its destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    pub bytes_written: u64,
    pub checksum: Vec<u8>,
}

impl TransferInfo {
    pub fn checksum_hex(&self) -> String { hex::encode(&self.checksum) }
}

/// Copy `reader` into `writer`, hashing the bytes on the way through.
pub fn copy_with_checksum<R, W>(reader: &mut R, writer: &mut W, algo: ChecksumAlgorithm) -> io::Result<TransferInfo>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut hasher = Hasher::new(algo);
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    writer.flush()?;
    Ok(TransferInfo { bytes_written: total, checksum: hasher.finish() })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    pub id: Identifier,
    pub path: PathBuf,
    pub transfer: TransferInfo,
}

/// Writes incoming content under `root/<shard path of id>/<name>`.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    ids: Arc<IdGenerator>,
    checksum: ChecksumAlgorithm,
}

fn validate_name(name: &str) -> ContentResult<&str> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0');
    if bad {
        return Err(ContentError::InvalidParameter {
            name: "name".to_string(),
            value: name.to_string(),
            reason: "must be a single non-empty path component".to_string(),
        });
    }
    Ok(trimmed)
}

fn write_synced<R: Read + ?Sized>(path: &Path, reader: &mut R, algo: ChecksumAlgorithm) -> io::Result<TransferInfo> {
    let mut out = BufWriter::new(File::create(path)?);
    let transfer = copy_with_checksum(reader, &mut out, algo)?;
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(transfer)
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>, ids: Arc<IdGenerator>, checksum: ChecksumAlgorithm) -> Self {
        Self { root: root.into(), ids, checksum }
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn path_for(&self, id: Identifier, name: &str) -> PathBuf {
        shard_dir(&self.root, &id.to_string()).join(name)
    }

    /// Store `reader` under a fresh identifier. The file only appears at its final
    /// path once fully written.
    pub fn put<R: Read + ?Sized>(&self, name: &str, reader: &mut R) -> ContentResult<StoredContent> {
        let name = validate_name(name)?;
        let id = self.ids.next();
        let path = self.path_for(id, name);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(".{}.{}.part", name, Uuid::new_v4()));
        let transfer = match write_synced(&tmp, reader, self.checksum) {
            Ok(t) => t,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e.into());
            }
        };
        fs::rename(&tmp, &path)?;
        debug!(target: "stowage::store", id = %id, path = %path.display(), "content committed");
        info!(target: "stowage::store", id = %id, bytes = transfer.bytes_written, checksum = %transfer.checksum_hex(), "stored content");
        Ok(StoredContent { id, path, transfer })
    }

    /// Node for previously stored content; `None` when nothing is stored there.
    pub fn node(&self, id: Identifier, name: &str) -> ContentResult<Option<ContentNode>> {
        let name = validate_name(name)?;
        let path = self.path_for(id, name);
        let meta = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let prefix = shard_dir(Path::new(""), &id.to_string()).to_string_lossy().replace('\\', "/");
        let mut node = ContentNode::new(&prefix, name, meta.len(), Arc::new(FileContent::new(&path)));
        if let Ok(modified) = meta.modified() {
            node = node.with_last_modified(modified.into());
        }
        Ok(Some(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idgen::default_origin_ms;

    #[test]
    fn checksums_match_known_digests() {
        let data = b"hello world";
        let sha = copy_with_checksum(&mut &data[..], &mut Vec::<u8>::new(), ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(sha.checksum_hex(), "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
        assert_eq!(sha.bytes_written, 11);

        let crc = copy_with_checksum(&mut &data[..], &mut Vec::<u8>::new(), ChecksumAlgorithm::Crc32).unwrap();
        assert_eq!(crc.checksum, crc32fast::hash(data).to_be_bytes().to_vec());

        let xxh = copy_with_checksum(&mut &data[..], &mut Vec::<u8>::new(), ChecksumAlgorithm::Xxh3).unwrap();
        assert_eq!(xxh.checksum, xxhash_rust::xxh3::xxh3_64(data).to_be_bytes().to_vec());
    }

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert_eq!("xxh3".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Xxh3);
        assert!("md5".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn put_writes_under_shard_and_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::new(tmp.path(), Arc::new(IdGenerator::new(default_origin_ms(), 1)), ChecksumAlgorithm::Sha256);
        let stored = store.put("scan.tif", &mut &b"payload"[..]).unwrap();

        let id = stored.id.to_string();
        let expected = tmp.path().join(&id[id.len() - 6..id.len() - 3]).join(&id[id.len() - 3..]).join(&id).join("scan.tif");
        assert_eq!(stored.path, expected);
        assert_eq!(fs::read(&expected).unwrap(), b"payload");
        assert_eq!(stored.transfer.bytes_written, 7);

        let node = store.node(stored.id, "scan.tif").unwrap().unwrap();
        assert_eq!(node.size(), 7);
        assert!(node.object_key().ends_with(&format!("/{}/scan.tif", id)));
        assert!(node.last_modified().is_some());
        assert!(store.node(stored.id, "other.tif").unwrap().is_none());

        // no temp files left behind
        let leftovers = fs::read_dir(expected.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn put_rejects_path_like_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::new(tmp.path(), Arc::new(IdGenerator::new(default_origin_ms(), 1)), ChecksumAlgorithm::Crc32);
        for bad in ["", "..", "a/b", "  "] {
            assert!(matches!(store.put(bad, &mut &b"x"[..]), Err(ContentError::InvalidParameter { .. })));
        }
    }
}
