//! Content nodes: request-scoped handles to one addressable unit of content.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::trace;

/// A byte source that also supports random access.
pub trait SeekableRead: Read + Seek + Send {}

impl<T: Read + Seek + Send> SeekableRead for T {}

/// Opens the byte stream behind a node. Implementations must be cheap to hold;
/// nothing is opened until `open` is called.
pub trait ContentReader: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Random access to the same bytes, when the backing store allows it.
    fn open_seekable(&self) -> io::Result<Option<Box<dyn SeekableRead>>> {
        Ok(None)
    }

    /// Current content length, only when the reader can vouch for it.
    /// The declared node size is a hint and may be stale.
    fn exact_size(&self) -> Option<u64> {
        None
    }
}

/// An opened node source, sequential or seekable.
pub enum Source<'a> {
    Sequential(&'a mut dyn Read),
    Seekable(&'a mut dyn SeekableRead),
}

impl Read for Source<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Sequential(r) => r.read(buf),
            Source::Seekable(r) => r.read(buf),
        }
    }
}

/// Content backed by a local file.
#[derive(Debug, Clone)]
pub struct FileContent {
    path: PathBuf,
}

impl FileContent {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl ContentReader for FileContent {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn open_seekable(&self) -> io::Result<Option<Box<dyn SeekableRead>>> {
        Ok(Some(Box::new(File::open(&self.path)?)))
    }

    fn exact_size(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().filter(|m| m.is_file()).map(|m| m.len())
    }
}

/// Content held in memory (tests, small generated payloads).
#[derive(Debug, Clone)]
pub struct MemoryContent {
    bytes: Arc<Vec<u8>>,
}

impl MemoryContent {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self { Self { bytes: Arc::new(bytes.into()) } }
    pub fn len(&self) -> usize { self.bytes.len() }
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }
}

struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] { self.0.as_slice() }
}

impl ContentReader for MemoryContent {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(SharedBytes(self.bytes.clone()))))
    }

    fn open_seekable(&self) -> io::Result<Option<Box<dyn SeekableRead>>> {
        Ok(Some(Box::new(Cursor::new(SharedBytes(self.bytes.clone())))))
    }

    fn exact_size(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }
}

#[derive(Clone)]
pub struct ContentNode {
    name: String,
    prefix: String,
    size: u64,
    is_collection: bool,
    last_modified: Option<DateTime<Utc>>,
    reader: Arc<dyn ContentReader>,
}

impl ContentNode {
    /// Slashes around `prefix` are dropped so the prefix is always a bare relative path.
    pub fn new(prefix: &str, name: &str, size: u64, reader: Arc<dyn ContentReader>) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            size,
            is_collection: false,
            last_modified: None,
            reader,
        }
    }

    pub fn from_bytes(prefix: &str, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let content = MemoryContent::new(bytes);
        let size = content.len() as u64;
        Self::new(prefix, name, size, Arc::new(content))
    }

    pub fn with_last_modified(mut self, ts: DateTime<Utc>) -> Self {
        self.last_modified = Some(ts);
        self
    }

    /// Mark the node as a container (e.g. a directory); content filters skip it.
    pub fn as_collection(mut self) -> Self {
        self.is_collection = true;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn prefix(&self) -> &str { &self.prefix }
    pub fn size(&self) -> u64 { self.size }
    pub fn is_collection(&self) -> bool { self.is_collection }
    pub fn last_modified(&self) -> Option<DateTime<Utc>> { self.last_modified }
    pub fn exact_size(&self) -> Option<u64> { self.reader.exact_size() }

    /// Full key, always starting with '/'.
    pub fn object_key(&self) -> String {
        if self.prefix.is_empty() {
            format!("/{}", self.name)
        } else {
            format!("/{}/{}", self.prefix, self.name)
        }
    }

    /// Open the node content.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        self.reader.open()
    }

    /// Run `f` over the opened content. The stream is released when this returns,
    /// on success, early return or error alike.
    pub fn with_content<T>(&self, f: impl FnOnce(&mut dyn Read) -> io::Result<T>) -> io::Result<T> {
        let mut stream = self.open()?;
        trace!(target: "stowage::node", key = %self.object_key(), "content opened");
        let res = f(&mut *stream);
        drop(stream);
        trace!(target: "stowage::node", key = %self.object_key(), ok = res.is_ok(), "content released");
        res
    }

    /// Like [`Self::with_content`], but hands out a seekable source when the reader has one.
    pub fn with_source<T>(&self, f: impl FnOnce(Source<'_>) -> io::Result<T>) -> io::Result<T> {
        match self.reader.open_seekable()? {
            Some(mut stream) => {
                trace!(target: "stowage::node", key = %self.object_key(), "seekable content opened");
                let res = f(Source::Seekable(&mut *stream));
                drop(stream);
                trace!(target: "stowage::node", key = %self.object_key(), ok = res.is_ok(), "content released");
                res
            }
            None => self.with_content(|r| f(Source::Sequential(r))),
        }
    }
}

impl fmt::Debug for ContentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentNode")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("is_collection", &self.is_collection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingContent {
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    struct Tracked {
        inner: Cursor<Vec<u8>>,
        closed: Arc<AtomicUsize>,
    }

    impl Read for Tracked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> { self.inner.read(buf) }
    }

    impl Drop for Tracked {
        fn drop(&mut self) { self.closed.fetch_add(1, Ordering::SeqCst); }
    }

    impl ContentReader for CountingContent {
        fn open(&self) -> io::Result<Box<dyn Read + Send>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Tracked { inner: Cursor::new(b"abc".to_vec()), closed: self.closed.clone() }))
        }
    }

    #[test]
    fn object_key_and_prefix_normalization() {
        let n = ContentNode::from_bytes("/a/b/", "c.txt", b"x".to_vec());
        assert_eq!(n.prefix(), "a/b");
        assert_eq!(n.object_key(), "/a/b/c.txt");
        let n = ContentNode::from_bytes("", "c.txt", b"x".to_vec());
        assert_eq!(n.object_key(), "/c.txt");
        assert_eq!(n.size(), 1);
    }

    #[test]
    fn with_content_releases_on_error() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let node = ContentNode::new("p", "n", 3, Arc::new(CountingContent { opened: opened.clone(), closed: closed.clone() }));

        let res: io::Result<()> = node.with_content(|r| {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });
        assert!(res.is_err());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let s = node.with_content(|r| { let mut s = String::new(); r.read_to_string(&mut s)?; Ok(s) }).unwrap();
        assert_eq!(s, "abc");
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sources_fall_back_to_sequential() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let node = ContentNode::new("p", "n", 3, Arc::new(CountingContent { opened: opened.clone(), closed: closed.clone() }));
        assert_eq!(node.exact_size(), None);
        let seekable = node.with_source(|src| Ok(matches!(src, Source::Seekable(_)))).unwrap();
        assert!(!seekable);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let mem = ContentNode::new("p", "n", 99, Arc::new(MemoryContent::new(b"hello".to_vec())));
        assert_eq!(mem.exact_size(), Some(5));
        let tail = mem
            .with_source(|src| match src {
                Source::Seekable(s) => {
                    s.seek(io::SeekFrom::Start(3))?;
                    let mut t = String::new();
                    s.read_to_string(&mut t)?;
                    Ok(t)
                }
                Source::Sequential(_) => Ok(String::new()),
            })
            .unwrap();
        assert_eq!(tail, "lo");
    }

    #[test]
    fn file_content_reports_current_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        fs::write(&path, b"12345").unwrap();
        let content = FileContent::new(&path);
        assert_eq!(content.exact_size(), Some(5));
        assert!(content.open_seekable().unwrap().is_some());
        assert_eq!(FileContent::new(dir.path()).exact_size(), None);
    }
}
