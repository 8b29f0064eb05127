//! Resolution of logical storage paths to content nodes.
//!
//! [`FsResolver`] serves a local directory tree: a file resolves to itself, a
//! directory to the files under it, honoring the listing parameters (`maxDepth`,
//! `selectedEntries`, `entryPattern`, `useNaturalSort`, `startEntryIndex`,
//! `entriesCount`).

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::error::{ContentError, ContentResult};
use crate::node::{ContentNode, FileContent};
use crate::params::FilterParams;

pub trait PathResolver: Send + Sync {
    /// Nodes addressed by `path`. A path that does not exist resolves to no nodes.
    fn resolve(&self, path: &str, params: &FilterParams) -> ContentResult<Vec<ContentNode>>;
}

/// Normalize a logical path to NFC with no surrounding slashes. The empty path is the root.
/// NUL, empty segments and `.`/`..` segments are rejected.
pub fn normalize_logical_path(path: &str) -> ContentResult<String> {
    let invalid = |reason: &str| ContentError::InvalidParameter {
        name: "path".to_string(),
        value: path.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.contains('\0') {
        return Err(invalid("NUL characters are not allowed"));
    }
    for seg in trimmed.split('/') {
        if seg.is_empty() {
            return Err(invalid("empty segments are not allowed"));
        }
        if seg == "." || seg == ".." {
            return Err(invalid("segments '.' and '..' are not allowed"));
        }
    }
    Ok(trimmed.nfc().collect())
}

fn split_digit_runs(s: &str) -> Vec<(bool, &str)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut digit = None;
    for (i, c) in s.char_indices() {
        let d = c.is_ascii_digit();
        match digit {
            Some(prev) if prev != d => {
                runs.push((prev, &s[start..i]));
                start = i;
            }
            _ => {}
        }
        digit = Some(d);
    }
    if let Some(d) = digit {
        runs.push((d, &s[start..]));
    }
    runs
}

/// Order strings with embedded numbers by numeric value: `z2` sorts before `z10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ra, rb) = (split_digit_runs(a), split_digit_runs(b));
    for ((da, sa), (db, sb)) in ra.iter().zip(rb.iter()) {
        let ord = if *da && *db {
            let (ta, tb) = (sa.trim_start_matches('0'), sb.trim_start_matches('0'));
            ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb)).then_with(|| sa.len().cmp(&sb.len()))
        } else {
            sa.cmp(sb)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ra.len().cmp(&rb.len()).then_with(|| a.cmp(b))
}

#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

fn to_logical(p: &Path) -> String {
    p.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    fn file_node(&self, logical: &str, path: &Path, meta: &fs::Metadata) -> ContentNode {
        let (prefix, name) = match logical.rsplit_once('/') {
            Some((p, n)) => (p, n),
            None => ("", logical),
        };
        let node = ContentNode::new(prefix, name, meta.len(), Arc::new(FileContent::new(path)));
        match meta.modified() {
            Ok(t) => node.with_last_modified(t.into()),
            Err(_) => node,
        }
    }

    fn list_dir(&self, logical: &str, dir: &Path, params: &FilterParams) -> ContentResult<Vec<ContentNode>> {
        let mut walker = WalkDir::new(dir).min_depth(1).sort_by_file_name();
        if params.max_depth() >= 0 {
            walker = walker.max_depth(params.max_depth() as usize);
        }
        let mut found: Vec<(String, PathBuf, fs::Metadata)> = Vec::new();
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            // walkdir depth 1 is the listed directory's direct children
            if !entry.file_type().is_file() || !params.check_depth(entry.depth() as i32 - 1) {
                continue;
            }
            let rel = entry.path().strip_prefix(dir).map(to_logical).unwrap_or_default();
            let rel: String = rel.nfc().collect();
            if !params.match_entry(&rel) {
                continue;
            }
            let meta = entry.metadata().map_err(io::Error::from)?;
            found.push((rel, entry.into_path(), meta));
        }
        if params.natural_sort() {
            found.sort_by(|a, b| natural_cmp(&a.0, &b.0));
        } else {
            found.sort_by(|a, b| a.0.cmp(&b.0));
        }
        let total = found.len();
        let start = params.start_entry_index().unwrap_or(0) as usize;
        let count = params.entries_count().map(|c| c as usize).unwrap_or(usize::MAX);
        let nodes: Vec<ContentNode> = found
            .into_iter()
            .skip(start)
            .take(count)
            .map(|(rel, path, meta)| {
                let key = if logical.is_empty() { rel } else { format!("{}/{}", logical, rel) };
                self.file_node(&key, &path, &meta)
            })
            .collect();
        debug!(target: "stowage::resolve", path = logical, matched = total, returned = nodes.len(), "listed directory");
        Ok(nodes)
    }
}

impl PathResolver for FsResolver {
    fn resolve(&self, path: &str, params: &FilterParams) -> ContentResult<Vec<ContentNode>> {
        let logical = normalize_logical_path(path)?;
        let target = if logical.is_empty() { self.root.clone() } else { self.root.join(&logical) };
        let meta = match fs::metadata(&target) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(target: "stowage::resolve", path = %logical, "nothing at path");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            self.list_dir(&logical, &target, params)
        } else {
            Ok(vec![self.file_node(&logical, &target, &meta)])
        }
    }
}

#[cfg(test)]
mod resolver_tests;
