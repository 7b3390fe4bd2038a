//! Directory scanners.
//!
//! `Scan` walks the immediate children of a directory (`read_dir`, so `.`
//! and `..` never appear). `RecursiveScan` walks the whole subtree with
//! walkdir in pre-order: a directory is always yielded before anything
//! inside it. Symlinks are never followed and surface as File nodes.
//!
//! Entries that disappear between listing and inspection are skipped; the
//! scanners take no locks, so a concurrent delete shows up as a torn view.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

use crate::errors::Result;
use super::helpers::io_error_with_help;
use super::Node;

/// Flat scan over immediate children, keyed by leaf name.
pub struct Scan {
    root: PathBuf,
    inner: fs::ReadDir,
    files: bool,
    dirs: bool,
}

impl Scan {
    pub(crate) fn new(root: &Path, files: bool, dirs: bool) -> Result<Self> {
        let inner = fs::read_dir(root).map_err(io_error_with_help("scan directory", root))?;
        Ok(Self {
            root: root.to_path_buf(),
            inner,
            files,
            dirs,
        })
    }
}

impl Iterator for Scan {
    type Item = Result<(OsString, Node)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(e) => e,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Some(Err(io_error_with_help("scan directory", &self.root)(e))),
            };
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    trace!(path = %entry.path().display(), "entry vanished during scan");
                    continue;
                }
                Err(e) => {
                    let path = entry.path();
                    return Some(Err(io_error_with_help("inspect entry", &path)(e)));
                }
            };
            let is_dir = file_type.is_dir();
            if (is_dir && !self.dirs) || (!is_dir && !self.files) {
                continue;
            }
            return Some(Ok((entry.file_name(), Node::from_kind(entry.path(), is_dir))));
        }
    }
}

/// Recursive pre-order scan, keyed by path relative to the scan root.
pub struct RecursiveScan {
    root: PathBuf,
    inner: walkdir::IntoIter,
    files: bool,
    dirs: bool,
}

impl RecursiveScan {
    pub(crate) fn new(root: &Path, files: bool, dirs: bool) -> Self {
        let inner = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter();
        Self {
            root: root.to_path_buf(),
            inner,
            files,
            dirs,
        }
    }
}

impl Iterator for RecursiveScan {
    type Item = Result<(PathBuf, Node)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(e) => e,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    if err.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) {
                        trace!(path = %path.display(), "entry vanished during scan");
                        continue;
                    }
                    let e = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
                    return Some(Err(io_error_with_help("scan directory", &path)(e)));
                }
            };
            let is_dir = entry.file_type().is_dir();
            if (is_dir && !self.dirs) || (!is_dir && !self.files) {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();
            return Some(Ok((rel, Node::from_kind(entry.into_path(), is_dir))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fixture() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/c")).unwrap();
        fs::write(dir.path().join("a/b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a/c/d.txt"), b"d").unwrap();
        fs::write(dir.path().join("top.txt"), b"t").unwrap();
        dir
    }

    #[test]
    fn flat_scan_filters_by_kind() {
        let dir = fixture();
        let mut names: Vec<_> = Scan::new(dir.path(), true, true)
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        names.sort();
        assert_eq!(names, vec![OsString::from("a"), OsString::from("top.txt")]);

        let dirs: Vec<_> = Scan::new(dir.path(), false, true)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].1.is_dir());
    }

    #[test]
    fn recursive_scan_is_pre_order() {
        let dir = fixture();
        let items: Vec<_> = RecursiveScan::new(dir.path(), true, true)
            .map(|r| r.unwrap().0)
            .collect();
        let pos = |p: &str| items.iter().position(|i| i == Path::new(p)).unwrap();
        assert!(pos("a") < pos("a/b.txt"));
        assert!(pos("a") < pos("a/c"));
        assert!(pos("a/c") < pos("a/c/d.txt"));
        assert_eq!(items.len(), 5);
    }

    #[test]
    fn recursive_files_only_yields_leaves() {
        let dir = fixture();
        let mut items: Vec<_> = RecursiveScan::new(dir.path(), true, false)
            .map(|r| r.unwrap())
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        let rels: Vec<_> = items.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(
            rels,
            vec![
                PathBuf::from("a/b.txt"),
                PathBuf::from("a/c/d.txt"),
                PathBuf::from("top.txt")
            ]
        );
        assert!(items.iter().all(|(_, n)| !n.is_dir()));
    }

    #[test]
    fn symlinks_are_files_and_not_followed() {
        let dir = fixture();
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("link")).unwrap();
        let items: Vec<_> = RecursiveScan::new(dir.path(), true, true)
            .map(|r| r.unwrap())
            .collect();
        let link = items.iter().find(|(p, _)| p == Path::new("link")).unwrap();
        assert!(!link.1.is_dir());
        assert!(!items.iter().any(|(p, _)| p.starts_with("link/")));
    }
}
