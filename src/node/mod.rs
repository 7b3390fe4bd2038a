//! Filesystem nodes: plain files, directories and the scanners that yield them.

mod copy;
pub mod dir;
pub mod file;
pub(crate) mod helpers;
pub mod perms;
pub mod scan;

pub use dir::Dir;
pub use file::File;
pub use scan::{RecursiveScan, Scan};

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::errors::Result;

/// A scan result or resolved child: either a File (regular file or symlink) or a Dir.
#[derive(Debug)]
pub enum Node {
    File(File),
    Dir(Dir),
}

impl Node {
    pub(crate) fn from_kind(path: PathBuf, is_dir: bool) -> Self {
        if is_dir {
            Node::Dir(Dir::new(path))
        } else {
            Node::File(File::new(path))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Node::File(f) => f.path(),
            Node::Dir(d) => d.path(),
        }
    }

    pub fn name(&self) -> Option<&OsStr> {
        self.path().file_name()
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }

    pub fn exists(&self) -> bool {
        match self {
            Node::File(f) => f.exists(),
            Node::Dir(d) => d.exists(),
        }
    }

    pub fn permissions(&self) -> Result<u32> {
        match self {
            Node::File(f) => f.permissions(),
            Node::Dir(d) => d.permissions(),
        }
    }

    /// Delete the node; directories go recursively.
    pub fn delete(&mut self) -> Result<()> {
        match self {
            Node::File(f) => f.delete(),
            Node::Dir(d) => d.delete(),
        }
    }

    pub fn as_dir(&self) -> Option<&Dir> {
        match self {
            Node::Dir(d) => Some(d),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Node::File(f) => Some(f),
            Node::Dir(_) => None,
        }
    }

    pub fn into_dir(self) -> Option<Dir> {
        match self {
            Node::Dir(d) => Some(d),
            Node::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<File> {
        match self {
            Node::File(f) => Some(f),
            Node::Dir(_) => None,
        }
    }
}
