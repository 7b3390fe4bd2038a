//! Directory handle and whole-subtree operations.
//!
//! A `Dir` is only a path. Every query goes back to the filesystem; the
//! handle caches nothing except where it points, and `move_to` is the one
//! operation that changes that.
//!
//! Ordering rules for tree operations:
//! - delete / empty_out remove children before their parent (rmdir needs an empty dir)
//! - merge_into creates parents before children (pre-order scan), then
//!   applies directory modes deepest first
//! - recursive chmod/chown/chgrp touch children before the dir itself
//!
//! Symlinks inside a tree are handled as links, never followed.

use std::ffi::{OsStr, OsString};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::errors::{AtlasError, Result};
use super::helpers::io_error_with_help;
use super::scan::{RecursiveScan, Scan};
use super::{perms, File, Node};

/// Mode used by `ensure_exists(None)` before umask.
pub const DEFAULT_DIR_MODE: u32 = 0o777;

/// Strip trailing separators, keeping a bare root intact.
fn normalize(path: &Path) -> PathBuf {
    let mut bytes = path.as_os_str().as_bytes();
    while bytes.len() > 1 && bytes.ends_with(b"/") {
        bytes = &bytes[..bytes.len() - 1];
    }
    PathBuf::from(OsStr::from_bytes(bytes))
}

/// Absolute form of `path` with symlinks resolved as far as the path exists.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut tail = Vec::new();
    let mut cur = path.to_path_buf();
    loop {
        if let Ok(real) = fs::canonicalize(&cur) {
            let mut out = real;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (cur.file_name().map(OsStr::to_os_string), cur.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name);
                cur = if parent.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    parent.to_path_buf()
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: normalize(path.as_ref()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    pub fn parent(&self) -> Option<Dir> {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Dir::new)
    }

    /// `name` is resolved relative to this dir even when it starts with a separator.
    fn child_path(&self, name: impl AsRef<Path>) -> PathBuf {
        let raw = name.as_ref().as_os_str().as_bytes();
        let start = raw.iter().position(|b| *b != b'/').unwrap_or(raw.len());
        self.path.join(OsStr::from_bytes(&raw[start..]))
    }

    fn require_exists(&self, context: &str) -> Result<()> {
        if !self.exists() {
            return Err(AtlasError::not_found(&self.path, context));
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    pub fn is_link(&self) -> bool {
        fs::symlink_metadata(&self.path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// mkdir -p. An existing dir only gets its own mode updated when one is given.
    pub fn ensure_exists(&self, permissions: Option<u32>) -> Result<&Self> {
        match permissions {
            Some(mode) => self.create_tree(mode, true),
            None => self.create_tree(DEFAULT_DIR_MODE, false),
        }
    }

    /// mkdir -p with `create_mode` as the mkdir mode, so umask still applies.
    /// An existing dir is left as it is.
    pub fn ensure_exists_with_default(&self, create_mode: u32) -> Result<&Self> {
        self.create_tree(create_mode, false)
    }

    fn create_tree(&self, mode: u32, exact: bool) -> Result<&Self> {
        if self.exists() {
            if exact {
                perms::set_mode(&self.path, mode)?;
            }
            return Ok(self);
        }
        if entry_exists(&self.path) {
            return Err(AtlasError::io_state(
                "create dir",
                &self.path,
                io::ErrorKind::AlreadyExists,
                "Dir destination exists as file",
            ));
        }

        DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(&self.path)
            .map_err(io_error_with_help("create dir", &self.path))?;
        // mkdir masks with umask; an explicit mode must land as given.
        if exact {
            perms::set_mode(&self.path, mode)?;
        }
        debug!(path = %self.path.display(), "dir created");
        Ok(self)
    }

    /// True when absent or without entries.
    pub fn is_empty(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(true);
        }
        let mut entries = fs::read_dir(&self.path).map_err(io_error_with_help("read dir", &self.path))?;
        Ok(entries.next().is_none())
    }

    pub fn permissions(&self) -> Result<u32> {
        self.require_exists("Cannot get permissions, dir does not exist")?;
        perms::get_mode(&self.path)
    }

    fn children(&self) -> Result<Vec<Node>> {
        self.scan_raw(true, true)?
            .map(|r| r.map(|(_, node)| node))
            .collect()
    }

    pub fn set_permissions(&self, mode: u32, recursive: bool) -> Result<&Self> {
        self.require_exists("Cannot set permissions, dir does not exist")?;
        if recursive {
            for child in self.children()? {
                match child {
                    Node::Dir(d) => {
                        d.set_permissions(mode, true)?;
                    }
                    Node::File(mut f) => {
                        if f.is_link() {
                            trace!(path = %f.path().display(), "skipping chmod on symlink");
                            continue;
                        }
                        f.set_permissions(mode)?;
                    }
                }
            }
        }
        perms::set_mode(&self.path, mode)?;
        Ok(self)
    }

    pub fn set_owner(&self, uid: u32, recursive: bool) -> Result<&Self> {
        self.require_exists("Cannot set owner, dir does not exist")?;
        if recursive {
            for child in self.children()? {
                match child {
                    Node::Dir(d) => {
                        d.set_owner(uid, true)?;
                    }
                    Node::File(mut f) => {
                        f.set_owner(uid)?;
                    }
                }
            }
        }
        perms::set_owner(&self.path, uid)?;
        Ok(self)
    }

    pub fn set_group(&self, gid: u32, recursive: bool) -> Result<&Self> {
        self.require_exists("Cannot set group, dir does not exist")?;
        if recursive {
            for child in self.children()? {
                match child {
                    Node::Dir(d) => {
                        d.set_group(gid, true)?;
                    }
                    Node::File(mut f) => {
                        f.set_group(gid)?;
                    }
                }
            }
        }
        perms::set_group(&self.path, gid)?;
        Ok(self)
    }

    // --- scanning -------------------------------------------------------

    /// Immediate children filtered by kind, keyed by leaf name.
    pub fn scan_raw(&self, files: bool, dirs: bool) -> Result<Scan> {
        self.require_exists("Cannot scan, dir does not exist")?;
        Scan::new(&self.path, files, dirs)
    }

    pub fn scan(&self) -> Result<Scan> {
        self.scan_raw(true, true)
    }

    pub fn scan_files(&self) -> Result<Scan> {
        self.scan_raw(true, false)
    }

    pub fn scan_dirs(&self) -> Result<Scan> {
        self.scan_raw(false, true)
    }

    pub fn list_names(&self, files: bool, dirs: bool) -> Result<Vec<OsString>> {
        self.scan_raw(files, dirs)?
            .map(|r| r.map(|(name, _)| name))
            .collect()
    }

    pub fn count_children(&self) -> Result<usize> {
        self.count(true, true)
    }

    pub fn count_files(&self) -> Result<usize> {
        self.count(true, false)
    }

    pub fn count_dirs(&self) -> Result<usize> {
        self.count(false, true)
    }

    fn count(&self, files: bool, dirs: bool) -> Result<usize> {
        self.scan_raw(files, dirs)?
            .try_fold(0, |n, r| r.map(|_| n + 1))
    }

    /// Whole subtree in pre-order, keyed by path relative to this dir.
    /// With `dirs == false` only non-directory leaves are yielded.
    pub fn scan_raw_recursive(&self, files: bool, dirs: bool) -> Result<RecursiveScan> {
        self.require_exists("Cannot scan, dir does not exist")?;
        Ok(RecursiveScan::new(&self.path, files, dirs))
    }

    pub fn scan_recursive(&self) -> Result<RecursiveScan> {
        self.scan_raw_recursive(true, true)
    }

    pub fn scan_files_recursive(&self) -> Result<RecursiveScan> {
        self.scan_raw_recursive(true, false)
    }

    pub fn scan_dirs_recursive(&self) -> Result<RecursiveScan> {
        self.scan_raw_recursive(false, true)
    }

    pub fn count_recursive(&self, files: bool, dirs: bool) -> Result<usize> {
        self.scan_raw_recursive(files, dirs)?
            .try_fold(0, |n, r| r.map(|_| n + 1))
    }

    // --- children -------------------------------------------------------

    /// Resolve an existing child: Dir for directories, File for regular files and symlinks.
    pub fn get_child(&self, name: impl AsRef<Path>) -> Option<Node> {
        let path = self.child_path(name);
        let meta = fs::symlink_metadata(&path).ok()?;
        let ft = meta.file_type();
        if ft.is_dir() {
            Some(Node::Dir(Dir::new(path)))
        } else if ft.is_file() || ft.is_symlink() {
            Some(Node::File(File::new(path)))
        } else {
            None
        }
    }

    pub fn has_child(&self, name: impl AsRef<Path>) -> bool {
        self.get_child(name).is_some()
    }

    pub fn delete_child(&self, name: impl AsRef<Path>) -> Result<&Self> {
        if let Some(mut child) = self.get_child(name) {
            child.delete()?;
        }
        Ok(self)
    }

    /// Lazy handle to a child dir; with `if_exists` it is dropped unless the dir exists.
    pub fn get_dir(&self, name: impl AsRef<Path>, if_exists: bool) -> Option<Dir> {
        let dir = Dir::new(self.child_path(name));
        if if_exists && !dir.exists() {
            return None;
        }
        Some(dir)
    }

    pub fn has_dir(&self, name: impl AsRef<Path>) -> bool {
        Dir::new(self.child_path(name)).exists()
    }

    pub fn create_dir(&self, name: impl AsRef<Path>, permissions: Option<u32>) -> Result<Dir> {
        let dir = Dir::new(self.child_path(name));
        dir.ensure_exists(permissions)?;
        Ok(dir)
    }

    pub fn delete_dir(&self, name: impl AsRef<Path>) -> Result<&Self> {
        if let Some(dir) = self.get_dir(name, true) {
            dir.delete()?;
        }
        Ok(self)
    }

    /// Lazy handle to a child file; with `if_exists` it is dropped unless the file exists.
    pub fn get_file(&self, name: impl AsRef<Path>, if_exists: bool) -> Option<File> {
        let file = File::new(self.child_path(name));
        if if_exists && !file.exists() {
            return None;
        }
        Some(file)
    }

    pub fn has_file(&self, name: impl AsRef<Path>) -> bool {
        File::new(self.child_path(name)).exists()
    }

    pub fn create_file(&self, name: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Result<File> {
        let mut file = File::new(self.child_path(name));
        file.put_contents(content)?;
        Ok(file)
    }

    pub fn open_file(&self, name: impl AsRef<Path>, mode: &str) -> Result<File> {
        let mut file = File::new(self.child_path(name));
        file.open(mode)?;
        Ok(file)
    }

    pub fn delete_file(&self, name: impl AsRef<Path>) -> Result<&Self> {
        if let Some(mut file) = self.get_file(name, true) {
            file.delete()?;
        }
        Ok(self)
    }

    // --- whole-tree operations -----------------------------------------

    /// Copy the tree to `destination`, which must not exist yet.
    pub fn copy(&self, destination: impl AsRef<Path>) -> Result<Dir> {
        let destination = normalize(destination.as_ref());
        if entry_exists(&destination) {
            return Err(AtlasError::io_state(
                "copy dir",
                &destination,
                io::ErrorKind::AlreadyExists,
                "Destination dir already exists",
            ));
        }
        self.merge_into(destination)
    }

    /// Rename the tree to `destination` and repoint this handle at it.
    pub fn move_to(&mut self, destination: impl AsRef<Path>) -> Result<&mut Self> {
        self.require_exists("Source dir does not exist")?;
        let destination = normalize(destination.as_ref());
        if entry_exists(&destination) {
            return Err(AtlasError::io_state(
                "move dir",
                &destination,
                io::ErrorKind::AlreadyExists,
                "Destination already exists",
            ));
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            Dir::new(parent).ensure_exists(None)?;
        }
        fs::rename(&self.path, &destination).map_err(io_error_with_help("rename dir", &self.path))?;
        debug!(src = %self.path.display(), dest = %destination.display(), "dir moved");
        self.path = destination;
        Ok(self)
    }

    /// Remove the dir and everything under it. No-op when absent.
    pub fn delete(&self) -> Result<()> {
        if self.is_link() {
            fs::remove_file(&self.path).map_err(io_error_with_help("delete dir link", &self.path))?;
            return Ok(());
        }
        if !self.exists() {
            return Ok(());
        }
        self.empty_out()?;
        fs::remove_dir(&self.path).map_err(io_error_with_help("remove dir", &self.path))?;
        debug!(path = %self.path.display(), "dir deleted");
        Ok(())
    }

    /// Remove everything under the dir, keeping the dir itself.
    pub fn empty_out(&self) -> Result<&Self> {
        if !self.exists() {
            return Ok(self);
        }
        for mut child in self.children()? {
            child.delete()?;
        }
        trace!(path = %self.path.display(), "dir emptied");
        Ok(self)
    }

    /// Recursively copy this tree into `destination` (created if missing),
    /// reproducing the mode bits of every directory and file.
    pub fn merge_into(&self, destination: impl AsRef<Path>) -> Result<Dir> {
        self.require_exists("Source dir does not exist")?;
        let dest = Dir::new(destination);

        let src_real = resolve_existing_prefix(&self.path);
        let dest_real = resolve_existing_prefix(&dest.path);
        if dest_real.starts_with(&src_real) {
            return Err(AtlasError::logic(format!(
                "Cannot merge {} into itself or its own subtree ({})",
                self.path.display(),
                dest.path.display()
            )));
        }

        let root_mode = self.permissions()?;
        dest.ensure_exists(None)?;
        let mut dir_modes = vec![(dest.path.clone(), root_mode)];
        let mut files = 0usize;

        for entry in self.scan_raw_recursive(true, true)? {
            let (rel, node) = entry?;
            let target = dest.path.join(&rel);
            match node {
                Node::Dir(d) => {
                    let mode = d.permissions()?;
                    Dir::new(&target).ensure_exists(None)?;
                    dir_modes.push((target, mode));
                }
                Node::File(f) if f.is_link() => {
                    copy_link(f.path(), &target)?;
                    files += 1;
                }
                Node::File(f) => {
                    let mode = f.permissions()?;
                    f.copy_to(&target)?.set_permissions(mode)?;
                    files += 1;
                }
            }
        }

        // Children were pushed after their parents; reversed, no dir is
        // restricted before everything inside it is written.
        for (path, mode) in dir_modes.iter().rev() {
            perms::set_mode(path, *mode)?;
        }

        debug!(
            src = %self.path.display(),
            dest = %dest.path.display(),
            dirs = dir_modes.len(),
            files,
            "dir merged"
        );
        Ok(dest)
    }
}

/// Recreate the symlink at `src` as `target`, replacing whatever non-dir is there.
fn copy_link(src: &Path, target: &Path) -> Result<()> {
    let link_to = fs::read_link(src).map_err(io_error_with_help("read link", src))?;
    if let Ok(meta) = fs::symlink_metadata(target) {
        if meta.is_dir() {
            return Err(AtlasError::io_state(
                "copy link",
                target,
                io::ErrorKind::AlreadyExists,
                "Destination exists as dir",
            ));
        }
        fs::remove_file(target).map_err(io_error_with_help("replace link", target))?;
    }
    std::os::unix::fs::symlink(&link_to, target).map_err(io_error_with_help("create link", target))?;
    trace!(src = %src.display(), dest = %target.display(), "link copied");
    Ok(())
}
