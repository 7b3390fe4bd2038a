//! Plain file handle.
//!
//! A lazy path wrapper that owns at most one open Channel. Existence is
//! always re-queried; nothing about the filesystem is cached.

use fs2::FileExt;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::channel::Channel;
use crate::errors::{AtlasError, Result};
use super::copy::copy_and_publish;
use super::helpers::io_error_with_help;
use super::perms;

#[derive(Debug)]
pub struct File {
    path: PathBuf,
    channel: Channel,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            channel: Channel::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// True for anything at the path that is not a directory (symlinks included, even dangling).
    pub fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path)
            .map(|m| !m.is_dir())
            .unwrap_or(false)
    }

    pub fn is_link(&self) -> bool {
        fs::symlink_metadata(&self.path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    pub fn size(&self) -> Result<u64> {
        let meta = fs::metadata(&self.path).map_err(io_error_with_help("stat", &self.path))?;
        Ok(meta.len())
    }

    /// Open (or reopen) the file with an fopen-style mode.
    pub fn open(&mut self, mode: &str) -> Result<&mut Self> {
        self.channel.close();
        self.channel = Channel::open(&self.path, Some(mode))?;
        Ok(self)
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn close(&mut self) -> &mut Self {
        self.channel.close();
        self
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    fn open_handle(&self, op: &str) -> Result<&fs::File> {
        self.channel
            .file()
            .ok_or_else(|| AtlasError::logic(format!("Cannot {op}, file not open: {}", self.path.display())))
    }

    /// Request an exclusive OS lock on the open handle.
    /// `Ok(false)` when `non_blocking` and another holder has it.
    pub fn lock_exclusive(&mut self, non_blocking: bool) -> Result<bool> {
        let file = self.open_handle("lock")?;
        let res = if non_blocking {
            FileExt::try_lock_exclusive(file)
        } else {
            FileExt::lock_exclusive(file)
        };
        self.lock_outcome(res, "exclusive")
    }

    pub fn lock_shared(&mut self, non_blocking: bool) -> Result<bool> {
        let file = self.open_handle("lock")?;
        let res = if non_blocking {
            FileExt::try_lock_shared(file)
        } else {
            FileExt::lock_shared(file)
        };
        self.lock_outcome(res, "shared")
    }

    fn lock_outcome(&self, res: io::Result<()>, kind: &str) -> Result<bool> {
        match res {
            Ok(()) => {
                trace!(path = %self.path.display(), kind, "file lock acquired");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!(path = %self.path.display(), kind, "file lock contended");
                Ok(false)
            }
            Err(e) => Err(io_error_with_help("lock file", &self.path)(e)),
        }
    }

    /// Release any OS lock held through the open handle. No-op when closed.
    pub fn unlock(&mut self) -> Result<&mut Self> {
        if let Some(file) = self.channel.file() {
            FileExt::unlock(file).map_err(io_error_with_help("unlock file", &self.path))?;
            trace!(path = %self.path.display(), "file lock released");
        }
        Ok(self)
    }

    /// Close and remove the file. No-op when absent.
    pub fn delete(&mut self) -> Result<()> {
        self.channel.close();
        if !self.exists() {
            return Ok(());
        }
        fs::remove_file(&self.path).map_err(io_error_with_help("delete file", &self.path))?;
        debug!(path = %self.path.display(), "file deleted");
        Ok(())
    }

    /// Copy to `dest`, creating missing parent directories. Overwrites an existing file.
    pub fn copy_to(&self, dest: impl AsRef<Path>) -> Result<File> {
        let dest = dest.as_ref();
        if !self.exists() {
            return Err(AtlasError::not_found(&self.path, "Source file does not exist"));
        }
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error_with_help("create destination directory", parent))?;
        }
        copy_and_publish(&self.path, dest)?;
        Ok(File::new(dest))
    }

    pub fn permissions(&self) -> Result<u32> {
        if !self.exists() {
            return Err(AtlasError::not_found(&self.path, "Cannot get permissions, file does not exist"));
        }
        perms::get_mode(&self.path)
    }

    pub fn set_permissions(&mut self, mode: u32) -> Result<&mut Self> {
        if !self.exists() {
            return Err(AtlasError::not_found(&self.path, "Cannot set permissions, file does not exist"));
        }
        perms::set_mode(&self.path, mode)?;
        Ok(self)
    }

    pub fn set_owner(&mut self, uid: u32) -> Result<&mut Self> {
        if !self.exists() {
            return Err(AtlasError::not_found(&self.path, "Cannot set owner, file does not exist"));
        }
        perms::set_owner(&self.path, uid)?;
        Ok(self)
    }

    pub fn set_group(&mut self, gid: u32) -> Result<&mut Self> {
        if !self.exists() {
            return Err(AtlasError::not_found(&self.path, "Cannot set group, file does not exist"));
        }
        perms::set_group(&self.path, gid)?;
        Ok(self)
    }

    /// Replace the file's content.
    pub fn put_contents(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self> {
        self.open("w")?;
        let res = self.channel.write(data.as_ref(), None);
        self.channel.close();
        res?;
        Ok(self)
    }

    /// Read the whole file.
    pub fn get_contents(&mut self) -> Result<Vec<u8>> {
        self.open("r")?;
        let res = self.channel.read_all();
        self.channel.close();
        Ok(res?.unwrap_or_default())
    }
}
