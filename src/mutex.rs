//! Advisory, reentrant mutex backed by a lock file.
//!
//! Design:
//! - The lock lives at `{dir}/{name}.lock`. It exists only while some owner holds it.
//! - The file is created with O_CREAT|O_EXCL, so "is it already there" and
//!   "create it" are one atomic step. An existing file means another owner;
//!   acquisition reports `false` instead of waiting.
//! - Once created, an exclusive flock is taken on it (blocking or not).
//! - A plain depth counter sits on top: only the 0 -> 1 and 1 -> 0
//!   transitions touch the filesystem.
//!
//! Notes:
//! - Acquisition never errors; callers decide whether to retry or bail.
//! - Dropping a held Mutex releases it regardless of depth.
//! - Release unlinks the file before dropping the flock, and stale recovery
//!   only unlinks the inode it locked, so neither can remove a newer owner's file.
//! - A holder that died leaves its file behind; `recover_stale` clears it
//!   once nobody holds the flock.

use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::{Duration, SystemTime};
use std::{fs, io};
use tracing::{debug, trace, warn};

use crate::errors::Result;
use crate::node::File;
use crate::node::helpers::io_error_with_help;

#[derive(Debug)]
pub struct Mutex {
    name: String,
    file: File,
    counter: usize,
    held: bool,
}

impl Mutex {
    pub fn new(name: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        let name = name.into();
        let path = dir.as_ref().join(format!("{name}.lock"));
        Self {
            name,
            file: File::new(path),
            counter: 0,
            held: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lock_path(&self) -> &Path {
        self.file.path()
    }

    pub fn is_locked(&self) -> bool {
        self.counter > 0
    }

    /// Reentrancy depth.
    pub fn depth(&self) -> usize {
        self.counter
    }

    /// Acquire (or re-enter) the lock. Returns whether this owner now holds it.
    pub fn lock(&mut self, blocking: bool) -> bool {
        if self.counter > 0 {
            self.counter += 1;
            trace!(name = %self.name, depth = self.counter, "mutex re-entered");
            return true;
        }
        if !self.acquire(blocking) {
            return false;
        }
        self.counter = 1;
        true
    }

    /// Leave one level; the last level releases the OS lock and removes the file.
    pub fn unlock(&mut self) -> Result<()> {
        if self.counter == 0 {
            return Ok(());
        }
        self.counter -= 1;
        if self.counter > 0 {
            trace!(name = %self.name, depth = self.counter, "mutex depth decreased");
            return Ok(());
        }
        self.release()
    }

    fn acquire(&mut self, blocking: bool) -> bool {
        if let Err(e) = self.file.open("x") {
            if e.io_kind() == Some(io::ErrorKind::AlreadyExists) {
                trace!(name = %self.name, path = %self.file.path().display(), "lock file present; held elsewhere");
            } else {
                warn!(name = %self.name, error = %e, "unable to create lock file");
            }
            return false;
        }

        match self.file.lock_exclusive(!blocking) {
            Ok(true) => {
                self.held = true;
                debug!(name = %self.name, path = %self.file.path().display(), "mutex acquired");
                true
            }
            outcome => {
                if let Err(e) = outcome {
                    warn!(name = %self.name, error = %e, "unable to lock lock file");
                } else {
                    trace!(name = %self.name, "lock file contended");
                }
                // We created the file, so it is ours to remove.
                if let Err(e) = self.file.delete() {
                    warn!(name = %self.name, error = %e, "unable to remove lock file after failed acquire");
                }
                false
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        // Unlink while the flock is still ours, so the path can only name our inode.
        let removed = remove_lock_file(self.file.path());
        let unlocked = self.file.unlock().map(|_| ());
        self.file.close();
        self.held = false;
        debug!(name = %self.name, "mutex released");
        removed.and(unlocked)
    }

    /// Remove a lock file whose holder is gone.
    ///
    /// The file is considered stale when nobody holds its flock and it is at
    /// least `min_age` old; the age guard covers the window between another
    /// owner creating the file and locking it. The path is only unlinked while
    /// it still names the inode we locked. Returns whether a file was removed.
    pub fn recover_stale(&mut self, min_age: Duration) -> Result<bool> {
        if self.counter > 0 {
            return Ok(false);
        }
        let path = self.file.path().to_path_buf();
        let Some(age) = lock_file_age(&path) else {
            return Ok(false);
        };
        if age < min_age {
            trace!(name = %self.name, age_ms = age.as_millis() as u64, "lock file too fresh to judge");
            return Ok(false);
        }

        let mut candidate = File::new(&path);
        if candidate.open("r").is_err() {
            return Ok(false);
        }
        if !candidate.lock_exclusive(true)? {
            trace!(name = %self.name, "lock file actively held");
            return Ok(false);
        }
        let removed = match candidate.channel().file() {
            Some(handle) => remove_if_same_inode(handle, &path),
            None => Ok(false),
        };
        candidate.close();
        if removed? {
            warn!(name = %self.name, path = %path.display(), "removed stale lock file");
            return Ok(true);
        }
        trace!(name = %self.name, "lock file replaced while checking; left alone");
        Ok(false)
    }
}

fn remove_lock_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            Err(io_error_with_help("remove lock file", path)(e))
        }
        _ => Ok(()),
    }
}

/// Unlink `path` only if it still names the inode behind `handle`.
fn remove_if_same_inode(handle: &fs::File, path: &Path) -> Result<bool> {
    let held = handle
        .metadata()
        .map_err(io_error_with_help("stat lock file", path))?;
    let current = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Ok(false),
    };
    if (held.dev(), held.ino()) != (current.dev(), current.ino()) {
        return Ok(false);
    }
    remove_lock_file(path)?;
    Ok(true)
}

fn lock_file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

impl Drop for Mutex {
    fn drop(&mut self) {
        if self.held {
            self.counter = 0;
            if let Err(e) = self.release() {
                warn!(name = %self.name, error = %e, "failed to release mutex on drop");
            }
        }
    }
}
