//! I/O helper utilities.
//!
//! Turns a raw io::Error into an `AtlasError::Io` carrying the operation, the
//! path and a short actionable hint keyed on the OS error code.
//!
//! Usage:
//!   fs::create_dir(dir).map_err(io_error_with_help("create dir", dir))?;

use std::io;
use std::path::Path;

use crate::errors::AtlasError;

/// Format a human-friendly message with op/path plus a platform hint.
fn build_message(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", op, path.display(), e);

    if let Some(code) = e.raw_os_error() {
        match code {
            libc::EACCES | libc::EPERM => {
                msg.push_str(" (permission denied; check ownership and mode bits)");
            }
            libc::EXDEV => {
                msg.push_str(" (cross-filesystem; atomic rename not possible)");
            }
            libc::EBUSY => {
                msg.push_str(" (resource busy)");
            }
            libc::ENOENT => {
                msg.push_str(" (path not found)");
            }
            libc::EEXIST => {
                msg.push_str(" (already exists)");
            }
            libc::ENOTEMPTY => {
                msg.push_str(" (directory not empty)");
            }
            libc::ENOTDIR => {
                msg.push_str(" (a path component is not a directory)");
            }
            libc::ENOSPC => {
                msg.push_str(" (no space left on device)");
            }
            libc::EROFS => {
                msg.push_str(" (read-only filesystem)");
            }
            libc::ELOOP => {
                msg.push_str(" (too many symbolic link levels)");
            }
            libc::ENAMETOOLONG => {
                msg.push_str(" (filename or path too long)");
            }
            libc::EMFILE | libc::ENFILE => {
                msg.push_str(" (file descriptor limit reached)");
            }
            _ => {}
        }
        msg.push_str(&format!(" [os code: {}]", code));
    } else {
        match e.kind() {
            io::ErrorKind::PermissionDenied => msg.push_str(" (permission denied)"),
            io::ErrorKind::NotFound => msg.push_str(" (path not found)"),
            io::ErrorKind::AlreadyExists => msg.push_str(" (already exists)"),
            io::ErrorKind::WouldBlock => msg.push_str(" (would block)"),
            _ => {}
        }
    }

    msg
}

/// Returns a closure suitable for `.map_err(...)` that converts io::Error -> AtlasError::Io.
pub(crate) fn io_error_with_help<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> AtlasError + 'a {
    move |e: io::Error| AtlasError::Io {
        op: op.to_string(),
        path: path.to_path_buf(),
        message: build_message(op, path, &e),
        source: e,
    }
}
