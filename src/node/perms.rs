//! Permission and ownership primitives shared by File and Dir.
//! Reads and writes both cover the full `0o7777` range, so the setuid,
//! setgid and sticky bits survive a read-then-apply.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::trace;

use crate::errors::Result;
use super::helpers::io_error_with_help;

pub(crate) const MODE_MASK: u32 = 0o7777;

pub(crate) fn get_mode(path: &Path) -> Result<u32> {
    let meta = fs::metadata(path).map_err(io_error_with_help("stat", path))?;
    Ok(meta.permissions().mode() & MODE_MASK)
}

pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mode = mode & MODE_MASK;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(io_error_with_help("chmod", path))?;
    trace!(path = %path.display(), mode = format_args!("{mode:o}"), "chmod");
    Ok(())
}

/// chown that never follows a final symlink, so links inside a tree are
/// re-owned rather than their targets.
pub(crate) fn set_owner(path: &Path, uid: u32) -> Result<()> {
    std::os::unix::fs::lchown(path, Some(uid), None).map_err(io_error_with_help("chown", path))?;
    trace!(path = %path.display(), uid, "chown");
    Ok(())
}

pub(crate) fn set_group(path: &Path, gid: u32) -> Result<()> {
    std::os::unix::fs::lchown(path, None, Some(gid)).map_err(io_error_with_help("chgrp", path))?;
    trace!(path = %path.display(), gid, "chgrp");
    Ok(())
}

/// Parse an octal mode string such as `"0755"` or `"755"`.
pub fn parse_mode(s: &str) -> Option<u32> {
    let t = s.trim();
    let t = t.strip_prefix("0o").unwrap_or(t);
    if t.is_empty() {
        return None;
    }
    u32::from_str_radix(t, 8).ok().filter(|m| *m <= 0o7777)
}
