//! File copy with atomic publish:
//! - Streams the source into a hidden temp sibling of the destination
//! - Flushes and fsyncs the temp file
//! - Renames temp -> dest (overwrites an existing file)
//! - Fsyncs the destination directory (best-effort)
//!
//! Permission bits are not carried over; callers that care reapply them.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use crate::errors::{AtlasError, Result};
use super::helpers::io_error_with_help;

const BUF_SIZE: usize = 1024 * 1024;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique hidden sibling name: `.atlas.<pid>.<nanos>.<seq>.tmp`
fn unique_temp_path(dest: &Path) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = format!(".atlas.{pid}.{nanos}.{seq}.tmp");
    dest.parent().unwrap_or_else(|| Path::new(".")).join(name)
}

/// Copy `src` -> `dst` (created new, never clobbered), then fsync it.
fn copy_streaming(src: &Path, dst: &Path) -> io::Result<u64> {
    let src_f = File::open(src)?;
    let dst_f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o666)
        .open(dst)?;

    let mut reader = BufReader::with_capacity(BUF_SIZE, src_f);
    let mut writer = BufWriter::with_capacity(BUF_SIZE, dst_f);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(bytes)
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Copy `src` to `dest` through a temp sibling and an atomic rename.
/// The destination's parent directory must already exist.
pub(crate) fn copy_and_publish(src: &Path, dest: &Path) -> Result<u64> {
    let dest_dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !dest_dir.is_dir() {
        return Err(AtlasError::not_found(dest_dir, "Copy destination directory does not exist"));
    }

    let tmp = unique_temp_path(dest);
    let bytes = match copy_streaming(src, &tmp) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(io_error_with_help("copy file", src)(e));
        }
    };
    trace!(src = %src.display(), tmp = %tmp.display(), bytes, "copied to temp");

    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(io_error_with_help("rename temporary file into place", dest)(e));
    }
    let _ = fsync_dir(dest_dir);

    debug!(src = %src.display(), dest = %dest.display(), bytes, "file copied");
    Ok(bytes)
}
