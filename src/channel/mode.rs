//! fopen-style mode strings.
//!
//! The base letter picks create/truncate behaviour, `+` adds the missing
//! direction. `b`, `t` and `e` are accepted and ignored: streams are always
//! binary and descriptors are always opened close-on-exec.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;

use crate::errors::{AtlasError, Result};

/// Build the OpenOptions matching `mode`.
pub(crate) fn open_options(mode: &str) -> Result<OpenOptions> {
    let mut base = None;
    let mut plus = false;
    for c in mode.chars() {
        match c {
            'r' | 'w' | 'a' | 'x' | 'c' if base.is_none() => base = Some(c),
            '+' => plus = true,
            'b' | 't' | 'e' => {}
            _ => return Err(AtlasError::logic(format!("Invalid stream mode '{mode}'"))),
        }
    }
    let base = base.ok_or_else(|| AtlasError::logic(format!("Invalid stream mode '{mode}'")))?;

    let mut opts = OpenOptions::new();
    opts.custom_flags(libc::O_CLOEXEC);
    match base {
        'r' => {
            opts.read(true).write(plus);
        }
        'w' => {
            opts.write(true).read(plus).create(true).truncate(true);
        }
        'a' => {
            opts.append(true).read(plus).create(true);
        }
        'x' => {
            opts.write(true).read(plus).create_new(true);
        }
        // 'c'
        _ => {
            opts.write(true).read(plus).create(true);
        }
    }
    Ok(opts)
}

/// Readable iff the mode mentions `r` or `+`.
pub(crate) fn mode_is_readable(mode: &str) -> bool {
    mode.contains('r') || mode.contains('+')
}

/// Writable iff the mode mentions any of `x w c a +`.
pub(crate) fn mode_is_writable(mode: &str) -> bool {
    mode.contains(['x', 'w', 'c', 'a', '+'])
}
