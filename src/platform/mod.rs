//! Platform-specific helpers.
//! The crate targets POSIX-like systems only; descriptor-level calls
//! (fcntl access/blocking flags) and secure file opening live here so the
//! rest of the codebase stays free of raw libc.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::{fd_access_mode, fd_is_blocking, open_log_file_secure_append, set_fd_blocking};
