//! Unix implementations of platform helpers.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

fn get_status_flags(file: &File) -> io::Result<libc::c_int> {
    let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags)
}

/// Reconstruct an fopen-style mode string from a descriptor's access flags.
pub fn fd_access_mode(file: &File) -> io::Result<String> {
    let flags = get_status_flags(file)?;
    let append = flags & libc::O_APPEND != 0;
    let mode = match flags & libc::O_ACCMODE {
        libc::O_RDONLY => "r",
        libc::O_WRONLY if append => "a",
        libc::O_WRONLY => "w",
        _ if append => "a+",
        _ => "r+",
    };
    Ok(mode.to_string())
}

/// Toggle O_NONBLOCK on the descriptor.
pub fn set_fd_blocking(file: &File, blocking: bool) -> io::Result<()> {
    let flags = get_status_flags(file)?;
    let updated = if blocking {
        flags & !libc::O_NONBLOCK
    } else {
        flags | libc::O_NONBLOCK
    };
    if updated == flags {
        return Ok(());
    }
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETFL, updated) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn fd_is_blocking(file: &File) -> io::Result<bool> {
    Ok(get_status_flags(file)? & libc::O_NONBLOCK == 0)
}

/// Open log file for appending; set 0600 only when creating a new file.
/// An existing file keeps its permissions.
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let existed = path.exists();
    let f = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
        .open(path)?;
    if !existed {
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn access_mode_reflects_open_options() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.txt");
        fs::write(&path, b"x").unwrap();

        let ro = File::open(&path).unwrap();
        assert_eq!(fd_access_mode(&ro).unwrap(), "r");

        let wo = OpenOptions::new().write(true).open(&path).unwrap();
        assert_eq!(fd_access_mode(&wo).unwrap(), "w");

        let ap = OpenOptions::new().append(true).open(&path).unwrap();
        assert_eq!(fd_access_mode(&ap).unwrap(), "a");

        let rw = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        assert_eq!(fd_access_mode(&rw).unwrap(), "r+");

        let ra = OpenOptions::new().read(true).append(true).open(&path).unwrap();
        assert_eq!(fd_access_mode(&ra).unwrap(), "a+");
    }

    #[test]
    fn blocking_flag_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.txt");
        let f = File::create(&path).unwrap();
        assert!(fd_is_blocking(&f).unwrap());
        set_fd_blocking(&f, false).unwrap();
        assert!(!fd_is_blocking(&f).unwrap());
        set_fd_blocking(&f, true).unwrap();
        assert!(fd_is_blocking(&f).unwrap());
    }

    #[test]
    fn preserve_existing_log_file_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, b"hello").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        let _f = open_log_file_secure_append(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640, "existing permissions should be preserved");
    }

    #[test]
    fn new_log_file_gets_0600() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new_log.txt");
        let _f = open_log_file_secure_append(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "newly created log file should be 0600");
    }
}
