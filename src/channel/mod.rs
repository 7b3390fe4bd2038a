//! Byte-stream channel over a single open file descriptor.
//!
//! Capabilities are derived from the mode string the stream was opened with
//! and memoized until `close()`. Reads degrade to `None` on any failure;
//! writes surface failures as `AtlasError::Io`. Closing never fails.

pub(crate) mod mode;

use std::cell::OnceCell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::os::fd::IntoRawFd;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

use crate::errors::{AtlasError, Result};
use crate::node::helpers::io_error_with_help;
use crate::platform::{fd_access_mode, fd_is_blocking, set_fd_blocking};
use mode::{mode_is_readable, mode_is_writable, open_options};

/// Chunk size used by `read_all` and `write_to`.
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Default)]
pub struct Channel {
    handle: Option<BufReader<File>>,
    path: Option<PathBuf>,
    mode: Option<String>,
    readable: OnceCell<bool>,
    writable: OnceCell<bool>,
    eof: bool,
}

impl Channel {
    /// Open `path` with an fopen-style `mode`.
    ///
    /// An empty path or a `None` mode yields an inert channel that reports
    /// itself as neither readable nor writable.
    pub fn open(path: impl AsRef<Path>, mode: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let mode = match mode {
            Some(m) if !path.as_os_str().is_empty() => m,
            _ => return Ok(Self::default()),
        };

        let file = open_options(mode)?
            .open(path)
            .map_err(io_error_with_help("open stream", path))?;
        trace!(path = %path.display(), mode, "stream opened");

        Ok(Self {
            handle: Some(BufReader::new(file)),
            path: Some(path.to_path_buf()),
            mode: Some(mode.to_string()),
            ..Self::default()
        })
    }

    /// Adopt an already open handle; the mode is read back from the descriptor.
    pub fn adopt(file: File) -> Result<Self> {
        let mode = fd_access_mode(&file)
            .map_err(io_error_with_help("inspect stream mode", Path::new("<adopted>")))?;
        Ok(Self {
            handle: Some(BufReader::new(file)),
            mode: Some(mode),
            ..Self::default()
        })
    }

    /// Raw handle, if open.
    pub fn file(&self) -> Option<&File> {
        self.handle.as_ref().map(|r| r.get_ref())
    }

    /// Mode string the stream was opened with.
    pub fn io_mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn display_path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new("<stream>"))
    }

    pub fn set_blocking(&mut self, flag: bool) -> Result<&mut Self> {
        let Some(reader) = self.handle.as_ref() else {
            return Err(AtlasError::logic("Cannot set blocking, resource not open"));
        };
        set_fd_blocking(reader.get_ref(), flag).map_err(io_error_with_help(
            "set blocking mode",
            self.path.as_deref().unwrap_or(Path::new("<stream>")),
        ))?;
        Ok(self)
    }

    pub fn is_blocking(&self) -> bool {
        match self.file() {
            Some(f) => fd_is_blocking(f).unwrap_or(false),
            None => false,
        }
    }

    pub fn is_readable(&self) -> bool {
        if self.handle.is_none() {
            return false;
        }
        *self
            .readable
            .get_or_init(|| mode_is_readable(self.mode.as_deref().unwrap_or("")))
    }

    pub fn is_writable(&self) -> bool {
        if self.handle.is_none() {
            return false;
        }
        *self
            .writable
            .get_or_init(|| mode_is_writable(self.mode.as_deref().unwrap_or("")))
    }

    fn check_readable(&self) -> Result<()> {
        if !self.is_readable() {
            return Err(AtlasError::logic(format!(
                "Channel is not readable: {}",
                self.display_path().display()
            )));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if !self.is_writable() {
            return Err(AtlasError::logic(format!(
                "Channel is not writable: {}",
                self.display_path().display()
            )));
        }
        Ok(())
    }

    fn swallow_read_error(&self, e: &io::Error) {
        if e.kind() == io::ErrorKind::WouldBlock {
            trace!(path = %self.display_path().display(), "read would block");
        } else {
            warn!(path = %self.display_path().display(), error = %e, "read failed; treating as no data");
        }
    }

    /// Read up to `length` bytes. `None` on end of stream or any read failure.
    pub fn read(&mut self, length: usize) -> Result<Option<Vec<u8>>> {
        self.check_readable()?;
        if length == 0 {
            return Ok(None);
        }
        let mut buf = vec![0u8; length];
        let res = match self.handle.as_mut() {
            Some(reader) => reader.read(&mut buf),
            None => return Ok(None),
        };
        match res {
            Ok(0) => {
                self.eof = true;
                Ok(None)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(e) => {
                self.swallow_read_error(&e);
                Ok(None)
            }
        }
    }

    /// Read a single byte.
    pub fn read_char(&mut self) -> Result<Option<u8>> {
        Ok(self.read(1)?.and_then(|b| b.first().copied()))
    }

    /// Read one line with trailing CR/LF stripped.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.check_readable()?;
        let mut buf = Vec::new();
        let res = match self.handle.as_mut() {
            Some(reader) => reader.read_until(b'\n', &mut buf),
            None => return Ok(None),
        };
        match res {
            Ok(0) => {
                self.eof = true;
                Ok(None)
            }
            Ok(_) => {
                if buf.last() != Some(&b'\n') {
                    self.eof = true;
                }
                while matches!(buf.last(), Some(b'\r' | b'\n')) {
                    buf.pop();
                }
                Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
            }
            Err(e) => {
                self.swallow_read_error(&e);
                Ok(None)
            }
        }
    }

    /// Read until end of stream. `None` if nothing could be read.
    pub fn read_all(&mut self) -> Result<Option<Vec<u8>>> {
        self.check_readable()?;
        let mut out = Vec::new();
        while let Some(chunk) = self.read(CHUNK_SIZE)? {
            out.extend_from_slice(&chunk);
        }
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    /// Pump everything readable from this channel into `writer`.
    pub fn write_to(&mut self, writer: &mut Channel) -> Result<u64> {
        self.check_readable()?;
        writer.check_writable()?;
        let mut total = 0u64;
        while let Some(chunk) = self.read(CHUNK_SIZE)? {
            total += writer.write(&chunk, None)? as u64;
        }
        Ok(total)
    }

    /// Write `data`, capped at `length` bytes when given. Returns bytes written.
    ///
    /// A non-blocking descriptor that would block stops the write early and
    /// reports the partial count.
    pub fn write(&mut self, data: &[u8], length: Option<usize>) -> Result<usize> {
        self.check_writable()?;
        let data = match length {
            Some(l) => &data[..l.min(data.len())],
            None => data,
        };
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("<stream>"));
        let Some(reader) = self.handle.as_mut() else {
            return Ok(0);
        };

        // Buffered read-ahead must not shift where the write lands.
        if !reader.buffer().is_empty() {
            reader
                .seek(SeekFrom::Current(0))
                .map_err(io_error_with_help("write to stream", &path))?;
        }

        let file = reader.get_mut();
        let mut written = 0;
        while written < data.len() {
            match file.write(&data[written..]) {
                Ok(0) => {
                    return Err(AtlasError::io_state(
                        "write to stream",
                        &path,
                        io::ErrorKind::WriteZero,
                        "Unable to write to stream",
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(io_error_with_help("write to stream", &path)(e)),
            }
        }
        Ok(written)
    }

    /// Write `data` followed by a newline.
    pub fn write_line(&mut self, data: &str) -> Result<usize> {
        let mut line = Vec::with_capacity(data.len() + 1);
        line.extend_from_slice(data.as_bytes());
        line.push(b'\n');
        self.write(&line, None)
    }

    /// Write up to `length` bytes from the front of `buffer`, draining what was written.
    pub fn write_buffer(&mut self, buffer: &mut Vec<u8>, length: usize) -> Result<usize> {
        let n = self.write(buffer, Some(length))?;
        buffer.drain(..n);
        Ok(n)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("<stream>"));
        let Some(reader) = self.handle.as_mut() else {
            return Err(AtlasError::logic("Cannot seek, resource not open"));
        };
        let at = reader
            .seek(pos)
            .map_err(io_error_with_help("seek stream", &path))?;
        self.eof = false;
        Ok(at)
    }

    pub fn rewind(&mut self) -> Result<&mut Self> {
        self.seek(SeekFrom::Start(0))?;
        Ok(self)
    }

    /// True when closed or after a read hit end of stream.
    pub fn is_at_end(&self) -> bool {
        self.handle.is_none() || self.eof
    }

    /// Close the handle, discarding any close error, and reset to the closed state.
    pub fn close(&mut self) -> &mut Self {
        if let Some(reader) = self.handle.take() {
            let fd = reader.into_inner().into_raw_fd();
            if unsafe { libc::close(fd) } != 0 {
                let e = io::Error::last_os_error();
                warn!(path = %self.display_path().display(), error = %e, "close failed; ignoring");
            } else {
                trace!(path = %self.display_path().display(), "stream closed");
            }
        }
        self.path = None;
        self.mode = None;
        self.readable.take();
        self.writable.take();
        self.eof = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_path_is_inert() {
        let mut ch = Channel::open("", Some("r")).unwrap();
        assert!(!ch.is_readable());
        assert!(!ch.is_writable());
        assert!(ch.is_at_end());
        assert_eq!(ch.read(4).unwrap_err().kind(), ErrorKind::Logic);
        assert_eq!(ch.write(b"x", None).unwrap_err().kind(), ErrorKind::Logic);
    }

    #[test]
    fn none_mode_is_inert() {
        let dir = tempdir().unwrap();
        let ch = Channel::open(dir.path().join("f"), None).unwrap();
        assert!(!ch.is_open());
        assert!(!dir.path().join("f").exists());
    }

    #[test]
    fn open_missing_for_read_is_io_error() {
        let dir = tempdir().unwrap();
        let err = Channel::open(dir.path().join("missing"), Some("r")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));
    }

    #[test]
    fn set_blocking_on_closed_is_logic_error() {
        let mut ch = Channel::default();
        let err = ch.set_blocking(false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert!(!ch.is_blocking());
    }

    #[test]
    fn round_trip_read_write() {
        let dir = tempdir().unwrap();
        let mut ch = Channel::open(dir.path().join("rt"), Some("w+")).unwrap();
        assert_eq!(ch.write(b"hello\x00world", None).unwrap(), 11);
        ch.rewind().unwrap();
        assert_eq!(ch.read(64).unwrap().as_deref(), Some(&b"hello\x00world"[..]));
        assert_eq!(ch.read(64).unwrap(), None);
        assert!(ch.is_at_end());
    }

    #[test]
    fn empty_content_reads_none() {
        let dir = tempdir().unwrap();
        let mut ch = Channel::open(dir.path().join("empty"), Some("w+")).unwrap();
        assert_eq!(ch.write(b"", None).unwrap(), 0);
        ch.rewind().unwrap();
        assert_eq!(ch.read(16).unwrap(), None);
    }

    #[test]
    fn write_honours_length_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cap");
        let mut ch = Channel::open(&path, Some("w")).unwrap();
        assert_eq!(ch.write(b"abcdef", Some(3)).unwrap(), 3);
        assert_eq!(ch.write(b"xy", Some(10)).unwrap(), 2);
        ch.close();
        assert_eq!(fs::read(&path).unwrap(), b"abcxy");
    }

    #[test]
    fn read_line_strips_crlf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lines");
        fs::write(&path, b"abc\r\nsecond\nlast").unwrap();
        let mut ch = Channel::open(&path, Some("r")).unwrap();
        assert_eq!(ch.read_line().unwrap().as_deref(), Some("abc"));
        assert_eq!(ch.read_line().unwrap().as_deref(), Some("second"));
        assert!(!ch.is_at_end());
        assert_eq!(ch.read_line().unwrap().as_deref(), Some("last"));
        assert!(ch.is_at_end());
        assert_eq!(ch.read_line().unwrap(), None);
    }

    #[test]
    fn read_char_walks_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chars");
        fs::write(&path, b"ab").unwrap();
        let mut ch = Channel::open(&path, Some("r")).unwrap();
        assert_eq!(ch.read_char().unwrap(), Some(b'a'));
        assert_eq!(ch.read_char().unwrap(), Some(b'b'));
        assert_eq!(ch.read_char().unwrap(), None);
    }

    #[test]
    fn write_after_buffered_read_lands_at_logical_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed");
        fs::write(&path, b"line1\nline2\n").unwrap();
        let mut ch = Channel::open(&path, Some("r+")).unwrap();
        assert_eq!(ch.read_line().unwrap().as_deref(), Some("line1"));
        ch.write(b"LINE2", None).unwrap();
        ch.close();
        assert_eq!(fs::read(&path).unwrap(), b"line1\nLINE2\n");
    }

    #[test]
    fn read_only_channel_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro");
        fs::write(&path, b"x").unwrap();
        let mut ch = Channel::open(&path, Some("r")).unwrap();
        assert!(ch.is_readable());
        assert!(!ch.is_writable());
        assert_eq!(ch.write(b"y", None).unwrap_err().kind(), ErrorKind::Logic);
    }

    #[test]
    fn close_is_idempotent_and_resets_state() {
        let dir = tempdir().unwrap();
        let mut ch = Channel::open(dir.path().join("c"), Some("a+")).unwrap();
        assert!(ch.is_readable());
        assert!(ch.is_writable());
        ch.close().close();
        assert!(!ch.is_readable());
        assert!(!ch.is_writable());
        assert!(ch.io_mode().is_none());
        assert!(ch.is_at_end());
    }

    #[test]
    fn write_buffer_drains_written_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("buf");
        let mut ch = Channel::open(&path, Some("w")).unwrap();
        let mut buffer = b"abcdef".to_vec();
        assert_eq!(ch.write_buffer(&mut buffer, 4).unwrap(), 4);
        assert_eq!(buffer, b"ef");
        ch.write_line("!").unwrap();
        ch.close();
        assert_eq!(fs::read(&path).unwrap(), b"abcd!\n");
    }

    #[test]
    fn write_to_pumps_everything() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &payload).unwrap();
        let mut reader = Channel::open(&src, Some("r")).unwrap();
        let mut writer = Channel::open(&dst, Some("w")).unwrap();
        assert_eq!(reader.write_to(&mut writer).unwrap(), payload.len() as u64);
        writer.close();
        assert_eq!(fs::read(&dst).unwrap(), payload);
    }

    #[test]
    fn adopt_reads_mode_from_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("adopt");
        fs::write(&path, b"data").unwrap();
        let mut ch = Channel::adopt(File::open(&path).unwrap()).unwrap();
        assert_eq!(ch.io_mode(), Some("r"));
        assert!(ch.is_readable());
        assert!(!ch.is_writable());
        assert_eq!(ch.read_all().unwrap().as_deref(), Some(&b"data"[..]));
    }

    #[test]
    fn read_failures_degrade_to_none() {
        let dir = tempdir().unwrap();
        // A directory opens read-only, but every read fails with EISDIR.
        let mut ch = Channel::open(dir.path(), Some("r")).unwrap();
        assert!(ch.is_readable());
        assert_eq!(ch.read(4).unwrap(), None);
        assert_eq!(ch.read_char().unwrap(), None);
        assert_eq!(ch.read_line().unwrap(), None);
    }

    #[test]
    fn set_blocking_toggles_descriptor() {
        let dir = tempdir().unwrap();
        let mut ch = Channel::open(dir.path().join("nb"), Some("w")).unwrap();
        assert!(ch.is_blocking());
        ch.set_blocking(false).unwrap();
        assert!(!ch.is_blocking());
    }
}
