//! Core library for `atlas_fs`.
//!
//! Filesystem primitives with a small, explicit surface:
//! - `Channel`: an fopen-mode byte stream over an open descriptor.
//! - `File` / `Dir` / `Node`: lazy path wrappers; existence is always
//!   re-queried, never cached.
//! - `Mutex`: a reentrant advisory lock backed by a lock file.
//!
//! Failures surface as `AtlasError` (`NotFound`, `Io`, `Logic`). Reads that
//! fail degrade to "no data", closes never fail, and mutex acquisition
//! reports a plain bool.

#[cfg(not(unix))]
compile_error!("atlas_fs supports POSIX targets only");

pub mod channel;
pub mod cli;
pub mod config;
pub mod errors;
pub mod mutex;
pub mod node;
pub mod output;
pub mod platform;

pub use channel::Channel;
pub use config::{Config, LogLevel, default_config_path, path_has_symlink_ancestor};
pub use errors::{AtlasError, ErrorKind, Result};
pub use mutex::Mutex;
pub use node::{Dir, File, Node, RecursiveScan, Scan};
