//! CLI definition and parsing.
//! Defines Args/Command and provides parse() for command-line handling.
//!
//! Notes:
//! - --debug is a shorthand for --log-level debug.
//! - Global flags override values loaded from config.xml.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::config::types::{Config, LogLevel};
use crate::node::perms::parse_mode;

/// Filesystem utility over atlas_fs directories, files and lock files.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Directory trees, file channels and lock files")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(
        short = 'd',
        long,
        global = true,
        help = "Enable debug logging (shorthand for --log-level debug)"
    )]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Also write logs to this file.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long, global = true, help = "Emit logs in structured JSON")]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List directory entries
    Scan(ScanArgs),
    /// Create a directory and any missing ancestors
    Mkdir {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
        /// Exact octal mode (e.g. 0755); also applied to an existing dir. Without it, new dirs use default_dir_mode under umask
        #[arg(long, value_parser = parse_mode_arg)]
        mode: Option<u32>,
    },
    /// Copy a directory tree into a new location
    Copy(PairArgs),
    /// Merge a directory tree into a (possibly existing) location
    Merge(PairArgs),
    /// Rename a directory
    Move(PairArgs),
    /// Delete a directory tree
    Delete {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },
    /// Delete everything inside a directory
    Empty {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },
    /// Change directory permissions
    Chmod {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
        #[arg(value_parser = parse_mode_arg)]
        mode: u32,
        /// Apply to the whole subtree (symlinks excluded)
        #[arg(short, long)]
        recursive: bool,
    },
    /// Run a command while holding a named lock
    Lock(LockArgs),
    /// Print the effective configuration and its source
    PrintConfig,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ScanArgs {
    #[arg(value_hint = ValueHint::DirPath)]
    pub dir: PathBuf,
    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,
    /// Only list files
    #[arg(long, conflicts_with = "dirs")]
    pub files: bool,
    /// Only list directories
    #[arg(long)]
    pub dirs: bool,
}

impl ScanArgs {
    /// (files, dirs) selection; neither flag means both.
    pub fn selection(&self) -> (bool, bool) {
        match (self.files, self.dirs) {
            (false, false) => (true, true),
            (f, d) => (f, d),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PairArgs {
    #[arg(value_hint = ValueHint::DirPath)]
    pub src: PathBuf,
    #[arg(value_hint = ValueHint::AnyPath)]
    pub dst: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LockArgs {
    /// Lock name; the file is `{lock_dir}/{name}.lock`
    pub name: String,
    /// Override the configured lock directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub lock_dir: Option<PathBuf>,
    /// Wait for the OS lock instead of failing fast
    #[arg(long)]
    pub wait: bool,
    /// Command to run while the lock is held
    #[arg(last = true, required = true, num_args = 1..)]
    pub cmd: Vec<String>,
}

fn parse_mode_arg(s: &str) -> Result<u32, String> {
    parse_mode(s).ok_or_else(|| format!("invalid octal mode: '{s}'"))
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(p) = &self.log_file {
            cfg.log_file = Some(p.clone());
        }
        if self.json {
            cfg.json_logs = true;
        }
        if let Command::Lock(LockArgs {
            lock_dir: Some(d), ..
        }) = &self.command
        {
            cfg.lock_dir = d.clone();
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
