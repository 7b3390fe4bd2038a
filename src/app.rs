//! Application orchestrator.
//! Loads/merges config, initializes logging, and dispatches each subcommand
//! to the matching atlas_fs operation.

use anyhow::{Context, Result};
use std::process::{self, ExitCode};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use atlas_fs::cli::{Args, Command, LockArgs, PairArgs, ScanArgs};
use atlas_fs::output as out;
use atlas_fs::{Config, Dir, Mutex, config};

use crate::logging::init_tracing;
use crate::shutdown;

/// Exit status when the named lock is held elsewhere (EX_TEMPFAIL).
pub const EXIT_LOCK_BUSY: u8 = 75;
/// Exit status after an interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

/// Lock files at least this old with no flock holder are treated as abandoned.
const STALE_LOCK_AGE: Duration = Duration::from_secs(2);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the CLI application.
pub fn run(args: Args) -> Result<ExitCode> {
    let mut cfg = config::load_config()?;
    args.apply_overrides(&mut cfg);

    // Handle print-config before logging init
    if let Command::PrintConfig = args.command {
        print_config(&cfg);
        return Ok(ExitCode::SUCCESS);
    }

    // Hold the guard until return so the file appender flushes.
    let _guard = init_tracing(cfg.log_level, cfg.log_file.as_deref(), cfg.json_logs).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
        e
    })?;

    debug!(command = ?args.command, "starting atlas");

    match &args.command {
        Command::Scan(scan) => run_scan(scan)?,
        Command::Mkdir { dir, mode } => {
            match mode {
                Some(mode) => {
                    Dir::new(dir).ensure_exists(Some(*mode))?;
                    info!(dir = %dir.display(), mode = format_args!("{mode:o}"), "Directory ensured");
                }
                None => {
                    Dir::new(dir).ensure_exists_with_default(cfg.default_dir_mode)?;
                    info!(dir = %dir.display(), "Directory ensured");
                }
            }
        }
        Command::Copy(PairArgs { src, dst }) => {
            let copied = Dir::new(src).copy(dst)?;
            out::print_success(&format!("Copied '{}' -> '{}'", src.display(), copied.path().display()));
        }
        Command::Merge(PairArgs { src, dst }) => {
            let merged = Dir::new(src).merge_into(dst)?;
            out::print_success(&format!("Merged '{}' -> '{}'", src.display(), merged.path().display()));
        }
        Command::Move(PairArgs { src, dst }) => {
            let mut dir = Dir::new(src);
            dir.move_to(dst)?;
            out::print_success(&format!("Moved '{}' -> '{}'", src.display(), dir.path().display()));
        }
        Command::Delete { dir } => {
            Dir::new(dir).delete()?;
            info!(dir = %dir.display(), "Directory deleted");
        }
        Command::Empty { dir } => {
            Dir::new(dir).empty_out()?;
            info!(dir = %dir.display(), "Directory emptied");
        }
        Command::Chmod { dir, mode, recursive } => {
            Dir::new(dir).set_permissions(*mode, *recursive)?;
            info!(dir = %dir.display(), mode = format_args!("{mode:o}"), recursive, "Permissions set");
        }
        Command::Lock(lock) => return run_locked(lock, &cfg),
        Command::PrintConfig => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn run_scan(scan: &ScanArgs) -> Result<()> {
    let dir = Dir::new(&scan.dir);
    let (files, dirs) = scan.selection();
    if scan.recursive {
        for item in dir.scan_raw_recursive(files, dirs)? {
            let (rel, node) = item?;
            let suffix = if node.is_dir() { "/" } else { "" };
            out::print_user(&format!("{}{suffix}", rel.display()));
        }
    } else {
        let mut entries = dir
            .scan_raw(files, dirs)?
            .map(|item| item.map(|(name, node)| (name, node.is_dir())))
            .collect::<atlas_fs::Result<Vec<_>>>()?;
        entries.sort();
        for (name, is_dir) in entries {
            let suffix = if is_dir { "/" } else { "" };
            out::print_user(&format!("{}{suffix}", name.to_string_lossy()));
        }
    }
    Ok(())
}

fn run_locked(lock: &LockArgs, cfg: &Config) -> Result<ExitCode> {
    shutdown::install().context("install interrupt handler")?;

    let mut mutex = Mutex::new(&lock.name, &cfg.lock_dir);
    if !acquire(&mut mutex, lock.wait)? {
        if shutdown::is_requested() {
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
        out::print_warn(&format!(
            "Lock '{}' is busy ({})",
            lock.name,
            mutex.lock_path().display()
        ));
        return Ok(ExitCode::from(EXIT_LOCK_BUSY));
    }
    info!(name = %lock.name, path = %mutex.lock_path().display(), "Lock acquired");

    let (program, rest) = lock
        .cmd
        .split_first()
        .context("lock requires a command to run")?;
    let status = process::Command::new(program)
        .args(rest)
        .status()
        .with_context(|| format!("spawn '{program}'"));

    mutex.unlock()?;
    info!(name = %lock.name, "Lock released");

    let status = status?;
    if shutdown::is_requested() {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => {
            warn!(command = %program, "command terminated by signal");
            ExitCode::FAILURE
        }
    })
}

/// Take the lock, clearing abandoned lock files. With `wait`, poll until
/// acquired or interrupted.
fn acquire(mutex: &mut Mutex, wait: bool) -> Result<bool> {
    loop {
        if mutex.lock(wait) {
            return Ok(true);
        }
        if mutex.recover_stale(STALE_LOCK_AGE)? && mutex.lock(wait) {
            return Ok(true);
        }
        if !wait || shutdown::is_requested() {
            return Ok(false);
        }
        thread::sleep(LOCK_POLL_INTERVAL);
    }
}

fn print_config(cfg: &Config) {
    match config::config_path() {
        Some(p) if std::env::var_os(config::CONFIG_ENV).is_some() => {
            out::print_info(&format!("Using {} (explicit): {}", config::CONFIG_ENV, p.display()));
        }
        Some(p) if p.exists() => out::print_info(&format!("Using config file: {}", p.display())),
        Some(p) => out::print_info(&format!("No config file at {}; using defaults", p.display())),
        None => out::print_warn("Could not determine a default config path; using defaults"),
    }
    out::print_user(&format!("default_dir_mode = {:04o}", cfg.default_dir_mode));
    out::print_user(&format!("lock_dir = {}", cfg.lock_dir.display()));
    out::print_user(&format!("log_level = {}", cfg.log_level));
    out::print_user(&format!(
        "log_file = {}",
        cfg.log_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".into())
    ));
    out::print_user(&format!("json_logs = {}", cfg.json_logs));
}
