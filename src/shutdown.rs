//! Interrupt coordination for the `atlas` binary.
//! The ctrlc handler only records the request; whoever is waiting (the lock
//! poller or a supervised child) checks the flag and unwinds normally, so
//! held lock files are released on the way out.
//!
//! Notes:
//! - Relaxed atomics are sufficient for a one-way "stop" flag.
//! - `request()` is safe to call from signal handlers.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a cooperative shutdown (idempotent).
#[inline]
pub fn request() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Check whether a shutdown has been requested.
#[inline]
pub fn is_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Install the interrupt handler. Safe to call once per process.
pub fn install() -> anyhow::Result<()> {
    ctrlc::set_handler(request)?;
    Ok(())
}
