//! Advisory file locking.
//!
//! This module implements the mutual-exclusion primitive the rest of the
//! crate is built on: an OS-level exclusive, non-blocking lock on a file
//! handle (`flock` on Unix, `LockFileEx` on Windows, via `fs2`).
//!
//! # Lock Files
//!
//! Lock files carry no payload; they exist only as lock targets. Ownership
//! is the OS lock on an open handle, never the file's presence on disk, so
//! a file left behind by a crashed process does not block a new instance:
//! the OS releases the lock when the holding process dies.
//!
//! # Acquisition Modes
//!
//! [`AdvisoryLock::acquire`] is a single non-blocking attempt — contention
//! reports `AlreadyHeld` and the caller decides what to do.
//! [`AdvisoryLock::retry_until_acquired`] spins until the lock is free and
//! is only appropriate for locks held briefly, such as the metadata lock
//! serializing lock-state updates.

mod advisory;
mod types;

#[cfg(test)]
mod tests;

pub use advisory::AdvisoryLock;
pub use types::LockOutcome;
