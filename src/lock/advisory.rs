//! The advisory lock wrapper.

use super::types::LockOutcome;
use crate::error::SetupError;
use fs2::FileExt;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// An exclusive, non-blocking advisory lock on one file.
///
/// Owns at most one open handle to the lock file; while the lock is held,
/// the OS lock lives on that handle. The struct itself is reusable: after
/// [`release`](AdvisoryLock::release) the same value can
/// [`acquire`](AdvisoryLock::acquire) again.
///
/// The lock file and its parent directory are created lazily on the first
/// acquire attempt. Releasing never deletes the file — whether the file
/// should outlive the lock is the caller's decision.
#[derive(Debug)]
pub struct AdvisoryLock {
    path: PathBuf,
    handle: Option<File>,
}

impl AdvisoryLock {
    /// Create an unheld lock targeting `path`. No filesystem access happens
    /// until the first acquire attempt.
    pub fn new(path: PathBuf) -> Self {
        Self { path, handle: None }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while this instance holds the lock.
    pub fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// Attempt to take the lock without blocking.
    ///
    /// Creates the parent directory and the lock file if missing, opens a
    /// read/write handle, and tries an exclusive OS lock on it.
    ///
    /// # Returns
    ///
    /// * `Success` — the lock is now held by this instance
    /// * `AlreadyHeld` — another owner (possibly another handle in this same
    ///   process) holds it; retryable
    /// * `CannotCreate` — directory/file creation or the lock syscall failed
    ///   for a non-contention reason; not retryable
    pub fn acquire(&mut self) -> LockOutcome {
        if let Some(parent) = self.path.parent()
            && !parent.exists()
            && let Err(e) = fs::create_dir_all(parent)
        {
            return LockOutcome::CannotCreate(SetupError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            });
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) => {
                return LockOutcome::CannotCreate(SetupError::CreateFile {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("acquired advisory lock on '{}'", self.path.display());
                self.handle = Some(file);
                LockOutcome::Success
            }
            Err(e) if is_contention(&e) => LockOutcome::AlreadyHeld(format!(
                "'{}' is locked by another instance",
                self.path.display()
            )),
            Err(e) => LockOutcome::CannotCreate(SetupError::Lock {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Release the OS lock and close the handle.
    ///
    /// Best-effort: failures are logged and swallowed. Calling this when the
    /// lock is not held is a no-op.
    pub fn release(&mut self) {
        if let Some(file) = self.handle.take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!("failed to unlock '{}': {}", self.path.display(), e);
            }
            debug!("released advisory lock on '{}'", self.path.display());
        }
    }

    /// Spin on [`acquire`](AdvisoryLock::acquire) until the lock is free.
    ///
    /// `AlreadyHeld` results are discarded and the attempt repeats;
    /// `CannotCreate` aborts the loop. Only suitable for locks whose holders
    /// release quickly — contention on a long-held lock would spin for its
    /// full duration.
    pub fn retry_until_acquired(&mut self) -> LockOutcome {
        loop {
            match self.acquire() {
                LockOutcome::AlreadyHeld(_) => std::thread::yield_now(),
                outcome => return outcome,
            }
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Whether a lock failure means "held by someone else" rather than a real
/// error. fs2 reports contention as `WouldBlock` on Unix and as a
/// platform-specific code on Windows.
fn is_contention(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
