//! Lock outcome type.

use crate::error::SetupError;

/// Result of a lock attempt.
#[derive(Debug)]
pub enum LockOutcome {
    /// The lock was acquired.
    Success,

    /// Another owner currently holds the lock. Expected under contention;
    /// safe to retry.
    AlreadyHeld(String),

    /// The lock file or its directory could not be created. Fatal; retrying
    /// cannot succeed until the underlying condition is fixed.
    CannotCreate(SetupError),
}

impl LockOutcome {
    /// True for [`LockOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, LockOutcome::Success)
    }
}
