//! Error types for applock.
//!
//! Public operations never return a bare `Err`: failures surface as variants
//! of [`LockOutcome`](crate::lock::LockOutcome) or
//! [`MessageOutcome`](crate::messaging::MessageOutcome). `SetupError` is the
//! payload of the non-retryable `CannotCreate` variant and describes why a
//! lock session could not be established.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A non-retryable failure while creating the resources a lock session needs.
///
/// All variants indicate an environmental problem (permissions, invalid path,
/// exhausted descriptors) that retrying cannot fix. Contrast with the
/// `AlreadyHeld` outcome, which is expected contention.
#[derive(Error, Debug)]
pub enum SetupError {
    /// The lock directory could not be created.
    #[error("failed to create lock directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The lock file could not be created or opened read/write.
    #[error("failed to open lock file '{path}': {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The OS rejected the lock attempt for a reason other than contention.
    #[error("failed to lock '{path}': {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The port file recording the message server's port could not be written.
    #[error("failed to write port file '{path}': {source}")]
    PortFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The message server could not bind its socket or start its thread.
    #[error("failed to start message server: {source}")]
    Server {
        #[source]
        source: io::Error,
    },
}
