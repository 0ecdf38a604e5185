//! Single-instance application locking with inter-instance messaging.
//!
//! `applock` guarantees that only one instance of an application —
//! identified by a string id and a shared lock directory — is active at a
//! time, and lets later-launched instances hand a short message to the
//! running one instead of starting a competing copy.
//!
//! The mechanism is an OS advisory file lock per id (the *slot*), a second
//! advisory lock serializing metadata updates (the *meta-lock*), and a
//! one-shot loopback TCP exchange whose port the running instance publishes
//! next to its lock file. See [`AppLocker`] for the full contract.
//!
//! # Example
//!
//! ```no_run
//! use applock::{AppLocker, LockOutcome};
//!
//! let locker = AppLocker::new("my-app", "/tmp/my-app-locks");
//! match locker.lock() {
//!     LockOutcome::Success => { /* we are the instance; run the app */ }
//!     LockOutcome::AlreadyHeld(_) => {
//!         // forward our command line to the running instance
//!         let _ = locker.send_message("open --new-tab");
//!     }
//!     LockOutcome::CannotCreate(err) => eprintln!("cannot lock: {err}"),
//! }
//! ```
//!
//! # Error Handling
//!
//! Public operations return outcome enums ([`LockOutcome`],
//! [`MessageOutcome`]) rather than `Result`s: contention and missing
//! instances are ordinary answers, not errors. Only environmental failures
//! (unwritable lock directory, socket setup) surface, as
//! [`LockOutcome::CannotCreate`]. `unlock` is unconditionally best-effort
//! so it is safe to run from an exit hook.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade. Wire up an
//! implementation such as `env_logger` to see acquire/release and server
//! lifecycle diagnostics.

pub mod error;
pub mod lock;
pub mod locker;
pub mod messaging;

pub use error::SetupError;
pub use lock::{AdvisoryLock, LockOutcome};
pub use locker::AppLocker;
pub use locker::exit_hook;
pub use messaging::{MessageHandler, MessageOutcome};
