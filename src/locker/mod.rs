//! The locking facade.
//!
//! [`AppLocker`] ties the pieces together: two advisory locks, the port
//! file, the message server/client, and an exit hook. The *slot* lock
//! (`{id}.lock`) represents exclusive ownership of the id; the *global*
//! lock (`global.lock`) is a meta-lock serializing every check-then-act
//! sequence that touches slot state or the port file, across all processes
//! sharing the lock directory.
//!
//! # Files
//!
//! Under `lock_dir`, with `{id}` percent-encoded:
//!
//! | file | contents | lifecycle |
//! |---|---|---|
//! | `global.lock` | empty, lock target only | created once, never deleted |
//! | `{id}.lock` | empty, lock target only | created on first `lock()`, deleted on `unlock()` |
//! | `{id}.port` | decimal TCP port | written on `lock()` success, deleted on `unlock()` |
//!
//! Ownership of the slot is the OS lock, never the file's presence, so a
//! crashed holder does not wedge the id: the OS drops its lock with the
//! process and the next `lock()` succeeds. A `send_message` racing into
//! the window between the crash and that release sees a refused connection
//! and reports `Failure` rather than hanging.

pub mod exit_hook;


use crate::error::SetupError;
use crate::lock::{AdvisoryLock, LockOutcome};
use crate::messaging::{
    MessageClient, MessageHandler, MessageOutcome, MessageServer, ServerHandle,
};
use exit_hook::ExitHookHandle;
use log::{debug, warn};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Bytes percent-encoded in lock file names. Everything outside
/// `[A-Za-z0-9._-]` is escaped so arbitrary ids map to stable,
/// filesystem-safe tokens.
const ENCODED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

fn encode_id(id: &str) -> String {
    utf8_percent_encode(id, ENCODED).to_string()
}

/// Guarantees a single active instance per `(id, lock_dir)` and carries
/// messages from later-launched instances to the running one.
///
/// Two lockers with the same id and directory contend for one slot;
/// different ids under the same directory are independent. A locker cycles
/// freely between locked and unlocked.
///
/// `unlock` also runs from a registered exit hook, so an instance that
/// terminates normally without calling it still releases its files.
///
/// # Example
///
/// ```no_run
/// use applock::{AppLocker, LockOutcome, MessageOutcome};
///
/// let locker = AppLocker::with_handler("my-app", "/tmp/my-app-locks", |msg| {
///     format!("pong: {msg}")
/// });
///
/// match locker.lock() {
///     LockOutcome::Success => { /* run the application */ }
///     LockOutcome::AlreadyHeld(_) => {
///         // hand our arguments to the running instance instead
///         if let MessageOutcome::Answer(reply) = locker.send_message("ping") {
///             println!("{reply}");
///         }
///     }
///     LockOutcome::CannotCreate(err) => eprintln!("cannot lock: {err}"),
/// }
/// ```
pub struct AppLocker {
    id: String,
    lock_dir: PathBuf,
    inner: Arc<Mutex<Inner>>,
    client: MessageClient,
}

/// State shared between the caller's thread and the exit hook.
struct Inner {
    id: String,
    global: AdvisoryLock,
    slot: AdvisoryLock,
    port_file: PathBuf,
    handler: MessageHandler,
    server: Option<ServerHandle>,
    hook: Option<ExitHookHandle>,
}

impl AppLocker {
    /// Create a locker whose message handler echoes requests back verbatim.
    ///
    /// `id` may be any string; it is percent-encoded into the lock file
    /// names. `lock_dir` must be the same for every instance meaning to
    /// share this id.
    pub fn new(id: impl Into<String>, lock_dir: impl Into<PathBuf>) -> Self {
        Self::with_handler(id, lock_dir, |message| message.to_string())
    }

    /// Create a locker with a custom message handler.
    ///
    /// The handler runs on the server thread of whichever instance holds
    /// the lock; its return value is the reply senders receive.
    pub fn with_handler(
        id: impl Into<String>,
        lock_dir: impl Into<PathBuf>,
        handler: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        let id = id.into();
        let lock_dir = lock_dir.into();
        let token = encode_id(&id);
        let inner = Inner {
            id: id.clone(),
            global: AdvisoryLock::new(lock_dir.join("global.lock")),
            slot: AdvisoryLock::new(lock_dir.join(format!("{token}.lock"))),
            port_file: lock_dir.join(format!("{token}.port")),
            handler: Arc::new(handler),
            server: None,
            hook: None,
        };
        let client = MessageClient::new(&id);
        Self {
            id,
            lock_dir,
            inner: Arc::new(Mutex::new(inner)),
            client,
        }
    }

    /// The id this locker contends for.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The directory holding the lock files.
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// True while this locker instance holds the slot.
    pub fn is_locked(&self) -> bool {
        self.inner_guard().slot.is_held()
    }

    /// Attempt to become the active instance for the id.
    ///
    /// On success a message server is running on an ephemeral loopback
    /// port, the port is published in the port file, and an exit hook
    /// equivalent to [`unlock`](AppLocker::unlock) is registered.
    ///
    /// Calling `lock` on a locker that already holds the slot is an
    /// idempotent `Success`: the running server is kept, no second one is
    /// spawned.
    ///
    /// # Returns
    ///
    /// * `Success` — this instance now owns the id
    /// * `AlreadyHeld` — another instance owns it; expected, retryable
    /// * `CannotCreate` — files could not be created or the server could
    ///   not start; fatal until the environment is fixed
    pub fn lock(&self) -> LockOutcome {
        let mut inner = self.inner_guard();

        if inner.slot.is_held() {
            return LockOutcome::Success;
        }

        if let LockOutcome::CannotCreate(e) = inner.global.retry_until_acquired() {
            return LockOutcome::CannotCreate(e);
        }
        let outcome = inner.lock_slot(&self.inner);
        inner.global.release();
        outcome
    }

    /// Release the slot and tear the session down.
    ///
    /// Never fails and never panics: every step is best-effort, so calling
    /// it on a never-locked or already-unlocked locker is harmless.
    pub fn unlock(&self) {
        let mut inner = self.inner_guard();
        if let Some(handle) = inner.hook.take() {
            exit_hook::unregister(handle);
        }
        inner.release_session();
    }

    /// Deliver `message` to whichever instance currently holds the id and
    /// block for its reply.
    ///
    /// The global lock is held for the whole round trip. That serializes
    /// sends against concurrent lock/unlock activity — a sender can never
    /// observe a half-written port file or a server mid-teardown — at the
    /// cost of blocking unrelated lock calls for the duration.
    ///
    /// # Returns
    ///
    /// * `Answer` — the reply produced by the running instance's handler
    /// * `Failure` — no running instance, stale port, or transport error
    pub fn send_message(&self, message: &str) -> MessageOutcome {
        let mut inner = self.inner_guard();
        if let LockOutcome::CannotCreate(e) = inner.global.retry_until_acquired() {
            return MessageOutcome::Failure(e.to_string());
        }
        let outcome = self.exchange(&inner, message);
        inner.global.release();
        outcome
    }

    /// Port-file lookup plus the client round trip; caller holds the
    /// global lock.
    fn exchange(&self, inner: &Inner, message: &str) -> MessageOutcome {
        if !inner.port_file.exists() {
            return MessageOutcome::Failure(format!(
                "no running instance for id `{}`",
                self.id
            ));
        }
        let contents = match fs::read_to_string(&inner.port_file) {
            Ok(contents) => contents,
            Err(e) => return MessageOutcome::Failure(format!("failed to read port file: {e}")),
        };
        let port: u16 = match contents.trim().parse() {
            Ok(port) => port,
            Err(_) => {
                return MessageOutcome::Failure(format!(
                    "invalid port number `{contents}` in port file"
                ));
            }
        };
        self.client.send(message, port)
    }

    fn inner_guard(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    /// Acquire the slot and start the session; caller holds the global
    /// lock. A single non-blocking attempt — contention on the slot means
    /// another instance is running, which is an answer, not a condition to
    /// wait out.
    fn lock_slot(&mut self, shared: &Arc<Mutex<Inner>>) -> LockOutcome {
        match self.slot.acquire() {
            LockOutcome::Success => {}
            other => return other,
        }

        let server = match MessageServer::bind(Arc::clone(&self.handler)) {
            Ok(server) => server,
            Err(e) => {
                self.slot.release();
                return LockOutcome::CannotCreate(SetupError::Server { source: e });
            }
        };
        let port = server.port();
        let running = match server.start(&self.id) {
            Ok(running) => running,
            Err(e) => {
                self.slot.release();
                return LockOutcome::CannotCreate(SetupError::Server { source: e });
            }
        };

        if let Err(e) = fs::write(&self.port_file, port.to_string()) {
            running.stop();
            self.slot.release();
            return LockOutcome::CannotCreate(SetupError::PortFile {
                path: self.port_file.clone(),
                source: e,
            });
        }
        self.server = Some(running);

        let shared = Arc::clone(shared);
        self.hook = Some(exit_hook::register(move || {
            let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            // the registry already drained this hook; it must not try to
            // unregister itself
            inner.hook = None;
            inner.release_session();
        }));

        debug!("locked `{}` with message server on port {port}", self.id);
        LockOutcome::Success
    }

    /// Tear the session down: stop the server, release the slot, delete
    /// the metadata files. Every step swallows its own errors so this is
    /// safe to run from an exit hook, where a failure has no recipient.
    fn release_session(&mut self) {
        if let LockOutcome::CannotCreate(e) = self.global.retry_until_acquired() {
            warn!("unlocking `{}` without the metadata lock: {e}", self.id);
        }

        if let Some(server) = self.server.take() {
            server.stop();
        }
        self.slot.release();
        remove_best_effort(self.slot.path());
        remove_best_effort(&self.port_file);
        self.global.release();

        debug!("unlocked `{}`", self.id);
    }
}

fn remove_best_effort(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!("failed to delete '{}': {}", path.display(), e);
    }
}
