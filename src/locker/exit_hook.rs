//! Process-exit hooks.
//!
//! A process-global registry of callbacks to run when the process
//! terminates normally, so a locked instance releases its files even when
//! the application never calls `unlock` itself. On Unix the registry is
//! wired to `atexit` the first time a hook is registered; on other
//! platforms the host should call [`run_exit_hooks`] from its own shutdown
//! path.
//!
//! A hook must not attempt to unregister its own handle: by the time hooks
//! run they have already been drained from the registry.

use std::collections::HashMap;
use std::sync::{Mutex, Once, OnceLock, PoisonError};

type Callback = Box<dyn FnMut() + Send>;

/// Identifies one registered hook for later [`unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitHookHandle(u64);

struct Registry {
    next_id: u64,
    hooks: HashMap<u64, Callback>,
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| {
        Mutex::new(Registry {
            next_id: 0,
            hooks: HashMap::new(),
        })
    })
}

/// Register `callback` to run at process exit.
pub fn register(callback: impl FnMut() + Send + 'static) -> ExitHookHandle {
    install_process_hook();
    let mut registry = registry().lock().unwrap_or_else(PoisonError::into_inner);
    let id = registry.next_id;
    registry.next_id += 1;
    registry.hooks.insert(id, Box::new(callback));
    ExitHookHandle(id)
}

/// Remove a previously registered hook. Unknown or already-removed handles
/// are a no-op.
pub fn unregister(handle: ExitHookHandle) {
    let mut registry = registry().lock().unwrap_or_else(PoisonError::into_inner);
    registry.hooks.remove(&handle.0);
}

/// Run and drain every registered hook.
///
/// Invoked automatically at normal process exit on Unix; hosts on other
/// platforms call it from their shutdown path. Hooks run outside the
/// registry lock, so a hook may register or unregister other hooks without
/// deadlocking.
pub fn run_exit_hooks() {
    let hooks = {
        let mut registry = registry().lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut registry.hooks)
    };
    for (_, mut hook) in hooks {
        hook();
    }
}

fn install_process_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        #[cfg(unix)]
        // SAFETY: run_hooks_native is a plain extern "C" fn taking no
        // arguments, exactly what atexit expects.
        unsafe {
            libc::atexit(run_hooks_native);
        }
    });
}

#[cfg(unix)]
extern "C" fn run_hooks_native() {
    run_exit_hooks();
}
